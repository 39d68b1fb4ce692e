//! Upstream fetching for proxy repositories.
//!
//! Remotes are tried strictly in configured order. Each one has its own HTTP
//! client carrying its connect and read timeouts, so a slow remote never
//! delays the decision about the next one beyond its own budget. Failures are
//! recorded and logged but never surfaced; the caller only learns that no
//! remote had the artifact.

use bytes::Bytes;
use depot_core::{ArtifactPath, DepotError, DepotResult, RemoteConfig};
use depot_storage::ByteReader;
use futures::TryStreamExt;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::{Client, Response, StatusCode};
use std::fmt;
use std::time::{Duration, Instant};
use tokio_util::io::StreamReader;

/// Characters escaped inside a single URL path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// One upstream, immutable for the life of the registry snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    pub base_url: String,
    pub store_locally: bool,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl RemoteDescriptor {
    pub fn from_config(
        config: &RemoteConfig,
        default_connect_secs: Option<u64>,
        default_read_secs: Option<u64>,
    ) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            store_locally: config.store_locally,
            connect_timeout: config.connect_timeout(default_connect_secs),
            read_timeout: config.read_timeout(default_read_secs),
        }
    }

    pub fn url_for(&self, path: &ArtifactPath) -> String {
        let encoded: Vec<String> = path
            .segments()
            .iter()
            .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
            .collect();
        format!("{}/{}", self.base_url, encoded.join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamFailureKind {
    Timeout,
    Connect,
    ServerError(u16),
    /// Any other non-success status apart from 404/410.
    UnexpectedStatus(u16),
    Transport,
}

impl fmt::Display for UpstreamFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpstreamFailureKind::Timeout => write!(f, "timeout"),
            UpstreamFailureKind::Connect => write!(f, "connect"),
            UpstreamFailureKind::ServerError(status) => write!(f, "server_error_{}", status),
            UpstreamFailureKind::UnexpectedStatus(status) => write!(f, "status_{}", status),
            UpstreamFailureKind::Transport => write!(f, "transport"),
        }
    }
}

/// A remote that could not answer. Distinct from "the remote does not have it".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamFailure {
    pub remote: String,
    pub path: ArtifactPath,
    pub kind: UpstreamFailureKind,
    pub message: String,
}

impl UpstreamFailure {
    pub(crate) fn from_reqwest(remote: &RemoteDescriptor, path: &ArtifactPath, err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            UpstreamFailureKind::Timeout
        } else if err.is_connect() {
            UpstreamFailureKind::Connect
        } else {
            UpstreamFailureKind::Transport
        };
        Self {
            remote: remote.base_url.clone(),
            path: path.clone(),
            kind,
            message: err.to_string(),
        }
    }

    pub(crate) fn interrupted(remote: &RemoteDescriptor, path: &ArtifactPath, message: String) -> Self {
        Self {
            remote: remote.base_url.clone(),
            path: path.clone(),
            kind: UpstreamFailureKind::Transport,
            message,
        }
    }

    pub(crate) fn log(&self) {
        tracing::warn!(
            remote = %self.remote,
            path = %self.path,
            failure_kind = %self.kind,
            error = %self.message,
            "Upstream fetch failed"
        );
    }
}

/// A successful upstream response whose body has not been read yet.
pub struct UpstreamResponse {
    /// Index of the answering remote in the configured order.
    pub remote_index: usize,
    pub remote: RemoteDescriptor,
    pub content_length: Option<u64>,
    response: Response,
}

impl UpstreamResponse {
    /// Body as a reader for streaming into storage.
    pub fn into_reader(self) -> ByteReader {
        let stream = self
            .response
            .bytes_stream()
            .map_err(std::io::Error::other);
        Box::pin(StreamReader::new(stream))
    }

    pub async fn bytes(self) -> Result<Bytes, reqwest::Error> {
        self.response.bytes().await
    }
}

impl fmt::Debug for UpstreamResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamResponse")
            .field("remote", &self.remote.base_url)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Result of walking the remotes: at most one response plus every failure met on the way.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub response: Option<UpstreamResponse>,
    pub failures: Vec<UpstreamFailure>,
}

struct Remote {
    descriptor: RemoteDescriptor,
    client: Client,
}

/// HTTP client over a proxy repository's ordered remotes.
pub struct ProxyClient {
    remotes: Vec<Remote>,
}

impl ProxyClient {
    pub fn new(descriptors: Vec<RemoteDescriptor>) -> DepotResult<Self> {
        let remotes = descriptors
            .into_iter()
            .map(|descriptor| {
                let client = Client::builder()
                    .connect_timeout(descriptor.connect_timeout)
                    .read_timeout(descriptor.read_timeout)
                    .user_agent(concat!("depot/", env!("CARGO_PKG_VERSION")))
                    .build()
                    .map_err(|e| {
                        DepotError::Configuration(format!(
                            "Failed to create HTTP client for {}: {}",
                            descriptor.base_url, e
                        ))
                    })?;
                Ok(Remote { descriptor, client })
            })
            .collect::<DepotResult<Vec<_>>>()?;

        Ok(Self { remotes })
    }

    pub fn remotes(&self) -> impl Iterator<Item = &RemoteDescriptor> {
        self.remotes.iter().map(|remote| &remote.descriptor)
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }

    /// Ask remotes `start..` in order for `path`; stop at the first success.
    pub async fn open(&self, path: &ArtifactPath, start: usize) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();

        for (index, remote) in self.remotes.iter().enumerate().skip(start) {
            let url = remote.descriptor.url_for(path);
            let started = Instant::now();

            let response = match remote.client.get(&url).send().await {
                Ok(response) => response,
                Err(e) => {
                    let failure = UpstreamFailure::from_reqwest(&remote.descriptor, path, &e);
                    failure.log();
                    outcome.failures.push(failure);
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                tracing::debug!(
                    remote = %remote.descriptor.base_url,
                    path = %path,
                    duration_ms = started.elapsed().as_secs_f64() * 1000.0,
                    "Upstream hit"
                );
                outcome.response = Some(UpstreamResponse {
                    remote_index: index,
                    remote: remote.descriptor.clone(),
                    content_length: response.content_length(),
                    response,
                });
                return outcome;
            }

            if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
                tracing::debug!(
                    remote = %remote.descriptor.base_url,
                    path = %path,
                    status = status.as_u16(),
                    "Artifact absent upstream"
                );
                continue;
            }

            let kind = if status.is_server_error() {
                UpstreamFailureKind::ServerError(status.as_u16())
            } else {
                UpstreamFailureKind::UnexpectedStatus(status.as_u16())
            };
            let failure = UpstreamFailure {
                remote: remote.descriptor.base_url.clone(),
                path: path.clone(),
                kind,
                message: format!("{} returned {}", url, status),
            };
            failure.log();
            outcome.failures.push(failure);
        }

        outcome
    }

    /// Fetch a small document fully, falling through remotes whose body
    /// cannot be read. Nothing is stored.
    pub async fn fetch_bytes(&self, path: &ArtifactPath) -> (Option<Bytes>, Vec<UpstreamFailure>) {
        let mut failures = Vec::new();
        let mut start = 0;

        while start < self.remotes.len() {
            let outcome = self.open(path, start).await;
            failures.extend(outcome.failures);
            let Some(response) = outcome.response else {
                break;
            };

            start = response.remote_index + 1;
            let remote = response.remote.clone();
            match response.bytes().await {
                Ok(bytes) => return (Some(bytes), failures),
                Err(e) => {
                    let failure = UpstreamFailure::from_reqwest(&remote, path, &e);
                    failure.log();
                    failures.push(failure);
                }
            }
        }

        (None, failures)
    }
}
