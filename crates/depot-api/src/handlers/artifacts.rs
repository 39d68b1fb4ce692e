//! Artifact routes: `GET`/`HEAD` resolve, `PUT`/`POST` deploy, `DELETE` removes.

use crate::auth::caller_identity;
use crate::error::HttpDepotError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use depot_core::{DepotError, DirectoryEntry, FileEntry};
use depot_engine::{DeleteRequest, DeployRequest, LookupRequest, LookupResult, Removed};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::StreamReader;

#[derive(Debug, Deserialize)]
pub struct ArtifactParams {
    pub repository: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct ListingFile {
    pub name: String,
    pub directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ListingResponse {
    pub path: String,
    pub files: Vec<ListingFile>,
}

#[derive(Debug, Serialize)]
pub struct DeletedResponse {
    pub path: String,
    pub directory: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Resolve a file, directory listing or latest version. HEAD is served by the
/// same handler; the body is dropped by the router.
#[tracing::instrument(skip(state, headers), fields(operation = "lookup"))]
pub async fn get_artifact(
    State(state): State<Arc<AppState>>,
    Path(params): Path<ArtifactParams>,
    headers: HeaderMap,
) -> Result<Response, HttpDepotError> {
    let result = state
        .depot
        .lookup(LookupRequest {
            repository: params.repository,
            path: params.path,
            identity: caller_identity(&headers),
        })
        .await?;

    match result {
        LookupResult::File { entry, body, .. } => {
            let stream = body.map(|chunk| {
                chunk.map_err(|e| std::io::Error::other(format!("Storage stream error: {}", e)))
            });
            file_response(&entry, Body::from_stream(stream))
        }
        LookupResult::Directory {
            repository,
            path,
            entries,
        } => {
            if wants_html(&headers) {
                let html = state
                    .depot
                    .metadata()
                    .render_listing_html(&repository, &path, &entries);
                return Ok(Html(html).into_response());
            }
            let display = if path.is_root() {
                String::new()
            } else {
                path.to_string()
            };
            Ok(Json(listing(display, &entries)).into_response())
        }
        LookupResult::Latest { version, .. } => Ok((
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            version,
        )
            .into_response()),
    }
}

/// Deploy the request body to the path.
#[tracing::instrument(skip(state, headers, body), fields(operation = "deploy"))]
pub async fn put_artifact(
    State(state): State<Arc<AppState>>,
    Path(params): Path<ArtifactParams>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, HttpDepotError> {
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));

    let entry = state
        .depot
        .deploy(DeployRequest {
            repository: params.repository,
            path: params.path,
            identity: caller_identity(&headers),
            body: Box::pin(reader),
            content_length,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(entry)).into_response())
}

#[tracing::instrument(skip(state, headers), fields(operation = "delete"))]
pub async fn delete_artifact(
    State(state): State<Arc<AppState>>,
    Path(params): Path<ArtifactParams>,
    headers: HeaderMap,
) -> Result<Response, HttpDepotError> {
    let removed = state
        .depot
        .delete(DeleteRequest {
            repository: params.repository,
            path: params.path,
            identity: caller_identity(&headers),
        })
        .await?;

    let response = match removed {
        Removed::File(entry) => DeletedResponse {
            path: entry.path.to_string(),
            directory: false,
            size: Some(entry.size_bytes),
        },
        Removed::Directory(entry) => DeletedResponse {
            path: entry.path.to_string(),
            directory: true,
            size: None,
        },
    };
    Ok(Json(response).into_response())
}

fn file_response(entry: &FileEntry, body: Body) -> Result<Response, HttpDepotError> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, entry.content_type.as_str())
        .header(header::CONTENT_LENGTH, entry.size_bytes)
        .header(header::ETAG, format!("\"{}\"", entry.checksums.sha1))
        .header(header::LAST_MODIFIED, http_date(entry.last_modified))
        .header("X-Checksum-Sha1", entry.checksums.sha1.as_str())
        .header("X-Checksum-Sha256", entry.checksums.sha256.as_str())
        .body(body)
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build response");
            HttpDepotError(DepotError::io(e.to_string()))
        })
}

fn listing(path: String, entries: &[DirectoryEntry]) -> ListingResponse {
    ListingResponse {
        path,
        files: entries
            .iter()
            .map(|entry| ListingFile {
                name: entry.name.clone(),
                directory: entry.is_directory,
                size: entry.size_bytes,
            })
            .collect(),
    }
}

fn wants_html(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|value: &HeaderValue| value.to_str().ok())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false)
}

fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}
