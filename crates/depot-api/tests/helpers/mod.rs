//! Test helpers: build a depot and router over a temporary storage root.

use axum_test::TestServer;
use depot_api::auth::StaticTokenAccess;
use depot_api::setup::routes;
use depot_api::state::AppState;
use depot_core::config::AccessTokenConfig;
use depot_core::{Config, RepositoryConfig, TracingNotifier, Visibility};
use depot_engine::Depot;
use depot_storage::UnlimitedSpace;
use std::sync::Arc;
use tempfile::TempDir;

pub const WRITER_TOKEN: &str = "writer-token";
pub const READER_TOKEN: &str = "reader-token";

pub struct TestApp {
    pub server: TestServer,
    pub _temp_dir: TempDir,
}

/// Repositories: public `releases` and `snapshots`, private `internal`, and a
/// public group `public` over releases then snapshots.
pub async fn setup_test_app() -> TestApp {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = Config {
        storage_path: temp_dir.path().to_path_buf(),
        repositories: vec![
            RepositoryConfig::hosted("releases"),
            RepositoryConfig::hosted("snapshots"),
            RepositoryConfig::hosted("internal").with_visibility(Visibility::Private),
            RepositoryConfig::group(
                "public",
                vec!["releases".to_string(), "snapshots".to_string()],
            ),
        ],
        access_tokens: vec![
            AccessTokenConfig {
                token: WRITER_TOKEN.to_string(),
                can_write: true,
                repositories: vec![],
            },
            AccessTokenConfig {
                token: READER_TOKEN.to_string(),
                can_write: false,
                repositories: vec!["internal".to_string()],
            },
        ],
        ..Config::default()
    };

    let depot = Depot::from_config(
        &config,
        Arc::new(UnlimitedSpace),
        Arc::new(StaticTokenAccess::from_config(&config)),
        Arc::new(TracingNotifier),
    )
    .await
    .unwrap();
    let state = Arc::new(AppState::new(Arc::new(depot), config));
    let server = TestServer::new(routes::setup_routes(state)).unwrap();

    TestApp {
        server,
        _temp_dir: temp_dir,
    }
}

pub fn bearer(token: &str) -> axum::http::HeaderValue {
    axum::http::HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}
