//! Application state shared by every handler.

use depot_core::Config;
use depot_engine::Depot;
use std::sync::Arc;

pub struct AppState {
    pub depot: Arc<Depot>,
    pub config: Config,
}

impl AppState {
    pub fn new(depot: Arc<Depot>, config: Config) -> Self {
        Self { depot, config }
    }
}
