pub mod api;

use std::sync::Arc;

use crate::scrape::RunCoordinator;
use crate::store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub coordinator: Arc<RunCoordinator>,
}
