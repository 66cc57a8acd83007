//! Application state for the API server

use crate::Config;
use crate::service::PageService;
use std::sync::Arc;

/// Shared application state accessible to all route handlers
///
/// This struct is cloned for each request (cheap Arc clones).
#[derive(Clone)]
pub struct AppState {
    /// Page engine answering page, thumbnail and cache requests
    pub service: PageService,

    /// Configuration (read-only)
    pub config: Arc<Config>,
}

impl AppState {
    /// Create a new AppState
    pub fn new(service: PageService, config: Arc<Config>) -> Self {
        Self { service, config }
    }
}
