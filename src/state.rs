//! Shared application state for all routes.

use crate::service::SchemaEngine;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SchemaEngine>,
    /// Cancelled on shutdown; each request works under a child token.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(engine: SchemaEngine) -> Self {
        AppState {
            engine: Arc::new(engine),
            shutdown: CancellationToken::new(),
        }
    }
}
