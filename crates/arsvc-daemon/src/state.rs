//! Shared runtime state for arsvc-daemon.
//!
//! One `AppState` is built once in `main` and cloned into every Axum
//! handler via `State<AppState>`. It owns no interior mutability of its
//! own — the two-tier store and queue are themselves cheaply `Clone`
//! handles over pooled connections.

use std::sync::Arc;

use arsvc_config::AppConfig;
use arsvc_queue::WorkQueue;
use arsvc_runner::{AnsibleCliRunner, PlaybookRunner};
use arsvc_store::JobStore;

#[derive(Clone)]
pub struct AppState {
    pub store: JobStore,
    pub queue: WorkQueue,
    pub config: Arc<AppConfig>,
    /// Used only by the synchronous submission path (`sync=true`); async
    /// jobs run in the separate worker pool process.
    pub sync_runner: Arc<dyn PlaybookRunner>,
}

impl AppState {
    pub fn new(store: JobStore, queue: WorkQueue, config: Arc<AppConfig>) -> Self {
        Self {
            store,
            queue,
            config,
            sync_runner: Arc::new(AnsibleCliRunner),
        }
    }
}
