use std::path::PathBuf;
use std::sync::Arc;

use shoal_config::RecipeValidator;
use shoal_store::StateStore;
use shoal_worker::WorkerLoop;

/// Shared, cloneable axum application state for the controller router:
/// persistence, the schema validator, the worker (for webhook wakeups),
/// the webhook shared secret, and the directory task ISOs are served from.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub worker: Arc<WorkerLoop>,
    pub recipe_validator: Arc<RecipeValidator>,
    pub webhook_secret: String,
    pub task_root: PathBuf,
}
