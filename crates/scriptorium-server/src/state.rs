use std::sync::Arc;

use scriptorium_core::{ScriptAnalyzer, ScriptEngine};
use scriptorium_provider::TextProvider;
use scriptorium_store::Store;

/// Shared application state accessible from all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScriptEngine>,
    pub analyzer: Arc<ScriptAnalyzer>,
}

impl AppState {
    pub fn new(store: Store, provider: Arc<dyn TextProvider>) -> Self {
        Self {
            engine: Arc::new(ScriptEngine::new(store.clone(), Arc::clone(&provider))),
            analyzer: Arc::new(ScriptAnalyzer::new(store, provider)),
        }
    }
}
