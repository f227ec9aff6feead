pub mod analysis;
pub mod context;
pub mod edit;
pub mod engine;
pub mod intent;
pub mod longform;
pub mod prompts;
pub mod scriptfmt;

use thiserror::Error;

use scriptorium_provider::ProviderError;
use scriptorium_store::StoreError;

pub use analysis::ScriptAnalyzer;
pub use context::{ContextAssembler, GenerationContext};
pub use edit::{EditOutcome, EditRequest};
pub use engine::{ScriptEngine, SendOutcome, SendRequest};
pub use intent::{Intent, IntentClassifier};
pub use longform::{LongFormGenerator, LongFormProgress, ProgressFn};
pub use scriptfmt::normalize_script;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{what} not found: {id}")]
    NotFound { what: &'static str, id: String },
    #[error("actor {actor} does not own {resource}")]
    Unauthorized { actor: String, resource: String },
    /// One step of a long-form generation failed; the whole operation fails
    /// and nothing is persisted.
    #[error("generation failed while writing section {section} of {total}: {source}")]
    SectionFailed {
        section: usize,
        total: usize,
        #[source]
        source: ProviderError,
    },
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("store failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { collection, id } => EngineError::NotFound {
                what: collection,
                id,
            },
            other => EngineError::Store(other),
        }
    }
}

impl EngineError {
    pub fn unauthorized(actor: &str, resource: impl ToString) -> Self {
        EngineError::Unauthorized {
            actor: actor.to_owned(),
            resource: resource.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
