pub mod openrouter;
pub mod router;
pub mod traits;
pub mod types;

pub use router::ProviderRouter;
pub use traits::ChatProvider;
pub use types::{ChatMessage, CompletionOptions, ExportFormat, ModelInfo, ProviderError, StreamEvent};
