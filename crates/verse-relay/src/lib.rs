pub mod mock;
pub mod openai;
pub mod relay;
pub mod types;

pub use mock::{MockCompletion, MockReply, MockTranscription};
pub use openai::OpenAiProvider;
pub use relay::{AudioReply, CompletionRelay, RelayConfig};
