//! Assistant 层：Provider 抽象与实现（Azure OpenAI Assistants / Mock）、SSE 解析、Run 驱动

pub mod azure;
pub mod mock;
pub mod run_driver;
pub mod stream;
pub mod traits;

pub use azure::{AzureAssistantsClient, DEFAULT_API_VERSION};
pub use mock::MockAssistantProvider;
pub use run_driver::{latest_assistant_reply, RunDriver, RunStrategy, NO_REPLY_FALLBACK};
pub use stream::{collect_stream_text, parse_event_line, StreamEvent};
pub use traits::{
    AssistantProvider, EventStreamReader, MessageRole, Run, RunStatus, ThreadMessage,
};
