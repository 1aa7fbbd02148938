//! 网关层：渠道无关的消息模型、会话目录、意图识别与回复校验
//!
//! - **message / spoke**：入站消息、出站活动与渠道发送 trait
//! - **session**：ChatIdentity -> Thread 句柄
//! - **intent**：规则表驱动的意图识别与实体抽取
//! - **validator**：回复转发前的质量闸门

mod intent;
mod message;
mod session;
mod spoke;
mod validator;

pub use intent::{
    IntentClassifier, MeasuringRange, QueryClassification, QueryEntities, QueryIntent,
};
pub use message::{ActivityKind, ChannelAccount, InboundMessage, OutboundActivity};
pub use session::{SessionDirectory, ThreadHandle};
pub use spoke::ChannelSender;
pub use validator::{
    ResponseValidator, ValidationResult, BLOCK_THRESHOLD, ISSUE_HEDGING, ISSUE_NO_SPECIFICS,
};
