//! Assistant Provider 抽象
//!
//! Thread / Run 语义由外部 Provider 提供（Azure OpenAI Assistants 实现见 azure.rs，测试用 mock.rs）。
//! 所有传输层失败返回 `BridgeError::Provider`，携带原始错误信息。

use std::io::BufRead;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::BridgeError;
use crate::gateway::ThreadHandle;

/// Run 状态；completed / failed / cancelled / expired / incomplete 为终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Expired,
    /// 因 token 上限等原因提前结束
    Incomplete,
    /// requires_action / cancelling 等：继续轮询
    #[serde(other)]
    Pending,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed
                | RunStatus::Failed
                | RunStatus::Cancelled
                | RunStatus::Expired
                | RunStatus::Incomplete
        )
    }
}

/// Provider 侧的一次 Run
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Run {
    pub id: String,
    pub status: RunStatus,
    /// 失败原因（Provider 的 last_error.message），可能为空
    #[serde(skip)]
    pub last_error: Option<String>,
}

impl Run {
    pub fn new(id: impl Into<String>, status: RunStatus) -> Self {
        Self {
            id: id.into(),
            status,
            last_error: None,
        }
    }

    /// 非成功终态转为错误：cancelled → RunCancelled，failed / expired / incomplete → RunFailed。
    /// completed 与未终态返回 None。
    pub fn failure(&self) -> Option<BridgeError> {
        match self.status {
            RunStatus::Cancelled => Some(BridgeError::RunCancelled(self.id.clone())),
            RunStatus::Failed | RunStatus::Expired | RunStatus::Incomplete => {
                Some(BridgeError::RunFailed(match &self.last_error {
                    Some(reason) => format!("{} ({:?}): {}", self.id, self.status, reason),
                    None => format!("{} ({:?})", self.id, self.status),
                }))
            }
            _ => None,
        }
    }
}

/// Thread 中消息的作者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Thread 中的一条消息（文本部分已拼接）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ThreadMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// 阻塞式 SSE 行读取器；只能在阻塞线程（spawn_blocking）中消费
pub type EventStreamReader = Box<dyn BufRead + Send>;

/// Assistant Provider：线程、消息与 Run 生命周期
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    async fn create_thread(&self) -> Result<ThreadHandle, BridgeError>;

    /// 以 user 角色向 Thread 追加一条消息
    async fn append_message(&self, thread: &ThreadHandle, content: &str) -> Result<(), BridgeError>;

    async fn create_run(&self, thread: &ThreadHandle, assistant_id: &str) -> Result<Run, BridgeError>;

    async fn get_run(&self, thread: &ThreadHandle, run_id: &str) -> Result<Run, BridgeError>;

    /// Thread 的消息列表，按时间从旧到新
    async fn list_messages(&self, thread: &ThreadHandle) -> Result<Vec<ThreadMessage>, BridgeError>;

    /// 以流式方式创建 Run，返回 SSE 行读取器。
    /// 该方法执行阻塞 I/O，调用方必须在阻塞线程中调用。
    fn open_run_stream(
        &self,
        thread: &ThreadHandle,
        assistant_id: &str,
    ) -> Result<EventStreamReader, BridgeError>;
}
