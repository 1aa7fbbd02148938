//! Mock Assistant Provider（用于测试，无需 API）
//!
//! 按预设脚本返回 Run 状态序列、回复消息与 SSE 流；可注入传输错误。记录追加的消息与调用次数。

use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::core::BridgeError;
use crate::gateway::ThreadHandle;
use crate::llm::{AssistantProvider, EventStreamReader, Run, RunStatus, ThreadMessage};

#[derive(Debug, Default)]
struct MockState {
    threads_created: usize,
    runs_created: usize,
    /// 下一次 get_run 返回的状态下标
    status_cursor: usize,
    appended: Vec<String>,
}

/// Mock 客户端：状态序列的最后一项会一直重复
#[derive(Debug)]
pub struct MockAssistantProvider {
    statuses: Vec<RunStatus>,
    reply: Option<String>,
    stream_body: String,
    provider_error: Option<String>,
    state: Mutex<MockState>,
}

impl MockAssistantProvider {
    pub fn new() -> Self {
        Self {
            statuses: vec![RunStatus::Completed],
            reply: None,
            stream_body: String::new(),
            provider_error: None,
            state: Mutex::new(MockState::default()),
        }
    }

    /// create_run 返回第一项，之后每次 get_run 依次前进
    pub fn with_statuses(mut self, statuses: Vec<RunStatus>) -> Self {
        if !statuses.is_empty() {
            self.statuses = statuses;
        }
        self
    }

    /// Run 完成后 Thread 末尾的 assistant 消息；不设置则只有 user 消息
    pub fn with_reply(mut self, reply: impl Into<String>) -> Self {
        self.reply = Some(reply.into());
        self
    }

    pub fn with_stream_body(mut self, body: impl Into<String>) -> Self {
        self.stream_body = body.into();
        self
    }

    /// 所有调用均以 Provider 错误失败
    pub fn with_provider_error(mut self, message: impl Into<String>) -> Self {
        self.provider_error = Some(message.into());
        self
    }

    pub fn threads_created(&self) -> usize {
        self.lock().threads_created
    }

    pub fn runs_created(&self) -> usize {
        self.lock().runs_created
    }

    /// 按顺序追加过的 user 消息
    pub fn appended(&self) -> Vec<String> {
        self.lock().appended.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_error(&self) -> Result<(), BridgeError> {
        match &self.provider_error {
            Some(message) => Err(BridgeError::Provider(message.clone())),
            None => Ok(()),
        }
    }

    fn status_at(&self, index: usize) -> RunStatus {
        let last = self.statuses.len() - 1;
        self.statuses[index.min(last)]
    }
}

impl Default for MockAssistantProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantProvider for MockAssistantProvider {
    async fn create_thread(&self) -> Result<ThreadHandle, BridgeError> {
        self.check_error()?;
        // 模拟网络往返，让并发轮次有机会交错
        tokio::task::yield_now().await;
        self.lock().threads_created += 1;
        Ok(ThreadHandle::new(format!("thread_{}", uuid::Uuid::new_v4())))
    }

    async fn append_message(&self, _thread: &ThreadHandle, content: &str) -> Result<(), BridgeError> {
        self.check_error()?;
        self.lock().appended.push(content.to_string());
        Ok(())
    }

    async fn create_run(&self, _thread: &ThreadHandle, _assistant_id: &str) -> Result<Run, BridgeError> {
        self.check_error()?;
        let mut state = self.lock();
        state.runs_created += 1;
        state.status_cursor = 1;
        Ok(Run::new(format!("run_{}", state.runs_created), self.status_at(0)))
    }

    async fn get_run(&self, _thread: &ThreadHandle, run_id: &str) -> Result<Run, BridgeError> {
        self.check_error()?;
        let mut state = self.lock();
        let status = self.status_at(state.status_cursor);
        state.status_cursor += 1;
        let mut run = Run::new(run_id, status);
        if status == RunStatus::Failed {
            run.last_error = Some("server_error: the assistant run failed".to_string());
        }
        Ok(run)
    }

    async fn list_messages(&self, _thread: &ThreadHandle) -> Result<Vec<ThreadMessage>, BridgeError> {
        self.check_error()?;
        let mut messages: Vec<ThreadMessage> =
            self.lock().appended.iter().map(ThreadMessage::user).collect();
        if let Some(reply) = &self.reply {
            messages.push(ThreadMessage::assistant(reply.clone()));
        }
        Ok(messages)
    }

    fn open_run_stream(
        &self,
        _thread: &ThreadHandle,
        _assistant_id: &str,
    ) -> Result<EventStreamReader, BridgeError> {
        self.check_error()?;
        self.lock().runs_created += 1;
        Ok(Box::new(Cursor::new(self.stream_body.clone().into_bytes())))
    }
}
