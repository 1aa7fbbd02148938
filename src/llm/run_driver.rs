//! Run 驱动：把一次 Assistant 调用推进到终态并取回回复文本
//!
//! 两种策略按配置二选一：
//! - **Poll**：追加消息 → 创建 Run → 按固定间隔轮询状态直到终态 → 取最新一条 assistant 消息
//! - **Stream**：追加消息 → 流式创建 Run → 在阻塞线程中消费 SSE，拼接增量文本
//!
//! failed / cancelled 以错误返回，绝不当作空回复；传输错误原样上抛。

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use super::stream::collect_stream_text;
use super::traits::{AssistantProvider, MessageRole, ThreadMessage};
use crate::config::AssistantSection;
use crate::core::BridgeError;
use crate::gateway::ThreadHandle;

/// Run 完成但没有 assistant 消息（或流为空）时的回复
pub const NO_REPLY_FALLBACK: &str = "Sorry, I didn't get a reply from the assistant.";

/// Run 驱动策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStrategy {
    Poll,
    #[default]
    Stream,
}

pub struct RunDriver {
    provider: Arc<dyn AssistantProvider>,
    strategy: RunStrategy,
    poll_interval: Duration,
    /// 轮询次数上限；0 表示不设上限
    max_poll_attempts: u32,
}

impl RunDriver {
    pub fn new(provider: Arc<dyn AssistantProvider>, strategy: RunStrategy) -> Self {
        Self {
            provider,
            strategy,
            poll_interval: Duration::from_secs(1),
            max_poll_attempts: 300,
        }
    }

    pub fn from_config(provider: Arc<dyn AssistantProvider>, config: &AssistantSection) -> Self {
        Self::new(provider, config.strategy)
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms))
            .with_max_poll_attempts(config.max_poll_attempts)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_max_poll_attempts(mut self, attempts: u32) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    pub fn strategy(&self) -> RunStrategy {
        self.strategy
    }

    /// 提交消息并等待 Assistant 回复
    pub async fn run_and_await(
        &self,
        thread: &ThreadHandle,
        assistant_id: &str,
        message: &str,
    ) -> Result<String, BridgeError> {
        self.provider.append_message(thread, message).await?;
        let reply = match self.strategy {
            RunStrategy::Poll => self.run_polling(thread, assistant_id).await?,
            RunStrategy::Stream => self.run_streaming(thread, assistant_id).await?,
        };
        Ok(reply.unwrap_or_else(|| {
            tracing::warn!(thread = %thread, "run completed without assistant content");
            NO_REPLY_FALLBACK.to_string()
        }))
    }

    async fn run_polling(
        &self,
        thread: &ThreadHandle,
        assistant_id: &str,
    ) -> Result<Option<String>, BridgeError> {
        let mut run = self.provider.create_run(thread, assistant_id).await?;
        let mut polls = 0u32;

        while !run.status.is_terminal() {
            if self.max_poll_attempts > 0 && polls >= self.max_poll_attempts {
                return Err(BridgeError::RunTimedOut { attempts: polls });
            }
            tokio::time::sleep(self.poll_interval).await;
            run = self.provider.get_run(thread, &run.id).await?;
            polls += 1;
            tracing::debug!(run_id = %run.id, status = ?run.status, polls, "polled run");
        }

        if let Some(err) = run.failure() {
            return Err(err);
        }

        let messages = self.provider.list_messages(thread).await?;
        Ok(latest_assistant_reply(&messages))
    }

    async fn run_streaming(
        &self,
        thread: &ThreadHandle,
        assistant_id: &str,
    ) -> Result<Option<String>, BridgeError> {
        let provider = Arc::clone(&self.provider);
        let thread = thread.clone();
        let assistant_id = assistant_id.to_string();

        // SSE 读取是阻塞 I/O，放到阻塞线程池，避免卡住其他并发轮次
        let collected = tokio::task::spawn_blocking(move || {
            let reader = provider.open_run_stream(&thread, &assistant_id)?;
            collect_stream_text(reader)
        })
        .await
        .map_err(|e| BridgeError::Provider(format!("stream worker aborted: {e}")))??;

        Ok((!collected.is_empty()).then_some(collected))
    }
}

/// 从旧到新的消息列表中，倒序找最新一条非空 assistant 消息
pub fn latest_assistant_reply(messages: &[ThreadMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find(|m| m.role == MessageRole::Assistant && !m.content.trim().is_empty())
        .map(|m| m.content.clone())
}
