//! 桥接错误类型
//!
//! 所有可失败步骤返回 BridgeError，由 TurnOrchestrator 在边界统一记录日志并替换为致歉文本。
//! 空输入、无回复内容、校验未通过不属于错误，见 `TurnOutcome`。

use thiserror::Error;

/// 单轮对话中可能出现的错误（Provider 传输、Run 终态、渠道发送、配置）
#[derive(Error, Debug)]
pub enum BridgeError {
    /// 与 Assistant Provider 通信失败：非 2xx、超时、连接失败、响应解析失败
    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Run failed: {0}")]
    RunFailed(String),

    #[error("Run cancelled: {0}")]
    RunCancelled(String),

    /// 轮询达到 max_poll_attempts 仍未进入终态
    #[error("Run did not finish after {attempts} polls")]
    RunTimedOut { attempts: u32 },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::Provider(e.to_string())
    }
}
