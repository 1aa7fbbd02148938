//! 单轮对话的阶段与结果
//!
//! TurnPhase 对应入站消息的处理状态机，仅用于日志追踪；TurnOutcome 是一轮结束时实际发出的回复类型。

use std::fmt;

/// 入站消息处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Received,
    ValidatingInput,
    ResolvingSession,
    Classifying,
    Enriching,
    Running,
    Extracting,
    ValidatingOutput,
    Clarifying,
    Sending,
    Done,
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Received => "received",
            TurnPhase::ValidatingInput => "validating_input",
            TurnPhase::ResolvingSession => "resolving_session",
            TurnPhase::Classifying => "classifying",
            TurnPhase::Enriching => "enriching",
            TurnPhase::Running => "running",
            TurnPhase::Extracting => "extracting",
            TurnPhase::ValidatingOutput => "validating_output",
            TurnPhase::Clarifying => "clarifying",
            TurnPhase::Sending => "sending",
            TurnPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// 一轮结束时发给用户的内容类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// 输入为空，只发送问候语，未触达会话与 Provider
    Greeted,
    /// 助手回复通过校验并已转发
    Replied(String),
    /// 回复被校验拒绝，改发澄清提示
    Clarified(String),
    /// 中途出错，已记录原始错误并发送致歉文本
    Apologized,
}

impl TurnOutcome {
    /// 最终发送给用户的文本（问候 / 致歉文本由配置决定，这里不重复保存）
    pub fn reply_text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Replied(text) | TurnOutcome::Clarified(text) => Some(text),
            TurnOutcome::Greeted | TurnOutcome::Apologized => None,
        }
    }
}
