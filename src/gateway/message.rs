//! 渠道消息定义
//!
//! 与具体渠道（Teams / Bot Framework）无关的入站消息与出站活动，编排器只看这一层。

use serde::{Deserialize, Serialize};

/// 渠道侧账号（用户或机器人）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
        }
    }
}

/// 入站消息：发送者、文本与会话寻址信息
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// 发送者（其 id 即 ChatIdentity）
    pub from: ChannelAccount,
    /// 接收者（机器人自身）
    pub recipient: ChannelAccount,
    pub text: String,
    pub conversation_id: String,
    pub channel_id: String,
    pub service_url: String,
}

impl InboundMessage {
    /// 会话目录使用的身份键
    pub fn chat_identity(&self) -> &str {
        &self.from.id
    }

    /// 构造回复：收发双方对调，会话 / 渠道 / serviceUrl 原样保留
    pub fn reply(&self, kind: ActivityKind, text: Option<String>) -> OutboundActivity {
        OutboundActivity {
            kind,
            text,
            recipient: self.from.clone(),
            sender: self.recipient.clone(),
            conversation_id: self.conversation_id.clone(),
            channel_id: self.channel_id.clone(),
            service_url: self.service_url.clone(),
        }
    }
}

/// 出站活动类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Message,
    Typing,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Message => "message",
            ActivityKind::Typing => "typing",
        }
    }
}

/// 出站活动：交给 ChannelSender 发送
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundActivity {
    pub kind: ActivityKind,
    pub text: Option<String>,
    pub recipient: ChannelAccount,
    pub sender: ChannelAccount,
    pub conversation_id: String,
    pub channel_id: String,
    pub service_url: String,
}
