//! 渠道端点（出站发送）
//!
//! 编排器通过 ChannelSender 发送问候、Typing、回复与致歉文本；Teams 实现见 integrations::teams。

use async_trait::async_trait;

use super::message::OutboundActivity;
use crate::core::BridgeError;

/// 渠道发送 trait：把一条出站活动投递到聊天渠道
#[async_trait]
pub trait ChannelSender: Send + Sync {
    async fn send_activity(&self, activity: &OutboundActivity) -> Result<(), BridgeError>;
}
