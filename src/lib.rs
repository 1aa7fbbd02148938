//! Parley - Teams 与 Azure OpenAI Assistants 之间的会话桥接
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 单轮编排、阶段状态、错误类型
//! - **gateway**: 渠道无关的消息模型、会话目录、意图识别与回复校验
//! - **integrations**: Teams Webhook 与 Bot Connector 发送
//! - **llm**: Assistants Provider 抽象、Azure 客户端、Run 驱动（轮询 / 流式）
//! - **observability**: tracing 日志初始化

pub mod config;
pub mod core;
pub mod gateway;
pub mod integrations;
pub mod llm;
pub mod observability;
