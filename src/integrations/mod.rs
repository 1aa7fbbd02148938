//! 外部渠道集成：Microsoft Teams（需 teams feature 与公网 Webhook 域名）

#[cfg(feature = "teams")]
pub mod teams;
