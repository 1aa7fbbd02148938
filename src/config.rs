//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `PARLEY__*` 覆盖（双下划线表示嵌套，如 `PARLEY__ASSISTANT__STRATEGY=poll`）。
//! 未配置的凭据回退到部署时常用的环境变量名（AZURE_OPENAI_API_KEY、MicrosoftAppId 等）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::llm::{RunStrategy, DEFAULT_API_VERSION};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub assistant: AssistantSection,
    pub channel: ChannelSection,
    pub session: SessionSection,
}

/// [app] 段：固定话术与 Typing 提示
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 空输入时的问候语
    pub greeting: String,
    /// 出错时发给用户的致歉文本（原始错误只写日志）
    pub apology: String,
    /// 回复被校验拒绝时的澄清提示模板，`{issues}` 替换为问题列表
    pub clarification: String,
    /// 调用 Assistant 前是否发送 typing 活动
    pub send_typing: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            greeting: "Hello! How can I assist you today?".to_string(),
            apology: "Sorry, something went wrong while preparing the answer. Please try again in a moment.".to_string(),
            clarification: "I couldn't find a precise answer to that ({issues}). Could you rephrase your question with more detail, such as the product series, measuring range or required output?".to_string(),
            send_typing: true,
        }
    }
}

/// [server] 段：Webhook 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3978,
        }
    }
}

/// [assistant] 段：Azure OpenAI Assistants 端点与 Run 驱动策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantSection {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub assistant_id: Option<String>,
    pub api_version: String,
    pub strategy: RunStrategy,
    pub poll_interval_ms: u64,
    /// 轮询次数上限，0 表示不限
    pub max_poll_attempts: u32,
    pub request_timeout_secs: u64,
}

impl Default for AssistantSection {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            assistant_id: None,
            api_version: DEFAULT_API_VERSION.to_string(),
            strategy: RunStrategy::default(),
            poll_interval_ms: 1000,
            max_poll_attempts: 300,
            request_timeout_secs: 60,
        }
    }
}

impl AssistantSection {
    /// 端点（去掉末尾 `/`），未配置时读 AZURE_OPENAI_ENDPOINT
    pub fn resolved_endpoint(&self) -> Option<String> {
        non_empty(self.endpoint.clone())
            .or_else(|| env_non_empty("AZURE_OPENAI_ENDPOINT"))
            .map(|e| e.trim_end_matches('/').to_string())
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone()).or_else(|| env_non_empty("AZURE_OPENAI_API_KEY"))
    }

    pub fn resolved_assistant_id(&self) -> Option<String> {
        non_empty(self.assistant_id.clone()).or_else(|| env_non_empty("ASSISTANT_ID"))
    }
}

/// [channel] 段：Bot Framework 凭据（为空时按 Emulator 方式不鉴权发送）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChannelSection {
    pub app_id: Option<String>,
    pub app_password: Option<String>,
    pub token_endpoint: String,
    pub oauth_scope: String,
    pub request_timeout_secs: u64,
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            app_id: None,
            app_password: None,
            token_endpoint:
                "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token".to_string(),
            oauth_scope: "https://api.botframework.com/.default".to_string(),
            request_timeout_secs: 30,
        }
    }
}

impl ChannelSection {
    pub fn resolved_app_id(&self) -> Option<String> {
        non_empty(self.app_id.clone()).or_else(|| env_non_empty("MicrosoftAppId"))
    }

    pub fn resolved_app_password(&self) -> Option<String> {
        non_empty(self.app_password.clone()).or_else(|| env_non_empty("MicrosoftAppPassword"))
    }
}

/// [session] 段：会话目录保留策略
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionSection {
    /// 空闲超时（秒）；不设置则进程生命周期内不过期
    pub idle_ttl_secs: Option<u64>,
}

impl SessionSection {
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn env_non_empty(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

/// 从 config 目录加载配置，环境变量 PARLEY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 PARLEY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("PARLEY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
