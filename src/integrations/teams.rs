//! Microsoft Teams（Bot Framework）集成
//!
//! `POST /api/messages` 接收 Bot Framework Activity，交给 TurnOrchestrator 在后台处理后立即返回 200；
//! 回复经 Bot Connector REST 接口发回 `{serviceUrl}/v3/conversations/{id}/activities`。
//! 入站 JWT 校验不在本模块处理。

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::ChannelSection;
use crate::core::{BridgeError, TurnOrchestrator};
use crate::gateway::{ChannelAccount, ChannelSender, InboundMessage, OutboundActivity};

/// 提前刷新 token 的余量
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Teams 服务状态
pub struct TeamsState {
    pub orchestrator: Arc<TurnOrchestrator>,
}

/// Bot Framework 会话
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

/// Bot Framework Activity（只保留桥接需要的字段）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl Activity {
    /// 转为渠道无关的入站消息；缺少发送者 / 会话 / serviceUrl 时返回 None
    pub fn into_inbound(self) -> Option<InboundMessage> {
        Some(InboundMessage {
            from: self.from?,
            recipient: self.recipient.unwrap_or_default(),
            text: self.text.unwrap_or_default(),
            conversation_id: self.conversation?.id,
            channel_id: self.channel_id.unwrap_or_default(),
            service_url: self.service_url?,
        })
    }
}

impl From<&OutboundActivity> for Activity {
    fn from(out: &OutboundActivity) -> Self {
        Activity {
            kind: out.kind.as_str().to_string(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            text: out.text.clone(),
            from: Some(out.sender.clone()),
            recipient: Some(out.recipient.clone()),
            conversation: Some(ConversationAccount {
                id: out.conversation_id.clone(),
                is_group: None,
            }),
            channel_id: Some(out.channel_id.clone()),
            service_url: Some(out.service_url.clone()),
            ..Default::default()
        }
    }
}

/// 创建 Teams 路由
pub fn create_router(state: Arc<TeamsState>) -> Router {
    Router::new()
        .route("/api/messages", post(messages))
        .route("/", get(|| async { "Teams Bot is running." }))
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
}

/// POST /api/messages - 接收 Bot Framework 活动
async fn messages(
    State(state): State<Arc<TeamsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.contains("application/json"));
    if !is_json {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }

    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(activity) => activity,
        Err(e) => {
            tracing::warn!("Teams webhook: invalid activity payload: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if activity.kind != "message" {
        tracing::debug!("Teams webhook: activity type {:?} ignored", activity.kind);
        return StatusCode::OK;
    }

    let Some(inbound) = activity.into_inbound() else {
        tracing::warn!("Teams webhook: message without sender, conversation or serviceUrl, ignoring");
        return StatusCode::OK;
    };

    tracing::info!(
        "Teams webhook: accepted message from={} conversation={} text_len={}",
        inbound.from.id,
        inbound.conversation_id,
        inbound.text.len()
    );

    let orchestrator = Arc::clone(&state.orchestrator);
    tokio::spawn(async move {
        let outcome = orchestrator.handle_turn(&inbound).await;
        tracing::debug!("Teams webhook: turn finished with {:?}", outcome);
    });

    StatusCode::OK
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: u64,
}

/// Bot Connector 客户端：发送出站活动，按需获取并缓存 client-credentials token
pub struct BotConnectorClient {
    client: reqwest::Client,
    /// (app_id, app_password)；None 表示 Emulator 模式，不鉴权
    credentials: Option<(String, String)>,
    token_endpoint: String,
    oauth_scope: String,
    token: RwLock<Option<CachedToken>>,
}

impl BotConnectorClient {
    pub fn from_config(config: &ChannelSection) -> Result<Self, BridgeError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| BridgeError::Channel(e.to_string()))?;
        let credentials = match (config.resolved_app_id(), config.resolved_app_password()) {
            (Some(id), Some(password)) => Some((id, password)),
            (Some(_), None) => {
                return Err(BridgeError::Config(
                    "channel app_id is set but app_password is missing".into(),
                ))
            }
            _ => None,
        };
        if credentials.is_none() {
            tracing::warn!("No Bot Framework app id configured, sending activities unauthenticated");
        }
        Ok(Self {
            client,
            credentials,
            token_endpoint: config.token_endpoint.clone(),
            oauth_scope: config.oauth_scope.clone(),
            token: RwLock::new(None),
        })
    }

    /// 获取 Bot Connector token（带缓存）；未配置凭据时返回 None
    async fn access_token(&self) -> Result<Option<String>, BridgeError> {
        let Some((app_id, app_password)) = &self.credentials else {
            return Ok(None);
        };

        if let Some(cached) = self.token.read().await.as_ref() {
            if cached.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(Some(cached.value.clone()));
            }
        }

        let mut slot = self.token.write().await;
        if let Some(cached) = slot.as_ref() {
            if cached.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(Some(cached.value.clone()));
            }
        }

        let resp = self
            .client
            .post(&self.token_endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", app_id.as_str()),
                ("client_secret", app_password.as_str()),
                ("scope", self.oauth_scope.as_str()),
            ])
            .send()
            .await
            .map_err(|e| BridgeError::Channel(format!("token request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Channel(format!("token endpoint {}: {}", status, text)));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| BridgeError::Channel(format!("invalid token response: {e}")))?;
        let value = token.access_token.clone();
        *slot = Some(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(Some(value))
    }
}

/// `{serviceUrl}/v3/conversations/{conversationId}/activities`，会话 ID 按路径段编码
pub fn activities_url(service_url: &str, conversation_id: &str) -> Result<reqwest::Url, BridgeError> {
    let mut url = reqwest::Url::parse(service_url)
        .map_err(|e| BridgeError::Channel(format!("invalid serviceUrl {service_url:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| BridgeError::Channel(format!("serviceUrl cannot be a base: {service_url}")))?
        .pop_if_empty()
        .extend(["v3", "conversations", conversation_id, "activities"]);
    Ok(url)
}

#[async_trait]
impl ChannelSender for BotConnectorClient {
    async fn send_activity(&self, activity: &OutboundActivity) -> Result<(), BridgeError> {
        let url = activities_url(&activity.service_url, &activity.conversation_id)?;
        let mut request = self.client.post(url).json(&Activity::from(activity));
        if let Some(token) = self.access_token().await? {
            request = request.bearer_auth(token);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| BridgeError::Channel(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(BridgeError::Channel(format!("Bot Connector {}: {}", status, text)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppSection;
    use crate::gateway::{ActivityKind, SessionDirectory};
    use crate::llm::{MockAssistantProvider, RunDriver, RunStrategy};
    use axum::body::Body;
    use axum::http::Request;
    use std::sync::Mutex;
    use tower::ServiceExt;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<OutboundActivity>>,
    }

    #[async_trait]
    impl ChannelSender for RecordingChannel {
        async fn send_activity(&self, activity: &OutboundActivity) -> Result<(), BridgeError> {
            self.sent.lock().unwrap().push(activity.clone());
            Ok(())
        }
    }

    fn router(channel: Arc<RecordingChannel>) -> Router {
        let provider = Arc::new(MockAssistantProvider::new().with_reply("The E95 zooms 6x."));
        let driver = RunDriver::new(provider.clone(), RunStrategy::Poll)
            .with_poll_interval(Duration::ZERO);
        let orchestrator = TurnOrchestrator::new(
            Arc::new(SessionDirectory::default()),
            provider,
            driver,
            channel,
            "asst_test",
            AppSection::default(),
        );
        create_router(Arc::new(TeamsState {
            orchestrator: Arc::new(orchestrator),
        }))
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    const MESSAGE: &str = r#"{
        "type": "message",
        "text": "zoom of the FLIR E95?",
        "from": {"id": "29:user"},
        "recipient": {"id": "28:bot"},
        "conversation": {"id": "conv-1"},
        "channelId": "msteams",
        "serviceUrl": "https://smba.example.net/"
    }"#;

    #[tokio::test]
    async fn test_health_and_root() {
        let app = router(Arc::new(RecordingChannel::default()));
        let resp = app
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"OK");

        let resp = app
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Teams Bot is running.");
    }

    #[tokio::test]
    async fn test_non_json_is_unsupported_media_type() {
        let app = router(Arc::new(RecordingChannel::default()));
        let req = Request::builder()
            .method("POST")
            .uri("/api/messages")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("hello"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let app = router(Arc::new(RecordingChannel::default()));
        let resp = app.oneshot(post_json("{not json")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_message_activity_is_acknowledged_and_ignored() {
        let channel = Arc::new(RecordingChannel::default());
        let app = router(channel.clone());
        let body = MESSAGE.replace("\"type\": \"message\"", "\"type\": \"conversationUpdate\"");
        let resp = app.oneshot(post_json(&body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_message_is_answered_in_background() {
        let channel = Arc::new(RecordingChannel::default());
        let app = router(channel.clone());
        let resp = app.oneshot(post_json(MESSAGE)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let mut reply = None;
        for _ in 0..100 {
            reply = channel
                .sent
                .lock()
                .unwrap()
                .iter()
                .find(|a| a.kind == ActivityKind::Message)
                .cloned();
            if reply.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let reply = reply.expect("reply activity");
        assert_eq!(reply.text.as_deref(), Some("The E95 zooms 6x."));
        assert_eq!(reply.recipient.id, "29:user");
        assert_eq!(reply.conversation_id, "conv-1");
    }

    #[test]
    fn test_activity_into_inbound() {
        let json = r#"{
            "type": "message",
            "id": "1234",
            "text": "What is the zoom range of the FLIR E95?",
            "from": {"id": "29:user", "name": "Dana"},
            "recipient": {"id": "28:bot", "name": "Parley"},
            "conversation": {"id": "a:conv;messageid=1"},
            "channelId": "msteams",
            "serviceUrl": "https://smba.trafficmanager.net/emea/"
        }"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        let inbound = activity.into_inbound().unwrap();
        assert_eq!(inbound.chat_identity(), "29:user");
        assert_eq!(inbound.recipient.id, "28:bot");
        assert_eq!(inbound.conversation_id, "a:conv;messageid=1");
        assert_eq!(inbound.channel_id, "msteams");
    }

    #[test]
    fn test_activity_without_sender_is_rejected() {
        let activity = Activity {
            kind: "message".into(),
            service_url: Some("https://example.net/".into()),
            ..Default::default()
        };
        assert!(activity.into_inbound().is_none());
    }

    #[test]
    fn test_outbound_serialization_uses_camel_case() {
        let out = OutboundActivity {
            kind: ActivityKind::Typing,
            text: None,
            recipient: ChannelAccount::new("29:user"),
            sender: ChannelAccount::new("28:bot"),
            conversation_id: "conv".into(),
            channel_id: "msteams".into(),
            service_url: "https://example.net/".into(),
        };
        let value = serde_json::to_value(Activity::from(&out)).unwrap();
        assert_eq!(value["type"], "typing");
        assert_eq!(value["from"]["id"], "28:bot");
        assert_eq!(value["recipient"]["id"], "29:user");
        assert_eq!(value["serviceUrl"], "https://example.net/");
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_activities_url_encodes_conversation_id() {
        let url = activities_url("https://smba.trafficmanager.net/emea/", "a:conv;messageid=1").unwrap();
        assert!(url
            .as_str()
            .starts_with("https://smba.trafficmanager.net/emea/v3/conversations/"));
        assert!(url.as_str().ends_with("/activities"));
        assert!(!url.as_str().contains("emea//v3"));
    }
}
