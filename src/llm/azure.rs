//! Azure OpenAI Assistants REST 客户端
//!
//! 通过 `api-key` 头与 `api-version` 查询参数调用 Assistants 接口（threads / messages / runs）。
//! 流式 Run 使用 reqwest 阻塞客户端，只能在阻塞线程中调用 `open_run_stream`。

use std::io::BufReader;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::AssistantSection;
use crate::core::BridgeError;
use crate::gateway::ThreadHandle;
use crate::llm::{
    AssistantProvider, EventStreamReader, MessageRole, Run, RunStatus, ThreadMessage,
};

pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";

#[derive(Debug, Deserialize)]
struct ThreadObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RunObject {
    id: String,
    status: RunStatus,
    #[serde(default)]
    last_error: Option<RunLastError>,
    #[serde(default)]
    incomplete_details: Option<IncompleteDetails>,
}

#[derive(Debug, Deserialize)]
struct IncompleteDetails {
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RunLastError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl From<RunObject> for Run {
    fn from(obj: RunObject) -> Self {
        let last_error = obj.last_error.map(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => format!("{code}: {message}"),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => "unknown error".to_string(),
        });
        let last_error = last_error.or_else(|| {
            obj.incomplete_details
                .and_then(|d| d.reason)
                .map(|reason| format!("incomplete: {reason}"))
        });
        Run {
            id: obj.id,
            status: obj.status,
            last_error,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageList {
    data: Vec<MessageObject>,
}

#[derive(Debug, Deserialize)]
struct MessageObject {
    role: MessageRole,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<TextContent>,
}

#[derive(Debug, Deserialize)]
struct TextContent {
    value: String,
}

impl From<MessageObject> for ThreadMessage {
    fn from(obj: MessageObject) -> Self {
        let content = obj
            .content
            .into_iter()
            .filter(|p| p.kind == "text")
            .filter_map(|p| p.text.map(|t| t.value))
            .collect::<Vec<_>>()
            .join("\n");
        ThreadMessage {
            role: obj.role,
            content,
        }
    }
}

/// Azure Assistants 客户端：持有异步 HTTP 客户端与端点信息
pub struct AzureAssistantsClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    request_timeout: Duration,
}

impl AzureAssistantsClient {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        api_version: &str,
        request_timeout: Duration,
    ) -> Result<Self, BridgeError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_version: api_version.to_string(),
            request_timeout,
        })
    }

    /// 从 [assistant] 配置创建；缺少 endpoint / api_key 时返回配置错误
    pub fn from_config(config: &AssistantSection) -> Result<Self, BridgeError> {
        let endpoint = config
            .resolved_endpoint()
            .ok_or_else(|| BridgeError::Config("assistant endpoint is not set".into()))?;
        let api_key = config
            .resolved_api_key()
            .ok_or_else(|| BridgeError::Config("assistant api key is not set".into()))?;
        Self::new(
            &endpoint,
            &api_key,
            &config.api_version,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/openai/{}", self.endpoint, path)
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, BridgeError> {
        let response = request
            .header("api-key", &self.api_key)
            .query(&[("api-version", self.api_version.as_str())])
            .send()
            .await
            .map_err(|e| BridgeError::Provider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BridgeError::Provider(format!("{}: {}", status, text)));
        }

        response
            .json()
            .await
            .map_err(|e| BridgeError::Provider(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl AssistantProvider for AzureAssistantsClient {
    async fn create_thread(&self) -> Result<ThreadHandle, BridgeError> {
        let thread: ThreadObject = self
            .send_json(self.client.post(self.url("threads")).json(&json!({})))
            .await?;
        Ok(ThreadHandle::new(thread.id))
    }

    async fn append_message(&self, thread: &ThreadHandle, content: &str) -> Result<(), BridgeError> {
        let url = self.url(&format!("threads/{}/messages", thread));
        let _: serde_json::Value = self
            .send_json(
                self.client
                    .post(url)
                    .json(&json!({ "role": "user", "content": content })),
            )
            .await?;
        Ok(())
    }

    async fn create_run(&self, thread: &ThreadHandle, assistant_id: &str) -> Result<Run, BridgeError> {
        let url = self.url(&format!("threads/{}/runs", thread));
        let run: RunObject = self
            .send_json(self.client.post(url).json(&json!({ "assistant_id": assistant_id })))
            .await?;
        Ok(run.into())
    }

    async fn get_run(&self, thread: &ThreadHandle, run_id: &str) -> Result<Run, BridgeError> {
        let url = self.url(&format!("threads/{}/runs/{}", thread, run_id));
        let run: RunObject = self.send_json(self.client.get(url)).await?;
        Ok(run.into())
    }

    async fn list_messages(&self, thread: &ThreadHandle) -> Result<Vec<ThreadMessage>, BridgeError> {
        let url = self.url(&format!("threads/{}/messages", thread));
        let list: MessageList = self
            .send_json(self.client.get(url).query(&[("order", "asc")]))
            .await?;
        Ok(list.data.into_iter().map(ThreadMessage::from).collect())
    }

    fn open_run_stream(
        &self,
        thread: &ThreadHandle,
        assistant_id: &str,
    ) -> Result<EventStreamReader, BridgeError> {
        // 阻塞客户端须在阻塞线程内创建与销毁；流式读取不设整体超时，只限制连接建立
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(self.request_timeout)
            .timeout(None)
            .build()?;
        let response = client
            .post(self.url(&format!("threads/{}/runs", thread)))
            .header("api-key", &self.api_key)
            .header("Accept", "text/event-stream")
            .query(&[("api-version", self.api_version.as_str())])
            .json(&json!({ "assistant_id": assistant_id, "stream": true }))
            .send()?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(BridgeError::Provider(format!("{}: {}", status, text)));
        }
        Ok(Box::new(BufReader::new(response)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_trailing_slash_trimmed() {
        let client = AzureAssistantsClient::new(
            "https://example.openai.azure.com/",
            "key",
            DEFAULT_API_VERSION,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            client.url("threads"),
            "https://example.openai.azure.com/openai/threads"
        );
    }

    #[test]
    fn test_message_list_joins_text_parts() {
        let body = r#"{
            "object": "list",
            "data": [
                {"id": "msg_1", "role": "user", "content": [{"type": "text", "text": {"value": "range?", "annotations": []}}]},
                {"id": "msg_2", "role": "assistant", "content": [
                    {"type": "text", "text": {"value": "Up to 7 m.", "annotations": []}},
                    {"type": "image_file", "image_file": {"file_id": "file_1"}},
                    {"type": "text", "text": {"value": "See datasheet.", "annotations": []}}
                ]}
            ]
        }"#;
        let list: MessageList = serde_json::from_str(body).unwrap();
        let messages: Vec<ThreadMessage> = list.data.into_iter().map(ThreadMessage::from).collect();
        assert_eq!(messages[0], ThreadMessage::user("range?"));
        assert_eq!(messages[1], ThreadMessage::assistant("Up to 7 m.\nSee datasheet."));
    }

    #[test]
    fn test_failed_run_carries_last_error() {
        let body = r#"{"id":"run_9","status":"failed","last_error":{"code":"rate_limit_exceeded","message":"slow down"}}"#;
        let run: Run = serde_json::from_str::<RunObject>(body).unwrap().into();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.last_error.as_deref(), Some("rate_limit_exceeded: slow down"));
    }

    #[test]
    fn test_incomplete_run_carries_reason() {
        let body = r#"{"id":"run_4","status":"incomplete","incomplete_details":{"reason":"max_completion_tokens"}}"#;
        let run: Run = serde_json::from_str::<RunObject>(body).unwrap().into();
        assert_eq!(run.status, RunStatus::Incomplete);
        assert_eq!(run.last_error.as_deref(), Some("incomplete: max_completion_tokens"));
    }
}
