//! SSE 事件流解析
//!
//! 数据行以 `data: ` 开头，其余部分要么是结束标记 `[DONE]`，要么是 JSON。
//! 增量路径：`choices[0].delta.content`；Assistants 事件的 `delta.content[*].text.value` 亦可。
//! `object = "thread.run"` 且状态为非成功终态的事件、以及 `event: error` 之后的数据行会终止读取并返回错误。
//! 其余非数据行与无法解析的 JSON 片段忽略。

use std::io::BufRead;

use serde_json::Value;

use crate::core::BridgeError;
use crate::llm::{Run, RunStatus};

pub const DATA_PREFIX: &str = "data: ";
pub const EVENT_PREFIX: &str = "event: ";
pub const DONE_TOKEN: &str = "[DONE]";

/// 单行解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Delta(String),
    /// Run 以 failed / cancelled / expired / incomplete 结束
    RunEnded(Run),
    /// 流内错误事件（原始信息）
    Error(String),
    Done,
    Ignored,
}

pub fn parse_event_line(line: &str) -> StreamEvent {
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        return StreamEvent::Ignored;
    };
    let data = rest.trim();
    if data == DONE_TOKEN {
        return StreamEvent::Done;
    }
    let Ok(json) = serde_json::from_str::<Value>(data) else {
        return StreamEvent::Ignored;
    };
    if let Some(err) = json.get("error") {
        return StreamEvent::Error(error_message(err));
    }
    if json.get("object").and_then(Value::as_str) == Some("thread.run") {
        return ended_run(&json).map_or(StreamEvent::Ignored, StreamEvent::RunEnded);
    }
    delta_text(&json).map_or(StreamEvent::Ignored, StreamEvent::Delta)
}

/// 读取整条流并拼接增量文本，遇到 `[DONE]` 或 EOF 结束。
/// 阻塞读取，只在阻塞线程中调用；读失败与错误事件视为 Provider 错误，非成功终态转为 Run 错误。
pub fn collect_stream_text<R: BufRead>(reader: R) -> Result<String, BridgeError> {
    let mut collected = String::new();
    let mut event_name = String::new();
    for line in reader.lines() {
        let line = line.map_err(|e| BridgeError::Provider(format!("stream read failed: {e}")))?;
        if line.trim().is_empty() {
            event_name.clear();
            continue;
        }
        if let Some(name) = line.strip_prefix(EVENT_PREFIX) {
            event_name = name.trim().to_string();
            continue;
        }

        let event = match parse_event_line(&line) {
            StreamEvent::Delta(_) | StreamEvent::Ignored if event_name == "error" => {
                match line.strip_prefix(DATA_PREFIX) {
                    Some(data) => StreamEvent::Error(error_payload(data.trim())),
                    None => StreamEvent::Ignored,
                }
            }
            event => event,
        };

        match event {
            StreamEvent::Delta(text) => collected.push_str(&text),
            StreamEvent::RunEnded(run) => {
                return Err(run.failure().unwrap_or_else(|| {
                    BridgeError::RunFailed(format!("{} ({:?})", run.id, run.status))
                }))
            }
            StreamEvent::Error(message) => {
                return Err(BridgeError::Provider(format!("stream error event: {message}")))
            }
            StreamEvent::Done => break,
            StreamEvent::Ignored => {}
        }
    }
    Ok(collected)
}

fn delta_text(json: &Value) -> Option<String> {
    if let Some(text) = json
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        return Some(text.to_string());
    }
    let parts = json.pointer("/delta/content")?.as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|p| p.pointer("/text/value").and_then(Value::as_str))
        .collect();
    (!text.is_empty()).then_some(text)
}

/// thread.run 对象且为非成功终态时返回 Run（带失败原因）
fn ended_run(json: &Value) -> Option<Run> {
    let status: RunStatus = serde_json::from_value(json.get("status")?.clone()).ok()?;
    let id = json.get("id").and_then(Value::as_str).unwrap_or("run");
    let mut run = Run::new(id, status);
    run.failure()?;
    run.last_error = json
        .get("last_error")
        .filter(|e| !e.is_null())
        .map(error_message)
        .or_else(|| {
            json.pointer("/incomplete_details/reason")
                .and_then(Value::as_str)
                .map(|reason| format!("incomplete: {reason}"))
        });
    Some(run)
}

/// `{code, message}` 形式的错误对象转为 `code: message`
fn error_message(err: &Value) -> String {
    let code = err.get("code").and_then(Value::as_str);
    let message = err.get("message").and_then(Value::as_str);
    match (code, message) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(only), None) | (None, Some(only)) => only.to_string(),
        (None, None) => err.to_string(),
    }
}

fn error_payload(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(json) => error_message(&json),
        Err(_) => data.to_string(),
    }
}
