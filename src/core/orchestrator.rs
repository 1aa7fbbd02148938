//! 单轮编排器
//!
//! 每条入站消息：校验输入 → 解析会话 → 意图识别 → 查询增强 → 驱动 Run → 校验回复 → 发送。
//! 输入校验之后的任何失败都在这里收口：记录原始错误，向用户发送固定致歉文本，不再上抛给渠道层。

use std::sync::Arc;

use tracing::Instrument;

use crate::config::{AppConfig, AppSection};
use crate::core::{BridgeError, TurnOutcome, TurnPhase};
use crate::gateway::{
    ActivityKind, ChannelSender, InboundMessage, IntentClassifier, QueryClassification,
    ResponseValidator, SessionDirectory,
};
use crate::llm::{AssistantProvider, AzureAssistantsClient, RunDriver};

/// 增强查询时放在用户问题前的固定指令
pub const ENRICHMENT_PREAMBLE: &str = "Answer precisely, using only information grounded in the product documents available to you. \
Quote exact values with units where the documents give them, and say explicitly when the documents do not cover the question.";

/// 在用户原文前加固定指令，按抽取到的实体追加产品系列与测量范围指令
pub fn enrich_query(text: &str, classification: &QueryClassification) -> String {
    let mut enriched = format!("{ENRICHMENT_PREAMBLE}\n\n{text}");

    let entities = &classification.entities;
    if !entities.product_series.is_empty() {
        enriched.push_str(&format!(
            "\n\nFocus on the following product series: {}.",
            entities.product_series.join(", ")
        ));
    }
    if !entities.ranges.is_empty() {
        let ranges: Vec<String> = entities
            .ranges
            .iter()
            .map(|r| format!("{}m to {}m", r.low, r.high))
            .collect();
        enriched.push_str(&format!(
            "\n\nThe user is asking about these measuring ranges: {}.",
            ranges.join(", ")
        ));
    }
    enriched
}

/// 用校验问题填充澄清模板
pub fn clarification_message(template: &str, issues: &[String]) -> String {
    template.replace("{issues}", &issues.join("; "))
}

/// 单轮编排器：会话目录、Provider 与渠道均由外部注入
pub struct TurnOrchestrator {
    sessions: Arc<SessionDirectory>,
    provider: Arc<dyn AssistantProvider>,
    driver: RunDriver,
    classifier: IntentClassifier,
    validator: ResponseValidator,
    channel: Arc<dyn ChannelSender>,
    assistant_id: String,
    settings: AppSection,
}

impl TurnOrchestrator {
    pub fn new(
        sessions: Arc<SessionDirectory>,
        provider: Arc<dyn AssistantProvider>,
        driver: RunDriver,
        channel: Arc<dyn ChannelSender>,
        assistant_id: impl Into<String>,
        settings: AppSection,
    ) -> Self {
        Self {
            sessions,
            provider,
            driver,
            classifier: IntentClassifier::new(),
            validator: ResponseValidator::new(),
            channel,
            assistant_id: assistant_id.into(),
            settings,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionDirectory> {
        &self.sessions
    }

    /// 处理一条入站消息。总会发送且只发送一条 message 活动（问候 / 回复 / 澄清 / 致歉）。
    pub async fn handle_turn(&self, inbound: &InboundMessage) -> TurnOutcome {
        let turn_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("turn", id = %turn_id, conversation = %inbound.conversation_id);
        self.run_turn(inbound).instrument(span).await
    }

    async fn run_turn(&self, inbound: &InboundMessage) -> TurnOutcome {
        let identity = inbound.chat_identity();
        enter(identity, TurnPhase::Received);
        enter(identity, TurnPhase::ValidatingInput);

        if inbound.text.trim().is_empty() {
            self.send(inbound, ActivityKind::Message, Some(self.settings.greeting.clone()))
                .await;
            enter(identity, TurnPhase::Done);
            return TurnOutcome::Greeted;
        }

        if self.settings.send_typing {
            self.send(inbound, ActivityKind::Typing, None).await;
        }

        let outcome = match self.answer(inbound).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(identity, error = %e, "turn failed, replying with apology");
                TurnOutcome::Apologized
            }
        };

        enter(identity, TurnPhase::Sending);
        let text = outcome
            .reply_text()
            .unwrap_or(self.settings.apology.as_str())
            .to_string();
        self.send(inbound, ActivityKind::Message, Some(text)).await;
        enter(identity, TurnPhase::Done);
        outcome
    }

    async fn answer(&self, inbound: &InboundMessage) -> Result<TurnOutcome, BridgeError> {
        let identity = inbound.chat_identity();

        enter(identity, TurnPhase::ResolvingSession);
        let thread = self
            .sessions
            .get_or_create(identity, || self.provider.create_thread())
            .await?;

        enter(identity, TurnPhase::Classifying);
        let classification = self.classifier.classify(&inbound.text);
        tracing::debug!(
            identity,
            intent = classification.primary_intent.as_str(),
            confidence = classification.confidence,
            series = ?classification.entities.product_series,
            "classified query"
        );

        enter(identity, TurnPhase::Enriching);
        let enriched = enrich_query(&inbound.text, &classification);

        enter(identity, TurnPhase::Running);
        let candidate = self
            .driver
            .run_and_await(&thread, &self.assistant_id, &enriched)
            .await?;

        enter(identity, TurnPhase::Extracting);
        enter(identity, TurnPhase::ValidatingOutput);
        let verdict = self.validator.validate(&classification, &candidate);
        if verdict.approved {
            return Ok(TurnOutcome::Replied(candidate));
        }

        enter(identity, TurnPhase::Clarifying);
        tracing::warn!(identity, issues = ?verdict.issues, "assistant reply rejected");
        Ok(TurnOutcome::Clarified(clarification_message(
            &self.settings.clarification,
            &verdict.issues,
        )))
    }

    /// 发送失败只记日志：渠道层只关心本轮已被接收
    async fn send(&self, inbound: &InboundMessage, kind: ActivityKind, text: Option<String>) {
        let activity = inbound.reply(kind, text);
        if let Err(e) = self.channel.send_activity(&activity).await {
            tracing::error!(
                identity = inbound.chat_identity(),
                kind = kind.as_str(),
                error = %e,
                "failed to send activity"
            );
        }
    }
}

fn enter(identity: &str, phase: TurnPhase) {
    tracing::debug!(identity, phase = %phase, "turn phase");
}

/// 按配置创建编排器：Azure Assistants Provider + 指定渠道 + 新的会话目录
pub fn create_orchestrator(
    cfg: &AppConfig,
    channel: Arc<dyn ChannelSender>,
) -> Result<TurnOrchestrator, BridgeError> {
    let assistant_id = cfg
        .assistant
        .resolved_assistant_id()
        .ok_or_else(|| BridgeError::Config("assistant id is not set".into()))?;
    let provider: Arc<dyn AssistantProvider> =
        Arc::new(AzureAssistantsClient::from_config(&cfg.assistant)?);
    let driver = RunDriver::from_config(Arc::clone(&provider), &cfg.assistant);
    let sessions = Arc::new(SessionDirectory::new(cfg.session.idle_ttl()));

    tracing::info!(
        strategy = ?driver.strategy(),
        assistant_id = %assistant_id,
        "assistant provider configured"
    );
    Ok(TurnOrchestrator::new(
        sessions,
        provider,
        driver,
        channel,
        assistant_id,
        cfg.app.clone(),
    ))
}
