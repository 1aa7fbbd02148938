//! 单轮编排集成测试：Mock Provider + 记录型渠道

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use parley::config::AppSection;
    use parley::core::{BridgeError, TurnOrchestrator, TurnOutcome};
    use parley::gateway::{
        ActivityKind, ChannelAccount, ChannelSender, InboundMessage, OutboundActivity,
        SessionDirectory, ISSUE_HEDGING, ISSUE_NO_SPECIFICS,
    };
    use parley::llm::{MockAssistantProvider, RunDriver, RunStatus, RunStrategy};

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<OutboundActivity>>,
        fail: bool,
    }

    impl RecordingChannel {
        fn sent(&self) -> Vec<OutboundActivity> {
            self.sent.lock().unwrap().clone()
        }

        fn messages(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter(|a| a.kind == ActivityKind::Message)
                .filter_map(|a| a.text)
                .collect()
        }
    }

    #[async_trait]
    impl ChannelSender for RecordingChannel {
        async fn send_activity(&self, activity: &OutboundActivity) -> Result<(), BridgeError> {
            self.sent.lock().unwrap().push(activity.clone());
            if self.fail {
                return Err(BridgeError::Channel("503 Service Unavailable".into()));
            }
            Ok(())
        }
    }

    fn orchestrator(
        provider: Arc<MockAssistantProvider>,
        channel: Arc<RecordingChannel>,
    ) -> TurnOrchestrator {
        let driver = RunDriver::new(provider.clone(), RunStrategy::Poll)
            .with_poll_interval(Duration::ZERO);
        TurnOrchestrator::new(
            Arc::new(SessionDirectory::default()),
            provider,
            driver,
            channel,
            "asst_test",
            AppSection::default(),
        )
    }

    fn inbound(from: &str, text: &str) -> InboundMessage {
        InboundMessage {
            from: ChannelAccount::new(from),
            recipient: ChannelAccount::new("28:bot"),
            text: text.to_string(),
            conversation_id: format!("conv-{from}"),
            channel_id: "msteams".to_string(),
            service_url: "https://smba.example.net/".to_string(),
        }
    }

    #[tokio::test]
    async fn test_whitespace_input_greets_without_provider_calls() {
        let provider = Arc::new(MockAssistantProvider::new());
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider.clone(), channel.clone());

        let outcome = orch.handle_turn(&inbound("29:alice", "   \n")).await;

        assert_eq!(outcome, TurnOutcome::Greeted);
        assert_eq!(channel.messages(), vec![AppSection::default().greeting]);
        assert_eq!(channel.sent().len(), 1);
        assert_eq!(provider.threads_created(), 0);
        assert!(orch.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_technical_question_is_answered() {
        let provider = Arc::new(
            MockAssistantProvider::new()
                .with_statuses(vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Completed])
                .with_reply("The FLIR E95 offers up to 6x digital zoom."),
        );
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider.clone(), channel.clone());

        let outcome = orch
            .handle_turn(&inbound("29:alice", "What is the zoom range of the FLIR E95?"))
            .await;

        assert_eq!(
            outcome,
            TurnOutcome::Replied("The FLIR E95 offers up to 6x digital zoom.".into())
        );
        assert_eq!(channel.messages(), vec!["The FLIR E95 offers up to 6x digital zoom."]);

        let appended = provider.appended();
        assert_eq!(appended.len(), 1);
        assert!(appended[0].contains("What is the zoom range of the FLIR E95?"));
        assert!(appended[0].contains("Focus on the following product series: FLIR Exx."));
    }

    #[tokio::test]
    async fn test_typing_precedes_reply_with_swapped_addressing() {
        let provider = Arc::new(MockAssistantProvider::new().with_reply("Model Q4X covers 25 to 600 mm."));
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider, channel.clone());

        orch.handle_turn(&inbound("29:alice", "Which model for 5 to 7 m?")).await;

        let sent = channel.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].kind, ActivityKind::Typing);
        assert_eq!(sent[1].kind, ActivityKind::Message);
        for activity in &sent {
            assert_eq!(activity.recipient.id, "29:alice");
            assert_eq!(activity.sender.id, "28:bot");
            assert_eq!(activity.conversation_id, "conv-29:alice");
            assert_eq!(activity.service_url, "https://smba.example.net/");
        }
    }

    #[tokio::test]
    async fn test_typing_can_be_disabled() {
        let provider = Arc::new(MockAssistantProvider::new().with_reply("Range is 5 m."));
        let channel = Arc::new(RecordingChannel::default());
        let driver = RunDriver::new(provider.clone(), RunStrategy::Poll)
            .with_poll_interval(Duration::ZERO);
        let settings = AppSection {
            send_typing: false,
            ..AppSection::default()
        };
        let orch = TurnOrchestrator::new(
            Arc::new(SessionDirectory::default()),
            provider,
            driver,
            channel.clone(),
            "asst_test",
            settings,
        );

        orch.handle_turn(&inbound("29:alice", "range?")).await;

        let sent = channel.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, ActivityKind::Message);
    }

    #[tokio::test]
    async fn test_vague_reply_becomes_clarification() {
        let provider = Arc::new(
            MockAssistantProvider::new().with_reply("I'm not sure, please check the manual."),
        );
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider, channel.clone());

        let outcome = orch
            .handle_turn(&inbound("29:alice", "Does it work with my PLC?"))
            .await;

        let TurnOutcome::Clarified(text) = outcome else {
            panic!("expected clarification, got {outcome:?}");
        };
        assert!(text.contains(ISSUE_NO_SPECIFICS));
        assert!(text.contains(ISSUE_HEDGING));
        assert!(!text.contains("check the manual"));
        assert_eq!(channel.messages(), vec![text]);
    }

    #[tokio::test]
    async fn test_failed_run_sends_single_apology() {
        let provider = Arc::new(
            MockAssistantProvider::new()
                .with_statuses(vec![RunStatus::Queued, RunStatus::InProgress, RunStatus::Failed])
                .with_reply("stale answer that must not be forwarded"),
        );
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider, channel.clone());

        let outcome = orch.handle_turn(&inbound("29:alice", "range?")).await;

        assert_eq!(outcome, TurnOutcome::Apologized);
        let messages = channel.messages();
        assert_eq!(messages, vec![AppSection::default().apology]);
        assert!(!messages[0].contains("server_error"));
    }

    #[tokio::test]
    async fn test_provider_error_sends_apology() {
        let provider = Arc::new(
            MockAssistantProvider::new().with_provider_error("401 Unauthorized: bad api key"),
        );
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider, channel.clone());

        let outcome = orch.handle_turn(&inbound("29:alice", "range?")).await;

        assert_eq!(outcome, TurnOutcome::Apologized);
        assert_eq!(channel.messages(), vec![AppSection::default().apology]);
        // 创建 Thread 失败不会被缓存
        assert!(orch.sessions().is_empty().await);
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_abort_turn() {
        let provider = Arc::new(MockAssistantProvider::new().with_reply("Range is 5 m."));
        let channel = Arc::new(RecordingChannel {
            fail: true,
            ..Default::default()
        });
        let orch = orchestrator(provider, channel.clone());

        let outcome = orch.handle_turn(&inbound("29:alice", "range?")).await;

        assert_eq!(outcome, TurnOutcome::Replied("Range is 5 m.".into()));
        // typing + message 都尝试过
        assert_eq!(channel.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_session_reused_across_turns() {
        let provider = Arc::new(MockAssistantProvider::new().with_reply("Range is 5 m."));
        let channel = Arc::new(RecordingChannel::default());
        let orch = orchestrator(provider.clone(), channel);

        orch.handle_turn(&inbound("29:alice", "first")).await;
        let thread = orch.sessions().get("29:alice").await.unwrap();
        orch.handle_turn(&inbound("29:alice", "second")).await;
        orch.handle_turn(&inbound("29:bob", "other")).await;

        assert_eq!(orch.sessions().get("29:alice").await, Some(thread));
        assert_eq!(provider.threads_created(), 2);
        assert_eq!(provider.runs_created(), 3);
        assert_eq!(orch.sessions().len().await, 2);
    }

    #[tokio::test]
    async fn test_concurrent_first_messages_share_one_thread() {
        let provider = Arc::new(MockAssistantProvider::new().with_reply("Range is 5 m."));
        let channel = Arc::new(RecordingChannel::default());
        let orch = Arc::new(orchestrator(provider.clone(), channel.clone()));

        let turns = (0..8).map(|i| {
            let orch = Arc::clone(&orch);
            tokio::spawn(async move {
                orch.handle_turn(&inbound("29:alice", &format!("question {i}"))).await
            })
        });
        let outcomes = futures_util::future::join_all(turns).await;

        assert!(outcomes.into_iter().all(|o| o.is_ok()));
        assert_eq!(provider.threads_created(), 1);
        assert_eq!(channel.messages().len(), 8);
    }
}
