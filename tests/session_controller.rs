mod common;

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};
    use std::time::Duration;

    use tokio::sync::mpsc;

    use slotchat::history::{ChatMessage, HistoryStore};
    use slotchat::session::{SessionController, SessionEnd, SessionState};

    use crate::common::{engine, memory_pool, text, ScriptedProvider};

    const ANSWER_WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        input: mpsc::Sender<String>,
        answers: mpsc::UnboundedReceiver<String>,
        task: tokio::task::JoinHandle<SessionEnd>,
    }

    fn start(provider: Arc<ScriptedProvider>, pool: &slotchat::db::DbPool, session: &str) -> (Harness, Arc<slotchat::history::DuckDbHistoryStore>) {
        let (engine, history) = engine(provider, pool);
        let (input, inbound) = mpsc::channel(16);
        let (outbound, answers) = mpsc::unbounded_channel();

        let controller = SessionController::new(session, engine, outbound);
        assert_eq!(controller.state(), SessionState::Idle);
        let task = tokio::spawn(controller.run(inbound));

        (Harness { input, answers, task }, history)
    }

    async fn next_answer(answers: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(ANSWER_WAIT, answers.recv())
            .await
            .expect("answer expected")
            .expect("outbound open")
    }

    async fn assert_silent(answers: &mut mpsc::UnboundedReceiver<String>, wait: Duration) {
        if let Ok(Some(extra)) = tokio::time::timeout(wait, answers.recv()).await {
            panic!("unexpected extra answer: {:?}", extra);
        }
    }

    #[tokio::test]
    async fn each_turn_gets_exactly_one_answer() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo());
        let (mut h, history) = start(provider.clone(), &pool, "s1");

        h.input.send("hello".to_string()).await.unwrap();
        assert_eq!(next_answer(&mut h.answers).await, "echo: hello");

        h.input.send("book 9am".to_string()).await.unwrap();
        assert_eq!(next_answer(&mut h.answers).await, "echo: book 9am");

        drop(h.input);
        assert_eq!(h.task.await.unwrap(), SessionEnd::Disconnected);
        assert_eq!(history.load("s1").await.unwrap().len(), 4);
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn new_input_preempts_and_merges_the_running_turn() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(400)));
        let (mut h, history) = start(provider.clone(), &pool, "s1");

        h.input.send("A".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.input.send("B".to_string()).await.unwrap();

        assert_eq!(next_answer(&mut h.answers).await, "echo: A\nB");
        assert_silent(&mut h.answers, Duration::from_millis(800)).await;

        assert_eq!(
            history.load("s1").await.unwrap(),
            vec![ChatMessage::user("A\nB"), ChatMessage::agent("echo: A\nB")]
        );
        // the superseded call was started but never answered
        assert_eq!(provider.calls(), 2);

        drop(h.input);
        assert_eq!(h.task.await.unwrap(), SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn rapid_bursts_collapse_into_one_turn() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(300)));
        let (mut h, history) = start(provider.clone(), &pool, "s1");

        for part in ["I'm Ana", "I need tomorrow", "at 10"] {
            h.input.send(part.to_string()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        assert_eq!(next_answer(&mut h.answers).await, "echo: I'm Ana\nI need tomorrow\nat 10");
        assert_silent(&mut h.answers, Duration::from_millis(700)).await;
        assert_eq!(history.load("s1").await.unwrap().len(), 2);

        // the buffer was cleared by the delivered answer
        h.input.send("thanks".to_string()).await.unwrap();
        assert_eq!(next_answer(&mut h.answers).await, "echo: thanks");
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo());
        let (mut h, history) = start(provider.clone(), &pool, "s1");

        h.input.send("   ".to_string()).await.unwrap();
        h.input.send("\n\t".to_string()).await.unwrap();
        assert_silent(&mut h.answers, Duration::from_millis(200)).await;
        assert_eq!(provider.calls(), 0);

        h.input.send("hi".to_string()).await.unwrap();
        assert_eq!(next_answer(&mut h.answers).await, "echo: hi");
        assert_eq!(history.load("s1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn blank_input_does_not_preempt() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(300)));
        let (mut h, _) = start(provider.clone(), &pool, "s1");

        h.input.send("hello".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.input.send("  ".to_string()).await.unwrap();

        assert_eq!(next_answer(&mut h.answers).await, "echo: hello");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn disconnect_cancels_turn_without_output_or_history() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_secs(5)));
        let (mut h, history) = start(provider.clone(), &pool, "s1");

        h.input.send("hello".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(h.input);

        let end = tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .expect("shutdown must not wait for the model")
            .unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
        assert!(h.answers.recv().await.is_none());
        assert!(history.load("s1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_ends_the_session() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo());
        let (h, _) = start(provider, &pool, "s1");

        drop(h.answers);
        h.input.send("hello".to_string()).await.unwrap();

        let end = tokio::time::timeout(Duration::from_secs(2), h.task)
            .await
            .expect("session should stop")
            .unwrap();
        assert_eq!(end, SessionEnd::SendFailed);
    }

    #[tokio::test]
    async fn sessions_do_not_share_buffers() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(200)));
        let (mut a, history) = start(provider.clone(), &pool, "a");
        let (mut b, _) = start(provider.clone(), &pool, "b");

        a.input.send("from a".to_string()).await.unwrap();
        b.input.send("from b".to_string()).await.unwrap();

        assert_eq!(next_answer(&mut a.answers).await, "echo: from a");
        assert_eq!(next_answer(&mut b.answers).await, "echo: from b");
        assert_eq!(history.load("a").await.unwrap()[0], ChatMessage::user("from a"));
        assert_eq!(history.load("b").await.unwrap()[0], ChatMessage::user("from b"));
    }

    #[tokio::test]
    async fn input_landing_as_the_turn_finishes_does_not_supersede_it() {
        let pool = memory_pool();
        let late_input: Arc<OnceLock<mpsc::Sender<String>>> = Arc::new(OnceLock::new());
        let injector = late_input.clone();

        // The first model reply queues "B" just before the turn returns, so the
        // controller sees a finished turn and new input on the same wakeup.
        let provider = Arc::new(ScriptedProvider::new(move |n, messages| {
            if n == 0 {
                if let Some(input) = injector.get() {
                    input.try_send("B".to_string()).unwrap();
                }
            }
            let last = messages.iter().rev().find(|m| m.role == "user").map(|m| m.content.clone());
            Ok(text(format!("echo: {}", last.unwrap_or_default())))
        }));
        let (mut h, history) = start(provider.clone(), &pool, "s1");
        late_input.set(h.input.clone()).unwrap();

        h.input.send("A".to_string()).await.unwrap();

        assert_eq!(next_answer(&mut h.answers).await, "echo: A");
        assert_eq!(next_answer(&mut h.answers).await, "echo: B");
        assert_eq!(provider.calls(), 2);
        assert_eq!(
            history.load("s1").await.unwrap(),
            vec![
                ChatMessage::user("A"),
                ChatMessage::agent("echo: A"),
                ChatMessage::user("B"),
                ChatMessage::agent("echo: B"),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_model_reply_after_preemption_is_not_delivered() {
        let pool = memory_pool();
        let provider = Arc::new(ScriptedProvider::echo().with_delay(Duration::from_millis(500)));
        let (mut h, history) = start(provider.clone(), &pool, "s1");

        h.input.send("A".to_string()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        h.input.send("B".to_string()).await.unwrap();

        // The first call would have answered at 500ms; only the merged turn may speak.
        assert_eq!(next_answer(&mut h.answers).await, "echo: A\nB");
        assert_silent(&mut h.answers, Duration::from_secs(2)).await;
        assert_eq!(provider.calls(), 2);
        assert_eq!(history.load("s1").await.unwrap().len(), 2);
    }
}
