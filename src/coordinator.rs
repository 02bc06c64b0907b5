use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};

use crate::augment::{ContextRetriever, HttpRetriever};
use crate::config::CoordinatorConfig;
use crate::connection::http::{HttpCredentialSource, HttpNegotiationEndpoint};
use crate::connection::webrtc::WebRtcPeer;
use crate::connection::{
    CredentialSource, NegotiationEndpoint, PeerTransport, SessionConnectionManager,
};
use crate::decoder;
use crate::error::SessionError;
use crate::orchestrator::{OutboundSink, ResponseOrchestrator};
use crate::transcript::TranscriptAggregator;
use crate::types::{ClientEvent, Speaker, StructuredEvent, Turn};

const STATUS_DISCONNECTED: &str = "Disconnected";
const STATUS_CONNECTING: &str = "Connecting...";
const STATUS_CONNECTED: &str = "Connected";
const STATUS_LISTENING: &str = "Listening...";
const STATUS_PROCESSING: &str = "Processing...";
const STATUS_RESPONDING: &str = "Responding...";

/// Builds one fresh transport per connection attempt; transports are never
/// reused across reconnects.
pub type TransportFactory = Arc<dyn Fn() -> Arc<dyn PeerTransport> + Send + Sync>;

/// Updates pushed to the UI layer. The transcript log reaches the UI through
/// `TurnFinalized`; partial text is never published as if it were final.
#[derive(Debug, Clone)]
pub enum CoordinatorUpdate {
    Status(String),
    TurnFinalized(Turn),
    /// Non-fatal protocol trouble (e.g. a malformed event, a dropped
    /// generation request). The session stays connected.
    ProtocolWarning(String),
}

enum Command {
    Start {
        done: oneshot::Sender<Result<(), SessionError>>,
    },
    End {
        done: oneshot::Sender<()>,
    },
    SendText {
        text: String,
        done: oneshot::Sender<Result<(), SessionError>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Connecting,
    Connected,
    Ending,
    Error,
}

/// Top-level handle for the UI layer: `start`, `end`, `send_text`, and a
/// broadcast subscription for updates. All session and turn state lives in
/// one spawned task that consumes commands, inbound events, and generation
/// results strictly one at a time.
pub struct SessionCoordinator {
    commands: mpsc::Sender<Command>,
    updates: broadcast::Sender<CoordinatorUpdate>,
}

impl SessionCoordinator {
    /// Production wiring: HTTP credential and negotiation collaborators,
    /// HTTP retrieval, WebRTC transports.
    pub fn spawn(config: CoordinatorConfig) -> Self {
        let http = reqwest::Client::new();
        let credentials = Arc::new(HttpCredentialSource::new(http.clone(), config.session_url()));
        let negotiation = Arc::new(HttpNegotiationEndpoint::new(
            http.clone(),
            config.negotiation_url(),
        ));
        let retriever = Arc::new(HttpRetriever::new(http, config.retrieval_url()));
        let transports: TransportFactory =
            Arc::new(|| Arc::new(WebRtcPeer::new()) as Arc<dyn PeerTransport>);
        Self::spawn_with(Arc::new(config), credentials, negotiation, retriever, transports)
    }

    pub fn spawn_with(
        config: Arc<CoordinatorConfig>,
        credentials: Arc<dyn CredentialSource>,
        negotiation: Arc<dyn NegotiationEndpoint>,
        retriever: Arc<dyn ContextRetriever>,
        transports: TransportFactory,
    ) -> Self {
        let capacity = config.channel_capacity();
        let (command_tx, command_rx) = mpsc::channel(capacity);
        let (update_tx, _) = broadcast::channel(capacity);
        let (generation_tx, generation_rx) = mpsc::channel(capacity);

        let task = CoordinatorTask {
            manager: Arc::new(SessionConnectionManager::new(credentials, negotiation)),
            orchestrator: Arc::new(ResponseOrchestrator::new(retriever, Arc::clone(&config))),
            config,
            transports,
            state: Lifecycle::Idle,
            epoch: 0,
            aggregator: TranscriptAggregator::new(),
            commands: command_rx,
            pending: VecDeque::new(),
            inbound: None,
            generation_tx,
            generation_rx,
            updates: update_tx.clone(),
        };
        tokio::spawn(task.run());

        Self {
            commands: command_tx,
            updates: update_tx,
        }
    }

    pub fn updates(&self) -> broadcast::Receiver<CoordinatorUpdate> {
        self.updates.subscribe()
    }

    /// Connects a new session. A no-op when one is already live.
    pub async fn start(&self) -> Result<(), SessionError> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::Start { done })
            .await
            .map_err(|_| SessionError::Cancelled)?;
        wait.await.map_err(|_| SessionError::Cancelled)?
    }

    /// Ends the live session, cancelling an in-flight connect if there is
    /// one. Idempotent; a no-op when idle.
    pub async fn end(&self) {
        let (done, wait) = oneshot::channel();
        if self.commands.send(Command::End { done }).await.is_ok() {
            let _ = wait.await;
        }
    }

    /// Emits typed text as a finalized user turn and requests a response.
    /// Deliberate policy: when no session is live this connects one first,
    /// so typing a question is enough to begin a conversation.
    pub async fn send_text(&self, text: &str) -> Result<(), SessionError> {
        let (done, wait) = oneshot::channel();
        self.commands
            .send(Command::SendText {
                text: text.to_string(),
                done,
            })
            .await
            .map_err(|_| SessionError::Cancelled)?;
        wait.await.map_err(|_| SessionError::Cancelled)?
    }
}

enum Step {
    Command(Option<Command>),
    Inbound(Option<String>),
    Generation(Option<(u64, Result<(), SessionError>)>),
}

enum ConnectProgress {
    Finished(Result<(), SessionError>),
    Cancelled { done: Option<oneshot::Sender<()>> },
}

struct CoordinatorTask {
    config: Arc<CoordinatorConfig>,
    manager: Arc<SessionConnectionManager>,
    orchestrator: Arc<ResponseOrchestrator>,
    transports: TransportFactory,
    state: Lifecycle,
    /// Bumped on every connect attempt and every teardown; results carrying
    /// an older epoch belong to a defunct session and are discarded.
    epoch: u64,
    aggregator: TranscriptAggregator,
    commands: mpsc::Receiver<Command>,
    pending: VecDeque<Command>,
    inbound: Option<mpsc::Receiver<String>>,
    generation_tx: mpsc::Sender<(u64, Result<(), SessionError>)>,
    generation_rx: mpsc::Receiver<(u64, Result<(), SessionError>)>,
    updates: broadcast::Sender<CoordinatorUpdate>,
}

impl CoordinatorTask {
    async fn run(mut self) {
        loop {
            if let Some(command) = self.pending.pop_front() {
                self.handle_command(command).await;
                continue;
            }

            let step = {
                let commands = &mut self.commands;
                let inbound = &mut self.inbound;
                let generation_rx = &mut self.generation_rx;
                tokio::select! {
                    command = commands.recv() => Step::Command(command),
                    raw = recv_inbound(inbound) => Step::Inbound(raw),
                    result = generation_rx.recv() => Step::Generation(result),
                }
            };

            match step {
                Step::Command(Some(command)) => self.handle_command(command).await,
                Step::Command(None) => break,
                Step::Inbound(Some(raw)) => {
                    let event = decoder::decode(&raw);
                    self.handle_event(event).await;
                }
                Step::Inbound(None) => self.handle_remote_close().await,
                Step::Generation(Some((epoch, result))) => {
                    self.handle_generation_result(epoch, result)
                }
                Step::Generation(None) => {}
            }
        }

        // Handle dropped: release whatever is still held.
        self.manager.end().await;
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { done } => {
                if self.state == Lifecycle::Connected {
                    let _ = done.send(Ok(()));
                    return;
                }
                let result = self.connect_session().await;
                let _ = done.send(result);
            }
            Command::End { done } => self.handle_end(done).await,
            Command::SendText { text, done } => self.handle_send_text(text, done).await,
        }
    }

    /// Negotiates one session. Commands arriving while the negotiation is in
    /// flight are handled here: `end` cancels the attempt by dropping the
    /// connect future, a duplicate `start` is acknowledged as a no-op, and
    /// anything else waits its turn in the pending queue.
    async fn connect_session(&mut self) -> Result<(), SessionError> {
        self.epoch += 1;
        let epoch = self.epoch;
        self.state = Lifecycle::Connecting;
        self.emit_status(STATUS_CONNECTING);

        let (inbound_tx, inbound_rx) = mpsc::channel(self.config.channel_capacity());
        let transport = (self.transports)();

        let progress = {
            let manager = Arc::clone(&self.manager);
            let negotiating = Arc::clone(&transport);
            let connect =
                async move { manager.connect(epoch, negotiating, inbound_tx).await.map(|_| ()) };
            tokio::pin!(connect);

            let commands = &mut self.commands;
            let pending = &mut self.pending;
            loop {
                tokio::select! {
                    result = &mut connect => break ConnectProgress::Finished(result),
                    command = commands.recv() => match command {
                        Some(Command::End { done }) => {
                            break ConnectProgress::Cancelled { done: Some(done) }
                        }
                        Some(Command::Start { done }) => {
                            // Already connecting; one attempt serves both.
                            let _ = done.send(Ok(()));
                        }
                        Some(command) => pending.push_back(command),
                        None => break ConnectProgress::Cancelled { done: None },
                    },
                }
            }
            // Leaving this scope drops the connect future, cancelling any
            // in-flight negotiation.
        };

        match progress {
            ConnectProgress::Finished(Ok(())) => {
                self.inbound = Some(inbound_rx);
                self.state = Lifecycle::Connected;
                self.emit_status(STATUS_CONNECTED);
                Ok(())
            }
            ConnectProgress::Finished(Err(err)) => {
                tracing::error!(%err, "connect failed");
                transport.close().await;
                self.state = Lifecycle::Error;
                self.emit_status(&format!("Error: {err}"));
                // Error auto-resets to idle; credential and local resources
                // are gone with the transport.
                self.state = Lifecycle::Idle;
                Err(err)
            }
            ConnectProgress::Cancelled { done } => {
                tracing::info!("connect cancelled by end()");
                transport.close().await;
                self.manager.end().await;
                self.epoch += 1;
                self.state = Lifecycle::Idle;
                self.emit_status(STATUS_DISCONNECTED);
                if let Some(done) = done {
                    let _ = done.send(());
                }
                Err(SessionError::Cancelled)
            }
        }
    }

    async fn handle_end(&mut self, done: oneshot::Sender<()>) {
        if self.state == Lifecycle::Idle {
            let _ = done.send(());
            return;
        }
        self.state = Lifecycle::Ending;
        self.manager.end().await;
        self.inbound = None;
        self.aggregator.reset();
        self.epoch += 1;
        self.state = Lifecycle::Idle;
        self.emit_status(STATUS_DISCONNECTED);
        let _ = done.send(());
    }

    async fn handle_send_text(
        &mut self,
        text: String,
        done: oneshot::Sender<Result<(), SessionError>>,
    ) {
        let text = text.trim().to_string();
        if text.is_empty() {
            let _ = done.send(Ok(()));
            return;
        }

        if self.state != Lifecycle::Connected {
            if let Err(err) = self.connect_session().await {
                let _ = done.send(Err(err));
                return;
            }
        }

        // Typed text is its own finalized turn; it does not touch any turn
        // the user may still be speaking.
        let turn = self.aggregator.finalize_direct(Speaker::User, &text);
        self.emit(CoordinatorUpdate::TurnFinalized(turn));

        if let Err(err) = self
            .manager
            .send(self.epoch, ClientEvent::message(&text))
            .await
        {
            let _ = done.send(Err(err));
            return;
        }

        self.spawn_generation(text);
        let _ = done.send(Ok(()));
    }

    async fn handle_event(&mut self, event: StructuredEvent) {
        match event {
            StructuredEvent::SessionCreated(created) => {
                self.manager.record_remote_id(created.id()).await;
            }
            StructuredEvent::TurnStarted(started) => {
                self.aggregator.on_turn_started(started.speaker());
            }
            StructuredEvent::TurnFragment(fragment) => {
                self.aggregator
                    .on_fragment(fragment.speaker(), fragment.delta());
            }
            StructuredEvent::TurnFinalized(finalized) => {
                // `turn.finalized` is the single source of truth for
                // finalization; response lifecycle events are status only.
                let speaker = finalized.speaker();
                if let Some(turn) = self
                    .aggregator
                    .on_turn_finalized(speaker, finalized.text())
                {
                    let utterance = turn.text().to_string();
                    self.emit(CoordinatorUpdate::TurnFinalized(turn));
                    if speaker == Speaker::User {
                        self.spawn_generation(utterance);
                    }
                }
            }
            StructuredEvent::SpeechStarted(_) => self.emit_status(STATUS_LISTENING),
            StructuredEvent::SpeechStopped(_) => self.emit_status(STATUS_PROCESSING),
            StructuredEvent::ResponseStarted(_) => self.emit_status(STATUS_RESPONDING),
            StructuredEvent::ResponseCompleted(_) => self.emit_status(STATUS_CONNECTED),
            StructuredEvent::Unknown { kind, .. } => {
                tracing::debug!(kind = %kind, "ignoring unrecognized event");
            }
            StructuredEvent::Malformed { raw, error } => {
                tracing::warn!(error = %error, raw = %raw, "discarding malformed event");
                self.emit(CoordinatorUpdate::ProtocolWarning(format!(
                    "malformed event: {error}"
                )));
            }
        }
    }

    /// Retrieval and the generation send run off-loop so they overlap with
    /// newly arriving inbound events; only the completion notice comes back
    /// here, tagged with the epoch that owns it.
    fn spawn_generation(&self, utterance: String) {
        let epoch = self.epoch;
        let orchestrator = Arc::clone(&self.orchestrator);
        let manager = Arc::clone(&self.manager);
        let results = self.generation_tx.clone();
        tokio::spawn(async move {
            let outcome = orchestrator
                .respond_to(epoch, &utterance, manager.as_ref())
                .await;
            let _ = results.send((epoch, outcome)).await;
        });
    }

    fn handle_generation_result(&mut self, epoch: u64, result: Result<(), SessionError>) {
        if epoch != self.epoch {
            tracing::debug!(epoch, current = self.epoch, "discarding stale generation result");
            return;
        }
        if let Err(err) = result {
            tracing::warn!(%err, "generation request dropped");
            self.emit(CoordinatorUpdate::ProtocolWarning(format!(
                "generation request dropped: {err}"
            )));
        }
    }

    /// The remote side closed the control channel underneath us.
    async fn handle_remote_close(&mut self) {
        self.inbound = None;
        if self.state == Lifecycle::Connected {
            tracing::info!("control channel closed by remote peer");
            self.manager.end().await;
            self.aggregator.reset();
            self.epoch += 1;
            self.state = Lifecycle::Idle;
            self.emit_status(STATUS_DISCONNECTED);
        }
    }

    fn emit_status(&self, status: &str) {
        self.emit(CoordinatorUpdate::Status(status.to_string()));
    }

    fn emit(&self, update: CoordinatorUpdate) {
        // No subscribers is fine; updates are advisory.
        let _ = self.updates.send(update);
    }
}

async fn recv_inbound(inbound: &mut Option<mpsc::Receiver<String>>) -> Option<String> {
    match inbound {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::augment::MockContextRetriever;
    use crate::connection::{
        MockCredentialSource, MockNegotiationEndpoint, MockPeerTransport,
    };
    use crate::types::AugmentationContext;
    use crate::types::SessionTicket;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use tokio::sync::Notify;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct Harness {
        coordinator: SessionCoordinator,
        sent: Arc<StdMutex<Vec<String>>>,
        inbound: Arc<StdMutex<Option<mpsc::Sender<String>>>>,
        connects: Arc<AtomicUsize>,
    }

    fn harness_with_retriever(retriever: MockContextRetriever) -> Harness {
        let mut credentials = MockCredentialSource::new();
        credentials.expect_issue().returning(|| {
            Ok(SessionTicket::new(
                Some("sess-1".to_string()),
                SecretString::from("ephemeral".to_string()),
            ))
        });

        let mut negotiation = MockNegotiationEndpoint::new();
        negotiation
            .expect_exchange()
            .returning(|_, _| Ok("answer-sdp".to_string()));

        let sent: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let inbound: Arc<StdMutex<Option<mpsc::Sender<String>>>> =
            Arc::new(StdMutex::new(None));
        let connects = Arc::new(AtomicUsize::new(0));

        let factory_sent = Arc::clone(&sent);
        let factory_inbound = Arc::clone(&inbound);
        let factory_connects = Arc::clone(&connects);
        let transports: TransportFactory = Arc::new(move || {
            factory_connects.fetch_add(1, Ordering::SeqCst);
            let mut transport = MockPeerTransport::new();

            let slot = Arc::clone(&factory_inbound);
            transport.expect_open().returning(move |tx| {
                *slot.lock().unwrap() = Some(tx);
                Ok(())
            });
            transport.expect_attach_capture().returning(|| Ok(()));
            transport
                .expect_create_offer()
                .returning(|| Ok("offer-sdp".to_string()));
            transport.expect_apply_answer().returning(|_| Ok(()));
            transport.expect_channel_open().returning(|| true);
            let log = Arc::clone(&factory_sent);
            transport.expect_send().returning(move |payload| {
                log.lock().unwrap().push(payload);
                Ok(())
            });
            transport.expect_close().returning(|| ());
            Arc::new(transport) as Arc<dyn PeerTransport>
        });

        let coordinator = SessionCoordinator::spawn_with(
            Arc::new(CoordinatorConfig::new()),
            Arc::new(credentials),
            Arc::new(negotiation),
            Arc::new(retriever),
            transports,
        );

        Harness {
            coordinator,
            sent,
            inbound,
            connects,
        }
    }

    fn harness() -> Harness {
        let mut retriever = MockContextRetriever::new();
        retriever
            .expect_fetch()
            .returning(|_| Ok(AugmentationContext::new("Policy A\n\nPolicy B".to_string())));
        harness_with_retriever(retriever)
    }

    async fn wait_for_sent(sent: &Arc<StdMutex<Vec<String>>>, count: usize) -> Vec<String> {
        for _ in 0..200 {
            {
                let log = sent.lock().unwrap();
                if log.len() >= count {
                    return log.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} outbound payloads, got {:?}", sent.lock().unwrap());
    }

    async fn next_update(
        updates: &mut broadcast::Receiver<CoordinatorUpdate>,
    ) -> CoordinatorUpdate {
        tokio::time::timeout(Duration::from_secs(2), updates.recv())
            .await
            .expect("timed out waiting for update")
            .expect("update channel closed")
    }

    async fn feed(harness: &Harness, raw: &str) {
        let sender = harness
            .inbound
            .lock()
            .unwrap()
            .clone()
            .expect("session not connected");
        sender.send(raw.to_string()).await.expect("inbound closed");
    }

    #[tokio::test]
    async fn send_text_when_disconnected_connects_once_then_sends() {
        let harness = harness();
        harness
            .coordinator
            .send_text("What is the refund policy?")
            .await
            .expect("send_text should succeed");

        let sent = wait_for_sent(&harness.sent, 2).await;
        assert_eq!(harness.connects.load(Ordering::SeqCst), 1);

        let message: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(message["type"], "message");
        assert_eq!(message["text"], "What is the refund policy?");

        let request: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(request["type"], "response.create");
        let instructions = request["response"]["instructions"].as_str().unwrap();
        assert!(instructions.contains("Policy A\n\nPolicy B"));
        assert!(instructions.contains("What is the refund policy?"));
        assert_eq!(request["response"]["voice"], "ash");
        assert_eq!(request["response"]["max_output_tokens"], 800);
    }

    #[tokio::test]
    async fn second_send_text_reuses_the_live_session() {
        let harness = harness();
        harness.coordinator.send_text("first").await.unwrap();
        harness.coordinator.send_text("second").await.unwrap();

        wait_for_sent(&harness.sent, 4).await;
        assert_eq!(harness.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_twice_is_a_noop() {
        let harness = harness();
        harness.coordinator.start().await.expect("first start");
        harness.coordinator.start().await.expect("second start");
        assert_eq!(harness.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn end_is_idempotent_from_any_state() {
        let harness = harness();
        // From idle: a no-op, never an error.
        harness.coordinator.end().await;

        harness.coordinator.start().await.expect("start");
        harness.coordinator.end().await;
        harness.coordinator.end().await;

        // The session can come back afterwards.
        harness.coordinator.start().await.expect("restart");
        assert_eq!(harness.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn end_cancels_an_in_flight_connect() {
        // Credential fetch that parks forever, keeping the connect in flight
        // until end() cancels it.
        struct StallingCredentials {
            reached: Arc<Notify>,
        }

        #[async_trait]
        impl CredentialSource for StallingCredentials {
            async fn issue(&self) -> Result<SessionTicket, SessionError> {
                self.reached.notify_one();
                std::future::pending().await
            }
        }

        let reached = Arc::new(Notify::new());
        let credentials = StallingCredentials {
            reached: Arc::clone(&reached),
        };

        let closes = Arc::new(AtomicUsize::new(0));
        let factory_closes = Arc::clone(&closes);
        let transports: TransportFactory = Arc::new(move || {
            // The attempt never gets past the credential step, so the only
            // legal call on the half-open transport is close().
            let mut transport = MockPeerTransport::new();
            let counter = Arc::clone(&factory_closes);
            transport.expect_close().times(1).returning(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            Arc::new(transport) as Arc<dyn PeerTransport>
        });

        let coordinator = Arc::new(SessionCoordinator::spawn_with(
            Arc::new(CoordinatorConfig::new()),
            Arc::new(credentials),
            Arc::new(MockNegotiationEndpoint::new()),
            Arc::new(MockContextRetriever::new()),
            transports,
        ));
        let mut updates = coordinator.updates();

        let starter = Arc::clone(&coordinator);
        let pending_start = tokio::spawn(async move { starter.start().await });

        tokio::time::timeout(Duration::from_secs(2), reached.notified())
            .await
            .expect("connect should reach the credential fetch");
        coordinator.end().await;

        let result = pending_start.await.expect("start task");
        assert!(matches!(result, Err(SessionError::Cancelled)));
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        loop {
            if let CoordinatorUpdate::Status(status) = next_update(&mut updates).await {
                if status == STATUS_DISCONNECTED {
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn assistant_fragments_finalize_into_one_turn() {
        let harness = harness();
        harness.coordinator.start().await.expect("start");
        let mut updates = harness.coordinator.updates();

        feed(&harness, r#"{"type":"turn.fragment","speaker":"assistant","delta":"Hel"}"#).await;
        feed(&harness, r#"{"type":"turn.fragment","speaker":"assistant","delta":"lo wo"}"#).await;
        feed(&harness, r#"{"type":"turn.fragment","speaker":"assistant","delta":"rld"}"#).await;
        feed(&harness, r#"{"type":"turn.finalized","speaker":"assistant"}"#).await;

        loop {
            match next_update(&mut updates).await {
                CoordinatorUpdate::TurnFinalized(turn) => {
                    assert_eq!(turn.speaker(), Speaker::Assistant);
                    assert_eq!(turn.text(), "Hello world");
                    break;
                }
                _ => continue,
            }
        }

        // Assistant turns never trigger generation.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(harness.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn finalized_user_turn_with_text_triggers_generation() {
        let mut retriever = MockContextRetriever::new();
        retriever
            .expect_fetch()
            .withf(|query| query == "What is the refund policy?")
            .once()
            .returning(|_| Ok(AugmentationContext::new("Policy A".to_string())));
        let harness = harness_with_retriever(retriever);

        harness.coordinator.start().await.expect("start");
        feed(
            &harness,
            r#"{"type":"turn.finalized","speaker":"user","text":"What is the refund policy?"}"#,
        )
        .await;

        let sent = wait_for_sent(&harness.sent, 1).await;
        let request: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(request["type"], "response.create");
        assert!(request["response"]["instructions"]
            .as_str()
            .unwrap()
            .contains("Policy A"));
    }

    #[tokio::test]
    async fn malformed_event_warns_but_session_continues() {
        let harness = harness();
        harness.coordinator.start().await.expect("start");
        let mut updates = harness.coordinator.updates();

        feed(&harness, "garbage{{{").await;
        loop {
            if let CoordinatorUpdate::ProtocolWarning(warning) = next_update(&mut updates).await {
                assert!(warning.contains("malformed"));
                break;
            }
        }

        // A well-formed event afterwards is still processed.
        feed(
            &harness,
            r#"{"type":"turn.finalized","speaker":"assistant","text":"still here"}"#,
        )
        .await;
        loop {
            if let CoordinatorUpdate::TurnFinalized(turn) = next_update(&mut updates).await {
                assert_eq!(turn.text(), "still here");
                break;
            }
        }
    }

    #[tokio::test]
    async fn speech_and_response_events_drive_status_only() {
        let harness = harness();
        harness.coordinator.start().await.expect("start");
        let mut updates = harness.coordinator.updates();

        feed(&harness, r#"{"type":"speech.started"}"#).await;
        loop {
            if let CoordinatorUpdate::Status(status) = next_update(&mut updates).await {
                assert_eq!(status, STATUS_LISTENING);
                break;
            }
        }

        feed(&harness, r#"{"type":"speech.stopped"}"#).await;
        loop {
            if let CoordinatorUpdate::Status(status) = next_update(&mut updates).await {
                assert_eq!(status, STATUS_PROCESSING);
                break;
            }
        }

        feed(&harness, r#"{"type":"response.completed"}"#).await;
        loop {
            if let CoordinatorUpdate::Status(status) = next_update(&mut updates).await {
                assert_eq!(status, STATUS_CONNECTED);
                break;
            }
        }
    }

    #[tokio::test]
    async fn retrieval_failure_degrades_to_empty_context() {
        let mut retriever = MockContextRetriever::new();
        retriever
            .expect_fetch()
            .returning(|_| Err(SessionError::Retrieval("down".to_string())));
        let harness = harness_with_retriever(retriever);

        harness.coordinator.send_text("hello").await.unwrap();
        let sent = wait_for_sent(&harness.sent, 2).await;

        let request: serde_json::Value = serde_json::from_str(&sent[1]).unwrap();
        assert_eq!(request["type"], "response.create");
        let instructions = request["response"]["instructions"].as_str().unwrap();
        assert!(instructions.contains("hello"));
        assert!(!instructions.contains("down"));
    }

    #[tokio::test]
    async fn unknown_events_have_no_state_effect() {
        let harness = harness();
        harness.coordinator.start().await.expect("start");
        let mut updates = harness.coordinator.updates();

        feed(&harness, r#"{"type":"rate_limits.updated","limit":1}"#).await;
        feed(
            &harness,
            r#"{"type":"turn.finalized","speaker":"assistant","text":"unaffected"}"#,
        )
        .await;

        loop {
            match next_update(&mut updates).await {
                CoordinatorUpdate::TurnFinalized(turn) => {
                    assert_eq!(turn.text(), "unaffected");
                    break;
                }
                CoordinatorUpdate::ProtocolWarning(warning) => {
                    panic!("unknown event should not warn: {warning}")
                }
                CoordinatorUpdate::Status(_) => continue,
            }
        }
    }
}
