use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use secrecy::SecretString;
use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::orchestrator::OutboundSink;
use crate::types::{ClientEvent, SessionTicket};

pub mod capture;
pub mod http;
pub mod webrtc;

/// Issues the single-use bearer credential for one negotiation exchange.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn issue(&self) -> Result<SessionTicket, SessionError>;
}

/// Exchanges a session-description offer for an answer, authorized by the
/// ephemeral credential.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NegotiationEndpoint: Send + Sync {
    async fn exchange(&self, offer: String, secret: SecretString)
        -> Result<String, SessionError>;
}

/// One peer connection: control channel, capture track, offer/answer, and
/// the outbound send path. Production uses a WebRTC peer; tests use a
/// `mockall` double.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Creates the peer and opens the control channel, forwarding inbound
    /// messages in arrival order. Called before any offer exists so no
    /// inbound event can race channel creation.
    async fn open(&self, inbound: mpsc::Sender<String>) -> Result<(), SessionError>;

    /// Attaches local audio capture as an outbound media track. A missing
    /// capture device is fatal to the connection attempt.
    async fn attach_capture(&self) -> Result<(), SessionError>;

    async fn create_offer(&self) -> Result<String, SessionError>;

    async fn apply_answer(&self, answer: String) -> Result<(), SessionError>;

    /// Sends one opaque payload over the control channel.
    async fn send(&self, payload: String) -> Result<(), SessionError>;

    fn channel_open(&self) -> bool;

    /// Releases the capture track and tears down the peer. Idempotent.
    async fn close(&self);
}

/// A live negotiated session. Cloning shares the underlying transport.
#[derive(Clone)]
pub struct SessionHandle {
    id: Option<String>,
    epoch: u64,
    transport: Arc<dyn PeerTransport>,
}

impl SessionHandle {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Owns connection negotiation and guarantees at most one live session.
///
/// A `connect` while a session is active fails with `AlreadyConnected`; the
/// caller must `end` first. `end` is idempotent. Sessions are never reused
/// across reconnects; every attempt builds a fresh transport.
pub struct SessionConnectionManager {
    credentials: Arc<dyn CredentialSource>,
    negotiation: Arc<dyn NegotiationEndpoint>,
    active: Mutex<Option<SessionHandle>>,
}

impl SessionConnectionManager {
    pub fn new(
        credentials: Arc<dyn CredentialSource>,
        negotiation: Arc<dyn NegotiationEndpoint>,
    ) -> Self {
        Self {
            credentials,
            negotiation,
            active: Mutex::new(None),
        }
    }

    /// Negotiates one session: credential, control channel, capture track,
    /// offer, answer. The control channel is wired up before the offer is
    /// sent so inbound events cannot race channel creation. On failure the
    /// caller owns cleanup of the transport it supplied.
    pub async fn connect(
        &self,
        epoch: u64,
        transport: Arc<dyn PeerTransport>,
        inbound: mpsc::Sender<String>,
    ) -> Result<SessionHandle, SessionError> {
        if self.active.lock().await.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let ticket = self.credentials.issue().await?;
        tracing::debug!("credential issued, negotiating");

        transport.open(inbound).await?;
        transport.attach_capture().await?;

        let offer = transport.create_offer().await?;
        let answer = self
            .negotiation
            .exchange(offer, ticket.secret().clone())
            .await?;
        transport.apply_answer(answer).await?;

        let handle = SessionHandle {
            id: ticket.id().map(str::to_string),
            epoch,
            transport: Arc::clone(&transport),
        };

        let mut active = self.active.lock().await;
        if active.is_some() {
            // Lost the race to another attempt; this one steps aside.
            transport.close().await;
            return Err(SessionError::AlreadyConnected);
        }
        *active = Some(handle.clone());
        tracing::info!(session_id = ?handle.id(), "session negotiated");
        Ok(handle)
    }

    /// Tears down the live session, releasing capture tracks and the remote
    /// media sink. Safe to call repeatedly and from any state.
    pub async fn end(&self) {
        let taken = self.active.lock().await.take();
        if let Some(session) = taken {
            session.transport.close().await;
            tracing::info!(session_id = ?session.id(), "session ended");
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.active.lock().await.is_some()
    }

    /// Records the remote peer's session id once `session.created` arrives.
    pub async fn record_remote_id(&self, id: &str) {
        if let Some(session) = self.active.lock().await.as_mut() {
            if session.id.is_none() {
                session.id = Some(id.to_string());
            }
        }
    }
}

#[async_trait]
impl OutboundSink for SessionConnectionManager {
    /// Serializes and sends an outbound event for the given session epoch.
    /// Refuses with `StaleSession` when the epoch no longer names the live
    /// session, and with `ChannelNotReady` when there is no open channel.
    /// The event is dropped, never queued.
    async fn send(&self, epoch: u64, event: ClientEvent) -> Result<(), SessionError> {
        let session = {
            let active = self.active.lock().await;
            match active.as_ref() {
                None => return Err(SessionError::ChannelNotReady),
                Some(session) if session.epoch != epoch => {
                    return Err(SessionError::StaleSession)
                }
                Some(session) => session.clone(),
            }
        };

        if !session.transport.channel_open() {
            return Err(SessionError::ChannelNotReady);
        }

        let payload = serde_json::to_string(&event)?;
        session.transport.send(payload).await
    }
}
