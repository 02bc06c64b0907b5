use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::connection::{capture, PeerTransport};
use crate::error::SessionError;

const CONTROL_CHANNEL_LABEL: &str = "events";

struct PeerInner {
    peer: Arc<RTCPeerConnection>,
    channel: Arc<RTCDataChannel>,
}

/// WebRTC-backed transport: one peer connection, one control data channel,
/// one outbound opus track fed by the local capture device. Built fresh per
/// session and discarded on close.
pub struct WebRtcPeer {
    inner: Mutex<Option<PeerInner>>,
    channel_open: Arc<AtomicBool>,
}

impl WebRtcPeer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
            channel_open: Arc::new(AtomicBool::new(false)),
        }
    }

    fn peer(&self) -> Result<Arc<RTCPeerConnection>, SessionError> {
        match self.inner.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|inner| Arc::clone(&inner.peer))
                .ok_or(SessionError::ChannelNotReady),
            Err(_) => Err(SessionError::Transport("peer state poisoned".to_string())),
        }
    }

    fn channel(&self) -> Result<Arc<RTCDataChannel>, SessionError> {
        match self.inner.lock() {
            Ok(guard) => guard
                .as_ref()
                .map(|inner| Arc::clone(&inner.channel))
                .ok_or(SessionError::ChannelNotReady),
            Err(_) => Err(SessionError::Transport("peer state poisoned".to_string())),
        }
    }
}

impl Default for WebRtcPeer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PeerTransport for WebRtcPeer {
    async fn open(&self, inbound: mpsc::Sender<String>) -> Result<(), SessionError> {
        let mut media = MediaEngine::default();
        media
            .register_default_codecs()
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;
        let api = APIBuilder::new().with_media_engine(media).build();

        let peer = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|err| SessionError::Negotiation(err.to_string()))?,
        );

        // The channel exists before any offer is created, so the remote end
        // can never deliver an event into a not-yet-registered handler.
        let channel = peer
            .create_data_channel(CONTROL_CHANNEL_LABEL, None)
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;

        let opened = Arc::clone(&self.channel_open);
        channel.on_open(Box::new(move || {
            opened.store(true, Ordering::SeqCst);
            Box::pin(async {})
        }));

        let closed = Arc::clone(&self.channel_open);
        channel.on_close(Box::new(move || {
            closed.store(false, Ordering::SeqCst);
            Box::pin(async {})
        }));

        channel.on_message(Box::new(move |message: DataChannelMessage| {
            let inbound = inbound.clone();
            Box::pin(async move {
                match String::from_utf8(message.data.to_vec()) {
                    Ok(text) => {
                        if inbound.send(text).await.is_err() {
                            tracing::debug!("inbound consumer gone, dropping event");
                        }
                    }
                    Err(err) => tracing::warn!(%err, "dropping non-utf8 control message"),
                }
            })
        }));

        match self.inner.lock() {
            Ok(mut guard) => {
                *guard = Some(PeerInner { peer, channel });
                Ok(())
            }
            Err(_) => Err(SessionError::Transport("peer state poisoned".to_string())),
        }
    }

    async fn attach_capture(&self) -> Result<(), SessionError> {
        let device = capture::acquire_input_device()?;
        tracing::info!(
            device = %device.name,
            sample_rate = device.sample_rate,
            channels = device.channels,
            "capture device acquired"
        );

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: 48_000,
                channels: 2,
                ..Default::default()
            },
            "audio".to_string(),
            "voicechat-microphone".to_string(),
        ));

        let peer = self.peer()?;
        peer.add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;
        Ok(())
    }

    async fn create_offer(&self) -> Result<String, SessionError> {
        let peer = self.peer()?;
        let offer = peer
            .create_offer(None)
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;

        // Wait for candidate gathering so the posted offer is complete;
        // the negotiation endpoint does not trickle.
        let mut gathered = peer.gathering_complete_promise().await;
        peer.set_local_description(offer)
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;
        let _ = gathered.recv().await;

        let local = peer.local_description().await.ok_or_else(|| {
            SessionError::Negotiation("no local description after gathering".to_string())
        })?;
        Ok(local.sdp)
    }

    async fn apply_answer(&self, answer: String) -> Result<(), SessionError> {
        let peer = self.peer()?;
        let description = RTCSessionDescription::answer(answer)
            .map_err(|err| SessionError::Negotiation(err.to_string()))?;
        peer.set_remote_description(description)
            .await
            .map_err(|err| SessionError::Negotiation(err.to_string()))
    }

    async fn send(&self, payload: String) -> Result<(), SessionError> {
        if !self.channel_open() {
            return Err(SessionError::ChannelNotReady);
        }
        let channel = self.channel()?;
        channel
            .send_text(payload)
            .await
            .map(|_| ())
            .map_err(|err| SessionError::Transport(err.to_string()))
    }

    fn channel_open(&self) -> bool {
        self.channel_open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        let inner = match self.inner.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                tracing::warn!("peer state poisoned during close");
                return;
            }
        };
        self.channel_open.store(false, Ordering::SeqCst);
        if let Some(inner) = inner {
            if let Err(err) = inner.peer.close().await {
                tracing::warn!(%err, "error closing peer connection");
            }
        }
    }
}
