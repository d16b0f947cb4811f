//! WebRTC session manager: accepts viewer signaling over a WebSocket per
//! camera and tracks live peer connections so a camera teardown or a
//! failed ICE negotiation only affects its own viewer.

mod session;
mod track_source;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, WebSocket};
use parking_lot::Mutex;
use tracing::info;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::capture::CaptureManager;
use crate::inference::InferenceDispatcher;

struct PeerEntry {
    #[allow(dead_code)]
    peer_connection: Arc<RTCPeerConnection>,
    #[allow(dead_code)]
    track: Arc<TrackLocalStaticSample>,
}

/// Peer connections and their tracks are collapsed into a single
/// `camera_id -> peer_id -> PeerEntry` map since both are always
/// inserted/removed together.
pub struct WebRtcSessionManager {
    peers: Mutex<HashMap<i64, HashMap<String, PeerEntry>>>,
    ice_servers: Vec<String>,
    capture: Arc<CaptureManager>,
}

impl WebRtcSessionManager {
    pub fn new(ice_servers: Vec<String>, capture: Arc<CaptureManager>) -> Self {
        WebRtcSessionManager {
            peers: Mutex::new(HashMap::new()),
            ice_servers,
            capture,
        }
    }

    pub fn ice_servers(&self) -> Vec<String> {
        self.ice_servers.clone()
    }

    fn insert_peer(
        &self,
        camera_id: i64,
        peer_id: String,
        peer_connection: Arc<RTCPeerConnection>,
        track: Arc<TrackLocalStaticSample>,
    ) {
        let mut peers = self.peers.lock();
        peers.entry(camera_id).or_default().insert(
            peer_id,
            PeerEntry {
                peer_connection,
                track,
            },
        );
    }

    fn remove_peer(&self, camera_id: i64, peer_id: &str) {
        let mut peers = self.peers.lock();
        if let Some(by_peer) = peers.get_mut(&camera_id) {
            by_peer.remove(peer_id);
            if by_peer.is_empty() {
                peers.remove(&camera_id);
            }
        }
    }

    pub fn active_viewer_count(&self, camera_id: i64) -> usize {
        self.peers.lock().get(&camera_id).map(|m| m.len()).unwrap_or(0)
    }

    /// Entry point wired from the HTTP layer's `WS /webrtc/{camera_id}`
    /// route. Closes with 1008 if the camera is unknown.
    pub async fn accept(
        self: Arc<Self>,
        mut socket: WebSocket,
        camera_id: i64,
        peer_addr: std::net::SocketAddr,
        inference: Arc<InferenceDispatcher>,
    ) {
        let Some(camera) = self.capture.camera_config(camera_id) else {
            use axum::extract::ws::Message;
            use futures_util::SinkExt;
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: 1008,
                    reason: format!("Camera {} not found", camera_id).into(),
                })))
                .await;
            return;
        };

        let peer_id = format!("{}:{}", peer_addr.ip(), peer_addr.port());
        info!(camera_id, peer_id = %peer_id, "accepted webrtc viewer session");
        session::handle_viewer_session(socket, peer_id, camera, self, inference).await;
    }
}
