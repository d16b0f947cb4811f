//! Per-viewer signaling. The `SignalingMessage` shapes and the
//! offer/answer/ice-candidate flow are generalized from two hardcoded
//! camera tracks to one track per `(camera_id, viewer)` session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message as AxumMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::inference::InferenceDispatcher;
use crate::model::CameraConfig;
use crate::webrtc::track_source;
use crate::webrtc::WebRtcSessionManager;

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum SignalingMessage {
    Offer { sdp: String },
    Answer { sdp: String },
    IceCandidate { candidate: RTCIceCandidateInit },
    Disconnect,
}

pub async fn handle_viewer_session(
    mut socket: WebSocket,
    peer_id: String,
    camera: CameraConfig,
    manager: Arc<WebRtcSessionManager>,
    inference: Arc<InferenceDispatcher>,
) {
    let camera_id = camera.camera_id;

    let mut media_engine = MediaEngine::default();
    if let Err(e) = media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                clock_rate: 90000,
                channels: 0,
                sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
                    .to_owned(),
                rtcp_feedback: vec![],
            },
            payload_type: 102,
            ..Default::default()
        },
        RTPCodecType::Video,
    ) {
        warn!(camera_id, error = %e, "failed to register codec, closing session");
        let _ = socket
            .send(AxumMessage::Close(Some(CloseFrame {
                code: 1011,
                reason: "codec setup failed".into(),
            })))
            .await;
        return;
    }

    let api = APIBuilder::new().with_media_engine(media_engine).build();
    let rtc_config = RTCConfiguration {
        ice_servers: manager
            .ice_servers()
            .into_iter()
            .map(|url| RTCIceServer {
                urls: vec![url],
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let peer_connection = match api.new_peer_connection(rtc_config).await {
        Ok(pc) => Arc::new(pc),
        Err(e) => {
            warn!(camera_id, error = %e, "failed to create peer connection");
            return;
        }
    };

    let track = Arc::new(TrackLocalStaticSample::new(
        RTCRtpCodecCapability {
            mime_type: MIME_TYPE_H264.to_owned(),
            ..Default::default()
        },
        format!("nexguard-{}", camera_id),
        format!("nexguard-stream-{}", camera_id),
    ));

    if let Err(e) = peer_connection
        .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
        .await
    {
        warn!(camera_id, error = %e, "failed to add track");
        return;
    }

    manager.insert_peer(camera_id, peer_id.clone(), Arc::clone(&peer_connection), Arc::clone(&track));

    let track_stop = Arc::new(AtomicBool::new(false));
    let track_stop_clone = Arc::clone(&track_stop);
    let manager_for_state = Arc::clone(&manager);
    let peer_id_for_state = peer_id.clone();
    peer_connection.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
        info!(camera_id, peer_id = %peer_id_for_state, state = ?s, "peer connection state changed");
        if matches!(s, RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed | RTCPeerConnectionState::Disconnected) {
            track_stop_clone.store(true, Ordering::SeqCst);
            manager_for_state.remove_peer(camera_id, &peer_id_for_state);
        }
        Box::pin(async move {})
    }));

    let (mut ws_sink, mut ws_stream) = socket.split();
    let fps_target = camera.fps_target;
    let resolution = camera.resolution;
    let track_for_producer = Arc::clone(&track);
    let inference_for_producer = Arc::clone(&inference);
    let producer_stop = Arc::clone(&track_stop);
    let producer = tokio::spawn(async move {
        track_source::run(
            camera_id,
            track_for_producer,
            inference_for_producer,
            fps_target,
            resolution,
            producer_stop,
        )
        .await;
    });

    while let Some(msg) = ws_stream.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                warn!(camera_id, peer_id = %peer_id, error = %e, "signaling socket error");
                break;
            }
        };
        let AxumMessage::Text(text) = msg else {
            continue;
        };
        match serde_json::from_str::<SignalingMessage>(&text) {
            Ok(SignalingMessage::Offer { sdp }) => {
                let offer = match RTCSessionDescription::offer(sdp) {
                    Ok(o) => o,
                    Err(e) => {
                        warn!(camera_id, error = %e, "malformed offer");
                        continue;
                    }
                };
                if let Err(e) = peer_connection.set_remote_description(offer).await {
                    warn!(camera_id, error = %e, "set_remote_description failed");
                    continue;
                }
                let answer = match peer_connection.create_answer(None).await {
                    Ok(a) => a,
                    Err(e) => {
                        warn!(camera_id, error = %e, "create_answer failed");
                        continue;
                    }
                };
                if let Err(e) = peer_connection.set_local_description(answer.clone()).await {
                    warn!(camera_id, error = %e, "set_local_description failed");
                    continue;
                }
                let reply = SignalingMessage::Answer { sdp: answer.sdp };
                if let Ok(json) = serde_json::to_string(&reply) {
                    let _ = ws_sink.send(AxumMessage::Text(json.into())).await;
                }
            }
            Ok(SignalingMessage::IceCandidate { candidate }) => {
                if let Err(e) = peer_connection.add_ice_candidate(candidate).await {
                    warn!(camera_id, error = %e, "malformed ICE candidate, ignoring");
                }
            }
            Ok(SignalingMessage::Disconnect) => {
                break;
            }
            Ok(SignalingMessage::Answer { .. }) => {
                warn!(camera_id, "unexpected answer from viewer, ignoring");
            }
            Err(e) => {
                warn!(camera_id, error = %e, "malformed signaling message, closing");
                let _ = ws_sink
                    .send(AxumMessage::Close(Some(CloseFrame {
                        code: 1002,
                        reason: "malformed signaling message".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    track_stop.store(true, Ordering::SeqCst);
    producer.abort();
    let _ = peer_connection.close().await;
    manager.remove_peer(camera_id, &peer_id);
    info!(camera_id, peer_id = %peer_id, "viewer session ended");
}
