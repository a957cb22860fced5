//! Per-stream frame loop.
//!
//! Each accepted stream runs this loop: buffer bytes, slice frames,
//! and on the first decodable Connect packet run the plugin pipeline
//! and emit exactly one terminal reply (ClientReferral or Disconnect).
//! All other packets are observed for diagnostics only. Unidirectional
//! streams have no send half and are drained.

use std::sync::Arc;

use hyrp_plugins::{ConnectEvent, Manager};
use hyrp_routing::{Backend, Decision, RouteError};
use hyrp_wire::{
    decode_connect, encode_client_referral, encode_disconnect, encode_frame, packet_name,
    FrameHeader, PacketId, MAX_PAYLOAD_LEN,
};
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};

use crate::config::MessagesConfig;
use crate::messages::disconnect_reason;

/// Frames buffered past this size end the stream.
pub const MAX_BUFFERED_PAYLOAD: usize = 16 * 1024 * 1024;

const PAYLOAD_HEX_PREFIX: usize = 96;
const READ_CHUNK: usize = 4096;

/// Everything a stream needs to act on its first Connect packet.
#[derive(Clone)]
pub struct StreamContext {
    pub decision: Arc<Decision>,
    pub route_err: Option<Arc<RouteError>>,
    pub base_event: ConnectEvent,
    pub plugins: Option<Arc<Manager>>,
    pub messages: Arc<MessagesConfig>,
}

enum Flow {
    Continue,
    Close,
}

/// Run the frame loop until EOF, an invalid frame, or a terminal reply.
///
/// `send` is `None` for unidirectional streams, which can never be
/// replied on.
pub async fn pump_frames<R, W>(recv: &mut R, mut send: Option<&mut W>, cx: StreamContext)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let mut pending: Vec<u8> = Vec::new();
    let mut referral_sent = false;
    let mut referral_data: Option<Vec<u8>> = None;
    let mut backend = cx.decision.backend.clone();

    loop {
        let n = match recv.read(&mut buf).await {
            Ok(0) => {
                debug!("stream closed");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "stream read error");
                return;
            }
        };
        pending.extend_from_slice(&buf[..n]);

        while let Some(header) = FrameHeader::parse(&pending) {
            if header.payload_len > MAX_PAYLOAD_LEN
                || header.payload_len as usize > MAX_BUFFERED_PAYLOAD
            {
                info!(
                    payload_len = header.payload_len,
                    packet_id = header.packet_id,
                    buffered_bytes = pending.len(),
                    "invalid frame"
                );
                return;
            }
            let frame_len = header.frame_len();
            if pending.len() < frame_len {
                break;
            }

            let payload = pending[8..frame_len].to_vec();
            pending.drain(..frame_len);
            log_frame(&header, &payload);

            if header.packet_id == PacketId::Connect.id() {
                let flow = handle_connect(
                    &payload,
                    &mut send,
                    &cx,
                    &mut referral_sent,
                    &mut referral_data,
                    &mut backend,
                )
                .await;
                if matches!(flow, Flow::Close) {
                    return;
                }
            }
        }
    }
}

fn log_frame(header: &FrameHeader, payload: &[u8]) {
    let sum = Sha256::digest(payload);
    let prefix_len = payload.len().min(PAYLOAD_HEX_PREFIX);
    debug!(
        packet_id = header.packet_id,
        packet_name = packet_name(header.packet_id),
        payload_len = header.payload_len,
        payload_sha256 = %hex::encode(sum),
        payload_prefix_hex = %hex::encode(&payload[..prefix_len]),
        "rx packet"
    );
}

async fn handle_connect<W>(
    payload: &[u8],
    send: &mut Option<&mut W>,
    cx: &StreamContext,
    referral_sent: &mut bool,
    referral_data: &mut Option<Vec<u8>>,
    backend: &mut Backend,
) -> Flow
where
    W: AsyncWrite + Unpin,
{
    let Ok(connect) = decode_connect(payload) else {
        debug!("undecodable connect payload");
        return Flow::Continue;
    };

    let mut event = cx.base_event.clone();
    event.protocol_hash = connect.protocol_hash.clone();
    event.client_type = connect.client_type;
    event.uuid = connect.uuid.clone();
    event.username = connect.username.clone();
    event.language = connect.language.clone();
    event.identity_token_present = connect.identity_token_present;

    if let Some(plugins) = &cx.plugins {
        let result = plugins
            .apply_on_connect(&event, &cx.decision, referral_data.clone())
            .await;
        if result.denied {
            // Deny is terminal: send the Disconnect and close so the
            // client can progress.
            return send_disconnect(send, &result.deny_reason).await;
        }
        *backend = result.backend;
        *referral_data = result.referral_content;
    }

    info!(
        protocol_hash = %connect.protocol_hash,
        client_type = connect.client_type,
        uuid = %connect.uuid,
        username = %connect.username,
        language = %connect.language,
        identity_token_present = connect.identity_token_present,
        referral_data_len = connect.referral_data_len,
        referral_source = ?connect.referral_source,
        "rx connect"
    );

    if !*referral_sent && !backend.host.is_empty() {
        if let Some(w) = send.as_deref_mut() {
            match encode_client_referral(&backend.host, backend.port, referral_data.as_deref()) {
                Err(e) => info!(error = %e, "failed to build referral"),
                Ok(referral) => {
                    if let Err(e) = write_frame(w, PacketId::ClientReferral.id(), &referral).await {
                        info!(error = %e, "failed to send referral");
                    } else {
                        *referral_sent = true;
                        info!(
                            host = %backend.host,
                            port = backend.port,
                            matched = cx.decision.matched,
                            route_index = cx.decision.route_index,
                            data_len = referral_data.as_deref().map(|d| d.len()).unwrap_or(0),
                            "tx referral"
                        );
                    }
                }
            }
        }
    }

    if !*referral_sent && backend.host.is_empty() {
        let reason = disconnect_reason(
            &cx.messages,
            &cx.base_event.sni,
            &event.language,
            cx.route_err.as_deref(),
        );
        if !reason.is_empty() {
            return send_disconnect(send, &reason).await;
        }
    }

    Flow::Continue
}

async fn send_disconnect<W>(send: &mut Option<&mut W>, reason: &str) -> Flow
where
    W: AsyncWrite + Unpin,
{
    let Some(w) = send.as_deref_mut() else {
        info!(error = "stream is not writable", "failed to send disconnect");
        return Flow::Close;
    };
    let payload = match encode_disconnect(reason) {
        Ok(payload) => payload,
        Err(e) => {
            info!(error = %e, "failed to build disconnect");
            return Flow::Close;
        }
    };
    if let Err(e) = write_frame(w, PacketId::Disconnect.id(), &payload).await {
        info!(error = %e, "failed to send disconnect");
        return Flow::Close;
    }
    info!(reason = %reason, "tx disconnect");
    if let Err(e) = w.shutdown().await {
        debug!(error = %e, "failed to close stream after disconnect");
    }
    Flow::Close
}

async fn write_frame<W>(w: &mut W, packet_id: u32, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    w.write_all(&encode_frame(packet_id, payload)).await?;
    w.flush().await
}
