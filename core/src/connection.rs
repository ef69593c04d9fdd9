use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use capydeploy_protocol::CAPABILITIES;
use capydeploy_protocol::ClientMessage;
use capydeploy_protocol::Envelope;
use capydeploy_protocol::HubConnectedPayload;
use capydeploy_protocol::PairConfirmPayload;
use capydeploy_protocol::decode_binary_frame;
use futures_util::SinkExt;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use crate::error::AgentError;
use crate::platform;
use crate::shortcuts;
use crate::shortcuts::TrackedShortcut;
use crate::supervisor::AgentShared;
use crate::supervisor::ConnectedHubInfo;
use crate::uploads::FileEntry as UploadFileEntry;
use crate::uploads::UploadRegistry;

/// Connection lifecycle state, independent per connection. `hub_id`/`name`
/// captured during `hub_connected` are remembered for the follow-up
/// `pair_confirm`.
enum ConnectionState {
    New,
    AwaitingPair { hub_id: String, hub_name: String },
    Authorized { hub_id: String },
}

struct ConnCtx {
    shared: Arc<AgentShared>,
    uploads: UploadRegistry,
}

/// Drive one accepted WebSocket connection: a reader loop that dispatches
/// messages and a single writer task that drains a FIFO send queue, so
/// replies are never interleaved on the wire.
pub async fn handle_connection(stream: WebSocketStream<TcpStream>, shared: Arc<AgentShared>, install_root: PathBuf) {
    let (mut sink, mut incoming) = stream.split();
    let (tx, mut rx) = mpsc::channel::<Message>(32);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut state = ConnectionState::New;
    let ctx = ConnCtx { shared: Arc::clone(&shared), uploads: UploadRegistry::new(install_root) };

    while let Some(frame) = incoming.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(error) => {
                tracing::warn!(%error, "websocket read error, closing connection");
                break;
            }
        };
        match frame {
            Message::Text(text) => {
                if let Err(error) = handle_text_frame(text.as_str(), &mut state, &ctx, &tx).await {
                    tracing::error!(%error, "fatal error handling text frame, closing connection");
                    break;
                }
            }
            Message::Binary(bytes) => {
                if let Err(error) = handle_binary_frame(&bytes, &state, &ctx, &tx).await {
                    tracing::error!(%error, "fatal error handling binary frame, closing connection");
                    break;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    if let ConnectionState::Authorized { hub_id } = &state {
        clear_connected_hub(&ctx.shared, hub_id);
    }
    let _ = ctx.shared.events.publish("hub_disconnected", serde_json::json!({}));

    drop(tx);
    let _ = writer.await;
}

async fn send(tx: &mpsc::Sender<Message>, envelope: Envelope) {
    #[expect(clippy::unwrap_used, reason = "Envelope always serializes")]
    let text = serde_json::to_string(&envelope).unwrap();
    let _ = tx.send(Message::Text(text.into())).await;
}

async fn handle_text_frame(
    text: &str,
    state: &mut ConnectionState,
    ctx: &ConnCtx,
    tx: &mpsc::Sender<Message>,
) -> Result<(), AgentError> {
    let envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(error) => {
            tracing::warn!(%error, "malformed envelope, ignoring");
            return Ok(());
        }
    };
    let id = envelope.id.clone();
    let message = match ClientMessage::parse(&envelope) {
        Ok(message) => message,
        Err(error) => {
            tracing::warn!(%error, kind = %envelope.kind, "malformed payload, ignoring");
            return Ok(());
        }
    };

    let is_handshake = matches!(message, ClientMessage::HubConnected(_) | ClientMessage::PairConfirm(_));
    if !is_handshake && !matches!(state, ConnectionState::Authorized { .. }) {
        send(tx, AgentError::NotAuthorized.to_wire(id)).await;
        return Ok(());
    }

    match dispatch(id.clone(), message, state, ctx).await {
        Ok(Some(envelope)) => send(tx, envelope).await,
        Ok(None) => {}
        Err(error) if error.is_wire_mappable() => send(tx, error.to_wire(id)).await,
        Err(error) if error.is_fatal() => return Err(error),
        Err(error) => tracing::warn!(%error, "application-level failure, not reported back"),
    }
    Ok(())
}

async fn handle_binary_frame(
    bytes: &[u8],
    state: &ConnectionState,
    ctx: &ConnCtx,
    tx: &mpsc::Sender<Message>,
) -> Result<(), AgentError> {
    if !matches!(state, ConnectionState::Authorized { .. }) {
        return Ok(());
    }
    let (header, payload) = match decode_binary_frame(bytes) {
        Ok(decoded) => decoded,
        Err(error) => {
            tracing::warn!(%error, "rejected malformed binary frame");
            return Ok(());
        }
    };
    match ctx.uploads.write_chunk(&header.upload_id, &header.file_path, header.offset, payload) {
        Ok(written) => {
            send(
                tx,
                Envelope::response(
                    header.id,
                    "upload_chunk_response",
                    serde_json::json!({"bytesWritten": written.bytes_written, "totalWritten": written.total_written}),
                ),
            )
            .await;
        }
        Err(error) if error.is_wire_mappable() => send(tx, error.to_wire(header.id)).await,
        Err(error) if error.is_fatal() => return Err(error),
        Err(error) => tracing::warn!(%error, "application-level failure, not reported back"),
    }
    Ok(())
}

async fn dispatch(id: String, message: ClientMessage, state: &mut ConnectionState, ctx: &ConnCtx) -> Result<Option<Envelope>, AgentError> {
    match message {
        ClientMessage::HubConnected(payload) => Ok(Some(handle_hub_connected(id, payload, state, ctx))),
        ClientMessage::PairConfirm(payload) => Ok(Some(handle_pair_confirm(id, payload, state, ctx)?)),
        ClientMessage::Ping => Ok(Some(Envelope::empty_response(id, "pong"))),
        ClientMessage::GetInfo => Ok(Some(handle_get_info(id, ctx))),
        ClientMessage::GetConfig => Ok(Some(handle_get_config(id, ctx))),
        ClientMessage::InitUpload(payload) => Ok(Some(handle_init_upload(id, payload, ctx)?)),
        ClientMessage::UploadChunk(payload) => handle_upload_chunk_text(id, payload, ctx),
        ClientMessage::CompleteUpload(payload) => Ok(Some(handle_complete_upload(id, payload, ctx)?)),
        ClientMessage::CancelUpload(payload) => {
            ctx.uploads.cancel(&payload.upload_id)?;
            Ok(Some(Envelope::response(id, "operation_result", serde_json::json!({"success": true}))))
        }
        ClientMessage::GetSteamUsers => Ok(Some(handle_get_steam_users(id))),
        ClientMessage::ListShortcuts => Ok(Some(handle_list_shortcuts(id, ctx))),
        ClientMessage::DeleteGame(payload) => Ok(Some(handle_delete_game(id, payload, ctx).await?)),
        ClientMessage::RestartSteam => Ok(Some(handle_restart_steam(id).await)),
        ClientMessage::Unknown(kind) => {
            tracing::debug!(kind, "unknown message type, ignoring");
            Ok(None)
        }
    }
}

fn handle_hub_connected(id: String, payload: HubConnectedPayload, state: &mut ConnectionState, ctx: &ConnCtx) -> Envelope {
    let Some(hub_id) = payload.hub_id else {
        return AgentError::HubIdRequired.to_wire(id);
    };
    let hub_name = payload.name.clone().unwrap_or_else(|| hub_id.clone());

    if let Some(token) = payload.token.as_deref() {
        if ctx.shared.pairing.validate_token(&hub_id, token) {
            *state = ConnectionState::Authorized { hub_id: hub_id.clone() };
            set_connected_hub(&ctx.shared, &hub_id, &hub_name, payload.version.as_deref().unwrap_or(""));
            let _ = ctx.shared.events.publish("hub_connected", serde_json::json!({"hubId": hub_id, "name": hub_name}));
            return Envelope::response(id, "agent_status", agent_status_payload(ctx));
        }
    }

    let code = ctx.shared.pairing.generate_code(&hub_id, &hub_name);
    let _ = ctx.shared.events.publish("pairing_code", serde_json::json!({"code": code}));
    *state = ConnectionState::AwaitingPair { hub_id, hub_name };
    Envelope::response(id, "pairing_required", serde_json::json!({"code": code, "expiresIn": 60}))
}

fn handle_pair_confirm(id: String, payload: PairConfirmPayload, state: &mut ConnectionState, ctx: &ConnCtx) -> Result<Envelope, AgentError> {
    let (hub_id, hub_name) = match state {
        ConnectionState::AwaitingPair { hub_id, hub_name } => (hub_id.clone(), hub_name.clone()),
        _ => return Ok(Envelope::response(id, "pair_failed", serde_json::json!({"reason": "Invalid code"}))),
    };

    match ctx.shared.pairing.validate_code(&hub_id, &payload.code)? {
        Some(token) => {
            *state = ConnectionState::Authorized { hub_id: hub_id.clone() };
            set_connected_hub(&ctx.shared, &hub_id, &hub_name, "");
            let _ = ctx.shared.events.publish("pairing_success", serde_json::json!({"hubId": hub_id}));
            Ok(Envelope::response(id, "pair_success", serde_json::json!({"token": token})))
        }
        None => Ok(Envelope::response(id, "pair_failed", serde_json::json!({"reason": "Invalid code"}))),
    }
}

fn set_connected_hub(shared: &Arc<AgentShared>, hub_id: &str, name: &str, version: &str) {
    #[expect(clippy::unwrap_used, reason = "poisoned only if a prior handler panicked while holding the lock")]
    let mut connected = shared.connected_hub.lock().unwrap();
    *connected = Some(ConnectedHubInfo { hub_id: hub_id.to_string(), name: name.to_string(), version: version.to_string() });
}

fn clear_connected_hub(shared: &Arc<AgentShared>, hub_id: &str) {
    #[expect(clippy::unwrap_used, reason = "poisoned only if a prior handler panicked while holding the lock")]
    let mut connected = shared.connected_hub.lock().unwrap();
    if connected.as_ref().is_some_and(|hub| hub.hub_id == hub_id) {
        *connected = None;
    }
}

fn agent_status_payload(ctx: &ConnCtx) -> serde_json::Value {
    serde_json::json!({
        "name": ctx.shared.identity.agent_name,
        "version": ctx.shared.identity.version,
        "platform": ctx.shared.identity.platform,
        "acceptConnections": ctx.shared.settings.get_bool("accept_connections", true),
    })
}

fn handle_get_info(id: String, ctx: &ConnCtx) -> Envelope {
    Envelope::response(
        id,
        "info_response",
        serde_json::json!({
            "agentId": ctx.shared.identity.agent_id,
            "agentName": ctx.shared.identity.agent_name,
            "platform": ctx.shared.identity.platform,
            "version": ctx.shared.identity.version,
            "capabilities": CAPABILITIES,
        }),
    )
}

fn handle_get_config(id: String, ctx: &ConnCtx) -> Envelope {
    let install_path = ctx.shared.settings.get_string("install_path", "");
    Envelope::response(id, "config_response", serde_json::json!({"installPath": install_path}))
}

fn handle_init_upload(id: String, payload: capydeploy_protocol::InitUploadPayload, ctx: &ConnCtx) -> Result<Envelope, AgentError> {
    let files = payload
        .files
        .into_iter()
        .map(|file| UploadFileEntry { path: file.path, size: file.size, mode: file.mode })
        .collect();
    let opened = ctx.uploads.open(&payload.config.game_name, payload.total_size, files)?;
    let _ = ctx.shared.events.publish("operation_event", serde_json::json!({"type": "install", "status": "start", "progress": 0}));
    Ok(Envelope::response(
        id,
        "upload_init_response",
        serde_json::json!({"uploadId": opened.upload_id, "chunkSize": opened.chunk_size}),
    ))
}

fn handle_upload_chunk_text(
    id: String,
    payload: capydeploy_protocol::UploadChunkPayload,
    ctx: &ConnCtx,
) -> Result<Option<Envelope>, AgentError> {
    let bytes = match base64::engine::general_purpose::STANDARD.decode(payload.data.as_bytes()) {
        Ok(bytes) => bytes,
        Err(error) => {
            tracing::warn!(%error, "invalid base64 in upload_chunk payload, not reported back");
            return Ok(None);
        }
    };
    let written = ctx.uploads.write_chunk(&payload.upload_id, &payload.file_path, payload.offset, &bytes)?;
    let _ = ctx.shared.events.publish(
        "upload_progress",
        serde_json::json!({"uploadId": payload.upload_id, "totalWritten": written.total_written}),
    );
    Ok(Some(Envelope::response(
        id,
        "upload_chunk_response",
        serde_json::json!({"bytesWritten": written.bytes_written, "totalWritten": written.total_written}),
    )))
}

fn handle_complete_upload(id: String, payload: capydeploy_protocol::CompleteUploadPayload, ctx: &ConnCtx) -> Result<Envelope, AgentError> {
    let completed = ctx.uploads.complete(&payload.upload_id)?;

    if payload.create_shortcut {
        if let Some(shortcut) = payload.shortcut.as_ref().filter(|s| s.exe.is_some()) {
            #[expect(clippy::unwrap_used, reason = "filtered to Some(exe) above")]
            let exe = shortcut.exe.clone().unwrap();
            let exe_file_name = Path::new(&exe).file_name().map(|n| n.to_os_string()).unwrap_or_default();
            let exe_path = completed.path.join(exe_file_name);
            set_executable(&exe_path);

            let _ = ctx.shared.events.publish(
                "create_shortcut",
                serde_json::json!({
                    "name": shortcut.name,
                    "exe": exe_path.to_string_lossy(),
                    "startDir": format!("\"{}\"", completed.path.display()),
                    "artwork": shortcut.artwork,
                }),
            );

            let tracked = TrackedShortcut {
                name: shortcut.name.clone().unwrap_or_default(),
                exe: exe_path.to_string_lossy().into_owned(),
                start_dir: completed.path.to_string_lossy().into_owned(),
                app_id: 0,
                game_name: completed.game_name.clone(),
                installed_at: now_secs(),
            };
            let _ = shortcuts::append(&ctx.shared.settings, tracked);
        }
    }

    let _ = ctx.shared.events.publish("operation_event", serde_json::json!({"status": "complete", "progress": 100}));
    Ok(Envelope::response(
        id,
        "operation_result",
        serde_json::json!({"success": true, "path": completed.path.to_string_lossy()}),
    ))
}

fn set_executable(path: &std::path::Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mut perms = metadata.permissions();
            perms.set_mode(0o755);
            let _ = std::fs::set_permissions(path, perms);
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn handle_get_steam_users(id: String) -> Envelope {
    let home = platform::resolve_user_home(std::path::Path::new("/"));
    let users = platform::resolve_steam_dir(&home)
        .map(|dir| platform::list_steam_users(&dir))
        .unwrap_or_default();
    Envelope::response(id, "steam_users_response", serde_json::json!({"users": users}))
}

fn handle_list_shortcuts(id: String, ctx: &ConnCtx) -> Envelope {
    let tracked = shortcuts::load(&ctx.shared.settings);
    Envelope::response(id, "shortcuts_response", serde_json::json!({"shortcuts": tracked}))
}

async fn handle_delete_game(id: String, payload: capydeploy_protocol::DeleteGamePayload, ctx: &ConnCtx) -> Result<Envelope, AgentError> {
    let removed = shortcuts::remove_by_app_id(&ctx.shared.settings, payload.app_id)?;
    let Some(record) = removed else {
        return Ok(Envelope::response(id, "operation_result", serde_json::json!({"success": false})));
    };

    let removal_ok = std::fs::remove_dir_all(&record.start_dir).is_ok();
    let _ = ctx.shared.events.publish("remove_shortcut", serde_json::json!({"appId": payload.app_id}));

    let restarted = restart_steam().await.is_ok();
    let _ = ctx.shared.events.publish("operation_event", serde_json::json!({"status": "complete", "success": removal_ok}));

    Ok(Envelope::response(
        id,
        "operation_result",
        serde_json::json!({"success": removal_ok, "steamRestarted": restarted}),
    ))
}

async fn handle_restart_steam(id: String) -> Envelope {
    match restart_steam().await {
        Ok(()) => Envelope::response(id, "operation_result", serde_json::json!({"status": "restarting"})),
        Err(error) => Envelope::response(id, "operation_result", serde_json::json!({"status": error})),
    }
}

async fn restart_steam() -> Result<(), String> {
    tokio::process::Command::new("systemctl")
        .args(["restart", "steam"])
        .output()
        .await
        .map(|_| ())
        .map_err(|error| error.to_string())
}

fn now_secs() -> u64 {
    #[expect(clippy::unwrap_used, reason = "system clock is never before the unix epoch")]
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs()
}
