//! End-to-end scenarios driven over a real WebSocket loopback connection,
//! exercising [`capydeploy_core::handle_connection`] the way a Hub would.

use std::sync::Arc;
use std::sync::Mutex;

use base64::Engine;
use capydeploy_core::AgentIdentity;
use capydeploy_core::AgentShared;
use capydeploy_core::EventPublisher;
use capydeploy_core::PairingManager;
use capydeploy_core::SettingsStore;
use capydeploy_protocol::BinaryHeader;
use capydeploy_protocol::Envelope;
use capydeploy_protocol::encode_binary_frame;
use futures_util::SinkExt;
use futures_util::StreamExt;
use serde_json::Value;
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_agent() -> (u16, tempfile::TempDir, Arc<AgentShared>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let settings = Arc::new(SettingsStore::open(dir.path().join("settings.json")).expect("open settings"));
    let shared = Arc::new(AgentShared {
        identity: AgentIdentity {
            agent_id: "abcd1234".to_string(),
            agent_name: "Deck".to_string(),
            platform: "steamdeck".to_string(),
            version: "0.1.0".to_string(),
        },
        pairing: Arc::new(PairingManager::new(Arc::clone(&settings))),
        events: Arc::new(EventPublisher::new(Arc::clone(&settings))),
        settings,
        connected_hub: Mutex::new(None),
    });

    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind");
    let port = listener.local_addr().expect("local_addr").port();
    let install_root = dir.path().join("games");
    std::fs::create_dir_all(&install_root).expect("mkdir install_root");

    let task_shared = Arc::clone(&shared);
    tokio::spawn(async move {
        let (socket, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(socket).await.expect("accept_async");
        capydeploy_core::handle_connection(ws, task_shared, install_root).await;
    });

    (port, dir, shared)
}

async fn connect(port: u16) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://127.0.0.1:{port}"))
        .await
        .expect("connect_async");
    ws
}

async fn send(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    envelope: Value,
) {
    ws.send(Message::Text(envelope.to_string().into())).await.expect("send");
}

async fn recv_envelope(
    ws: &mut tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
) -> Envelope {
    let message = ws.next().await.expect("stream ended").expect("ws error");
    match message {
        Message::Text(text) => serde_json::from_str(&text).expect("envelope json"),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

#[tokio::test]
async fn fresh_pairing_and_single_file_upload() {
    let (port, dir, _shared) = spawn_agent().await;
    let mut ws = connect(port).await;

    send(&mut ws, json!({"id": "1", "type": "hub_connected", "payload": {"hubId": "H", "name": "Hub", "version": "0.1"}})).await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "pairing_required");
    let code = envelope.payload.unwrap()["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);

    send(&mut ws, json!({"id": "2", "type": "pair_confirm", "payload": {"code": code}})).await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "pair_success");
    let token = envelope.payload.unwrap()["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 32);

    send(
        &mut ws,
        json!({"id": "3", "type": "init_upload", "payload": {"config": {"gameName": "G"}, "totalSize": 5, "files": [{"path": "a.bin", "size": 5}]}}),
    )
    .await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "upload_init_response");
    let payload = envelope.payload.unwrap();
    let upload_id = payload["uploadId"].as_str().unwrap().to_string();
    assert_eq!(payload["chunkSize"], 1024 * 1024);

    let header = BinaryHeader {
        id: "4".to_string(),
        upload_id: upload_id.clone(),
        file_path: "a.bin".to_string(),
        offset: 0,
        checksum: None,
    };
    let frame = encode_binary_frame(&header, b"hello");
    ws.send(Message::Binary(frame.into())).await.expect("send binary");
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "upload_chunk_response");
    assert_eq!(envelope.payload.unwrap()["totalWritten"], 5);

    send(
        &mut ws,
        json!({"id": "5", "type": "complete_upload", "payload": {"uploadId": upload_id, "createShortcut": false}}),
    )
    .await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "operation_result");
    assert_eq!(envelope.payload.as_ref().unwrap()["success"], true);

    let installed_file = dir.path().join("games").join("G").join("a.bin");
    assert_eq!(std::fs::read_to_string(installed_file).expect("read installed file"), "hello");
}

#[tokio::test]
async fn reconnect_with_stored_token_skips_pairing() {
    let (port, _dir, shared) = spawn_agent().await;

    let code = shared.pairing.generate_code("H", "Hub");
    let token = shared.pairing.validate_code("H", &code).expect("validate").expect("token");

    let mut ws = connect(port).await;
    send(
        &mut ws,
        json!({"id": "1", "type": "hub_connected", "payload": {"hubId": "H", "name": "Hub", "version": "0.1", "token": token}}),
    )
    .await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "agent_status");
}

#[tokio::test]
async fn unauthorized_use_is_rejected_but_connection_survives() {
    let (port, _dir, _shared) = spawn_agent().await;
    let mut ws = connect(port).await;

    send(&mut ws, json!({"id": "1", "type": "ping", "payload": null})).await;
    let envelope = recv_envelope(&mut ws).await;
    let error = envelope.error.expect("error payload");
    assert_eq!(error.code, 401);
    assert_eq!(error.message, "Not authorized");

    // the connection is still alive: a handshake now succeeds.
    send(&mut ws, json!({"id": "2", "type": "hub_connected", "payload": {"hubId": "H", "name": "Hub", "version": "0.1"}})).await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.kind, "pairing_required");
}

#[tokio::test]
async fn cancel_mid_upload_removes_the_directory_and_later_chunks_404() {
    let (port, dir, shared) = spawn_agent().await;
    let code = shared.pairing.generate_code("H", "Hub");
    let token = shared.pairing.validate_code("H", &code).expect("validate").expect("token");

    let mut ws = connect(port).await;
    send(
        &mut ws,
        json!({"id": "1", "type": "hub_connected", "payload": {"hubId": "H", "name": "Hub", "version": "0.1", "token": token}}),
    )
    .await;
    let _ = recv_envelope(&mut ws).await;

    send(
        &mut ws,
        json!({"id": "2", "type": "init_upload", "payload": {"config": {"gameName": "G"}, "totalSize": 1048576, "files": [{"path": "a.bin", "size": 1048576}]}}),
    )
    .await;
    let envelope = recv_envelope(&mut ws).await;
    let upload_id = envelope.payload.unwrap()["uploadId"].as_str().unwrap().to_string();

    for i in 0..3u64 {
        let header = BinaryHeader {
            id: format!("chunk-{i}"),
            upload_id: upload_id.clone(),
            file_path: "a.bin".to_string(),
            offset: i * 10,
            checksum: None,
        };
        let frame = encode_binary_frame(&header, b"0123456789");
        ws.send(Message::Binary(frame.into())).await.expect("send binary");
        let _ = recv_envelope(&mut ws).await;
    }

    send(&mut ws, json!({"id": "3", "type": "cancel_upload", "payload": {"uploadId": upload_id}})).await;
    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.payload.unwrap()["success"], true);
    assert!(!dir.path().join("games").join("G").exists());

    let header = BinaryHeader {
        id: "4".to_string(),
        upload_id: upload_id.clone(),
        file_path: "a.bin".to_string(),
        offset: 0,
        checksum: None,
    };
    let frame = encode_binary_frame(&header, b"x");
    ws.send(Message::Binary(frame.into())).await.expect("send binary");
    let envelope = recv_envelope(&mut ws).await;
    let error = envelope.error.expect("error payload");
    assert_eq!(error.code, 404);
}

#[tokio::test]
async fn delete_game_by_app_id_removes_folder_and_tracked_shortcut() {
    let (port, dir, shared) = spawn_agent().await;
    let code = shared.pairing.generate_code("H", "Hub");
    let token = shared.pairing.validate_code("H", &code).expect("validate").expect("token");

    let game_dir = dir.path().join("games").join("G");
    std::fs::create_dir_all(&game_dir).expect("mkdir game dir");
    shared
        .settings
        .set(
            "tracked_shortcuts",
            json!([{
                "name": "G",
                "exe": game_dir.join("g.sh").to_string_lossy(),
                "startDir": game_dir.to_string_lossy(),
                "appId": 555,
                "gameName": "G",
                "installedAt": 0,
            }]),
        )
        .expect("seed tracked shortcut");

    let mut ws = connect(port).await;
    send(
        &mut ws,
        json!({"id": "1", "type": "hub_connected", "payload": {"hubId": "H", "name": "Hub", "version": "0.1", "token": token}}),
    )
    .await;
    let _ = recv_envelope(&mut ws).await;

    send(&mut ws, json!({"id": "2", "type": "delete_game", "payload": {"appId": 555}})).await;
    let envelope = recv_envelope(&mut ws).await;
    let payload = envelope.payload.unwrap();
    assert_eq!(payload["success"], true);
    assert!(payload.get("steamRestarted").is_some());
    assert!(!game_dir.exists());

    let remaining = shared.settings.get("tracked_shortcuts", json!([]));
    assert_eq!(remaining, json!([]));
}
