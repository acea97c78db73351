use std::sync::Mutex;
use std::time::Duration;

use super::*;
use outpost_net::{ConnectionState, NetSettings, NetworkedRuntime};
use outpost_protocol::{
    CraftRequest, CraftResult, InputPayload, JoinRequest, RejectReason, WorldSnapshot,
};
use outpost_sim::SimConfig;
use tokio::task::JoinHandle;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);
const SEED: &str = "server-seed";

struct Running {
    server: Arc<WorldServer>,
    addr: String,
    task: JoinHandle<Result<(), ServerError>>,
}

async fn start(max_connections: usize) -> Running {
    let socket = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap().to_string();
    let settings = ServerSettings {
        bind_addr: addr.clone(),
        max_connections,
        limits: FrameLimits::default(),
    };
    let runtime = Arc::new(LocalRuntime::new(SEED, SimConfig::default()));
    let server = Arc::new(WorldServer::new(settings, runtime));
    let task = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.run_with_listener(socket).await }
    });
    Running { server, addr, task }
}

async fn send(stream: &mut TcpStream, message: &ClientMessage) {
    let text = message.encode().unwrap();
    write_frame(stream, text.as_bytes(), &FrameLimits::default())
        .await
        .unwrap();
}

async fn recv(stream: &mut TcpStream) -> ServerMessage {
    let text = timeout(WAIT, read_envelope(stream, &FrameLimits::default()))
        .await
        .expect("timed out waiting for a frame")
        .unwrap();
    ServerMessage::decode(&text).unwrap()
}

/// Read until a message satisfies `pick`, skipping everything else.
async fn recv_until<T>(
    stream: &mut TcpStream,
    mut pick: impl FnMut(ServerMessage) -> Option<T>,
) -> T {
    loop {
        if let Some(found) = pick(recv(stream).await) {
            return found;
        }
    }
}

fn join(player_id: &str) -> ClientMessage {
    ClientMessage::Join(JoinRequest {
        world_seed: SEED.to_string(),
        player_id: player_id.to_string(),
        start_x: 0.0,
        start_z: 0.0,
    })
}

async fn wait_for(mut check: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_new_connection_receives_baseline_first() {
    let running = start(8).await;
    let mut stream = TcpStream::connect(&running.addr).await.unwrap();

    let mut kinds = Vec::new();
    for _ in 0..4 {
        kinds.push(recv(&mut stream).await.kind());
    }
    assert_eq!(
        kinds,
        [
            "snapshot",
            "container_state",
            "world_flag_state",
            "world_directive_state"
        ]
    );
    running.server.shutdown();
}

#[tokio::test]
async fn test_join_is_broadcast_to_other_connections() {
    let running = start(8).await;
    let mut alice = TcpStream::connect(&running.addr).await.unwrap();
    let mut watcher = TcpStream::connect(&running.addr).await.unwrap();
    wait_for(|| running.server.connection_count() == 2).await;

    send(&mut alice, &join("p1")).await;
    let hotbar = recv_until(&mut watcher, |message| match message {
        ServerMessage::HotbarState(state) => Some(state),
        _ => None,
    })
    .await;
    assert_eq!(hotbar.player_id, "p1");
    running.server.shutdown();
}

#[tokio::test]
async fn test_snapshots_advance_while_serving() {
    let running = start(8).await;
    let mut stream = TcpStream::connect(&running.addr).await.unwrap();
    let tick = recv_until(&mut stream, |message| match message {
        ServerMessage::Snapshot(snapshot) if snapshot.tick > 0 => Some(snapshot.tick),
        _ => None,
    })
    .await;
    assert!(tick > 0);
    running.server.shutdown();
}

#[tokio::test]
async fn test_invalid_frames_keep_connection_open() {
    let running = start(8).await;
    let mut stream = TcpStream::connect(&running.addr).await.unwrap();
    let limits = FrameLimits::default();
    write_frame(&mut stream, b"{ not json", &limits).await.unwrap();
    write_frame(&mut stream, &[0xc3, 0x28], &limits).await.unwrap();
    write_frame(&mut stream, br#"{"type":"fly","payload":{}}"#, &limits)
        .await
        .unwrap();
    write_frame(&mut stream, b"", &limits).await.unwrap();

    send(&mut stream, &join("p1")).await;
    let hotbar = recv_until(&mut stream, |message| match message {
        ServerMessage::HotbarState(state) => Some(state),
        _ => None,
    })
    .await;
    assert_eq!(hotbar.player_id, "p1");
    running.server.shutdown();
}

#[tokio::test]
async fn test_disconnect_zeroes_input_of_joined_players() {
    let running = start(8).await;
    let mut stream = TcpStream::connect(&running.addr).await.unwrap();
    send(&mut stream, &join("p1")).await;
    send(
        &mut stream,
        &ClientMessage::Input(InputPayload {
            player_id: "p1".to_string(),
            input: InputState {
                move_x: 1.0,
                ..Default::default()
            },
        }),
    )
    .await;

    let runtime = Arc::clone(running.server.runtime());
    let input_of = move || {
        runtime.with_resolver(|resolver| resolver.sim().player("p1").map(|p| p.input.move_x))
    };
    wait_for(|| input_of() == Some(1.0)).await;

    drop(stream);
    wait_for(|| input_of() == Some(0.0)).await;
    assert_eq!(running.server.connection_count(), 0);
    running.server.shutdown();
}

#[tokio::test]
async fn test_connections_beyond_limit_are_closed() {
    let running = start(1).await;
    let _first = TcpStream::connect(&running.addr).await.unwrap();
    wait_for(|| running.server.connection_count() == 1).await;

    let mut second = TcpStream::connect(&running.addr).await.unwrap();
    let outcome = timeout(WAIT, read_envelope(&mut second, &FrameLimits::default()))
        .await
        .expect("rejected connection was not closed");
    assert!(matches!(outcome, Err(FrameError::ConnectionClosed | FrameError::Io(_))));
    running.server.shutdown();
}

#[tokio::test]
async fn test_shutdown_ends_run() {
    let running = start(8).await;
    running.server.shutdown();
    let result = timeout(WAIT, running.task).await.unwrap().unwrap();
    assert!(result.is_ok());
    assert!(running.server.runtime().is_disposed());
}

#[tokio::test]
async fn test_networked_runtime_round_trip() {
    let running = start(8).await;
    let client = NetworkedRuntime::connect(NetSettings::new(running.addr.clone(), SEED));

    let results: Arc<Mutex<Vec<CraftResult>>> = Arc::default();
    let sink = Arc::clone(&results);
    let _sub = client.subscribe_craft_results(listener(move |result: &CraftResult| {
        sink.lock().unwrap().push(result.clone());
    }));
    let snapshots: Arc<Mutex<Vec<WorldSnapshot>>> = Arc::default();
    let sink = Arc::clone(&snapshots);
    let _snaps = client.subscribe_snapshots(listener(move |snapshot: &WorldSnapshot| {
        sink.lock().unwrap().push(snapshot.clone());
    }));

    let mut state = client.watch_connection();
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();

    client.join(JoinRequest {
        world_seed: SEED.to_string(),
        player_id: "p1".to_string(),
        start_x: 0.0,
        start_z: 0.0,
    });
    client.submit_craft_request(
        "p1",
        CraftRequest {
            action_id: "c1".to_string(),
            recipe_id: "craft-bandage".to_string(),
            count: 1,
        },
    );

    wait_for(|| !results.lock().unwrap().is_empty()).await;
    let result = results.lock().unwrap()[0].clone();
    assert_eq!(result.action_id, "c1");
    assert_eq!(result.reason, Some(RejectReason::InsufficientResources));

    wait_for(|| {
        snapshots
            .lock()
            .unwrap()
            .iter()
            .any(|snapshot| snapshot.players.contains_key("p1"))
    })
    .await;

    client.dispose();
    running.server.shutdown();
}
