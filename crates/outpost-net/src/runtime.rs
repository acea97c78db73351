//! Networked implementation of [`WorldRuntimeClient`].
//!
//! A background task owns the TCP connection. Outbound messages go through an
//! unbounded channel that exists only while connected; anything other than
//! join/input submitted without a connection is dropped. Every new
//! connection first receives the session replay, then live traffic. Inbound
//! envelopes are decoded and published through the hub, which enforces
//! snapshot ordering.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use outpost_config::{Config, RuntimeMode};
use outpost_protocol::{
    BlockActionRequest, ClientMessage, CombatActionRequest, ContainerActionRequest, CraftRequest,
    DirectiveState, FrameError, FrameLimits, HotbarSelectPayload, InputPayload, InputState,
    InteractRequest, JoinRequest, LeavePayload, PlayerAction, ServerMessage, WorldFlagState,
    WorldSnapshot, read_envelope, write_frame,
};
use outpost_runtime::{SubscriberHub, WorldRuntimeClient};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};

use crate::connection::{ConnectionState, ConnectionStateWatch};
use crate::reconnect::{DEFAULT_RECONNECT_DELAY, FixedDelay};
use crate::session::SessionReplay;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct NetSettings {
    /// `host:port` of the world peer.
    pub endpoint: String,
    /// Seed of the fallback snapshot published before the peer speaks.
    pub world_seed: String,
    pub reconnect_delay: Duration,
    pub limits: FrameLimits,
}

impl NetSettings {
    pub fn new(endpoint: impl Into<String>, world_seed: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            world_seed: world_seed.into(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            limits: FrameLimits::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            endpoint: config.network.endpoint(),
            world_seed: config.runtime.world_seed.clone(),
            reconnect_delay: Duration::from_millis(config.network.reconnect_delay_ms),
            limits: FrameLimits::new(config.network.max_frame_bytes),
        }
    }
}

struct Outbound {
    session: SessionReplay,
    link: Option<mpsc::UnboundedSender<String>>,
}

struct Inner {
    settings: NetSettings,
    hub: SubscriberHub,
    outbound: Mutex<Outbound>,
    state: ConnectionStateWatch,
    disposed: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Outbound> {
        self.outbound.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Install the outbound link for a new connection with the session
    /// replay already queued ahead of any live message. Returns the number
    /// of replayed messages.
    fn attach(&self, link: mpsc::UnboundedSender<String>) -> usize {
        let mut outbound = self.lock();
        let replay = outbound.session.replay();
        for message in &replay {
            match message.encode() {
                Ok(text) => {
                    let _ = link.send(text);
                }
                Err(err) => tracing::warn!(kind = message.kind(), %err, "failed to encode replay"),
            }
        }
        outbound.link = Some(link);
        replay.len()
    }

    fn detach(&self) {
        self.lock().link = None;
    }

    /// Update session state and forward `message` if connected.
    fn send(&self, message: ClientMessage) {
        if self.is_disposed() {
            return;
        }
        let text = match message.encode() {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(kind = message.kind(), %err, "failed to encode message");
                return;
            }
        };
        let mut outbound = self.lock();
        match &message {
            ClientMessage::Join(request) => outbound.session.record_join(request.clone()),
            ClientMessage::Leave(payload) => outbound.session.record_leave(&payload.player_id),
            ClientMessage::Input(payload) => {
                outbound.session.record_input(&payload.player_id, payload.input)
            }
            _ => {}
        }
        match &outbound.link {
            Some(link) => {
                if link.send(text).is_err() {
                    tracing::trace!(kind = message.kind(), "link closed before send");
                }
            }
            None => tracing::debug!(kind = message.kind(), "not connected, message dropped"),
        }
    }

    fn receive(&self, text: &str) {
        match ServerMessage::decode(text) {
            Ok(message) => {
                if !self.hub.publish(&message) {
                    tracing::trace!("out-of-order snapshot dropped");
                }
            }
            Err(err) => tracing::debug!(%err, "dropping undecodable frame"),
        }
    }
}

/// Client contract backed by a remote world peer.
pub struct NetworkedRuntime {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
}

impl NetworkedRuntime {
    /// Start the connection task on the current tokio runtime. Returns
    /// immediately; the first attempt happens in the background.
    pub fn connect(settings: NetSettings) -> Self {
        let hub = SubscriberHub::new();
        hub.retain(&ServerMessage::Snapshot(WorldSnapshot::empty(settings.world_seed.clone())));
        hub.retain(&ServerMessage::WorldFlagState(WorldFlagState::default()));
        hub.retain(&ServerMessage::WorldDirectiveState(DirectiveState::default()));

        let inner = Arc::new(Inner {
            settings,
            hub,
            outbound: Mutex::new(Outbound {
                session: SessionReplay::new(),
                link: None,
            }),
            state: ConnectionStateWatch::new(),
            disposed: AtomicBool::new(false),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(supervise(Arc::clone(&inner), shutdown_rx));
        Self { inner, shutdown_tx }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.settings.endpoint
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state.current()
    }

    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn is_joined(&self, player_id: &str) -> bool {
        self.inner.lock().session.is_joined(player_id)
    }
}

impl WorldRuntimeClient for NetworkedRuntime {
    fn mode(&self) -> RuntimeMode {
        RuntimeMode::Networked
    }

    fn hub(&self) -> &SubscriberHub {
        &self.inner.hub
    }

    fn join(&self, request: JoinRequest) {
        self.inner.send(ClientMessage::Join(request));
    }

    fn leave(&self, player_id: &str) {
        self.inner.hub.forget_player(player_id);
        self.inner.send(ClientMessage::Leave(LeavePayload {
            player_id: player_id.to_string(),
        }));
    }

    fn set_input(&self, player_id: &str, input: InputState) {
        self.inner.send(ClientMessage::Input(InputPayload {
            player_id: player_id.to_string(),
            input: input.sanitized(),
        }));
    }

    fn submit_block_action(&self, player_id: &str, request: BlockActionRequest) {
        self.inner
            .send(ClientMessage::BlockAction(PlayerAction::new(player_id, request)));
    }

    fn select_hotbar_slot(&self, player_id: &str, slot_index: i64) {
        self.inner.send(ClientMessage::HotbarSelect(HotbarSelectPayload {
            player_id: player_id.to_string(),
            slot_index,
        }));
    }

    fn submit_craft_request(&self, player_id: &str, request: CraftRequest) {
        self.inner
            .send(ClientMessage::CraftRequest(PlayerAction::new(player_id, request)));
    }

    fn submit_container_action(&self, player_id: &str, request: ContainerActionRequest) {
        self.inner
            .send(ClientMessage::ContainerAction(PlayerAction::new(player_id, request)));
    }

    fn submit_combat_action(&self, player_id: &str, request: CombatActionRequest) {
        self.inner
            .send(ClientMessage::CombatAction(PlayerAction::new(player_id, request)));
    }

    fn submit_interact_action(&self, player_id: &str, request: InteractRequest) {
        self.inner
            .send(ClientMessage::InteractAction(PlayerAction::new(player_id, request)));
    }

    fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown_tx.send(true);
        self.inner.detach();
        self.inner.hub.clear();
        tracing::info!(endpoint = %self.inner.settings.endpoint, "networked runtime disposed");
    }
}

impl Drop for NetworkedRuntime {
    fn drop(&mut self) {
        self.dispose();
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Connect, serve, and reconnect after a fixed delay until disposed.
async fn supervise(inner: Arc<Inner>, mut shutdown_rx: watch::Receiver<bool>) {
    let endpoint = inner.settings.endpoint.clone();
    let mut schedule = FixedDelay::new(inner.settings.reconnect_delay);

    while !inner.is_disposed() {
        inner.state.set(ConnectionState::Connecting);
        let attempt = tokio::select! {
            result = TcpStream::connect(endpoint.as_str()) => result,
            _ = shutdown_rx.changed() => break,
        };
        match attempt {
            Ok(stream) => {
                schedule.reset();
                serve(&inner, stream, &mut shutdown_rx).await;
                inner.detach();
            }
            Err(err) => {
                tracing::warn!(%endpoint, attempt = schedule.attempts() + 1, %err, "connect failed");
            }
        }
        inner.state.set(ConnectionState::Disconnected);
        if inner.is_disposed() {
            break;
        }

        let delay = schedule.next_delay();
        tracing::info!(%endpoint, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => break,
        }
    }
    inner.state.set(ConnectionState::Disconnected);
    tracing::debug!(%endpoint, "connection task stopped");
}

/// Pump one connection until it fails or shutdown is signalled.
async fn serve(inner: &Inner, stream: TcpStream, shutdown_rx: &mut watch::Receiver<bool>) {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!(%err, "failed to set TCP_NODELAY");
    }
    let (mut reader, mut writer) = stream.into_split();
    let (link, mut queue) = mpsc::unbounded_channel();
    let replayed = inner.attach(link);
    inner.state.set(ConnectionState::Connected);
    tracing::info!(endpoint = %inner.settings.endpoint, replayed, "connected");

    let limits = inner.settings.limits;
    tokio::select! {
        err = write_loop(&mut writer, &mut queue, &limits) => {
            tracing::warn!(%err, "connection write failed");
        }
        err = read_loop(inner, &mut reader, &limits) => match err {
            FrameError::ConnectionClosed => tracing::info!("peer closed connection"),
            err => tracing::warn!(%err, "connection read failed"),
        },
        _ = shutdown_rx.changed() => {}
    }
}

async fn write_loop(
    writer: &mut OwnedWriteHalf,
    queue: &mut mpsc::UnboundedReceiver<String>,
    limits: &FrameLimits,
) -> FrameError {
    while let Some(text) = queue.recv().await {
        match write_frame(writer, text.as_bytes(), limits).await {
            Ok(()) => {}
            Err(FrameError::PayloadTooLarge { size, max }) => {
                tracing::warn!(size, max, "outbound message exceeds frame limit, dropped");
            }
            Err(err) => return err,
        }
    }
    FrameError::ConnectionClosed
}

async fn read_loop(inner: &Inner, reader: &mut OwnedReadHalf, limits: &FrameLimits) -> FrameError {
    loop {
        match read_envelope(reader, limits).await {
            Ok(text) => inner.receive(&text),
            Err(FrameError::NotUtf8(_)) => tracing::debug!("dropping non-UTF-8 frame"),
            Err(err) => return err,
        }
    }
}
