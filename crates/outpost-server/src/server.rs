//! TCP world server.
//!
//! Every connection shares one [`LocalRuntime`]. Inbound envelopes are applied
//! to the runtime, and everything the runtime publishes is fanned out to all
//! connected peers.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;

use outpost_config::Config;
use outpost_protocol::{
    ClientMessage, FrameError, FrameLimits, InputState, ServerMessage, read_envelope, write_frame,
};
use outpost_runtime::{LocalRuntime, WorldRuntimeClient, listener};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

use crate::connections::{ConnectionId, ConnectionMap, IdGenerator};

/// Default cap on simultaneous connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(std::io::Error),
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub bind_addr: String,
    pub max_connections: usize,
    pub limits: FrameLimits,
}

impl ServerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_addr: config.network.endpoint(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            limits: FrameLimits::new(config.network.max_frame_bytes),
        }
    }
}

pub struct WorldServer {
    settings: ServerSettings,
    runtime: Arc<LocalRuntime>,
    connections: Arc<ConnectionMap>,
    ids: IdGenerator,
    shutdown_tx: watch::Sender<bool>,
}

impl WorldServer {
    pub fn new(settings: ServerSettings, runtime: Arc<LocalRuntime>) -> Self {
        let connections = Arc::new(ConnectionMap::new(settings.max_connections));
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            settings,
            runtime,
            connections,
            ids: IdGenerator::new(),
            shutdown_tx,
        }
    }

    pub fn runtime(&self) -> &Arc<LocalRuntime> {
        &self.runtime
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Bind the configured address and serve until [`shutdown`](Self::shutdown).
    pub async fn run(&self) -> Result<(), ServerError> {
        let addr = self.settings.bind_addr.clone();
        let socket = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.run_with_listener(socket).await
    }

    /// Serve on an already-bound listener.
    pub async fn run_with_listener(&self, socket: TcpListener) -> Result<(), ServerError> {
        if let Ok(addr) = socket.local_addr() {
            tracing::info!(%addr, "world server listening");
        }

        let fanout = Arc::clone(&self.connections);
        let _broadcast = self
            .runtime
            .hub()
            .subscribe_all(listener(move |message: &ServerMessage| fanout.broadcast(message)));
        let tick_driver = self.runtime.start_tick_driver();

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let result = loop {
            tokio::select! {
                accepted = socket.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(err) => break Err(ServerError::Accept(err)),
                },
                _ = shutdown_rx.changed() => break Ok(()),
            }
        };

        self.runtime.dispose();
        tick_driver.abort();
        tracing::info!("world server stopped");
        result
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let id = self.ids.next_id();
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();

        // Queue the baseline and register under the resolver lock so no
        // message produced afterwards can reach this peer ahead of it.
        let admitted = self.runtime.with_resolver(|resolver| {
            for message in resolver.baseline() {
                match message.encode() {
                    Ok(text) => {
                        let _ = queue_tx.send(text);
                    }
                    Err(err) => tracing::warn!(%err, "failed to encode baseline"),
                }
            }
            self.connections.insert(id, queue_tx).is_ok()
        });
        if !admitted {
            tracing::warn!(%peer, "connection limit reached, rejecting");
            return;
        }
        tracing::info!(%peer, connection = id.0, "client connected");

        let peer_task = Peer {
            id,
            runtime: Arc::clone(&self.runtime),
            connections: Arc::clone(&self.connections),
            limits: self.settings.limits,
            joined: BTreeSet::new(),
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        tokio::spawn(peer_task.serve(stream, queue_rx, shutdown_rx));
    }
}

/// Per-connection state.
struct Peer {
    id: ConnectionId,
    runtime: Arc<LocalRuntime>,
    connections: Arc<ConnectionMap>,
    limits: FrameLimits,
    joined: BTreeSet<String>,
}

impl Peer {
    async fn serve(
        mut self,
        stream: TcpStream,
        mut queue: mpsc::UnboundedReceiver<String>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        if let Err(err) = stream.set_nodelay(true) {
            tracing::debug!(%err, "failed to set TCP_NODELAY");
        }
        let (mut reader, mut writer) = stream.into_split();
        let limits = self.limits;
        let connection = self.id.0;

        tokio::select! {
            err = write_loop(&mut writer, &mut queue, &limits) => {
                tracing::debug!(connection, %err, "write side closed");
            }
            err = self.read_loop(&mut reader) => match err {
                FrameError::ConnectionClosed => tracing::info!(connection, "client disconnected"),
                err => tracing::warn!(connection, %err, "client read failed"),
            },
            _ = shutdown_rx.changed() => {}
        }

        self.connections.remove(self.id);
        // Players stop moving once their connection is gone.
        for player_id in &self.joined {
            self.runtime.set_input(player_id, InputState::default());
        }
    }

    async fn read_loop(&mut self, reader: &mut OwnedReadHalf) -> FrameError {
        loop {
            match read_envelope(reader, &self.limits).await {
                Ok(text) => match ClientMessage::decode(&text) {
                    Ok(message) => self.apply(message),
                    Err(err) => {
                        tracing::debug!(connection = self.id.0, %err, "dropping invalid envelope");
                    }
                },
                Err(FrameError::NotUtf8(_)) => {
                    tracing::debug!(connection = self.id.0, "dropping non-UTF-8 frame");
                }
                Err(err) => return err,
            }
        }
    }

    fn apply(&mut self, message: ClientMessage) {
        let runtime = &self.runtime;
        match message {
            ClientMessage::Join(request) => {
                self.joined.insert(request.player_id.clone());
                runtime.join(request);
            }
            ClientMessage::Leave(payload) => {
                self.joined.remove(&payload.player_id);
                runtime.leave(&payload.player_id);
            }
            ClientMessage::Input(payload) => runtime.set_input(&payload.player_id, payload.input),
            ClientMessage::BlockAction(action) => {
                runtime.submit_block_action(&action.player_id, action.action);
            }
            ClientMessage::HotbarSelect(payload) => {
                runtime.select_hotbar_slot(&payload.player_id, payload.slot_index);
            }
            ClientMessage::CraftRequest(action) => {
                runtime.submit_craft_request(&action.player_id, action.action);
            }
            ClientMessage::ContainerAction(action) => {
                runtime.submit_container_action(&action.player_id, action.action);
            }
            ClientMessage::CombatAction(action) => {
                runtime.submit_combat_action(&action.player_id, action.action);
            }
            ClientMessage::InteractAction(action) => {
                runtime.submit_interact_action(&action.player_id, action.action);
            }
        }
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

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
