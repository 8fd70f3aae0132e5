//! WebTransport server: accepts connections and routes client messages
//! into the shared game session.

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wtransport::endpoint::IncomingSession;
use wtransport::{Endpoint, RecvStream, SendStream};

use crate::config::ServerConfig;
use crate::game::entities::PlayerId;
use crate::game::input_queue::{InputQueueError, InputSender};
use crate::metrics::Metrics;
use crate::net::framing::{read_message, FramingError};
use crate::net::protocol::{decode, ClientMessage, PlayerSnapshot, ServerMessage, WorldInit};
use crate::net::session::{send_to_player, start_game_loop, GameSession};
use crate::net::tls::TlsConfig;

type SharedWriter = Arc<RwLock<Option<SendStream>>>;

/// WebTransport server
pub struct WebTransportServer {
    config: ServerConfig,
    tls_config: TlsConfig,
    session: Arc<RwLock<GameSession>>,
    metrics: Arc<Metrics>,
}

impl WebTransportServer {
    /// Create a new WebTransport server
    pub async fn new(config: ServerConfig, metrics: Arc<Metrics>) -> anyhow::Result<Self> {
        let tls_config = TlsConfig::load().await?;
        let session = Arc::new(RwLock::new(GameSession::new(&config, metrics.clone())));

        Ok(Self {
            config,
            tls_config,
            session,
            metrics,
        })
    }

    /// Get the certificate hash for client configuration
    pub fn cert_hash(&self) -> &str {
        self.tls_config.get_cert_hash()
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.config.bind_address, self.config.port)
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        // Dual-stack bind so both localhost and LAN clients can connect.
        let server_config = wtransport::ServerConfig::builder()
            .with_bind_default(self.config.port)
            .with_identity(self.tls_config.identity)
            .build();

        let server = Endpoint::server(server_config)?;

        info!("WebTransport server listening on port {}", self.config.port);
        info!("Certificate hash: {}", self.tls_config.cert_hash);

        start_game_loop(self.session.clone());

        loop {
            let incoming = server.accept().await;

            let session = self.session.clone();
            let metrics = self.metrics.clone();

            tokio::spawn(async move {
                metrics
                    .connections_active
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                if let Err(e) = handle_connection(incoming, session).await {
                    warn!("Connection error: {}", e);
                }
                metrics
                    .connections_active
                    .fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
            });
        }
    }
}

/// Handle a single WebTransport connection
async fn handle_connection(
    incoming: IncomingSession,
    session: Arc<RwLock<GameSession>>,
) -> anyhow::Result<()> {
    let session_request = incoming.await?;

    debug!(
        "New connection from {:?}, path {}",
        session_request.authority(),
        session_request.path()
    );

    let connection = session_request.accept().await?;
    let (send, recv) = connection.accept_bi().await?;

    let writer: SharedWriter = Arc::new(RwLock::new(Some(send)));
    let input = session.read().await.input_sender();

    let mut player_id: Option<PlayerId> = None;
    let result = connection_loop(recv, &writer, &input, &session, &mut player_id).await;

    // Disconnect cleanup, whether the stream closed or errored.
    if let Some(pid) = player_id {
        session.write().await.remove_player(pid);
        info!("Player {} disconnected", pid);
    }
    writer.write().await.take();

    result
}

async fn connection_loop(
    mut recv: RecvStream,
    writer: &SharedWriter,
    input: &InputSender,
    session: &Arc<RwLock<GameSession>>,
    player_id: &mut Option<PlayerId>,
) -> anyhow::Result<()> {
    loop {
        let payload = match read_message(&mut recv).await {
            Ok(payload) => payload,
            Err(FramingError::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let message = match decode(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Failed to decode client message: {}", e);
                continue;
            }
        };

        match message {
            ClientMessage::CreatePlayer { name } => {
                if player_id.is_some() {
                    warn!("Duplicate create player request, ignoring");
                    continue;
                }

                let pid = Uuid::new_v4();
                let (spawn, world) = {
                    let mut guard = session.write().await;
                    guard.add_player(pid, &name, writer.clone());
                    // add_player sanitized the name; snapshot the result.
                    let player = guard
                        .simulation
                        .player(pid)
                        .ok_or_else(|| anyhow::anyhow!("player vanished during join"))?;
                    (
                        PlayerSnapshot::from_player(player),
                        WorldInit::from_world(&guard.simulation.world),
                    )
                };
                *player_id = Some(pid);

                send_to_player(writer, &ServerMessage::SpawnPlayer(spawn))
                    .await
                    .map_err(|e| anyhow::anyhow!("spawn send failed: {e}"))?;
                send_to_player(writer, &ServerMessage::CreateWorld(world))
                    .await
                    .map_err(|e| anyhow::anyhow!("world send failed: {e}"))?;
            }

            ClientMessage::PlayerInput(action) => {
                let Some(pid) = *player_id else {
                    continue;
                };
                match input.try_send(pid, action) {
                    Ok(()) => {}
                    Err(InputQueueError::Full) => {
                        // Dropped sample; the next batch supersedes it.
                        debug!("Input buffer full, dropping sample from {}", pid);
                    }
                    Err(InputQueueError::Disconnected) => {
                        return Err(anyhow::anyhow!("tick loop stopped"));
                    }
                }
            }

            ClientMessage::Ping { ms } => {
                if let Some(pid) = *player_id {
                    session.write().await.simulation.touch_player(pid);
                }
                if let Err(e) = send_to_player(writer, &ServerMessage::Pong { ms }).await {
                    debug!("Pong send failed: {}", e);
                }
            }

            ClientMessage::GetData => {
                let users = session.read().await.metrics.users_average();
                if let Err(e) = send_to_player(writer, &ServerMessage::ServerData { users }).await {
                    debug!("Server data send failed: {}", e);
                }
            }
        }
    }
}
