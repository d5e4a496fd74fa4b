//! The gateway session.
//!
//! One `Session` is one logical bot connection: it owns the gateway
//! WebSocket, the sequence counter, the handler registry, the state cache,
//! the rate limiter and REST client, and the per-guild voice connections.
//! There is exactly one live gateway socket at a time; `open` on an
//! already-open session fails.

use std::collections::HashMap;
use std::future::Future;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use flate2::read::ZlibDecoder;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use banter_model::{
    op, Activity, ActivityType, Connect, Disconnect, Event, GatewayPayload, Guild, Hello,
    Identify, IdentifyProperties, RequestGuildMembersData, Resume, Status, TypedEvent,
    UpdateStatusData, VoiceServerUpdate, VoiceState, VoiceStateUpdateData, API_VERSION,
};
use banter_ratelimit::RateLimiter;
use banter_rest::RestClient;
use banter_voice::{VoiceConnection, VoiceControl, VoiceError, VoiceResult};

use crate::handler::{HandlerRegistry, HandlerRemover};
use crate::state::State;
use crate::{Error, Result, SessionConfig};

/// Library version used in the identify properties.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Heartbeat intervals without an ack before the connection is declared
/// dead.
const FAILED_ACK_MULTIPLIER: u32 = 5;

/// Close code sent when the gateway asks us to reconnect.
const CLOSE_SERVICE_RESTART: u16 = 1012;

const RECONNECT_WAIT_CAP: Duration = Duration::from_secs(600);

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct SessionInner {
    config: SessionConfig,
    identify: RwLock<Identify>,
    limiter: Arc<RateLimiter>,
    rest: RestClient,
    state: State,
    handlers: HandlerRegistry,
    voice: RwLock<HashMap<String, Arc<VoiceConnection>>>,
    sequence: AtomicU64,
    session_id: RwLock<String>,
    gateway_url: RwLock<String>,
    ws: AsyncMutex<Option<WsSink>>,
    listening: SyncMutex<Option<broadcast::Sender<()>>>,
    /// Bumped on every close; stale tasks check it before reconnecting.
    generation: AtomicU64,
    data_ready: AtomicBool,
    last_heartbeat_ack: RwLock<Instant>,
    last_heartbeat_sent: RwLock<Instant>,
}

/// A Discord bot session. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session with stock defaults for a bot token.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client fails to build.
    pub fn new(token: &str) -> Result<Self> {
        Self::with_config(SessionConfig::new(token))
    }

    /// Create a session from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when the HTTP client fails to build.
    pub fn with_config(config: SessionConfig) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new());
        let rest = match &config.api_url {
            Some(base) => RestClient::with_base_url(&config.token, Arc::clone(&limiter), base),
            None => RestClient::new(&config.token, Arc::clone(&limiter)),
        }?
        .with_max_retries(config.max_rest_retries)
        .with_retry_on_rate_limit(config.retry_on_rate_limit);

        let identify = Identify {
            token: config.token.clone(),
            properties: IdentifyProperties {
                os: std::env::consts::OS.to_owned(),
                browser: format!("banter v{VERSION}"),
                device: String::new(),
            },
            compress: config.compress,
            large_threshold: config.large_threshold,
            shard: None,
            intents: config.intents,
        };

        let state = State::new(config.state.clone());

        let session = Self {
            inner: Arc::new(SessionInner {
                config,
                identify: RwLock::new(identify),
                limiter,
                rest,
                state,
                handlers: HandlerRegistry::new(),
                voice: RwLock::new(HashMap::new()),
                sequence: AtomicU64::new(0),
                session_id: RwLock::new(String::new()),
                gateway_url: RwLock::new(String::new()),
                ws: AsyncMutex::new(None),
                listening: SyncMutex::new(None),
                generation: AtomicU64::new(0),
                data_ready: AtomicBool::new(false),
                last_heartbeat_ack: RwLock::new(Instant::now()),
                last_heartbeat_sent: RwLock::new(Instant::now()),
            }),
        };

        // 429s anywhere in the REST client surface as __RATE_LIMIT__
        // events.
        let weak = Arc::downgrade(&session.inner);
        session
            .inner
            .rest
            .set_rate_limit_hook(Arc::new(move |event| {
                if let Some(inner) = weak.upgrade() {
                    let session = Session { inner };
                    tokio::spawn(async move {
                        session
                            .dispatch(Event::RateLimit(Box::new(event)))
                            .await;
                    });
                }
            }));

        Ok(session)
    }

    /// The REST client.
    #[must_use]
    pub fn rest(&self) -> &RestClient {
        &self.inner.rest
    }

    /// The state cache.
    #[must_use]
    pub fn state(&self) -> &State {
        &self.inner.state
    }

    /// The shared rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.inner.limiter
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Time between the last heartbeat sent and the last ack received.
    #[must_use]
    pub fn heartbeat_latency(&self) -> Duration {
        let sent = *self.inner.last_heartbeat_sent.read();
        self.inner
            .last_heartbeat_ack
            .read()
            .checked_duration_since(sent)
            .unwrap_or(Duration::ZERO)
    }

    /// The last sequence number seen on a dispatch.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.inner.sequence.load(Ordering::SeqCst)
    }

    /// The voice connection for a guild, if one exists.
    #[must_use]
    pub fn voice_connection(&self, guild_id: &str) -> Option<Arc<VoiceConnection>> {
        self.inner.voice.read().get(guild_id).cloned()
    }

    // ── Handlers ─────────────────────────────────────────────────────────

    /// Register a handler for the payload type chosen by the closure.
    ///
    /// A handler taking [`Event`] itself is a catch-all and sees every
    /// dispatch.
    pub fn add_handler<E, F, Fut>(&self, handler: F) -> HandlerRemover
    where
        E: TypedEvent,
        F: Fn(Session, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.add::<E, F, Fut>(handler)
    }

    /// Register a handler that unregisters after its first firing.
    pub fn add_handler_once<E, F, Fut>(&self, handler: F) -> HandlerRemover
    where
        E: TypedEvent,
        F: Fn(Session, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.add_once::<E, F, Fut>(handler)
    }

    // ── Gateway lifecycle ────────────────────────────────────────────────

    /// Open the gateway connection: dial, handshake, and start the
    /// heartbeat and reader tasks.
    ///
    /// Identifies when no prior session exists, resumes otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::WsAlreadyOpen`] when a socket is already live,
    /// [`Error::ExpectingHello`] on a malformed handshake, and transport
    /// errors from the dial.
    pub async fn open(&self) -> Result<()> {
        {
            let ws = self.inner.ws.lock().await;
            if ws.is_some() {
                return Err(Error::WsAlreadyOpen);
            }
        }

        let gateway_url = self.resolve_gateway_url().await?;
        info!(url = %gateway_url, "connecting to gateway");

        let mut request = gateway_url.clone().into_client_request()?;
        request
            .headers_mut()
            .insert("Accept-Encoding", HeaderValue::from_static("zlib"));

        let (stream, _) = match connect_async(request).await {
            Ok(ok) => ok,
            Err(e) => {
                // A stale cached URL may be the problem; refetch next time.
                self.inner.gateway_url.write().clear();
                return Err(e.into());
            }
        };
        let (sink, mut read) = stream.split();

        let hello_payload = read_payload(&mut read).await?;
        if hello_payload.op != op::HELLO {
            return Err(Error::ExpectingHello(hello_payload.op));
        }
        let hello: Hello = serde_json::from_value(hello_payload.d.unwrap_or_default())?;
        debug!(interval_ms = hello.heartbeat_interval, "received gateway hello");
        *self.inner.last_heartbeat_ack.write() = Instant::now();

        {
            let mut ws = self.inner.ws.lock().await;
            if ws.is_some() {
                return Err(Error::WsAlreadyOpen);
            }
            *ws = Some(sink);
        }

        if let Err(e) = self.finish_handshake(&mut read).await {
            self.inner.ws.lock().await.take();
            return Err(e);
        }

        self.dispatch(Event::Connect(Box::new(Connect))).await;

        let close_tx = broadcast::channel(1).0;
        *self.inner.listening.lock() = Some(close_tx.clone());
        let generation = self.inner.generation.load(Ordering::SeqCst);

        self.spawn_heartbeat(hello.heartbeat_interval, close_tx.subscribe(), generation);
        self.spawn_reader(read, close_tx.subscribe(), generation);

        Ok(())
    }

    async fn resolve_gateway_url(&self) -> Result<String> {
        {
            let cached = self.inner.gateway_url.read();
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let base = match &self.inner.config.gateway_url {
            Some(url) => url.clone(),
            None => self.inner.rest.gateway().await?,
        };
        let url = format!("{base}?v={API_VERSION}&encoding=json");
        *self.inner.gateway_url.write() = url.clone();
        Ok(url)
    }

    /// Identify or resume, then process the first dispatch (normally READY
    /// or RESUMED).
    async fn finish_handshake(&self, read: &mut WsStream) -> Result<()> {
        let sequence = self.inner.sequence.load(Ordering::SeqCst);
        let session_id = self.inner.session_id.read().clone();

        if session_id.is_empty() && sequence == 0 {
            self.identify().await?;
        } else {
            info!("sending resume packet to gateway");
            self.gateway_write(
                op::RESUME,
                &Resume {
                    token: self.inner.config.token.clone(),
                    session_id,
                    seq: sequence,
                },
            )
            .await?;
        }

        let first = read_payload(read).await?;
        match first.t.as_deref() {
            Some("READY" | "RESUMED") => {}
            other => warn!(event = ?other, "expected READY or RESUMED as first packet"),
        }
        self.on_payload(first).await;
        Ok(())
    }

    async fn identify(&self) -> Result<()> {
        let mut identify = self.inner.identify.read().clone();

        if !self.inner.config.compress {
            identify.compress = false;
        }
        if identify.token.is_empty() {
            identify.token = self.inner.config.token.clone();
        }

        let (shard_id, shard_count) = (self.inner.config.shard_id, self.inner.config.shard_count);
        if shard_count > 1 {
            if shard_id >= shard_count {
                return Err(Error::ShardOutOfRange {
                    shard_id,
                    shard_count,
                });
            }
            identify.shard = Some([shard_id, shard_count]);
        }

        debug!("sending identify packet");
        self.gateway_write(op::IDENTIFY, &identify).await
    }

    /// Close the gateway connection with a normal close code.
    pub async fn close(&self) {
        self.close_with_code(1000).await;
    }

    /// Close the gateway connection with a specific close code, stopping
    /// every task and emitting a disconnect event.
    pub async fn close_with_code(&self, code: u16) {
        self.inner.data_ready.store(false, Ordering::SeqCst);
        self.inner.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(listening) = self.inner.listening.lock().take() {
            debug!("closing listening channel");
            let _ = listening.send(());
        }

        {
            let mut ws = self.inner.ws.lock().await;
            if let Some(mut sink) = ws.take() {
                debug!(code, "sending gateway close frame");
                let frame = CloseFrame {
                    code: CloseCode::from(code),
                    reason: "".into(),
                };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "error sending close frame");
                }
            }
        }

        self.dispatch(Event::Disconnect(Box::new(Disconnect))).await;
    }

    /// Reconnect with exponential backoff, then kick every voice
    /// connection into its own reconnect.
    async fn reconnect(&self) {
        if !self.inner.config.reconnect_on_error {
            return;
        }

        let mut wait = Duration::from_secs(1);
        loop {
            info!("trying to reconnect to gateway");
            match self.open().await {
                Ok(()) => {
                    info!("successfully reconnected to gateway");
                    if self.inner.config.reconnect_voice {
                        let connections: Vec<_> =
                            self.inner.voice.read().values().cloned().collect();
                        for connection in connections {
                            info!(guild_id = %connection.guild_id(), "reconnecting voice connection");
                            let connection = Arc::clone(&connection);
                            tokio::spawn(async move { connection.reconnect().await });
                            sleep(Duration::from_secs(1)).await;
                        }
                    }
                    return;
                }
                Err(Error::WsAlreadyOpen) => {
                    info!("websocket already exists, no need to reconnect");
                    return;
                }
                Err(e) => {
                    error!(error = %e, "error reconnecting to gateway");
                }
            }

            sleep(wait).await;
            wait = (wait * 2).min(RECONNECT_WAIT_CAP);
        }
    }

    fn spawn_reconnect(&self) {
        let session = self.clone();
        tokio::spawn(async move { session.reconnect().await });
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    // ── Background tasks ─────────────────────────────────────────────────

    fn spawn_heartbeat(
        &self,
        interval_ms: u64,
        mut close_rx: broadcast::Receiver<()>,
        generation: u64,
    ) {
        let session = self.clone();
        tokio::spawn(async move {
            let period = Duration::from_millis(interval_ms.max(1));
            loop {
                let sequence = session.inner.sequence.load(Ordering::SeqCst);
                debug!(sequence, "sending gateway heartbeat");

                *session.inner.last_heartbeat_sent.write() = Instant::now();
                let written = session.gateway_write(op::HEARTBEAT, &sequence).await;

                let since_ack = session.inner.last_heartbeat_ack.read().elapsed();
                let stale = since_ack > period * FAILED_ACK_MULTIPLIER;

                if written.is_err() || stale {
                    if let Err(e) = written {
                        error!(error = %e, "error sending heartbeat");
                    } else {
                        error!(
                            since_ack_ms = since_ack.as_millis(),
                            "no heartbeat ack, triggering reconnect"
                        );
                    }
                    if session.is_current(generation) {
                        session.close().await;
                        session.spawn_reconnect();
                    }
                    return;
                }

                session.inner.data_ready.store(true, Ordering::SeqCst);

                tokio::select! {
                    _ = close_rx.recv() => return,
                    () = sleep(period) => {}
                }
            }
        });
    }

    fn spawn_reader(
        &self,
        mut read: WsStream,
        mut close_rx: broadcast::Receiver<()>,
        generation: u64,
    ) {
        let session = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = close_rx.recv() => return,

                    msg = read.next() => match msg {
                        Some(Ok(msg)) => match decode_frame(&msg) {
                            Ok(Some(payload)) => session.on_payload(payload).await,
                            Ok(None) => {}
                            Err(e) => error!(error = %e, "error decoding gateway frame"),
                        },
                        Some(Err(e)) => {
                            if session.is_current(generation) {
                                warn!(error = %e, "error reading from gateway");
                                session.close().await;
                                session.reconnect().await;
                            }
                            return;
                        }
                        None => {
                            if session.is_current(generation) {
                                warn!("gateway stream ended");
                                session.close().await;
                                session.reconnect().await;
                            }
                            return;
                        }
                    },
                }
            }
        });
    }

    // ── Inbound frames ───────────────────────────────────────────────────

    async fn on_payload(&self, payload: GatewayPayload) {
        if let Some(sequence) = payload.s {
            self.inner.sequence.store(sequence, Ordering::SeqCst);
        }

        match payload.op {
            op::DISPATCH => {
                let name = payload.t.unwrap_or_default();
                let data = payload.d.unwrap_or(Value::Null);
                match Event::decode(&name, data) {
                    Ok(event) => {
                        if matches!(event, Event::Unknown { .. }) {
                            warn!(event = %name, "unknown event type");
                        }
                        self.dispatch(event).await;
                    }
                    Err(e) => {
                        error!(event = %name, error = %e, "error decoding event");
                    }
                }
            }
            op::HEARTBEAT => {
                debug!("heartbeat requested by gateway");
                let sequence = self.inner.sequence.load(Ordering::SeqCst);
                if let Err(e) = self.gateway_write(op::HEARTBEAT, &sequence).await {
                    error!(error = %e, "error answering gateway heartbeat");
                }
            }
            op::RECONNECT => {
                info!("gateway requested reconnect");
                self.close_with_code(CLOSE_SERVICE_RESTART).await;
                self.spawn_reconnect();
            }
            op::INVALID_SESSION => {
                info!("session invalidated, sending identify");
                if let Err(e) = self.identify().await {
                    warn!(error = %e, "error re-identifying after invalid session");
                }
            }
            op::HELLO => {
                // Only expected during open.
            }
            op::HEARTBEAT_ACK => {
                *self.inner.last_heartbeat_ack.write() = Instant::now();
                debug!("got heartbeat ack");
            }
            other => {
                warn!(op = other, "unknown gateway opcode");
            }
        }
    }

    /// Run internal hooks, advance the state cache, then fan the event out
    /// to handlers. The cache is always updated before any handler runs.
    pub(crate) async fn dispatch(&self, mut event: Event) {
        match &mut event {
            Event::Ready(ready) => {
                for guild in &mut ready.guilds {
                    stamp_guild_ids(guild);
                }
                *self.inner.session_id.write() = ready.session_id.clone();
            }
            Event::GuildCreate(e) => stamp_guild_ids(&mut e.guild),
            Event::GuildUpdate(e) => stamp_guild_ids(&mut e.guild),
            Event::VoiceServerUpdate(e) => self.on_voice_server_update(e),
            Event::VoiceStateUpdate(e) => self.on_voice_state_update(&e.state),
            _ => {}
        }

        self.inner.state.apply(&mut event);

        self.inner
            .handlers
            .dispatch(self, Arc::new(event), self.inner.config.sync_events)
            .await;
    }

    // ── Gateway writes ───────────────────────────────────────────────────

    /// Serialize and write one payload; all writes share the socket mutex.
    async fn gateway_write<T: Serialize>(&self, opcode: u8, data: &T) -> Result<()> {
        let payload = GatewayPayload::new(opcode, data)?;
        let text = serde_json::to_string(&payload)?;

        let mut ws = self.inner.ws.lock().await;
        let sink = ws.as_mut().ok_or(Error::WsNotFound)?;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Update the bot's status with a playing activity.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn update_game_status(&self, idle_since: Option<u64>, name: &str) -> Result<()> {
        self.update_activity_status(idle_since, ActivityType::GAME, name, "")
            .await
    }

    /// Update the bot's status with a watching activity.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn update_watch_status(&self, idle_since: Option<u64>, name: &str) -> Result<()> {
        self.update_activity_status(idle_since, ActivityType::WATCHING, name, "")
            .await
    }

    /// Update the bot's status with a listening activity.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn update_listening_status(&self, name: &str) -> Result<()> {
        self.update_activity_status(None, ActivityType::LISTENING, name, "")
            .await
    }

    /// Update the bot's status with a streaming activity when a URL is
    /// given, a game otherwise.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn update_streaming_status(
        &self,
        idle_since: Option<u64>,
        name: &str,
        url: &str,
    ) -> Result<()> {
        let kind = if url.is_empty() {
            ActivityType::GAME
        } else {
            ActivityType::STREAMING
        };
        self.update_activity_status(idle_since, kind, name, url).await
    }

    /// Set a custom status string, or clear it when empty.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn update_custom_status(&self, state: &str) -> Result<()> {
        let mut data = UpdateStatusData {
            status: Status::Online,
            ..Default::default()
        };
        if !state.is_empty() {
            data.activities = vec![Activity {
                name: "Custom Status".to_owned(),
                kind: ActivityType::CUSTOM,
                state: Some(state.to_owned()),
                ..Default::default()
            }];
        }
        self.update_status(data).await
    }

    async fn update_activity_status(
        &self,
        idle_since: Option<u64>,
        kind: ActivityType,
        name: &str,
        url: &str,
    ) -> Result<()> {
        let mut data = UpdateStatusData {
            since: idle_since,
            status: Status::Online,
            ..Default::default()
        };
        if !name.is_empty() {
            data.activities = vec![Activity {
                name: name.to_owned(),
                kind,
                url: if url.is_empty() {
                    None
                } else {
                    Some(url.to_owned())
                },
                ..Default::default()
            }];
        }
        self.update_status(data).await
    }

    /// Send a raw op-3 status update.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn update_status(&self, data: UpdateStatusData) -> Result<()> {
        self.gateway_write(op::PRESENCE_UPDATE, &data).await
    }

    /// Request guild members matching a username prefix.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn request_guild_members(
        &self,
        guild_id: &str,
        query: &str,
        limit: u32,
        nonce: &str,
        presences: bool,
    ) -> Result<()> {
        self.request_guild_members_batch(&[guild_id], query, limit, nonce, presences)
            .await
    }

    /// Request specific guild members by user ID.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn request_guild_members_list(
        &self,
        guild_id: &str,
        user_ids: &[String],
        limit: u32,
        nonce: &str,
        presences: bool,
    ) -> Result<()> {
        let data = RequestGuildMembersData {
            guild_id: vec![guild_id.to_owned()],
            query: None,
            user_ids: Some(user_ids.to_vec()),
            limit,
            nonce: nonce.to_owned(),
            presences,
        };
        self.gateway_write(op::REQUEST_GUILD_MEMBERS, &data).await
    }

    /// Request members across several guilds at once.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn request_guild_members_batch(
        &self,
        guild_ids: &[&str],
        query: &str,
        limit: u32,
        nonce: &str,
        presences: bool,
    ) -> Result<()> {
        let data = RequestGuildMembersData {
            guild_id: guild_ids.iter().map(|&id| id.to_owned()).collect(),
            query: Some(query.to_owned()),
            user_ids: None,
            limit,
            nonce: nonce.to_owned(),
            presences,
        };
        self.gateway_write(op::REQUEST_GUILD_MEMBERS, &data).await
    }

    // ── Voice ────────────────────────────────────────────────────────────

    /// Join a voice channel and wait for media to come up.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket and
    /// [`Error::Voice`] when the handshake times out.
    pub async fn voice_join(
        &self,
        guild_id: &str,
        channel_id: &str,
        mute: bool,
        deaf: bool,
    ) -> Result<Arc<VoiceConnection>> {
        let connection = {
            let mut voice = self.inner.voice.write();
            voice
                .entry(guild_id.to_owned())
                .or_insert_with(|| {
                    VoiceConnection::new(
                        guild_id,
                        Arc::new(SessionControl {
                            inner: Arc::downgrade(&self.inner),
                        }),
                    )
                })
                .clone()
        };

        connection.prepare_join(channel_id, mute, deaf);
        self.voice_join_manual(guild_id, Some(channel_id), mute, deaf)
            .await?;

        if let Err(e) = connection.wait_until_connected().await {
            warn!(guild_id, error = %e, "error waiting for voice to connect");
            connection.close().await;
            return Err(e.into());
        }

        Ok(connection)
    }

    /// Send a bare op-4 voice state update; `None` channel disconnects.
    ///
    /// # Errors
    ///
    /// [`Error::WsNotFound`] without a live gateway socket.
    pub async fn voice_join_manual(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        mute: bool,
        deaf: bool,
    ) -> Result<()> {
        let data = VoiceStateUpdateData {
            guild_id: guild_id.to_owned(),
            channel_id: channel_id.map(str::to_owned),
            self_mute: mute,
            self_deaf: deaf,
        };
        self.gateway_write(op::VOICE_STATE_UPDATE, &data).await
    }

    /// Capture our own voice session ID off the dispatch stream.
    fn on_voice_state_update(&self, state: &VoiceState) {
        if state.channel_id.is_empty() {
            return;
        }
        if self.inner.state.user().id != state.user_id {
            return;
        }

        let Some(connection) = self.voice_connection(&state.guild_id) else {
            return;
        };
        connection.update_session(&state.user_id, &state.session_id, &state.channel_id);
    }

    /// A voice server was (re)assigned: restart that guild's voice socket.
    fn on_voice_server_update(&self, update: &VoiceServerUpdate) {
        let Some(connection) = self.voice_connection(&update.guild_id) else {
            return;
        };

        let token = update.token.clone();
        let endpoint = update.endpoint.clone();
        tokio::spawn(async move {
            connection.close().await;
            connection.update_server(&token, &endpoint);
            if let Err(e) = connection.open().await {
                error!(guild_id = %connection.guild_id(), error = %e, "error opening voice connection");
            }
        });
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("sequence", &self.inner.sequence.load(Ordering::SeqCst))
            .field("data_ready", &self.inner.data_ready.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

/// Weak control handle voice connections use to reach their session.
struct SessionControl {
    inner: Weak<SessionInner>,
}

#[async_trait]
impl VoiceControl for SessionControl {
    async fn send_voice_state(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
        self_mute: bool,
        self_deaf: bool,
    ) -> VoiceResult<()> {
        let Some(inner) = self.inner.upgrade() else {
            return Err(VoiceError::Control("session dropped".to_owned()));
        };
        Session { inner }
            .voice_join_manual(guild_id, channel_id, self_mute, self_deaf)
            .await
            .map_err(|e| VoiceError::Control(e.to_string()))
    }

    fn session_ready(&self) -> bool {
        self.inner
            .upgrade()
            .is_some_and(|inner| inner.data_ready.load(Ordering::SeqCst))
    }

    fn forget_connection(&self, guild_id: &str) {
        if let Some(inner) = self.inner.upgrade() {
            inner.voice.write().remove(guild_id);
        }
    }
}

/// Stamp a guild's ID onto nested resources that omit it on the wire.
fn stamp_guild_ids(guild: &mut Guild) {
    let guild_id = guild.id.clone();
    for channel in &mut guild.channels {
        channel.guild_id.clone_from(&guild_id);
    }
    for thread in &mut guild.threads {
        thread.guild_id.clone_from(&guild_id);
    }
    for member in &mut guild.members {
        member.guild_id.clone_from(&guild_id);
    }
    for state in &mut guild.voice_states {
        state.guild_id.clone_from(&guild_id);
    }
}

/// Decode one WebSocket message into a gateway payload; binary frames are
/// zlib-compressed JSON.
fn decode_frame(msg: &Message) -> Result<Option<GatewayPayload>> {
    match msg {
        Message::Text(text) => Ok(Some(serde_json::from_str(text.as_ref())?)),
        Message::Binary(data) => {
            let mut decoder = ZlibDecoder::new(data.as_slice());
            let mut json = Vec::new();
            decoder.read_to_end(&mut json)?;
            Ok(Some(serde_json::from_slice(&json)?))
        }
        _ => Ok(None),
    }
}

/// Read frames until one carries a payload; used during the open
/// handshake before the reader task exists.
async fn read_payload(read: &mut WsStream) -> Result<GatewayPayload> {
    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let Some(payload) = decode_frame(&msg)? {
                    return Ok(payload);
                }
            }
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(Error::Ws(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed,
                ))
            }
        }
    }
}
