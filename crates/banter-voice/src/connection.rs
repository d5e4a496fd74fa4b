//! The per-guild voice connection state machine.
//!
//! Lifecycle: the gateway session sends an op-4 voice state update, the
//! resulting voice-state-update supplies the session ID and the
//! voice-server-update supplies the token and endpoint. `open` then dials
//! the voice gateway, identifies, and on op-2 Ready performs UDP IP
//! discovery, selects the encrypted protocol, and runs the media loops
//! until closed or reconnected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex as SyncMutex, RwLock};
use serde::Serialize;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use banter_model::GatewayPayload;

use crate::protocol::{
    op, SelectProtocol, SelectProtocolData, SessionDescription, Speaking, SpeakingUpdate,
    VoiceIdentify, VoiceReady, CLOSE_MANUAL_DISCONNECT,
};
use crate::rtp::{
    discovery_request, open_frame, parse_discovery_response, seal_frame, DISCOVERY_LEN,
    ENCRYPTION_MODE, FRAME_SIZE, SAMPLE_RATE,
};
use crate::{Packet, VoiceControl, VoiceError, VoiceResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Callback for op-5 speaking broadcasts.
pub type SpeakingHandler = Arc<dyn Fn(&SpeakingUpdate) + Send + Sync>;

const UDP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const SESSION_ID_WAIT: Duration = Duration::from_millis(50);
const SESSION_ID_ATTEMPTS: u32 = 20;
const CONNECT_WAIT_ATTEMPTS: u32 = 10;
const RECONNECT_WAIT_CAP: Duration = Duration::from_secs(600);

/// Mutable connection state behind the flag lock.
#[derive(Debug, Default)]
struct ConnState {
    channel_id: String,
    user_id: String,
    session_id: String,
    token: String,
    endpoint: String,
    mute: bool,
    deaf: bool,
    speaking: bool,
    ready: bool,
    reconnecting: bool,
    ssrc: u32,
    secret_key: Option<[u8; 32]>,
}

/// A voice connection to one guild's voice server.
pub struct VoiceConnection {
    guild_id: String,
    control: Arc<dyn VoiceControl>,
    state: RwLock<ConnState>,
    /// Write half of the voice WebSocket; all writes serialize through it.
    ws: AsyncMutex<Option<WsSink>>,
    udp: RwLock<Option<Arc<UdpSocket>>>,
    close: SyncMutex<Option<broadcast::Sender<()>>>,
    /// Bumped on every close; stale reader tasks check it before
    /// triggering reconnects.
    generation: AtomicU64,
    opus_tx: mpsc::Sender<Vec<u8>>,
    opus_rx: Arc<AsyncMutex<mpsc::Receiver<Vec<u8>>>>,
    packet_tx: mpsc::Sender<Packet>,
    packet_rx: SyncMutex<Option<mpsc::Receiver<Packet>>>,
    speaking_handlers: RwLock<Vec<SpeakingHandler>>,
}

impl VoiceConnection {
    /// Create a connection bound to a guild and a gateway control handle.
    #[must_use]
    pub fn new(guild_id: &str, control: Arc<dyn VoiceControl>) -> Arc<Self> {
        let (opus_tx, opus_rx) = mpsc::channel(2);
        let (packet_tx, packet_rx) = mpsc::channel(2);

        Arc::new(Self {
            guild_id: guild_id.to_owned(),
            control,
            state: RwLock::new(ConnState::default()),
            ws: AsyncMutex::new(None),
            udp: RwLock::new(None),
            close: SyncMutex::new(None),
            generation: AtomicU64::new(0),
            opus_tx,
            opus_rx: Arc::new(AsyncMutex::new(opus_rx)),
            packet_tx,
            packet_rx: SyncMutex::new(Some(packet_rx)),
            speaking_handlers: RwLock::new(Vec::new()),
        })
    }

    /// The guild this connection belongs to.
    #[must_use]
    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    /// The channel this connection targets.
    #[must_use]
    pub fn channel_id(&self) -> String {
        self.state.read().channel_id.clone()
    }

    /// Whether the media send loop is currently running.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.read().ready
    }

    /// Sender for outbound Opus frames.
    #[must_use]
    pub fn opus_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.opus_tx.clone()
    }

    /// Take the inbound packet receiver; yields decoded [`Packet`]s while
    /// the receive loop runs. Returns `None` after the first call.
    #[must_use]
    pub fn take_receiver(&self) -> Option<mpsc::Receiver<Packet>> {
        self.packet_rx.lock().take()
    }

    /// Register a callback for op-5 speaking broadcasts.
    pub fn add_speaking_handler(&self, handler: SpeakingHandler) {
        self.speaking_handlers.write().push(handler);
    }

    /// Record the join target before the handshake starts.
    pub fn prepare_join(&self, channel_id: &str, mute: bool, deaf: bool) {
        let mut state = self.state.write();
        state.channel_id = channel_id.to_owned();
        state.mute = mute;
        state.deaf = deaf;
    }

    /// Apply the gateway's voice-state-update for our own user.
    pub fn update_session(&self, user_id: &str, session_id: &str, channel_id: &str) {
        let mut state = self.state.write();
        state.user_id = user_id.to_owned();
        state.session_id = session_id.to_owned();
        state.channel_id = channel_id.to_owned();
    }

    /// Apply the gateway's voice-server-update.
    pub fn update_server(&self, token: &str, endpoint: &str) {
        let mut state = self.state.write();
        state.token = token.to_owned();
        state.endpoint = endpoint.to_owned();
    }

    /// Dial the voice gateway and identify.
    ///
    /// Requires the session ID from the gateway's voice-state-update; waits
    /// briefly for it to land.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::NoSessionId`] when the gateway never reported
    /// our own voice state, [`VoiceError::EmptyEndpoint`] without a server
    /// endpoint, and transport errors from the dial itself.
    pub async fn open(self: &Arc<Self>) -> VoiceResult<()> {
        let mut waited = 0;
        while self.state.read().session_id.is_empty() {
            if waited > SESSION_ID_ATTEMPTS {
                return Err(VoiceError::NoSessionId);
            }
            sleep(SESSION_ID_WAIT).await;
            waited += 1;
        }

        {
            let ws = self.ws.lock().await;
            if ws.is_some() {
                warn!(guild_id = %self.guild_id, "refusing to overwrite live voice websocket");
                return Ok(());
            }
        }

        let (endpoint, identify) = {
            let state = self.state.read();
            if state.endpoint.is_empty() {
                return Err(VoiceError::EmptyEndpoint);
            }
            (
                state.endpoint.clone(),
                VoiceIdentify {
                    server_id: self.guild_id.clone(),
                    user_id: state.user_id.clone(),
                    session_id: state.session_id.clone(),
                    token: state.token.clone(),
                },
            )
        };

        let url = format!("wss://{}", endpoint.trim_end_matches(":80"));
        info!(url = %url, guild_id = %self.guild_id, "connecting to voice endpoint");

        let (stream, _) = connect_async(&url).await?;
        let (sink, read) = stream.split();
        *self.ws.lock().await = Some(sink);

        self.send_payload(op::IDENTIFY, &identify).await?;

        let close_tx = broadcast::channel(1).0;
        let close_rx = close_tx.subscribe();
        *self.close.lock() = Some(close_tx);

        let generation = self.generation.load(Ordering::SeqCst);
        let conn = Arc::clone(self);
        tokio::spawn(async move {
            conn.ws_listen(read, close_rx, generation).await;
        });

        Ok(())
    }

    /// Serialize and send one payload on the voice WebSocket.
    async fn send_payload<T: Serialize>(&self, opcode: u8, data: &T) -> VoiceResult<()> {
        let payload = GatewayPayload::new(opcode, data)?;
        let text = serde_json::to_string(&payload)?;

        let mut ws = self.ws.lock().await;
        let sink = ws.as_mut().ok_or(VoiceError::NotConnected)?;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Update our speaking flag, notifying the voice server.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::NotConnected`] without a live socket or the
    /// transport error from the write.
    pub async fn speaking(&self, speaking: bool) -> VoiceResult<()> {
        let result = self
            .send_payload(op::SPEAKING, &Speaking { speaking, delay: 0 })
            .await;

        let mut state = self.state.write();
        match result {
            Ok(()) => {
                state.speaking = speaking;
                Ok(())
            }
            Err(e) => {
                state.speaking = false;
                Err(e)
            }
        }
    }

    /// Move to another voice channel in the same guild.
    ///
    /// # Errors
    ///
    /// Propagates gateway write failures.
    pub async fn change_channel(
        &self,
        channel_id: &str,
        mute: bool,
        deaf: bool,
    ) -> VoiceResult<()> {
        self.control
            .send_voice_state(&self.guild_id, Some(channel_id), mute, deaf)
            .await?;

        let mut state = self.state.write();
        state.channel_id = channel_id.to_owned();
        state.mute = mute;
        state.deaf = deaf;
        state.speaking = false;
        Ok(())
    }

    /// Leave the voice channel and tear the connection down.
    ///
    /// # Errors
    ///
    /// Propagates gateway write failures; the connection is closed and
    /// removed from the session either way.
    pub async fn disconnect(&self) -> VoiceResult<()> {
        let session_id = {
            let mut state = self.state.write();
            std::mem::take(&mut state.session_id)
        };

        let result = if session_id.is_empty() {
            Ok(())
        } else {
            self.control
                .send_voice_state(&self.guild_id, None, true, true)
                .await
        };

        self.close().await;
        info!(guild_id = %self.guild_id, "voice connection removed");
        self.control.forget_connection(&self.guild_id);
        result
    }

    /// Close the sockets and stop every task.
    pub async fn close(&self) {
        {
            let mut state = self.state.write();
            state.ready = false;
            state.speaking = false;
        }
        self.generation.fetch_add(1, Ordering::SeqCst);

        if let Some(close_tx) = self.close.lock().take() {
            let _ = close_tx.send(());
        }

        // Dropping the socket closes it.
        self.udp.write().take();

        let mut ws = self.ws.lock().await;
        if let Some(mut sink) = ws.take() {
            if let Err(e) = sink.send(Message::Close(None)).await {
                debug!(error = %e, "error sending voice close frame");
            }
        }
    }

    /// Poll until the media loop is running, for about ten seconds.
    ///
    /// # Errors
    ///
    /// Returns [`VoiceError::Timeout`] when the handshake never finishes.
    pub async fn wait_until_connected(&self) -> VoiceResult<()> {
        for _ in 0..CONNECT_WAIT_ATTEMPTS {
            if self.state.read().ready {
                return Ok(());
            }
            sleep(Duration::from_secs(1)).await;
        }
        if self.state.read().ready {
            Ok(())
        } else {
            Err(VoiceError::Timeout)
        }
    }

    /// Reconnect with exponential backoff; idempotent while in flight.
    pub async fn reconnect(self: &Arc<Self>) {
        {
            let mut state = self.state.write();
            if state.reconnecting {
                debug!(guild_id = %self.guild_id, "already reconnecting");
                return;
            }
            state.reconnecting = true;
        }

        self.close().await;

        let mut wait = Duration::from_secs(1);
        loop {
            sleep(wait).await;
            wait = (wait * 2).min(RECONNECT_WAIT_CAP);

            if !self.control.session_ready() {
                info!(guild_id = %self.guild_id, "gateway session not ready, delaying voice reconnect");
                continue;
            }

            let (channel_id, mute, deaf) = {
                let state = self.state.read();
                (state.channel_id.clone(), state.mute, state.deaf)
            };

            info!(guild_id = %self.guild_id, channel_id = %channel_id, "reconnecting voice");
            let joined = self
                .control
                .send_voice_state(&self.guild_id, Some(&channel_id), mute, deaf)
                .await;

            match joined {
                Ok(()) => {
                    if self.wait_until_connected().await.is_ok() {
                        info!(guild_id = %self.guild_id, "voice reconnected");
                        break;
                    }
                }
                Err(e) => {
                    warn!(guild_id = %self.guild_id, error = %e, "voice rejoin failed");
                }
            }

            // Clean up the half-open attempt before the next round.
            if let Err(e) = self
                .control
                .send_voice_state(&self.guild_id, None, true, true)
                .await
            {
                error!(guild_id = %self.guild_id, error = %e, "error sending voice cleanup");
            }
        }

        self.state.write().reconnecting = false;
    }

    // ── WebSocket reader ─────────────────────────────────────────────────

    async fn ws_listen(
        self: Arc<Self>,
        mut read: WsStream,
        mut close_rx: broadcast::Receiver<()>,
        generation: u64,
    ) {
        loop {
            tokio::select! {
                _ = close_rx.recv() => return,

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(e) = self.handle_message(text.as_str()).await {
                            error!(guild_id = %self.guild_id, error = %e, "voice event error");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.as_ref().map(|f| u16::from(f.code));
                        if code == Some(CLOSE_MANUAL_DISCONNECT) {
                            self.handle_manual_disconnect().await;
                        } else if self.is_current(generation) {
                            warn!(guild_id = %self.guild_id, ?code, "voice websocket closed");
                            let conn = Arc::clone(&self);
                            tokio::spawn(async move { conn.reconnect().await });
                        }
                        return;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        if self.is_current(generation) {
                            error!(guild_id = %self.guild_id, error = %e, "voice websocket error");
                            let conn = Arc::clone(&self);
                            tokio::spawn(async move { conn.reconnect().await });
                        }
                        return;
                    }
                    None => {
                        if self.is_current(generation) {
                            let conn = Arc::clone(&self);
                            tokio::spawn(async move { conn.reconnect().await });
                        }
                        return;
                    }
                },
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Grace period after a 4014: the host may be moving us between
    /// channels, in which case a fresh socket appears within a few seconds.
    async fn handle_manual_disconnect(&self) {
        info!(guild_id = %self.guild_id, "received 4014 manual disconnection");
        self.ws.lock().await.take();

        for _ in 0..5 {
            sleep(Duration::from_secs(1)).await;
            if self.ws.lock().await.is_some() {
                info!(guild_id = %self.guild_id, "reconnected after 4014");
                return;
            }
        }

        info!(guild_id = %self.guild_id, "disconnecting after 4014");
        self.control.forget_connection(&self.guild_id);
        self.close().await;
    }

    async fn handle_message(self: &Arc<Self>, text: &str) -> VoiceResult<()> {
        let payload: GatewayPayload = serde_json::from_str(text)?;
        let data = payload.d.unwrap_or_default();

        match payload.op {
            op::READY => {
                let ready: VoiceReady = serde_json::from_value(data)?;
                debug!(ssrc = ready.ssrc, interval_ms = ready.heartbeat_interval, "voice ready");
                self.state.write().ssrc = ready.ssrc;

                self.spawn_heartbeat(ready.heartbeat_interval);

                let udp = self.udp_open(&ready).await?;
                self.spawn_media_loops(&udp);
            }
            op::HEARTBEAT => {}
            op::SESSION_DESCRIPTION => {
                let description: SessionDescription = serde_json::from_value(data)?;
                debug!(mode = %description.mode, "voice session description");
                self.state.write().secret_key = Some(description.secret_key);
            }
            op::SPEAKING => {
                let update: SpeakingUpdate = serde_json::from_value(data)?;
                let handlers = self.speaking_handlers.read().clone();
                for handler in handlers {
                    handler(&update);
                }
            }
            other => {
                debug!(op = other, "unknown voice opcode");
            }
        }

        Ok(())
    }

    fn spawn_heartbeat(self: &Arc<Self>, interval_ms: u64) {
        let conn = Arc::clone(self);
        let mut close_rx = match self.close.lock().as_ref() {
            Some(tx) => tx.subscribe(),
            None => return,
        };

        tokio::spawn(async move {
            let period = Duration::from_millis(interval_ms.max(1));
            loop {
                let nonce = SystemTime::now()
                    .duration_since(SystemTime::UNIX_EPOCH)
                    .map_or(0, |d| d.as_secs());
                if let Err(e) = conn.send_payload(op::HEARTBEAT, &nonce).await {
                    error!(guild_id = %conn.guild_id, error = %e, "voice heartbeat failed");
                    return;
                }

                tokio::select! {
                    _ = close_rx.recv() => return,
                    () = sleep(period) => {}
                }
            }
        });
    }

    // ── UDP media ────────────────────────────────────────────────────────

    /// Dial the media socket, run IP discovery, and select the protocol.
    async fn udp_open(self: &Arc<Self>, ready: &VoiceReady) -> VoiceResult<Arc<UdpSocket>> {
        if self.ws.lock().await.is_none() {
            return Err(VoiceError::NotConnected);
        }
        if self.udp.read().is_some() {
            return Err(VoiceError::UdpAlreadyOpen);
        }

        let host = format!("{}:{}", ready.ip, ready.port);
        info!(addr = %host, "connecting voice udp");

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(&host).await?;

        socket.send(&discovery_request(ready.ssrc)).await?;

        let mut response = [0u8; DISCOVERY_LEN];
        let len = socket.recv(&mut response).await?;
        if len < DISCOVERY_LEN {
            return Err(VoiceError::PacketTooSmall { len });
        }
        let (address, port) = parse_discovery_response(&response)?;
        debug!(%address, port, "discovered external address");

        self.send_payload(
            op::SELECT_PROTOCOL,
            &SelectProtocol {
                protocol: "udp".into(),
                data: SelectProtocolData {
                    address,
                    port,
                    mode: ENCRYPTION_MODE.into(),
                },
            },
        )
        .await?;

        let socket = Arc::new(socket);
        *self.udp.write() = Some(Arc::clone(&socket));
        self.spawn_keepalive(&socket);

        Ok(socket)
    }

    fn spawn_keepalive(self: &Arc<Self>, socket: &Arc<UdpSocket>) {
        let Some(mut close_rx) = self.close.lock().as_ref().map(broadcast::Sender::subscribe)
        else {
            return;
        };
        let socket = Arc::clone(socket);
        let guild_id = self.guild_id.clone();

        tokio::spawn(async move {
            let mut sequence: u64 = 0;
            loop {
                if let Err(e) = socket.send(&sequence.to_le_bytes()).await {
                    error!(guild_id = %guild_id, error = %e, "udp keepalive failed");
                    return;
                }
                sequence = sequence.wrapping_add(1);

                tokio::select! {
                    _ = close_rx.recv() => return,
                    () = sleep(UDP_KEEPALIVE_INTERVAL) => {}
                }
            }
        });
    }

    fn spawn_media_loops(self: &Arc<Self>, socket: &Arc<UdpSocket>) {
        let Some(close_tx) = self.close.lock().as_ref().cloned() else {
            return;
        };

        {
            let conn = Arc::clone(self);
            let socket = Arc::clone(socket);
            let close_rx = close_tx.subscribe();
            tokio::spawn(async move {
                conn.opus_sender_loop(socket, close_rx).await;
            });
        }

        if !self.state.read().deaf {
            let conn = Arc::clone(self);
            let socket = Arc::clone(socket);
            let close_rx = close_tx.subscribe();
            tokio::spawn(async move {
                conn.opus_receiver_loop(socket, close_rx).await;
            });
        }
    }

    /// Paced media send loop; `ready` is true exactly while it runs.
    async fn opus_sender_loop(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        mut close_rx: broadcast::Receiver<()>,
    ) {
        let mut opus_rx = self.opus_rx.lock().await;

        self.state.write().ready = true;
        let generation = self.generation.load(Ordering::SeqCst);

        let frame_period = Duration::from_millis(u64::from(FRAME_SIZE / (SAMPLE_RATE / 1000)));
        let mut ticker = tokio::time::interval(frame_period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut sequence: u16 = 0;
        let mut timestamp: u32 = 0;

        loop {
            let frame = tokio::select! {
                _ = close_rx.recv() => break,
                frame = opus_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            if !self.state.read().speaking {
                if let Err(e) = self.speaking(true).await {
                    error!(guild_id = %self.guild_id, error = %e, "error sending speaking update");
                }
            }

            let Some(secret_key) = self.state.read().secret_key else {
                debug!(guild_id = %self.guild_id, "dropping frame before session description");
                continue;
            };
            let cipher = crate::rtp::cipher(&secret_key);

            let ssrc = self.state.read().ssrc;
            let packet = match seal_frame(&cipher, sequence, timestamp, ssrc, &frame) {
                Ok(packet) => packet,
                Err(e) => {
                    error!(guild_id = %self.guild_id, error = %e, "failed to seal voice frame");
                    continue;
                }
            };

            tokio::select! {
                _ = close_rx.recv() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = socket.send(&packet).await {
                error!(guild_id = %self.guild_id, error = %e, "voice udp write failed");
                break;
            }

            sequence = sequence.wrapping_add(1);
            timestamp = timestamp.wrapping_add(FRAME_SIZE);
        }

        if self.is_current(generation) {
            let mut state = self.state.write();
            state.ready = false;
            state.speaking = false;
        }
    }

    /// Media receive loop; decodes and decrypts inbound RTP.
    async fn opus_receiver_loop(
        self: Arc<Self>,
        socket: Arc<UdpSocket>,
        mut close_rx: broadcast::Receiver<()>,
    ) {
        let generation = self.generation.load(Ordering::SeqCst);
        let mut buf = [0u8; 1024];

        loop {
            let len = tokio::select! {
                _ = close_rx.recv() => return,
                received = socket.recv(&mut buf) => match received {
                    Ok(len) => len,
                    Err(e) => {
                        let same_socket = self
                            .udp
                            .read()
                            .as_ref()
                            .is_some_and(|current| Arc::ptr_eq(current, &socket));
                        if same_socket && self.is_current(generation) {
                            error!(guild_id = %self.guild_id, error = %e, "voice udp read failed");
                            let conn = Arc::clone(&self);
                            tokio::spawn(async move { conn.reconnect().await });
                        }
                        return;
                    }
                },
            };

            let Some(secret_key) = self.state.read().secret_key else {
                continue;
            };
            let cipher = crate::rtp::cipher(&secret_key);

            match open_frame(&cipher, &buf[..len]) {
                Ok(Some(packet)) => {
                    if self.packet_tx.send(packet).await.is_err() {
                        return;
                    }
                }
                // Non-media frames and undecryptable packets are skipped.
                Ok(None) | Err(_) => {}
            }
        }
    }
}

impl std::fmt::Debug for VoiceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("VoiceConnection")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &state.channel_id)
            .field("ready", &state.ready)
            .field("reconnecting", &state.reconnecting)
            .finish_non_exhaustive()
    }
}
