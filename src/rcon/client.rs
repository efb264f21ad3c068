//! RCON client: socket ownership, command queue, and reconnect logic.
//!
//! The client is a single exclusive-owner task driven by `tokio::select!`
//! over a command channel and the dispatch tick. The queue, the in-flight
//! table, and the connection state are owned by that task, so they are
//! mutated sequentially without locks. Connect attempts, retry timers,
//! and socket reads run as spawned tasks that report back through the
//! same channel; every such task carries the generation it was spawned
//! for, and messages from a superseded generation are discarded.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Interval, MissedTickBehavior};

use super::codec::{self, Frame};
use super::{ConnectionState, RconError};
use crate::config::RconConfig;
use crate::events::EventBus;

/// Default bound for `connect()` retry attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Pause between refused-connection retries
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Events emitted by an [`RconClient`]
#[derive(Debug, Clone)]
pub enum RconEvent {
    /// Authentication was acknowledged; commands will now dispatch
    Connected,
    /// The connection was torn down (explicitly or by a socket error)
    Disconnected,
    /// A connect attempt was refused and another is scheduled
    RetryWarning { attempt: u32, max_attempts: u32 },
    /// A connect attempt failed terminally
    Error(String),
}

type Reply = oneshot::Sender<Result<String, RconError>>;

/// A command waiting in the FIFO queue for its dispatch tick
struct PendingCommand {
    body: String,
    reply: Reply,
}

enum Msg {
    Connect {
        max_attempts: u32,
        ack: oneshot::Sender<Result<(), RconError>>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
    Send {
        body: String,
        reply: Reply,
    },
    // Reports from spawned connect/retry/reader tasks
    Opened {
        generation: u64,
        stream: TcpStream,
    },
    OpenFailed {
        generation: u64,
        attempt: u32,
        max_attempts: u32,
        error: io::Error,
    },
    Retry {
        generation: u64,
        attempt: u32,
        max_attempts: u32,
    },
    Frame {
        generation: u64,
        frame: Frame,
    },
    ReadClosed {
        generation: u64,
        error: Option<io::Error>,
    },
}

/// Handle to the RCON client task.
///
/// Cloning is cheap; all clones talk to the same task. The handle must be
/// created from within a Tokio runtime.
#[derive(Clone)]
pub struct RconClient {
    tx: mpsc::UnboundedSender<Msg>,
    events: EventBus<RconEvent>,
    state: watch::Receiver<ConnectionState>,
}

impl RconClient {
    /// Spawn the client task for the given configuration.
    ///
    /// No connection is opened until [`connect`](Self::connect) is called.
    pub fn new(config: RconConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = EventBus::default();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let task = ClientTask::new(config, events.clone(), state_tx, tx.clone(), rx);
        tokio::spawn(task.run());

        Self {
            tx,
            events,
            state: state_rx,
        }
    }

    /// Connect and authenticate, retrying refused connections up to
    /// [`DEFAULT_MAX_ATTEMPTS`] times.
    pub async fn connect(&self) -> Result<(), RconError> {
        self.connect_with(DEFAULT_MAX_ATTEMPTS).await
    }

    /// Connect and authenticate with an explicit retry bound
    /// (`max_attempts == 0` retries without bound).
    ///
    /// Fails immediately with [`RconError::AlreadyConnected`] if the client
    /// is authenticated. Any existing socket is torn down first. Connection
    /// progress and failures are reported as [`RconEvent`]s.
    pub async fn connect_with(&self, max_attempts: u32) -> Result<(), RconError> {
        let (ack, ack_rx) = oneshot::channel();
        self.tx
            .send(Msg::Connect { max_attempts, ack })
            .map_err(|_| RconError::ClientGone)?;
        ack_rx.await.map_err(|_| RconError::ClientGone)?
    }

    /// Tear down the connection.
    ///
    /// Idempotent and safe to call when never connected. Every queued and
    /// in-flight command is rejected with [`RconError::Disconnected`]; a
    /// [`RconEvent::Disconnected`] is emitted.
    pub async fn disconnect(&self) {
        let (ack, ack_rx) = oneshot::channel();
        if self.tx.send(Msg::Disconnect { ack }).is_ok() {
            let _ = ack_rx.await;
        }
    }

    /// Queue a command and await its response payload.
    ///
    /// Commands dispatch in FIFO order, one per dispatch tick, only while
    /// authenticated. The returned future resolves when the correlated
    /// response arrives and rejects if the connection is torn down first.
    pub async fn send(&self, command: impl Into<String>) -> Result<String, RconError> {
        let (reply, reply_rx) = oneshot::channel();
        self.tx
            .send(Msg::Send {
                body: command.into(),
                reply,
            })
            .map_err(|_| RconError::ClientGone)?;
        reply_rx.await.unwrap_or(Err(RconError::ClientGone))
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch channel following every connection state transition
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Subscribe to client events
    pub fn subscribe(&self) -> broadcast::Receiver<RconEvent> {
        self.events.subscribe()
    }
}

struct ClientTask {
    config: RconConfig,
    events: EventBus<RconEvent>,
    state: watch::Sender<ConnectionState>,
    tx: mpsc::UnboundedSender<Msg>,
    rx: mpsc::UnboundedReceiver<Msg>,
    queue: VecDeque<PendingCommand>,
    in_flight: HashMap<i32, Reply>,
    writer: Option<OwnedWriteHalf>,
    reader: Option<JoinHandle<()>>,
    authenticated: bool,
    next_exec_id: i32,
    /// Bumped on every connect/disconnect; stale task reports are dropped
    generation: u64,
    tick: Interval,
}

impl ClientTask {
    fn new(
        config: RconConfig,
        events: EventBus<RconEvent>,
        state: watch::Sender<ConnectionState>,
        tx: mpsc::UnboundedSender<Msg>,
        rx: mpsc::UnboundedReceiver<Msg>,
    ) -> Self {
        let tick = Self::dispatch_tick(config.dispatch_interval_ms);
        Self {
            config,
            events,
            state,
            tx,
            rx,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
            writer: None,
            reader: None,
            authenticated: false,
            next_exec_id: codec::FIRST_EXEC_ID,
            generation: 0,
            tick,
        }
    }

    fn dispatch_tick(interval_ms: u64) -> Interval {
        let mut tick = interval(Duration::from_millis(interval_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tick
    }

    async fn run(mut self) {
        loop {
            // Sampled before select!, which keeps the guard from borrowing
            // `self` while the branch futures hold its fields.
            let can_dispatch = self.can_dispatch();
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                _ = self.tick.tick(), if can_dispatch => {
                    self.dispatch_one().await;
                }
            }
        }

        // All handles dropped: nothing can await replies any more
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn can_dispatch(&self) -> bool {
        self.authenticated && self.writer.is_some() && !self.queue.is_empty()
    }

    async fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Connect { max_attempts, ack } => {
                if self.authenticated {
                    let _ = ack.send(Err(RconError::AlreadyConnected));
                    return;
                }
                // Tear down any half-open socket; its in-flight entries can
                // never be answered, the queue carries over.
                self.drop_socket();
                self.generation += 1;
                self.set_state(ConnectionState::Connecting);
                self.spawn_connect(1, max_attempts);
                let _ = ack.send(Ok(()));
            }

            Msg::Disconnect { ack } => {
                self.disconnect_cleanup();
                let _ = ack.send(());
            }

            Msg::Send { body, reply } => {
                self.queue.push_back(PendingCommand { body, reply });
            }

            Msg::Opened { generation, stream } => {
                if generation != self.generation {
                    return;
                }
                let (read_half, mut write_half) = stream.into_split();

                let auth = codec::encode(
                    codec::AUTH_REQUEST,
                    codec::AUTH_REQUEST_ID,
                    &self.config.password,
                );
                if let Err(e) = write_half.write_all(&auth).await {
                    self.socket_error(e);
                    return;
                }

                self.writer = Some(write_half);
                self.spawn_reader(read_half);
                self.tick = Self::dispatch_tick(self.config.dispatch_interval_ms);
                self.set_state(ConnectionState::Authenticating);
                tracing::debug!(
                    host = %self.config.host,
                    port = self.config.port,
                    "socket open, authenticating"
                );
            }

            Msg::OpenFailed {
                generation,
                attempt,
                max_attempts,
                error,
            } => {
                if generation != self.generation {
                    return;
                }
                if error.kind() == io::ErrorKind::ConnectionRefused {
                    if max_attempts != 0 && attempt >= max_attempts {
                        self.events.emit(RconEvent::Error(format!(
                            "failed to connect {max_attempts} times"
                        )));
                        self.set_state(ConnectionState::Disconnected);
                        return;
                    }
                    tracing::debug!(attempt, "connection refused, retrying");
                    self.events.emit(RconEvent::RetryWarning {
                        attempt,
                        max_attempts,
                    });
                    self.spawn_retry(attempt + 1, max_attempts);
                } else {
                    self.events
                        .emit(RconEvent::Error(format!("failed to connect: {error}")));
                    self.set_state(ConnectionState::Disconnected);
                }
            }

            Msg::Retry {
                generation,
                attempt,
                max_attempts,
            } => {
                // A retry superseded by a newer connect() or disconnect()
                // must no-op.
                if generation != self.generation {
                    return;
                }
                self.spawn_connect(attempt, max_attempts);
            }

            Msg::Frame { generation, frame } => {
                if generation != self.generation {
                    return;
                }
                self.handle_frame(frame);
            }

            Msg::ReadClosed { generation, error } => {
                if generation != self.generation {
                    return;
                }
                match error {
                    Some(e) => self.socket_error(e),
                    None => {
                        tracing::debug!("server closed the connection");
                        self.disconnect_cleanup();
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: Frame) {
        match frame.kind {
            codec::AUTH_RESPONSE => {
                self.authenticated = true;
                self.set_state(ConnectionState::Ready);
                self.events.emit(RconEvent::Connected);
                tracing::debug!("authenticated");
            }
            codec::EXEC_RESPONSE => match self.in_flight.remove(&frame.id) {
                Some(reply) => {
                    let _ = reply.send(Ok(frame.body));
                }
                None => {
                    tracing::debug!(id = frame.id, "response for unknown request id, dropping");
                }
            },
            kind => {
                tracing::warn!(kind, id = frame.id, "unknown packet type");
            }
        }
    }

    /// Pop the oldest queued command and write it to the socket.
    ///
    /// At most one command leaves the queue per tick, capping outbound
    /// throughput at one command per dispatch interval.
    async fn dispatch_one(&mut self) {
        let Some(cmd) = self.queue.pop_front() else {
            return;
        };
        let Some(writer) = self.writer.as_mut() else {
            self.queue.push_front(cmd);
            return;
        };

        let id = self.next_exec_id;
        self.next_exec_id = self.next_exec_id.wrapping_add(1);

        let frame = codec::encode(codec::EXEC_REQUEST, id, &cmd.body);
        self.in_flight.insert(id, cmd.reply);
        if let Err(e) = writer.write_all(&frame).await {
            self.socket_error(e);
        }
    }

    fn spawn_connect(&self, attempt: u32, max_attempts: u32) {
        let generation = self.generation;
        let tx = self.tx.clone();
        let host = self.config.host.clone();
        let port = self.config.port;
        tokio::spawn(async move {
            match TcpStream::connect((host.as_str(), port)).await {
                Ok(stream) => {
                    let _ = tx.send(Msg::Opened { generation, stream });
                }
                Err(error) => {
                    let _ = tx.send(Msg::OpenFailed {
                        generation,
                        attempt,
                        max_attempts,
                        error,
                    });
                }
            }
        });
    }

    fn spawn_retry(&self, attempt: u32, max_attempts: u32) {
        let generation = self.generation;
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(RETRY_DELAY).await;
            let _ = tx.send(Msg::Retry {
                generation,
                attempt,
                max_attempts,
            });
        });
    }

    fn spawn_reader(&mut self, mut read_half: OwnedReadHalf) {
        let generation = self.generation;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            // One complete frame per read; fragmented or coalesced frames
            // are not reassembled.
            let mut buf = [0u8; 4096];
            loop {
                match read_half.read(&mut buf).await {
                    Ok(0) => {
                        let _ = tx.send(Msg::ReadClosed {
                            generation,
                            error: None,
                        });
                        break;
                    }
                    Ok(n) => match codec::decode(&buf[..n]) {
                        Ok(frame) => {
                            let _ = tx.send(Msg::Frame { generation, frame });
                        }
                        Err(e) => tracing::warn!("dropping undecodable frame: {e}"),
                    },
                    Err(e) => {
                        let _ = tx.send(Msg::ReadClosed {
                            generation,
                            error: Some(e),
                        });
                        break;
                    }
                }
            }
        });
        self.reader = Some(handle);
    }

    /// Full teardown: reject everything pending and report `Disconnected`
    fn disconnect_cleanup(&mut self) {
        self.generation += 1;
        self.drop_socket();
        self.authenticated = false;
        for cmd in self.queue.drain(..) {
            let _ = cmd.reply.send(Err(RconError::Disconnected));
        }
        self.set_state(ConnectionState::Disconnected);
        self.events.emit(RconEvent::Disconnected);
    }

    /// Drop the socket halves and reject commands already on the wire.
    /// Queued commands are left alone.
    fn drop_socket(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer = None;
        for (_, reply) in self.in_flight.drain() {
            let _ = reply.send(Err(RconError::Disconnected));
        }
    }

    fn socket_error(&mut self, error: io::Error) {
        tracing::debug!("socket error: {error}");
        self.events
            .emit(RconEvent::Error(format!("connection error: {error}")));
        self.disconnect_cleanup();
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Instant};

    const TICK_MS: u64 = 20;

    fn test_config(port: u16, dispatch_interval_ms: u64) -> RconConfig {
        RconConfig {
            host: "127.0.0.1".to_string(),
            port,
            password: "hunter2".to_string(),
            dispatch_interval_ms,
        }
    }

    /// Read exactly one frame off the mock server socket, using the size
    /// field so back-to-back frames never coalesce in the test.
    async fn read_frame(sock: &mut TcpStream) -> Frame {
        let mut size_buf = [0u8; 4];
        sock.read_exact(&mut size_buf).await.unwrap();
        let size = i32::from_le_bytes(size_buf) as usize;
        let mut rest = vec![0u8; size];
        sock.read_exact(&mut rest).await.unwrap();

        let mut raw = size_buf.to_vec();
        raw.extend_from_slice(&rest);
        codec::decode(&raw).unwrap()
    }

    /// Accept the client's connection and complete the auth handshake
    async fn accept_and_auth(listener: &TcpListener) -> TcpStream {
        let (mut sock, _) = listener.accept().await.unwrap();
        let auth = read_frame(&mut sock).await;
        assert_eq!(auth.kind, codec::AUTH_REQUEST);
        assert_eq!(auth.id, codec::AUTH_REQUEST_ID);
        sock.write_all(&codec::encode(codec::AUTH_RESPONSE, codec::AUTH_REQUEST_ID, ""))
            .await
            .unwrap();
        sock
    }

    async fn next_event(rx: &mut broadcast::Receiver<RconEvent>) -> RconEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_connect_authenticates_and_reports_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = RconClient::new(test_config(port, TICK_MS));
        let mut events = client.subscribe();

        client.connect().await.unwrap();

        let (mut sock, _) = listener.accept().await.unwrap();
        let auth = read_frame(&mut sock).await;
        assert_eq!(auth.kind, codec::AUTH_REQUEST);
        assert_eq!(auth.id, codec::AUTH_REQUEST_ID);
        assert_eq!(auth.body, "hunter2");

        sock.write_all(&codec::encode(codec::AUTH_RESPONSE, codec::AUTH_REQUEST_ID, ""))
            .await
            .unwrap();

        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));
        assert_eq!(client.state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_connect_while_authenticated_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = RconClient::new(test_config(port, TICK_MS));
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        let _sock = accept_and_auth(&listener).await;
        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));

        assert_eq!(client.connect().await, Err(RconError::AlreadyConnected));
    }

    #[tokio::test]
    async fn test_send_resolves_with_response_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = RconClient::new(test_config(port, TICK_MS));
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        let mut sock = accept_and_auth(&listener).await;
        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));

        let server = tokio::spawn(async move {
            let frame = read_frame(&mut sock).await;
            assert_eq!(frame.kind, codec::EXEC_REQUEST);
            assert_eq!(frame.id, codec::FIRST_EXEC_ID);
            assert_eq!(frame.body, "list");
            sock.write_all(&codec::encode(codec::EXEC_RESPONSE, frame.id, "players: none"))
                .await
                .unwrap();
            sock
        });

        let response = timeout(Duration::from_secs(5), client.send("list"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, "players: none");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_responses_correlate_by_request_id() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = RconClient::new(test_config(port, TICK_MS));
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        let mut sock = accept_and_auth(&listener).await;
        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));

        let first = {
            let client = client.clone();
            tokio::spawn(async move { client.send("first").await })
        };
        // Let the first send enqueue before the second, so FIFO order is
        // deterministic.
        sleep(Duration::from_millis(10)).await;
        let second = {
            let client = client.clone();
            tokio::spawn(async move { client.send("second").await })
        };

        // FIFO dispatch: ids increase in submit order
        let f1 = read_frame(&mut sock).await;
        let f2 = read_frame(&mut sock).await;
        assert_eq!(f1.body, "first");
        assert_eq!(f2.body, "second");
        assert_eq!(f2.id, f1.id.wrapping_add(1));

        // A response with an unknown id is dropped without disturbing
        // the pending commands.
        sock.write_all(&codec::encode(codec::EXEC_RESPONSE, 9999, "stale"))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        // Answer out of order: the second command resolves first
        sock.write_all(&codec::encode(codec::EXEC_RESPONSE, f2.id, "two"))
            .await
            .unwrap();
        let second = timeout(Duration::from_secs(5), second).await.unwrap().unwrap();
        assert_eq!(second.unwrap(), "two");
        assert!(!first.is_finished());

        sleep(Duration::from_millis(50)).await;
        sock.write_all(&codec::encode(codec::EXEC_RESPONSE, f1.id, "one"))
            .await
            .unwrap();
        let first = timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
        assert_eq!(first.unwrap(), "one");
    }

    #[tokio::test]
    async fn test_at_most_one_dispatch_per_tick() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = RconClient::new(test_config(port, 150));
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        let mut sock = accept_and_auth(&listener).await;
        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));

        for body in ["a", "b", "c"] {
            let client = client.clone();
            tokio::spawn(async move {
                let _ = client.send(body).await;
            });
        }

        let mut arrivals = Vec::new();
        for _ in 0..3 {
            let _ = read_frame(&mut sock).await;
            arrivals.push(Instant::now());
        }

        // Three queued commands must take three dispatch intervals
        assert!(arrivals[1] - arrivals[0] >= Duration::from_millis(100));
        assert!(arrivals[2] - arrivals[1] >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_disconnect_rejects_queued_and_in_flight() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        // Long tick: the first command dispatches on a tick and the rest
        // are still queued when we disconnect.
        let client = RconClient::new(test_config(port, 300));
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        let mut sock = accept_and_auth(&listener).await;
        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));

        let pending: Vec<_> = ["a", "b", "c"]
            .into_iter()
            .map(|body| {
                let client = client.clone();
                tokio::spawn(async move { client.send(body).await })
            })
            .collect();

        // Wait until exactly one command is on the wire (in-flight, never
        // answered); the other two remain queued. The settle sleep keeps
        // us well inside the 300ms tick so no second dispatch happens.
        let _ = read_frame(&mut sock).await;
        sleep(Duration::from_millis(50)).await;

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);

        for handle in pending {
            let result = timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
            assert_eq!(result, Err(RconError::Disconnected));
        }

        let mut saw_disconnected = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, RconEvent::Disconnected) {
                saw_disconnected = true;
            }
        }
        assert!(saw_disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_bound() {
        // Bind then drop to find a port that refuses connections
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let client = RconClient::new(test_config(port, TICK_MS));
        let mut events = client.subscribe();

        client.connect_with(3).await.unwrap();

        let mut warnings = 0;
        loop {
            match next_event(&mut events).await {
                RconEvent::RetryWarning { .. } => warnings += 1,
                RconEvent::Error(message) => {
                    assert_eq!(message, "failed to connect 3 times");
                    break;
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
        assert_eq!(warnings, 2);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // No fourth attempt: the event stream stays quiet
        sleep(Duration::from_millis(300)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_refused_error_is_not_retried() {
        // An unroutable-host connect error must surface immediately
        let client = RconClient::new(RconConfig {
            host: "host.invalid".to_string(),
            port: 25575,
            password: String::new(),
            dispatch_interval_ms: TICK_MS,
        });
        let mut events = client.subscribe();

        client.connect_with(3).await.unwrap();

        match next_event(&mut events).await {
            RconEvent::Error(message) => assert!(message.starts_with("failed to connect:")),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_when_never_connected() {
        let client = RconClient::new(test_config(1, TICK_MS));
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_send_before_connect_queues_until_disconnect_rejects() {
        let client = RconClient::new(test_config(1, TICK_MS));
        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.send("list").await })
        };

        sleep(Duration::from_millis(50)).await;
        assert!(!pending.is_finished());

        client.disconnect().await;
        let result = timeout(Duration::from_secs(5), pending).await.unwrap().unwrap();
        assert_eq!(result, Err(RconError::Disconnected));
    }

    #[tokio::test]
    async fn test_server_close_tears_down_to_disconnected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let client = RconClient::new(test_config(port, TICK_MS));
        let mut events = client.subscribe();

        client.connect().await.unwrap();
        let sock = accept_and_auth(&listener).await;
        assert!(matches!(next_event(&mut events).await, RconEvent::Connected));

        drop(sock);

        loop {
            if matches!(next_event(&mut events).await, RconEvent::Disconnected) {
                break;
            }
        }
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }
}
