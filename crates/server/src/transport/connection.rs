//! WebSocket connection pump.
//!
//! Each connection runs a read loop and a write loop. The write loop is the
//! only writer to the socket; producers hand it frames through a bounded
//! queue and never wait on a slow peer.

use super::{SendError, Transport};
use crate::config::TransportConfig;
use crate::entity::ConnectionId;
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// One client socket.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Bytes>,
    closed: AtomicBool,
    shutdown: watch::Sender<bool>,
    #[cfg(test)]
    teardowns: std::sync::atomic::AtomicUsize,
}

/// The socket halves of a connection that has not started pumping yet.
///
/// Frames enqueued on the [`Connection`] before [`ConnectionPump::start`] are
/// held in the queue and written once the pump runs.
pub struct ConnectionPump<S> {
    conn: Arc<Connection>,
    ws: WebSocketStream<S>,
    rx: mpsc::Receiver<Bytes>,
    heartbeat: Duration,
    read_timeout: Duration,
    max_frame_size: usize,
}

impl<S> ConnectionPump<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Start the read and write loops.
    ///
    /// `on_frame` is awaited for every inbound binary message before the next
    /// one is read.
    pub fn start<H, Fut>(self, on_frame: H)
    where
        H: FnMut(Bytes) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sink, stream) = self.ws.split();
        tokio::spawn(write_loop(Arc::clone(&self.conn), sink, self.rx, self.heartbeat));
        tokio::spawn(read_loop(
            self.conn,
            stream,
            self.read_timeout,
            self.max_frame_size,
            on_frame,
        ));
    }
}

impl Connection {
    /// Wrap `ws` without reading from it yet.
    pub fn open<S>(
        id: ConnectionId,
        ws: WebSocketStream<S>,
        config: &TransportConfig,
    ) -> (Arc<Self>, ConnectionPump<S>) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown, _) = watch::channel(false);
        let conn = Arc::new(Self {
            id,
            outbound: tx,
            closed: AtomicBool::new(false),
            shutdown,
            #[cfg(test)]
            teardowns: std::sync::atomic::AtomicUsize::new(0),
        });
        let pump = ConnectionPump {
            conn: Arc::clone(&conn),
            ws,
            rx,
            heartbeat: config.heartbeat(),
            read_timeout: config.read_timeout(),
            max_frame_size: config.max_frame_size,
        };
        (conn, pump)
    }

    /// [`open`](Self::open) and start pumping immediately.
    pub fn spawn<S, H, Fut>(
        id: ConnectionId,
        ws: WebSocketStream<S>,
        config: &TransportConfig,
        on_frame: H,
    ) -> Arc<Self>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        H: FnMut(Bytes) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (conn, pump) = Self::open(id, ws, config);
        pump.start(on_frame);
        conn
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Run the teardown sequence. Returns `true` only for the call that
    /// actually performed it.
    pub fn shutdown(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        #[cfg(test)]
        self.teardowns.fetch_add(1, Ordering::SeqCst);
        debug!("Connection {} closing", self.id);
        // Wakes both loops; the write loop closes the queue and the socket.
        self.shutdown.send_replace(true);
        true
    }

    /// Resolves once the connection has been closed by any path.
    pub async fn closed(&self) {
        until_closed(&mut self.shutdown.subscribe()).await;
    }
}

async fn until_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}

impl Transport for Connection {
    fn send_binary(&self, frame: Bytes) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Connection {} send queue full, dropping client", self.id);
                self.shutdown();
                Err(SendError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.shutdown();
                Err(SendError::Closed)
            }
        }
    }

    fn close(&self) {
        self.shutdown();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

async fn read_loop<S, H, Fut>(
    conn: Arc<Connection>,
    mut stream: SplitStream<WebSocketStream<S>>,
    read_timeout: Duration,
    max_frame_size: usize,
    mut on_frame: H,
) where
    S: AsyncRead + AsyncWrite + Unpin,
    H: FnMut(Bytes) -> Fut,
    Fut: Future<Output = ()>,
{
    let mut shutdown = conn.shutdown.subscribe();
    loop {
        // The deadline restarts with every received message, pongs included.
        let next = tokio::select! {
            _ = until_closed(&mut shutdown) => break,
            next = timeout(read_timeout, stream.next()) => next,
        };
        match next {
            Err(_) => {
                debug!("Connection {} read deadline expired", conn.id);
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!("Connection {} read error: {}", conn.id, e);
                break;
            }
            Ok(Some(Ok(Message::Binary(data)))) => {
                if data.len() > max_frame_size {
                    warn!(
                        "Connection {} sent oversized frame ({} > {} bytes)",
                        conn.id,
                        data.len(),
                        max_frame_size
                    );
                    break;
                }
                on_frame(data).await;
            }
            Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(_))) => {}
        }
    }
    conn.shutdown();
}

async fn write_loop<S>(
    conn: Arc<Connection>,
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::Receiver<Bytes>,
    heartbeat: Duration,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut shutdown = conn.shutdown.subscribe();
    let mut ticker = interval_at(Instant::now() + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = until_closed(&mut shutdown) => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                let burst = async {
                    sink.feed(Message::Binary(frame)).await?;
                    while let Ok(next) = rx.try_recv() {
                        sink.feed(Message::Binary(next)).await?;
                    }
                    sink.flush().await
                };
                let result = tokio::select! {
                    _ = until_closed(&mut shutdown) => break,
                    result = burst => result,
                };
                if let Err(e) = result {
                    debug!("Connection {} write error: {}", conn.id, e);
                    break;
                }
                ticker.reset();
            }
            _ = ticker.tick() => {
                if let Err(e) = sink.send(Message::Ping(Bytes::new())).await {
                    debug!("Connection {} ping failed: {}", conn.id, e);
                    break;
                }
            }
        }
    }

    conn.shutdown();
    rx.close();
    // Flush what was queued before the close, e.g. a final DestroyPlayer.
    // Best effort; the peer may already be gone or not reading.
    let _ = timeout(Duration::from_secs(1), async {
        while let Some(frame) = rx.recv().await {
            if sink.feed(Message::Binary(frame)).await.is_err() {
                return;
            }
        }
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{DuplexStream, duplex};
    use tokio_tungstenite::tungstenite::protocol::Role;

    fn config(queue_capacity: usize) -> TransportConfig {
        TransportConfig {
            queue_capacity,
            heartbeat_secs: 30,
            read_timeout_secs: 30,
            max_frame_size: 512,
        }
    }

    async fn pair(buffer: usize) -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (server_io, client_io) = duplex(buffer);
        let server = WebSocketStream::from_raw_socket(server_io, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(client_io, Role::Client, None).await;
        (server, client)
    }

    async fn next_binary(client: &mut WebSocketStream<DuplexStream>) -> Bytes {
        loop {
            match timeout(Duration::from_secs(2), client.next()).await {
                Ok(Some(Ok(Message::Binary(data)))) => return data,
                Ok(Some(Ok(_))) => continue,
                other => panic!("expected a binary frame, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_frames_arrive_in_enqueue_order() {
        let (server, mut client) = pair(64 * 1024).await;
        let conn = Connection::spawn(1, server, &config(16), |_| async {});

        for i in 0u8..5 {
            conn.send_binary(Bytes::from(vec![i])).unwrap();
        }
        for i in 0u8..5 {
            assert_eq!(&next_binary(&mut client).await[..], &[i]);
        }
    }

    #[tokio::test]
    async fn test_full_queue_closes_connection() {
        // Nothing runs between these sends on the current-thread runtime,
        // so the write loop cannot drain the queue.
        let (server, _client) = pair(64).await;
        let conn = Connection::spawn(2, server, &config(4), |_| async {});

        for _ in 0..4 {
            conn.send_binary(Bytes::from_static(b"frame")).unwrap();
        }
        assert_eq!(conn.send_binary(Bytes::from_static(b"frame")), Err(SendError::Full));
        assert!(conn.is_closed());
        assert_eq!(conn.send_binary(Bytes::from_static(b"frame")), Err(SendError::Closed));
        timeout(Duration::from_secs(2), conn.closed()).await.unwrap();
        conn.close();
        assert_eq!(conn.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_tears_down_once() {
        let (server, client) = pair(1024).await;
        let conn = Connection::spawn(3, server, &config(8), |_| async {});

        // Peer disappearing triggers the read-error path at the same time.
        drop(client);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let conn = Arc::clone(&conn);
                tokio::spawn(async move { conn.shutdown() })
            })
            .collect();

        let mut performed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                performed += 1;
            }
        }
        assert!(performed <= 1);
        assert!(conn.is_closed());
        conn.close();
        conn.close();
        timeout(Duration::from_secs(2), conn.closed()).await.unwrap();

        // Let the read loop hit the dropped peer as well.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_handler() {
        let (server, mut client) = pair(4096).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _conn = Connection::spawn(4, server, &config(8), move |frame| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(frame);
            }
        });

        client.send(Message::Binary(Bytes::from_static(b"one"))).await.unwrap();
        client.send(Message::Binary(Bytes::from_static(b"two"))).await.unwrap();
        assert_eq!(&rx.recv().await.unwrap()[..], b"one");
        assert_eq!(&rx.recv().await.unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn test_oversized_frame_closes() {
        let (server, mut client) = pair(4096).await;
        let conn = Connection::spawn(5, server, &config(8), |_| async {});

        client.send(Message::Binary(Bytes::from(vec![0u8; 600]))).await.unwrap();
        timeout(Duration::from_secs(2), conn.closed()).await.unwrap();
    }

    #[tokio::test]
    async fn test_peer_close_closes_connection() {
        let (server, mut client) = pair(4096).await;
        let conn = Connection::spawn(6, server, &config(8), |_| async {});

        client.close(None).await.unwrap();
        timeout(Duration::from_secs(2), conn.closed()).await.unwrap();
        assert_eq!(conn.send_binary(Bytes::from_static(b"late")), Err(SendError::Closed));
        conn.close();
        assert_eq!(conn.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_queued_frames_flushed_on_close() {
        let (server, mut client) = pair(64 * 1024).await;
        let (conn, pump) = Connection::open(9, server, &config(16));
        conn.send_binary(Bytes::from_static(b"early")).unwrap();
        pump.start(|_| async {});

        conn.send_binary(Bytes::from_static(b"last")).unwrap();
        conn.close();
        assert_eq!(&next_binary(&mut client).await[..], b"early");
        assert_eq!(&next_binary(&mut client).await[..], b"last");
        let end = timeout(Duration::from_secs(2), client.next()).await.unwrap();
        assert!(matches!(end, Some(Ok(Message::Close(_))) | None));
    }

    #[tokio::test]
    async fn test_idle_connection_gets_ping() {
        let (server, mut client) = pair(4096).await;
        let mut cfg = config(8);
        cfg.heartbeat_secs = 1;
        let _conn = Connection::spawn(7, server, &cfg, |_| async {});

        let msg = timeout(Duration::from_secs(3), client.next()).await.unwrap();
        assert!(matches!(msg, Some(Ok(Message::Ping(_)))));
    }

    #[tokio::test]
    async fn test_silent_peer_hits_read_deadline() {
        let (server, _client) = pair(4096).await;
        let mut cfg = config(8);
        cfg.read_timeout_secs = 1;
        let conn = Connection::spawn(8, server, &cfg, |_| async {});

        timeout(Duration::from_secs(3), conn.closed()).await.unwrap();
    }
}
