//! The reconnecting transport itself: owns the driver task, exposes
//! `send`/`close`/`ready_state`, and a `subscribe()` broadcast of
//! cross-isolate-safe event payloads (§4.1, §9 "events carry only plain
//! data").

use crate::backoff::{next_delay, TransportOpts};
use crate::socket::{Connector, Socket, WsConnector};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;

pub use crate::socket::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl ReadyState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// Plain-data event payload. No host-only handles, so it survives a
/// cross-isolate channel send (§9: "Cross-unit messaging... events carry
/// only plain data").
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message {
        data: Vec<u8>,
        origin: String,
        last_event_id: String,
        ports: Vec<()>,
        source: Option<String>,
    },
    Close {
        code: u16,
        reason: String,
        was_clean: bool,
    },
    Error {
        message: String,
    },
}

enum Outbound {
    Data(Message),
    Close(u16, String),
}

pub struct ReconnectingTransport {
    state: Arc<AtomicU8>,
    closed_by_user: Arc<AtomicBool>,
    events: broadcast::Sender<TransportEvent>,
    outbound: mpsc::UnboundedSender<Outbound>,
    driver: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for ReconnectingTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectingTransport")
            .field("ready_state", &self.ready_state())
            .finish()
    }
}

impl ReconnectingTransport {
    pub fn new(url: impl Into<String>, opts: TransportOpts) -> Self {
        Self::with_connector(url, opts, Arc::new(WsConnector))
    }

    pub fn with_connector(
        url: impl Into<String>,
        opts: TransportOpts,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let url = url.into();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let closed_by_user = Arc::new(AtomicBool::new(false));
        let (events_tx, _rx) = broadcast::channel(1024);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let driver = tokio::spawn(run_driver(
            url,
            opts,
            connector,
            state.clone(),
            events_tx.clone(),
            outbound_rx,
            closed_by_user.clone(),
        ));

        Self {
            state,
            closed_by_user,
            events: events_tx,
            outbound: outbound_tx,
            driver,
        }
    }

    pub fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    pub fn send(&self, bytes: Vec<u8>) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(Outbound::Data(Message::Binary(bytes.into())))
            .map_err(|_| TransportError::Io("driver task gone".into()))
    }

    /// Prevents further reconnects. Idempotent.
    pub fn close(&self, code: Option<u16>, reason: Option<String>) {
        self.closed_by_user.store(true, Ordering::SeqCst);
        self.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Close(
            code.unwrap_or(1000),
            reason.unwrap_or_default(),
        ));
    }
}

impl Drop for ReconnectingTransport {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_driver(
    url: String,
    opts: TransportOpts,
    connector: Arc<dyn Connector>,
    state: Arc<AtomicU8>,
    events: broadcast::Sender<TransportEvent>,
    mut outbound_rx: mpsc::UnboundedReceiver<Outbound>,
    closed_by_user: Arc<AtomicBool>,
) {
    let mut retry_count: u32 = 0;

    loop {
        if closed_by_user.load(Ordering::SeqCst) {
            break;
        }

        state.store(ReadyState::Connecting as u8, Ordering::SeqCst);
        tracing::debug!(url = %url, attempt = retry_count, "connecting");

        let connect_fut = connector.connect(url.clone());
        let connect_result = timeout(Duration::from_millis(opts.connection_timeout_ms), connect_fut).await;

        let socket = match connect_result {
            Ok(Ok(socket)) => Some(socket),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "connect failed");
                let _ = events.send(TransportEvent::Error {
                    message: e.to_string(),
                });
                None
            }
            Err(_) => {
                tracing::warn!("connect timed out");
                let _ = events.send(TransportEvent::Error {
                    message: "connection timeout".into(),
                });
                None
            }
        };

        let was_clean = match socket {
            Some(socket) => {
                state.store(ReadyState::Open as u8, Ordering::SeqCst);
                retry_count = 0;
                tracing::debug!("connected");
                let _ = events.send(TransportEvent::Open);
                drive_open_socket(socket, &events, &mut outbound_rx, &closed_by_user).await
            }
            None => false,
        };

        state.store(ReadyState::Closed as u8, Ordering::SeqCst);
        let _ = events.send(TransportEvent::Close {
            code: if was_clean { 1000 } else { 1006 },
            reason: String::new(),
            was_clean,
        });

        if closed_by_user.load(Ordering::SeqCst) {
            break;
        }

        let delay = next_delay(retry_count, &opts);
        retry_count = retry_count.saturating_add(1);
        tracing::debug!(delay_ms = delay.as_millis() as u64, "scheduling reconnect");
        tokio::time::sleep(delay).await;
    }

    state.store(ReadyState::Closed as u8, Ordering::SeqCst);
}

/// Drives one live connection until it closes (locally or remotely).
/// Returns whether the close was clean.
async fn drive_open_socket(
    mut socket: Box<dyn Socket>,
    events: &broadcast::Sender<TransportEvent>,
    outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
    closed_by_user: &Arc<AtomicBool>,
) -> bool {
    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                match outbound {
                    Some(Outbound::Data(msg)) => {
                        if let Err(e) = socket.send(msg).await {
                            tracing::warn!(error = %e, "send failed");
                            let _ = events.send(TransportEvent::Error { message: e.to_string() });
                            return false;
                        }
                    }
                    Some(Outbound::Close(code, reason)) => {
                        let frame = Message::Close(Some(tokio_tungstenite::tungstenite::protocol::CloseFrame {
                            code: tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(code),
                            reason: reason.into(),
                        }));
                        let _ = socket.send(frame).await;
                        return true;
                    }
                    None => {
                        // Transport dropped; force-close is implicit.
                        closed_by_user.store(true, Ordering::SeqCst);
                        return true;
                    }
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((1000, String::new()));
                        let _ = events.send(TransportEvent::Close { code, reason, was_clean: true });
                        return true;
                    }
                    Some(Ok(Message::Text(text))) => {
                        let _ = events.send(TransportEvent::Message {
                            data: text.as_bytes().to_vec(),
                            origin: String::new(),
                            last_event_id: String::new(),
                            ports: Vec::new(),
                            source: None,
                        });
                    }
                    Some(Ok(Message::Binary(data))) => {
                        let _ = events.send(TransportEvent::Message {
                            data: data.to_vec(),
                            origin: String::new(),
                            last_event_id: String::new(),
                            ports: Vec::new(),
                            source: None,
                        });
                    }
                    Some(Ok(_)) => {
                        // Ping/Pong/Frame: no user-visible event.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "recv failed");
                        let _ = events.send(TransportEvent::Error { message: e.to_string() });
                        return false;
                    }
                    None => {
                        return false;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::BoxFuture;
    use std::sync::Mutex;

    struct FlakyConnector {
        fail_times: Mutex<u32>,
    }

    impl Connector for FlakyConnector {
        fn connect(&self, _url: String) -> BoxFuture<'static, Result<Box<dyn Socket>, TransportError>> {
            let mut guard = self.fail_times.lock().unwrap();
            if *guard > 0 {
                *guard -= 1;
                Box::pin(async { Err(TransportError::Io("refused".into())) })
            } else {
                Box::pin(async { Ok(Box::new(NullSocket) as Box<dyn Socket>) })
            }
        }
    }

    struct NullSocket;
    impl Socket for NullSocket {
        fn send(&mut self, _msg: Message) -> BoxFuture<'_, Result<(), TransportError>> {
            Box::pin(async { Ok(()) })
        }
        fn recv(&mut self) -> BoxFuture<'_, Option<Result<Message, TransportError>>> {
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_failures_and_then_opens() {
        let connector = Arc::new(FlakyConnector {
            fail_times: Mutex::new(2),
        });
        let transport = ReconnectingTransport::with_connector(
            "wss://example.invalid",
            TransportOpts::default(),
            connector,
        );
        let mut rx = transport.subscribe();

        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Error { .. }));
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Close { was_clean: false, .. }));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Error { .. }));
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Close { was_clean: false, .. }));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Open));
        assert_eq!(transport.ready_state(), ReadyState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn close_prevents_further_open_events() {
        let connector = Arc::new(FlakyConnector {
            fail_times: Mutex::new(0),
        });
        let transport = ReconnectingTransport::with_connector(
            "wss://example.invalid",
            TransportOpts::default(),
            connector,
        );
        let mut rx = transport.subscribe();
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(matches!(rx.recv().await.unwrap(), TransportEvent::Open));

        transport.close(None, None);
        tokio::time::advance(Duration::from_millis(10)).await;
        let close_event = rx.recv().await.unwrap();
        assert!(matches!(close_event, TransportEvent::Close { was_clean: true, .. }));

        tokio::time::advance(Duration::from_secs(60)).await;
        // No further Open events should be pending.
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.ready_state(), ReadyState::Closed);
    }

    #[test]
    fn send_on_unopened_transport_fails_not_open() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let connector = Arc::new(FlakyConnector {
                fail_times: Mutex::new(1_000_000),
            });
            let transport = ReconnectingTransport::with_connector(
                "wss://example.invalid",
                TransportOpts::default(),
                connector,
            );
            assert_eq!(transport.send(vec![1, 2, 3]), Err(TransportError::NotOpen));
        });
    }
}
