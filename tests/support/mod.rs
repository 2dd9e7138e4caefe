#![allow(dead_code)]

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures_util::future::{self, BoxFuture};
use futures_util::{FutureExt, Sink, Stream};
use secrecy::SecretString;
use storefront_sdk::realtime::client::{ChannelClient, ChannelError};
use storefront_sdk::realtime::config::ChannelConfig;
use storefront_sdk::realtime::transport::{BoxSocket, Connector};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

pub const TEST_HOST: &str = "shop.test";
const WAIT: Duration = Duration::from_secs(120);

pub fn secret(token: &str) -> SecretString {
    SecretString::new(token.to_string())
}

pub fn test_client(connector: MockConnector) -> ChannelClient {
    ChannelClient::with_connector(ChannelConfig::notifications(TEST_HOST), connector)
        .expect("build channel client")
}

/// Awaits `future`, failing the test if it does not finish in time.
pub async fn within<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    timeout(WAIT, future)
        .await
        .expect("timed out waiting for channel activity")
}

/// Server side of one in-memory connection.
pub struct MockPeer {
    pub url: String,
    pub to_client: mpsc::UnboundedSender<Result<Message, WsError>>,
    pub from_client: mpsc::UnboundedReceiver<Message>,
}

impl MockPeer {
    pub fn push_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(Message::Text(text.to_string())));
    }

    pub fn push(&self, message: Message) {
        let _ = self.to_client.send(Ok(message));
    }

    /// Next text frame written by the client, or `None` once the client
    /// dropped its socket.
    pub async fn next_text(&mut self) -> Option<String> {
        loop {
            match self.from_client.recv().await? {
                Message::Text(text) => return Some(text),
                _ => continue,
            }
        }
    }
}

struct MockSocket {
    inbound: mpsc::UnboundedReceiver<Result<Message, WsError>>,
    outbound: mpsc::UnboundedSender<Message>,
}

impl Stream for MockSocket {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inbound.poll_recv(cx)
    }
}

impl Sink<Message> for MockSocket {
    type Error = WsError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: Message) -> Result<(), WsError> {
        self.outbound
            .send(item)
            .map_err(|_| WsError::ConnectionClosed)
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        Poll::Ready(Ok(()))
    }
}

/// Connector handing out in-memory sockets.
#[derive(Clone)]
pub struct MockConnector {
    peers: mpsc::UnboundedSender<MockPeer>,
    refuse: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

/// Test-side control over a [`MockConnector`].
pub struct MockServer {
    peers: mpsc::UnboundedReceiver<MockPeer>,
    refuse: Arc<AtomicBool>,
    stall: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

pub fn mock_transport() -> (MockConnector, MockServer) {
    let (peers_tx, peers_rx) = mpsc::unbounded_channel();
    let refuse = Arc::new(AtomicBool::new(false));
    let stall = Arc::new(AtomicBool::new(false));
    let opens = Arc::new(AtomicUsize::new(0));
    (
        MockConnector {
            peers: peers_tx,
            refuse: Arc::clone(&refuse),
            stall: Arc::clone(&stall),
            opens: Arc::clone(&opens),
        },
        MockServer {
            peers: peers_rx,
            refuse,
            stall,
            opens,
        },
    )
}

impl MockServer {
    /// Makes every following open attempt fail immediately.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Makes every following open attempt hang forever.
    pub fn stall_connections(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    /// Number of open attempts seen so far, successful or not.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub async fn accept(&mut self) -> MockPeer {
        within(self.peers.recv())
            .await
            .expect("connector dropped before a connection was opened")
    }
}

impl Connector for MockConnector {
    fn open(&self, url: String) -> BoxFuture<'static, Result<BoxSocket, ChannelError>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        if self.stall.load(Ordering::SeqCst) {
            return future::pending::<Result<BoxSocket, ChannelError>>().boxed();
        }
        if self.refuse.load(Ordering::SeqCst) {
            return async { Err::<BoxSocket, _>(ChannelError::WebSocket(WsError::ConnectionClosed)) }
                .boxed();
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let _ = self.peers.send(MockPeer {
            url,
            to_client,
            from_client,
        });
        let socket: BoxSocket = Box::pin(MockSocket { inbound, outbound });
        async move { Ok::<_, ChannelError>(socket) }.boxed()
    }
}
