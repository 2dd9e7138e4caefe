//! Transport seam between the channel state machine and the websocket.

use std::pin::Pin;

use futures_util::future::BoxFuture;
use futures_util::{FutureExt, Sink, Stream};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use crate::realtime::client::ChannelError;

/// Bidirectional websocket message pipe.
pub trait Socket:
    Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send
{
}

impl<T> Socket for T where
    T: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Send + ?Sized
{
}

pub type BoxSocket = Pin<Box<dyn Socket>>;

/// Opens transport connections for the channel client.
///
/// `url` already carries the credential and must not be logged.
pub trait Connector: Send + Sync + 'static {
    fn open(&self, url: String) -> BoxFuture<'static, Result<BoxSocket, ChannelError>>;
}

/// Production connector backed by `tokio-tungstenite`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn open(&self, url: String) -> BoxFuture<'static, Result<BoxSocket, ChannelError>> {
        async move {
            let (socket, _response) = connect_async(url).await?;
            Ok(Box::pin(socket) as BoxSocket)
        }
        .boxed()
    }
}
