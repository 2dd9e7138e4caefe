//! Typed event feed on top of the channel client.
//!
//! `EventFeed` listens to every lifecycle and storefront event type, converts
//! payloads into [`ChannelEvent`] values and keeps an unread-notification
//! counter for badge rendering.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::realtime::client::ChannelClient;
use crate::realtime::listeners::{ListenerId, ListenerRegistry};
use crate::realtime::proto::{
    RoomMessage, TypingNotice, CHAT_EVENT, CONNECTED_EVENT, DISCONNECTED_EVENT, ERROR_EVENT,
    NOTIFICATION_EVENT, ORDER_EVENT, PONG_EVENT, ROOM_MESSAGE_EVENT, TYPING_EVENT,
    WISHLIST_EVENT,
};

const FEED_EVENT_TYPES: [&str; 10] = [
    CONNECTED_EVENT,
    DISCONNECTED_EVENT,
    ERROR_EVENT,
    NOTIFICATION_EVENT,
    CHAT_EVENT,
    ORDER_EVENT,
    WISHLIST_EVENT,
    PONG_EVENT,
    ROOM_MESSAGE_EVENT,
    TYPING_EVENT,
];

/// Event yielded by [`EventFeed::recv`].
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    /// Transport failure; payload carries a `message` field.
    Error(Value),
    /// Site notification pushed to the signed-in user.
    Notification(Value),
    /// Chat activity summary on the notifications route.
    Chat(Value),
    /// Order status change.
    Order(Value),
    /// A new listing matched one of the user's wishlists.
    Wishlist(Value),
    Pong,
    /// Message posted in the joined chat room.
    RoomMessage(RoomMessage),
    /// The other room member is typing.
    Typing(TypingNotice),
}

impl ChannelEvent {
    /// Maps a dispatched event into its typed form.
    ///
    /// Returns `None` for unknown event types and for room payloads that do
    /// not match their expected shape.
    pub fn from_event(event_type: &str, payload: &Value) -> Option<Self> {
        let event = match event_type {
            CONNECTED_EVENT => Self::Connected,
            DISCONNECTED_EVENT => Self::Disconnected,
            ERROR_EVENT => Self::Error(payload.clone()),
            NOTIFICATION_EVENT => Self::Notification(payload.clone()),
            CHAT_EVENT => Self::Chat(payload.clone()),
            ORDER_EVENT => Self::Order(payload.clone()),
            WISHLIST_EVENT => Self::Wishlist(payload.clone()),
            PONG_EVENT => Self::Pong,
            ROOM_MESSAGE_EVENT => match serde_json::from_value(payload.clone()) {
                Ok(message) => Self::RoomMessage(message),
                Err(err) => {
                    warn!(event = "feed_payload_rejected", event_type, error = %err);
                    return None;
                }
            },
            TYPING_EVENT => match serde_json::from_value(payload.clone()) {
                Ok(notice) => Self::Typing(notice),
                Err(err) => {
                    warn!(event = "feed_payload_rejected", event_type, error = %err);
                    return None;
                }
            },
            _ => return None,
        };
        Some(event)
    }
}

/// Typed view over a [`ChannelClient`]'s events.
///
/// Dropping the feed removes its listeners from the client.
#[derive(Debug)]
pub struct EventFeed {
    registry: Arc<ListenerRegistry>,
    registrations: Vec<(&'static str, ListenerId)>,
    receiver: mpsc::UnboundedReceiver<ChannelEvent>,
    unread_notifications: u64,
}

impl EventFeed {
    /// Starts collecting events from `client`.
    ///
    /// Events dispatched before the feed is attached are not replayed.
    pub fn attach(client: &ChannelClient) -> Self {
        let registry = Arc::clone(client.listeners());
        let (tx, receiver) = mpsc::unbounded_channel();

        let registrations = FEED_EVENT_TYPES
            .iter()
            .map(|&event_type| {
                let tx = tx.clone();
                let id = registry.on(event_type, move |payload| {
                    if let Some(event) = ChannelEvent::from_event(event_type, payload) {
                        let _ = tx.send(event);
                    }
                });
                (event_type, id)
            })
            .collect();

        Self {
            registry,
            registrations,
            receiver,
            unread_notifications: 0,
        }
    }

    /// Receives the next typed event.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        let event = self.receiver.recv().await?;
        if matches!(event, ChannelEvent::Notification(_)) {
            self.unread_notifications += 1;
        }
        Some(event)
    }

    /// Notifications received through this feed and not yet marked read.
    pub fn unread_notifications(&self) -> u64 {
        self.unread_notifications
    }

    pub fn mark_read(&mut self) {
        self.unread_notifications = self.unread_notifications.saturating_sub(1);
    }

    pub fn mark_all_read(&mut self) {
        self.unread_notifications = 0;
    }
}

impl Drop for EventFeed {
    fn drop(&mut self) {
        for (event_type, id) in self.registrations.drain(..) {
            self.registry.off(event_type, id);
        }
    }
}
