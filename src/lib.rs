//! Client SDK for the storefront realtime notification channel.
//!
//! The crate is organized by concern:
//! - `realtime`: auto-reconnecting websocket channel, event registry, typed
//!   events and wire protocol.
//! - `retry`: reconnect policy and timeout utilities.
//!
//! ```no_run
//! use secrecy::SecretString;
//! use storefront_sdk::realtime::client::ChannelClient;
//! use storefront_sdk::realtime::config::ChannelConfig;
//!
//! # async fn run() -> Result<(), storefront_sdk::realtime::client::ChannelError> {
//! let client = ChannelClient::new(ChannelConfig::notifications("shop.example"))?;
//! client.on("wishlist", |data| println!("wishlist match: {data}"));
//! client.connect(SecretString::new("access-token".to_string()));
//! # Ok(())
//! # }
//! ```

/// Realtime channel client, protocol types and event feed.
pub mod realtime;
/// Reconnect policy and timeout helpers.
pub mod retry;
