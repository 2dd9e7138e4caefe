//! Realtime channel modules.
//!
//! - `client`: connection state machine, heartbeat and reconnect handling.
//! - `config`: connection target and timing options.
//! - `listeners`: ordered listener registry with fault-isolated dispatch.
//! - `proto`: wire frames shared with the storefront channel service.
//! - `session`: typed event feed with unread-notification tracking.
//! - `transport`: websocket connector seam.

/// Channel client and lifecycle state.
pub mod client;
/// Channel configuration and defaults.
pub mod config;
/// Event listener registry.
pub mod listeners;
/// Channel wire messages.
pub mod proto;
/// Typed event feed.
pub mod session;
/// Transport connector trait and the websocket implementation.
pub mod transport;
