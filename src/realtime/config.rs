//! Connection target and timing configuration for the realtime channel.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::realtime::client::ChannelError;
use crate::retry::ReconnectPolicy;

/// Default values used by [`ChannelConfig`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChannelDefaults;

impl ChannelDefaults {
    /// Host used by `ChannelConfig::default()`.
    pub const HOST: &'static str = "localhost";
    /// Port of the channel service.
    pub const PORT: u16 = 8000;
    /// Per-user notification route.
    pub const NOTIFICATIONS_PATH: &'static str = "/ws/notifications/";
    /// Period of the `ping` heartbeat.
    pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(5000);
    /// Wait before each automatic reconnect.
    pub const RECONNECT_DELAY: Duration = ReconnectPolicy::DEFAULT_DELAY;
    /// Automatic reconnects allowed before giving up.
    pub const MAX_RECONNECT_ATTEMPTS: u32 = ReconnectPolicy::DEFAULT_MAX_ATTEMPTS;
    /// Upper bound on one transport open.
    pub const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Where and how the channel connects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ChannelConfig {
    /// Application host name, without scheme or port.
    pub host: String,
    /// Service port, `8000` by default.
    pub port: u16,
    /// Service path, including leading and trailing slashes.
    pub path: String,
    /// Uses `wss` instead of `ws` when set.
    pub secure: bool,
    /// Period of the `ping` heartbeat while connected.
    pub heartbeat_interval: Duration,
    /// Upper bound on a single transport open attempt.
    pub open_timeout: Duration,
    /// Automatic reconnect budget and delay.
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    /// Config for the per-user notification route on `host`.
    pub fn notifications(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: ChannelDefaults::PORT,
            path: ChannelDefaults::NOTIFICATIONS_PATH.to_string(),
            secure: false,
            heartbeat_interval: ChannelDefaults::HEARTBEAT_INTERVAL,
            open_timeout: ChannelDefaults::OPEN_TIMEOUT,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Config for a single chat room route on `host`.
    pub fn chat_room(host: impl Into<String>, room_id: u64) -> Self {
        Self::notifications(host).with_path(format!("/ws/chat/{room_id}/"))
    }

    /// Sets the service port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the service path; it must start with `/`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Switches between `ws` and `wss`.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Sets the heartbeat period.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the bound on a single open attempt.
    pub fn with_open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Replaces the automatic reconnect policy.
    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Connection target without the credential. Safe to log.
    pub fn endpoint(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        format!("{scheme}://{}:{}{}", self.host, self.port, self.path)
    }

    /// Full connection target carrying the bearer credential in the query.
    pub(crate) fn connection_url(&self, credential: &SecretString) -> String {
        format!(
            "{}?token={}",
            self.endpoint(),
            urlencoding::encode(credential.expose_secret())
        )
    }

    /// Checks that the config describes a reachable target with live timers.
    pub fn validate(&self) -> Result<(), ChannelError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ChannelError::InvalidConfig("host must not be empty".to_string()));
        }
        if host.contains("://") || host.contains('/') {
            return Err(ChannelError::InvalidConfig(format!(
                "host must be a bare host name, got {host:?}"
            )));
        }
        if !self.path.starts_with('/') {
            return Err(ChannelError::InvalidConfig(
                "path must start with '/'".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ChannelError::InvalidConfig(
                "heartbeat interval must be > 0".to_string(),
            ));
        }
        if self.open_timeout.is_zero() {
            return Err(ChannelError::InvalidConfig(
                "open timeout must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::notifications(ChannelDefaults::HOST)
    }
}
