//! Configuration for the stream manager and its background tasks.

use std::time::Duration;

use depthcast_session::SessionConfig;
use depthcast_tick::TickPolicy;
use depthcast_transport::IceServer;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Fixed-delay polling used while waiting for a device to report its
/// streams as active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of status checks. At least 1.
    pub attempts: u32,
    /// Sleep between two checks.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

/// Settings for the per-session point-cloud publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Publish attempts per second. Default: 30.
    pub tick_rate_hz: u32,
    /// What the publish loop does after a late tick. Default: skip.
    #[serde(default)]
    pub tick_policy: TickPolicy,
    /// Maximum vertices per data-channel message. Default: 3000.
    pub chunk_size: usize,
    /// Vertex count of the fallback message sent when a frame fails to
    /// serialize. Default: 1000.
    pub fallback_vertex_limit: usize,
    /// Minimum time between heartbeats. Default: 30 s.
    pub heartbeat_interval: Duration,
    /// Pause before retrying a transiently failed send. Default: 1 s.
    pub retry_backoff: Duration,
    /// Label of the data channel opened for depth and point-cloud viewers.
    pub channel_label: String,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 30,
            tick_policy: TickPolicy::Skip,
            chunk_size: 3000,
            fallback_vertex_limit: 1000,
            heartbeat_interval: Duration::from_secs(30),
            retry_backoff: Duration::from_secs(1),
            channel_label: "pointcloud".to_string(),
        }
    }
}

/// Everything the [`StreamManager`](crate::StreamManager) needs to know.
///
/// Load it from anywhere serde can read, then pass it through
/// [`validated`](Self::validated) (the manager does this on construction).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Cap on sessions whose answer has been applied. Default: 10.
    pub max_concurrent_sessions: usize,
    /// Maximum session age. Default: 1 hour.
    pub session_timeout: Duration,
    /// Maximum time without viewer activity. Default: 30 minutes.
    pub idle_timeout: Duration,
    /// Time between reaper sweeps. Default: 60 s.
    pub reaper_interval: Duration,
    /// Device activation polling for new sessions. Default: 5 × 500 ms.
    pub activation_retry: RetryPolicy,
    /// Device activation polling for stream switches. Default: 5 × 200 ms.
    pub switch_retry: RetryPolicy,
    /// Deadline for a whole stream switch, up to its commit. Default: 10 s.
    pub switch_timeout: Duration,
    /// STUN/TURN servers handed to every new connection.
    pub ice_servers: Vec<IceServer>,
    pub streamer: StreamerConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let sessions = SessionConfig::default();
        Self {
            max_concurrent_sessions: 10,
            session_timeout: sessions.session_timeout,
            idle_timeout: sessions.idle_timeout,
            reaper_interval: Duration::from_secs(60),
            activation_retry: RetryPolicy::new(5, Duration::from_millis(500)),
            switch_retry: RetryPolicy::new(5, Duration::from_millis(200)),
            switch_timeout: Duration::from_secs(10),
            ice_servers: Vec::new(),
            streamer: StreamerConfig::default(),
        }
    }
}

impl ManagerConfig {
    const MIN_REAPER_INTERVAL: Duration = Duration::from_secs(1);

    /// Clamp values that would stall or break the manager.
    pub fn validated(mut self) -> Self {
        if self.max_concurrent_sessions == 0 {
            warn!("max_concurrent_sessions is 0, clamping to 1");
            self.max_concurrent_sessions = 1;
        }
        if self.reaper_interval < Self::MIN_REAPER_INTERVAL {
            warn!(
                interval_ms = self.reaper_interval.as_millis() as u64,
                "reaper interval too short, clamping to 1 s"
            );
            self.reaper_interval = Self::MIN_REAPER_INTERVAL;
        }
        self.activation_retry.attempts = self.activation_retry.attempts.max(1);
        self.switch_retry.attempts = self.switch_retry.attempts.max(1);
        if self.switch_timeout.is_zero() {
            warn!("switch_timeout is zero, using the default");
            self.switch_timeout = Duration::from_secs(10);
        }

        let streamer = &mut self.streamer;
        streamer.chunk_size = streamer.chunk_size.max(1);
        streamer.fallback_vertex_limit = streamer.fallback_vertex_limit.clamp(1, streamer.chunk_size);
        if streamer.tick_rate_hz == 0 {
            warn!("streamer tick rate is 0, using 1 Hz");
            streamer.tick_rate_hz = 1;
        }
        if streamer.channel_label.is_empty() {
            streamer.channel_label = StreamerConfig::default().channel_label;
        }
        self
    }

    /// The part of this config the session registry cares about.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            session_timeout: self.session_timeout,
            idle_timeout: self.idle_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.max_concurrent_sessions, 10);
        assert_eq!(config.session_timeout, Duration::from_secs(3600));
        assert_eq!(config.idle_timeout, Duration::from_secs(1800));
        assert_eq!(config.activation_retry, RetryPolicy::new(5, Duration::from_millis(500)));
        assert_eq!(config.switch_retry, RetryPolicy::new(5, Duration::from_millis(200)));
        assert_eq!(config.streamer.chunk_size, 3000);
        assert_eq!(config.streamer.channel_label, "pointcloud");
    }

    #[test]
    fn test_validated_clamps_zero_values() {
        let mut config = ManagerConfig::default();
        config.max_concurrent_sessions = 0;
        config.reaper_interval = Duration::ZERO;
        config.activation_retry.attempts = 0;
        config.streamer.chunk_size = 0;
        config.streamer.tick_rate_hz = 0;

        let config = config.validated();

        assert_eq!(config.max_concurrent_sessions, 1);
        assert_eq!(config.reaper_interval, Duration::from_secs(1));
        assert_eq!(config.activation_retry.attempts, 1);
        assert_eq!(config.streamer.chunk_size, 1);
        assert_eq!(config.streamer.fallback_vertex_limit, 1);
        assert_eq!(config.streamer.tick_rate_hz, 1);
    }

    #[test]
    fn test_validated_keeps_sane_config() {
        let config = ManagerConfig::default().validated();
        assert_eq!(config.streamer.fallback_vertex_limit, 1000);
        assert_eq!(config.switch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_streamer_tick_policy_reads_kebab_case() {
        let mut value = serde_json::to_value(StreamerConfig::default()).unwrap();
        assert_eq!(value["tick_policy"], "skip");

        value["tick_policy"] = "catch-up".into();
        let config: StreamerConfig = serde_json::from_value(value).unwrap();
        assert_eq!(config.tick_policy, TickPolicy::CatchUp);
    }

    #[test]
    fn test_session_config_carries_timeouts() {
        let mut config = ManagerConfig::default();
        config.idle_timeout = Duration::from_secs(5);
        assert_eq!(config.session_config().idle_timeout, Duration::from_secs(5));
    }
}
