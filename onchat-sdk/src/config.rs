//! Client configuration.

use std::time::Duration;

use rand::Rng;

/// Backend endpoint used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "wss://chat.longapp.site/chat/chat";

/// Configuration for a [`SocketClient`](crate::SocketClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL (ws:// or wss://). Fixed for the client's lifetime.
    pub endpoint: String,
    /// Automatic reconnection after an unexpected close.
    pub reconnect: ReconnectPolicy,
    /// Bound on envelopes held while disconnected.
    pub queue: QueuePolicy,
    /// How long [`SocketClient::request`](crate::SocketClient::request) waits for a matching frame.
    pub request_timeout: Duration,
    /// Limit on one connection attempt, handshake included. An attempt that
    /// runs over counts as failed.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectPolicy::default(),
            queue: QueuePolicy::default(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn queue(mut self, policy: QueuePolicy) -> Self {
        self.queue = policy;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Reconnection schedule.
///
/// The default is the backend's historical behaviour: up to 5 consecutive
/// attempts, a fixed 3 second pause before each. Setting `backoff_factor`
/// above 1.0 turns it into capped exponential backoff, and `jitter` spreads
/// clients out when a backend restart drops all of them at once.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Consecutive automatic attempts before giving up. 0 disables reconnect.
    pub max_attempts: u32,
    /// Pause before the first attempt.
    pub delay: Duration,
    /// Multiplier applied per further attempt. 1.0 keeps the delay fixed.
    pub backoff_factor: f64,
    /// Upper bound on the pause when backing off.
    pub max_delay: Duration,
    /// Add up to 25% random extra delay.
    pub jitter: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(3000),
            backoff_factor: 1.0,
            max_delay: Duration::from_secs(30),
            jitter: false,
        }
    }
}

impl ReconnectPolicy {
    /// No automatic reconnection at all.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn exponential(mut self, factor: f64, max_delay: Duration) -> Self {
        self.backoff_factor = factor;
        self.max_delay = max_delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    /// Pause before attempt number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_ms = self.delay.as_millis() as f64;
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let mut delay_ms = base_ms * self.backoff_factor.max(1.0).powi(exponent);
        if self.backoff_factor > 1.0 {
            delay_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        }
        let mut delay_ms = delay_ms as u64;
        if self.jitter {
            let range = delay_ms / 4;
            if range > 0 {
                delay_ms += rand::thread_rng().gen_range(0..=range);
            }
        }
        Duration::from_millis(delay_ms)
    }
}

/// Bound on the outbound queue.
///
/// When `capacity` is reached the oldest queued envelope is dropped. With
/// `max_age` set, envelopes older than that are dropped at flush time
/// instead of being sent late.
#[derive(Debug, Clone)]
pub struct QueuePolicy {
    pub capacity: usize,
    pub max_age: Option<Duration>,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_age: None,
        }
    }
}

impl QueuePolicy {
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn max_age(mut self, age: Duration) -> Self {
        self.max_age = Some(age);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_backend_behaviour() {
        let config = ClientConfig::default();
        assert_eq!(config.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.reconnect.delay, Duration::from_secs(3));
        assert_eq!(config.queue.capacity, 256);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.queue.max_age.is_none());
    }

    #[test]
    fn fixed_delay_does_not_grow() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(3));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(3));
    }

    #[test]
    fn exponential_delay_is_capped() {
        let policy = ReconnectPolicy::default()
            .delay(Duration::from_secs(1))
            .exponential(2.0, Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = ReconnectPolicy::default()
            .delay(Duration::from_millis(1000))
            .jitter(true);
        for attempt in 1..20 {
            let d = policy.delay_for_attempt(attempt);
            assert!(d >= Duration::from_millis(1000));
            assert!(d <= Duration::from_millis(1250));
        }
    }

    #[test]
    fn queue_capacity_never_zero() {
        assert_eq!(QueuePolicy::default().capacity(0).capacity, 1);
    }
}
