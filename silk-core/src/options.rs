//! Node configuration options.
//!
//! This module provides the constructor-only configuration surface for a
//! node, in the same builder style as libzmq-flavored socket options:
//! everything has a sane default, and callers override only what they need.

use std::collections::HashSet;
use std::time::Duration;

use crate::retry::RetryProfile;

/// Keepalive cadence and failure-detection timing for one node.
///
/// # Examples
///
/// ```
/// use silk_core::options::KeepaliveOptions;
/// use std::time::Duration;
///
/// let ka = KeepaliveOptions::default().with_period(Duration::from_secs(2));
/// assert_eq!(ka.period, Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct KeepaliveOptions {
    /// Interval between `_ka` broadcasts.
    pub period: Duration,
    /// Number of missed periods tolerated before a peer is considered dead.
    ///
    /// A peer is pruned once `now > lastSeenDeadline`, where
    /// `lastSeenDeadline = lastSeen + missed_periods * period`.
    pub missed_periods: u32,
    /// How often the prune timer sweeps the cluster view for expired peers.
    pub prune_interval: Duration,
}

impl Default for KeepaliveOptions {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            missed_periods: 3,
            prune_interval: Duration::from_secs(1),
        }
    }
}

impl KeepaliveOptions {
    /// Override the keepalive broadcast period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Override the number of missed periods tolerated before eviction.
    #[must_use]
    pub const fn with_missed_periods(mut self, missed_periods: u32) -> Self {
        self.missed_periods = missed_periods;
        self
    }

    /// Override how often the prune timer sweeps the cluster view.
    #[must_use]
    pub const fn with_prune_interval(mut self, prune_interval: Duration) -> Self {
        self.prune_interval = prune_interval;
        self
    }

    /// The deadline after which a peer last seen at `period` ago is pruned.
    #[must_use]
    pub fn deadline(&self) -> Duration {
        self.period * self.missed_periods
    }
}

/// Node-wide configuration, supplied once at construction.
///
/// # Examples
///
/// ```
/// use silk_core::options::NodeOptions;
///
/// let opts = NodeOptions::new("tcp://127.0.0.1:5000", "tcp://127.0.0.1:5001")
///     .with_name("node-a")
///     .with_ack_all(true);
/// assert_eq!(opts.router_endpoint, "tcp://127.0.0.1:5000");
/// ```
#[derive(Debug, Clone)]
pub struct NodeOptions {
    /// Router endpoint this node binds for direct and handshake traffic.
    pub router_endpoint: String,
    /// Publish endpoint this node binds for broadcasts and keepalives.
    pub pub_endpoint: String,
    /// Optional human-readable name advertised in this node's descriptor.
    pub name: Option<String>,
    /// Keepalive and failure-detection timing.
    pub keepalive: KeepaliveOptions,
    /// Default reply policy applied to a type registered via `on` without
    /// an explicit override.
    pub default_message_policy_ms: u64,
    /// Default retry attempt budget applied the same way.
    pub default_message_attempts: u32,
    /// Retry profile governing pending-ack backoff.
    pub retry_profile: RetryProfile,
    /// Whether non-protocol inbound messages are acknowledged by default.
    pub ack_all: bool,
    /// Message types exempted from `ack_all` (never acknowledged), or — when
    /// `ack_all` is false — the only types that *are* acknowledged.
    pub ack_only: HashSet<String>,
    /// How long the publish socket buffers outbound broadcasts at start,
    /// mitigating the slow-joiner effect on subscribers still connecting.
    pub slow_joiner_delay: Duration,
    /// Receive high water mark applied to the router and subscribe sockets.
    pub recv_hwm: usize,
    /// Send high water mark applied to the router and publish sockets.
    pub send_hwm: usize,
    /// Linger applied to sockets at stop.
    pub linger: Duration,
}

impl NodeOptions {
    /// Construct options with the two required bind endpoints and every
    /// other field at its default.
    #[must_use]
    pub fn new(router_endpoint: impl Into<String>, pub_endpoint: impl Into<String>) -> Self {
        Self {
            router_endpoint: router_endpoint.into(),
            pub_endpoint: pub_endpoint.into(),
            name: None,
            keepalive: KeepaliveOptions::default(),
            default_message_policy_ms: 1_000,
            default_message_attempts: 3,
            retry_profile: RetryProfile::medium(),
            ack_all: true,
            ack_only: HashSet::new(),
            slow_joiner_delay: Duration::from_millis(200),
            recv_hwm: 1_000,
            send_hwm: 1_000,
            linger: Duration::from_millis(500),
        }
    }

    /// Set the node's advertised name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override keepalive and failure-detection timing.
    #[must_use]
    pub const fn with_keepalive(mut self, keepalive: KeepaliveOptions) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Override the default reply policy applied to newly registered types.
    #[must_use]
    pub const fn with_default_policy(mut self, period_ms: u64, attempts: u32) -> Self {
        self.default_message_policy_ms = period_ms;
        self.default_message_attempts = attempts;
        self
    }

    /// Override the retry profile governing pending-ack backoff.
    #[must_use]
    pub const fn with_retry_profile(mut self, profile: RetryProfile) -> Self {
        self.retry_profile = profile;
        self
    }

    /// Set whether non-protocol inbound messages are acknowledged by default.
    #[must_use]
    pub const fn with_ack_all(mut self, ack_all: bool) -> Self {
        self.ack_all = ack_all;
        self
    }

    /// Add a type to the `ack_only` override set.
    #[must_use]
    pub fn with_ack_only(mut self, ty: impl Into<String>) -> Self {
        self.ack_only.insert(ty.into());
        self
    }

    /// Override the slow-joiner startup delay.
    #[must_use]
    pub const fn with_slow_joiner_delay(mut self, delay: Duration) -> Self {
        self.slow_joiner_delay = delay;
        self
    }

    /// Override both socket high water marks.
    #[must_use]
    pub const fn with_hwm(mut self, recv_hwm: usize, send_hwm: usize) -> Self {
        self.recv_hwm = recv_hwm;
        self.send_hwm = send_hwm;
        self
    }

    /// Override the socket linger applied at stop.
    #[must_use]
    pub const fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Whether an inbound non-protocol message of `ty` should be acknowledged
    /// under the current ack policy.
    #[must_use]
    pub fn should_ack(&self, ty: &str) -> bool {
        if self.ack_all {
            !self.ack_only.contains(ty)
        } else {
            self.ack_only.contains(ty)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ack_all_default_acks_everything_but_overrides() {
        let opts = NodeOptions::new("tcp://127.0.0.1:5000", "tcp://127.0.0.1:5001")
            .with_ack_only("noisy");
        assert!(opts.should_ack("check-temp"));
        assert!(!opts.should_ack("noisy"));
    }

    #[test]
    fn ack_only_allowlist_when_ack_all_false() {
        let opts = NodeOptions::new("tcp://127.0.0.1:5000", "tcp://127.0.0.1:5001")
            .with_ack_all(false)
            .with_ack_only("important");
        assert!(opts.should_ack("important"));
        assert!(!opts.should_ack("check-temp"));
    }

    #[test]
    fn keepalive_deadline_multiplies_period() {
        let ka = KeepaliveOptions::default().with_period(Duration::from_millis(100));
        assert_eq!(ka.deadline(), Duration::from_millis(300));
    }
}
