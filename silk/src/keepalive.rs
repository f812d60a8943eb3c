//! Keepalive and prune timers.
//!
//! Two independent cadences drive failure detection: this node broadcasts
//! `_ka` on `keepalive.period`, and separately sweeps the cluster view for
//! expired peers on `prune_interval`. Both are modelled as a tiny ticker
//! over `compio::time::sleep`, since `compio` has no built-in interval type
//! to reach for.

use std::time::Duration;

/// A periodic tick source driven by repeated `compio` sleeps.
///
/// # Examples
///
/// ```no_run
/// use silk::keepalive::Ticker;
/// use std::time::Duration;
///
/// # #[compio::main]
/// # async fn main() {
/// let mut ticker = Ticker::new(Duration::from_millis(5));
/// ticker.tick().await;
/// # }
/// ```
pub struct Ticker {
    period: Duration,
}

impl Ticker {
    /// Construct a ticker firing every `period`.
    #[must_use]
    pub const fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        compio::time::sleep(self.period).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[compio::test]
    async fn tick_resolves() {
        let mut ticker = Ticker::new(Duration::from_millis(1));
        ticker.tick().await;
    }
}
