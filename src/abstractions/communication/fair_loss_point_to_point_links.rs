//! Fair-loss wrapper around any [`LinkSender`].
//!
//! Drops or duplicates outgoing messages with configurable probabilities so
//! the factory/procurement exchange can be exercised over a link that behaves
//! like a congested datagram network.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, warn};

use crate::abstractions::communication::LinkSender;
use crate::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FairLossConfig {
    /// Probability of silently dropping a message.
    pub drop_rate: f64,
    /// Probability of sending a delivered message twice.
    pub duplicate_rate: f64,
}

impl Default for FairLossConfig {
    fn default() -> Self {
        Self::reliable()
    }
}

impl FairLossConfig {
    pub fn reliable() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
        }
    }

    pub fn new(drop_rate: f64, duplicate_rate: f64) -> Result<Self, ConfigError> {
        if !(0.0..=1.0).contains(&drop_rate) {
            return Err(ConfigError::Probability("drop rate"));
        }
        if !(0.0..=1.0).contains(&duplicate_rate) {
            return Err(ConfigError::Probability("duplicate rate"));
        }
        Ok(Self {
            drop_rate,
            duplicate_rate,
        })
    }

    pub fn is_lossy(&self) -> bool {
        self.drop_rate > 0.0 || self.duplicate_rate > 0.0
    }
}

#[derive(Debug, Default)]
pub struct LinkStats {
    pub offered: AtomicU64,
    pub dropped: AtomicU64,
    pub duplicated: AtomicU64,
}

impl LinkStats {
    /// (offered, dropped, duplicated)
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.offered.load(Ordering::Relaxed),
            self.dropped.load(Ordering::Relaxed),
            self.duplicated.load(Ordering::Relaxed),
        )
    }
}

pub struct FairLossPointToPointLinks<L> {
    inner: L,
    config: FairLossConfig,
    stats: Arc<LinkStats>,
}

impl<L> FairLossPointToPointLinks<L> {
    pub fn new(inner: L, config: FairLossConfig) -> Self {
        if config.is_lossy() {
            warn!(
                drop_rate = config.drop_rate,
                duplicate_rate = config.duplicate_rate,
                "fair-loss link enabled, messages may be dropped or duplicated"
            );
        }
        Self {
            inner,
            config,
            stats: Arc::new(LinkStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    fn roll(probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        rand::rng().random::<f64>() < probability
    }
}

impl<A, M, L> LinkSender<A, M> for FairLossPointToPointLinks<L>
where
    A: 'static + Send + Sync + Copy + core::fmt::Debug,
    M: 'static + Send + Sync + Copy,
    L: LinkSender<A, M> + Send + Sync,
{
    async fn send(&self, to: A, message: M) -> io::Result<()> {
        self.stats.offered.fetch_add(1, Ordering::Relaxed);

        if Self::roll(self.config.drop_rate) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(?to, "fair-loss link dropped message");
            return Ok(());
        }

        self.inner.send(to, message).await?;

        if Self::roll(self.config.duplicate_rate) {
            self.stats.duplicated.fetch_add(1, Ordering::Relaxed);
            debug!(?to, "fair-loss link duplicated message");
            self.inner.send(to, message).await?;
        }
        Ok(())
    }
}
