//! Factory and procurement configuration.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::abstractions::communication::fair_loss_point_to_point_links::FairLossConfig;
use crate::error::ConfigError;
use crate::factory::worker::WorkerProfile;

pub const DEFAULT_PORT: u16 = 5000;
pub const MAX_FACTORIES: u32 = 20;

/// How sub-factory capacities and durations are chosen for each order.
#[derive(Clone, Debug, PartialEq)]
pub enum Staffing {
    /// Drawn uniformly from the ranges for every sub-factory of every order.
    /// A seed makes the draws reproducible.
    Random {
        capacity: RangeInclusive<u32>,
        duration_ms: RangeInclusive<u32>,
        seed: Option<u64>,
    },
    /// Sub-factory `i` gets `profiles[(i - 1) % len]`.
    Fixed(Vec<WorkerProfile>),
}

impl Default for Staffing {
    fn default() -> Self {
        Staffing::Random {
            capacity: 10..=50,
            duration_ms: 500..=1200,
            seed: None,
        }
    }
}

impl Staffing {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Staffing::Random {
                capacity,
                duration_ms,
                ..
            } => {
                if capacity.is_empty() {
                    return Err(ConfigError::EmptyRange("capacity"));
                }
                if duration_ms.is_empty() {
                    return Err(ConfigError::EmptyRange("duration"));
                }
                if *capacity.start() == 0 {
                    return Err(ConfigError::ZeroBound("capacity"));
                }
                if *duration_ms.start() == 0 {
                    return Err(ConfigError::ZeroBound("duration"));
                }
            }
            Staffing::Fixed(profiles) => {
                if profiles.is_empty() {
                    return Err(ConfigError::EmptyRange("fixed profiles"));
                }
                if profiles.iter().any(|p| p.capacity == 0) {
                    return Err(ConfigError::ZeroBound("capacity"));
                }
                if profiles.iter().any(|p| p.duration.is_zero()) {
                    return Err(ConfigError::ZeroBound("duration"));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FactoryConfig {
    /// Sub-factories spawned per order
    pub workers: u32,
    /// Upper bound on `workers`
    pub max_workers: u32,
    pub port: u16,
    pub staffing: Staffing,
    /// Loss/duplication injected on every message the factory sends
    pub link: FairLossConfig,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_workers: MAX_FACTORIES,
            port: DEFAULT_PORT,
            staffing: Staffing::default(),
            link: FairLossConfig::reliable(),
        }
    }
}

impl FactoryConfig {
    pub fn builder() -> FactoryConfigBuilder {
        FactoryConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        if self.workers > self.max_workers {
            return Err(ConfigError::TooManyWorkers {
                requested: self.workers,
                max: self.max_workers,
            });
        }
        self.staffing.validate()
    }
}

pub struct FactoryConfigBuilder {
    config: FactoryConfig,
}

impl FactoryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: FactoryConfig::default(),
        }
    }

    pub fn workers(mut self, n: u32) -> Self {
        self.config.workers = n;
        self
    }

    pub fn max_workers(mut self, n: u32) -> Self {
        self.config.max_workers = n;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn staffing(mut self, staffing: Staffing) -> Self {
        self.config.staffing = staffing;
        self
    }

    /// Same capacity and duration for every sub-factory.
    pub fn uniform(self, capacity: u32, duration: Duration) -> Self {
        self.staffing(Staffing::Fixed(vec![WorkerProfile { capacity, duration }]))
    }

    pub fn link(mut self, link: FairLossConfig) -> Self {
        self.config.link = link;
        self
    }

    /// Validates before handing the configuration out.
    pub fn build(self) -> Result<FactoryConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for FactoryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Procurement waits forever by default; a lost confirmation or completion
/// report then blocks it. Timeouts are opt-in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcurementConfig {
    pub confirm_timeout: Option<Duration>,
    /// Maximum silence between two reports once the order is confirmed
    pub report_timeout: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_classic_factory() {
        let config = FactoryConfig::default();
        assert_eq!(config.port, 5000);
        assert_eq!(config.workers, 1);
        assert_eq!(config.max_workers, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn worker_count_is_bounded() {
        assert_eq!(
            FactoryConfig::builder().workers(0).build(),
            Err(ConfigError::NoWorkers)
        );
        assert_eq!(
            FactoryConfig::builder().workers(21).build(),
            Err(ConfigError::TooManyWorkers {
                requested: 21,
                max: 20
            })
        );
        assert!(FactoryConfig::builder().workers(20).build().is_ok());
    }

    #[test]
    fn staffing_rejects_degenerate_bounds() {
        #[allow(clippy::reversed_empty_ranges)]
        let empty = Staffing::Random {
            capacity: 5..=1,
            duration_ms: 1..=2,
            seed: None,
        };
        assert_eq!(empty.validate(), Err(ConfigError::EmptyRange("capacity")));

        let zero = Staffing::Random {
            capacity: 1..=5,
            duration_ms: 0..=2,
            seed: None,
        };
        assert_eq!(zero.validate(), Err(ConfigError::ZeroBound("duration")));

        assert_eq!(
            Staffing::Fixed(vec![]).validate(),
            Err(ConfigError::EmptyRange("fixed profiles"))
        );
        assert_eq!(
            FactoryConfig::builder()
                .uniform(0, Duration::from_millis(1))
                .build(),
            Err(ConfigError::ZeroBound("capacity"))
        );
    }
}
