use std::io;

use thiserror::Error;
use tokio::task::JoinError;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("malformed message: need {needed} bytes, got {available}")]
    Malformed { needed: usize, available: usize },
    #[error("unknown message purpose {0}")]
    UnknownPurpose(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("at least one sub-factory is required")]
    NoWorkers,
    #[error("{requested} sub-factories requested, at most {max} supported")]
    TooManyWorkers { requested: u32, max: u32 },
    #[error("{0} range is empty")]
    EmptyRange(&'static str),
    #[error("{0} must be positive")]
    ZeroBound(&'static str),
    #[error("{0} must be within 0.0..=1.0")]
    Probability(&'static str),
}

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    #[error("order of {rejected} parts rejected while an order of {active} parts is in progress")]
    ProtocolViolation { active: u32, rejected: u32 },
    #[error("made {produced} parts of an order of {ordered} ({remaining} left unclaimed)")]
    Shortfall {
        produced: u64,
        ordered: u32,
        remaining: u32,
    },
    #[error("sub-factory {0} panicked")]
    WorkerPanicked(u32),
    #[error("order cancelled before completion")]
    Cancelled,
    #[error("order task failed: {0}")]
    OrderTask(#[from] JoinError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ProcurementError {
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
    /// The factory answered `PROTOCOL_ERROR`: it is shutting down, or it
    /// turned this order away because another one is running.
    #[error("factory answered with a protocol error (shutting down or busy with another order)")]
    ProtocolError,
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}
