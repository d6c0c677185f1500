//! Error types shared by the protocol clients, the identification engine,
//! and the device layer.

use thiserror::Error;

/// Failure classes for probe and device operations.
///
/// During identification every error is absorbed into the confidence
/// bookkeeping; during firmware and query operations errors surface to the
/// caller and fail that one operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level failure below the protocol: resolution, connect,
    /// read, write, or timeout
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer answered, but not with what the protocol grammar expects
    #[error("{0}")]
    Protocol(String),

    /// The service is absent or refused us on this endpoint; an expected
    /// outcome while probing, fatal only for confirmed-device operations
    #[error("{0} unavailable on this endpoint")]
    ProbeUnavailable(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;
