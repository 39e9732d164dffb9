//! Error taxonomy for the conductor core.
//!
//! Every error is one of four kinds (`Config`, `Numerical`, `Comm`, `Internal`,
//! see spec §7). None of them are recovered locally: a correctly assembled
//! capacitance structure is a precondition for the physics to mean anything,
//! so any error here is fatal to the calling simulation.

use thiserror::Error as ThisError;

/// The four fatal error kinds distinguished by the object subsystem.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The object map or configuration is inconsistent (missing dataset,
    /// `N = 0` with objects enabled, `T_a = 0`).
    Config,
    /// LU decomposition failed or the capacitance matrix is singular to
    /// working precision.
    Numerical,
    /// An MPI collective failed, or participants disagree on object/size counts.
    Comm,
    /// An internal assertion failed (e.g. a ghost index leaked into an
    /// interior table).
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Config => "CONFIG",
            ErrorKind::Numerical => "NUMERICAL",
            ErrorKind::Comm => "COMM",
            ErrorKind::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Error type returned by every fallible operation in this crate.
#[derive(Debug, ThisError)]
pub enum CoreError {
    /// The object map or configuration is inconsistent.
    #[error("[CONFIG] {0}")]
    Config(String),
    /// A dense capacitance matrix failed to invert.
    #[error("[NUMERICAL] {0}")]
    Numerical(String),
    /// An MPI collective failed or ranks disagree.
    #[error("[COMM] {0}")]
    Comm(String),
    /// An internal invariant was violated.
    #[error("[INTERNAL] {0}")]
    Internal(String),
    /// Any error that is not represented by one of the explicit kinds above,
    /// chained from a lower-level collaborator (HDF5, MPI, ...).
    #[error("unexpected failure: {0}")]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Returns the classification of this error, per spec §7.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Config(_) => ErrorKind::Config,
            CoreError::Numerical(_) => ErrorKind::Numerical,
            CoreError::Comm(_) => ErrorKind::Comm,
            CoreError::Internal(_) => ErrorKind::Internal,
            CoreError::Other(_) => ErrorKind::Internal,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CoreError::Config(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        CoreError::Numerical(msg.into())
    }

    pub fn comm(msg: impl Into<String>) -> Self {
        CoreError::Comm(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        CoreError::Internal(msg.into())
    }

    /// Logs this error at `error` level with a rank prefix, then returns it
    /// unchanged. Callers at the top of the call stack (the CLI binary) use
    /// this just before turning the error into a process exit, matching the
    /// "single rank-prefixed error line followed by an abort" contract in
    /// spec §7.
    pub fn log_with_rank(self, rank: i32) -> Self {
        log::error!("[rank {}] {}", rank, self);
        self
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
