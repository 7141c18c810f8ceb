//! Game Errors

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error taxonomy surfaced to players.
///
/// Every failure a player can see maps onto one of these kinds. None of them
/// are retried automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Missing or malformed fields
    InvalidRequest,
    /// Amount below the configured minimum
    AmountTooSmall,
    /// Wrong HTTP verb
    MethodNotAllowed,
    /// The player rejected signing in their wallet
    WalletDeclined,
    /// The request never reached the server or the reply was lost
    NetworkError,
    /// Balance does not cover the requested amount
    InsufficientBalance,
    /// Action requires a state the round is not in
    Conflict,
    /// Unknown resource
    NotFound,
    /// Server-side failure
    Internal,
    /// Round driver cannot take the request right now
    Unavailable,
}

/// Game rule violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Wallet address required")]
    MissingWallet,

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    #[error("Round is not running")]
    RoundNotRunning,

    #[error("Wager already active for this round")]
    WagerAlreadyActive,

    #[error("Case {0} not found")]
    CaseNotFound(u32),

    #[error("Case {0} has no items")]
    EmptyCase(u32),

    #[error("Round driver is busy")]
    Busy,

    #[error("Round driver stopped")]
    DriverStopped,
}

impl GameError {
    /// Taxonomy entry for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::MissingWallet | GameError::InvalidAmount => ErrorKind::InvalidRequest,
            GameError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            GameError::RoundNotRunning | GameError::WagerAlreadyActive => ErrorKind::Conflict,
            GameError::CaseNotFound(_) => ErrorKind::NotFound,
            GameError::EmptyCase(_) => ErrorKind::Internal,
            GameError::Busy | GameError::DriverStopped => ErrorKind::Unavailable,
        }
    }
}
