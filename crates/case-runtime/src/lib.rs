//! Case Runtime - Core game rules for NFT cases
//!
//! This crate provides the server-side game core:
//! - Player sessions (balance + inventory) held in process memory
//! - Crash round state machine and its 20Hz driver loop
//! - Case catalog and case opening
//! - Withdrawal request validation

pub mod cases;
pub mod crash;
pub mod error;
pub mod rng;
pub mod round_driver;
pub mod session;
pub mod withdraw;

pub use cases::{CaseCatalog, CaseDefinition, InventoryItem, Rarity};
pub use crash::{CrashRound, RoundEvent, RoundSnapshot, RoundState, RoundTimings, Wager};
pub use error::{ErrorKind, GameError};
pub use rng::{RandomSource, SharedRng};
pub use round_driver::{BetReceipt, CashOutReceipt, RoundDriver, RoundHandle};
pub use session::{Session, SessionStore};
pub use withdraw::{WithdrawError, WithdrawalPolicy, WithdrawalReceipt};

/// Crash round tick in milliseconds (20Hz)
pub const TICK_MS: u64 = 50;

/// Delay before a waiting round starts
pub const WAITING_DELAY_MS: u64 = 2_000;

/// Delay after a crash before the next round starts waiting
pub const CRASHED_DELAY_MS: u64 = 3_000;

/// Cosmetic delay between paying for a case and revealing the item
pub const CASE_OPEN_DELAY_MS: u64 = 2_000;

/// Balance granted to a session on first access
pub const STARTING_BALANCE: u64 = 10_000;

/// Maximum queued round commands before callers see `Busy`
pub const MAX_PENDING_COMMANDS: usize = 1024;
