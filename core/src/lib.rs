//! Infravest Core Library
//!
//! Shared primitives for the compliance and governance crates: identity
//! addresses, the injected clock and the token ledger interface consumed
//! for voting weight.

pub mod address;
pub mod clock;
pub mod ledger;

pub use address::Address;
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use ledger::{LedgerError, MemoryLedger, TokenLedger};

/// Seconds in one day
pub const SECONDS_PER_DAY: u64 = 86_400;
