pub mod account;
pub mod error;
pub mod journal;
pub mod ledger;

pub use account::{Account, AccountId, AccountKind, AccountSide};
pub use error::AccountingError;
pub use journal::{JournalBatch, JournalEntry};
pub use ledger::Ledger;
