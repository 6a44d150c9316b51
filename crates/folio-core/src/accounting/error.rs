use folio_primitives::PoolId;
use thiserror::Error;

use crate::accounting::AccountId;
use crate::auth::NotAuthorized;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountingError {
    #[error(transparent)]
    NotAuthorized(#[from] NotAuthorized),

    #[error("ledger is locked: no pool window is open")]
    Locked,

    #[error("a window is already open; cannot unlock {0}")]
    AlreadyUnlocked(PoolId),

    #[error("account {1} does not exist in {0}")]
    AccountNotFound(PoolId, AccountId),

    #[error("account {1} already exists in {0}")]
    AccountExists(PoolId, AccountId),

    #[error("window unbalanced: debits {debit} != credits {credit}")]
    Unbalanced { debit: u128, credit: u128 },

    #[error("amount overflow while accumulating entries")]
    AmountOverflow,

    #[error("balance of account {1} in {0} exceeds the signed range")]
    BalanceOverflow(PoolId, AccountId),
}
