use std::fmt;

use chrono::{DateTime, Utc};
use folio_primitives::PoolId;
use serde::{Deserialize, Serialize};

use crate::accounting::AccountingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountSide {
    Debit,
    Credit,
}

/// Semantic role tag carried inside an [`AccountId`]. Holdings bind the
/// Asset/Equity/Gain/Loss roles; the remaining kinds exist for general
/// bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    Asset,
    Equity,
    Gain,
    Loss,
    Liability,
    Expense,
}

impl AccountKind {
    /// The side on which an account of this kind conventionally grows.
    pub fn normal_side(self) -> AccountSide {
        match self {
            AccountKind::Asset | AccountKind::Expense | AccountKind::Loss => AccountSide::Debit,
            AccountKind::Equity | AccountKind::Liability | AccountKind::Gain => AccountSide::Credit,
        }
    }
}

/// Ledger account identifier: a numeric index plus a kind tag. Unique per
/// pool; the same id may be reused freely across pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId {
    pub index: u32,
    pub kind: AccountKind,
}

impl AccountId {
    pub const fn new(index: u32, kind: AccountKind) -> Self {
        Self { index, kind }
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}#{}", self.kind, self.index)
    }
}

/// A single ledger account: unsigned debit/credit accumulators plus the
/// polarity that decides how they combine into a signed balance. Accounts are
/// created once and never deleted, so audit history survives a zero balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub pool: PoolId,
    pub id: AccountId,
    pub normal: AccountSide,
    pub total_debit: u128,
    pub total_credit: u128,
    pub metadata: Option<Vec<u8>>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(pool: PoolId, id: AccountId, normal: AccountSide) -> Self {
        Self {
            pool,
            id,
            normal,
            total_debit: 0,
            total_credit: 0,
            metadata: None,
            updated_at: Utc::now(),
        }
    }

    /// Signed balance: `total_debit − total_credit` for debit-normal
    /// accounts, the reverse for credit-normal ones. Fails with
    /// [`AccountingError::BalanceOverflow`] once either running total leaves
    /// the `i128` range rather than silently truncating.
    pub fn balance(&self) -> Result<i128, AccountingError> {
        let overflow = || AccountingError::BalanceOverflow(self.pool, self.id);
        let debit = i128::try_from(self.total_debit).map_err(|_| overflow())?;
        let credit = i128::try_from(self.total_credit).map_err(|_| overflow())?;
        Ok(match self.normal {
            AccountSide::Debit => debit - credit,
            AccountSide::Credit => credit - debit,
        })
    }
}
