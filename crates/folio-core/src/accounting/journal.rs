use chrono::{DateTime, Utc};
use folio_primitives::PoolId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounting::{AccountId, AccountSide};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub account: AccountId,
    pub side: AccountSide,
    pub amount: u128,
}

/// One successfully locked window: every entry it applied, stamped with the
/// pool's monotonic sequence number. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalBatch {
    pub id: Uuid,
    pub pool: PoolId,
    pub sequence: u64,
    pub posted_at: DateTime<Utc>,
    pub entries: Vec<JournalEntry>,
}
