use folio_primitives::{AssetId, PoolId, ShareClassId};
use thiserror::Error;

use crate::accounting::AccountKind;
use crate::auth::NotAuthorized;
use crate::holdings::ValuationError;
use crate::pool::PoolError;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldingsError {
    #[error(transparent)]
    NotAuthorized(#[from] NotAuthorized),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("share class id must not be null")]
    InvalidShareClass,

    #[error("asset {1} is not allowed for {0}")]
    AssetNotAllowed(PoolId, AssetId),

    #[error("holding already exists for {0}/{1}/{2}")]
    AlreadyExists(PoolId, ShareClassId, AssetId),

    #[error("no holding for {0}/{1}/{2}")]
    NotFound(PoolId, ShareClassId, AssetId),

    #[error("account kind {0:?} is not a holding role")]
    UnsupportedAccountKind(AccountKind),

    #[error("decrease exceeds held quantity or value")]
    InsufficientBalance,

    #[error("holding quantity or value overflow")]
    AmountOverflow,

    #[error("value delta exceeds the signed range")]
    DeltaOverflow,

    #[error(transparent)]
    Valuation(#[from] ValuationError),
}
