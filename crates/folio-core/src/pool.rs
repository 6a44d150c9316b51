//! Minimal pool registry: pool existence and accounting currency.
//!
//! The ledger and holdings layers consult this collaborator for tenant
//! context; it deliberately knows nothing about accounts or positions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use folio_primitives::{Asset, PoolId};
use thiserror::Error;

use crate::auth::{Caller, NotAuthorized, WardSet};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolError {
    #[error(transparent)]
    NotAuthorized(#[from] NotAuthorized),

    #[error("pool {0} is already registered")]
    PoolExists(PoolId),

    #[error("pool {0} is not registered")]
    PoolNotFound(PoolId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolInfo {
    pub currency: Asset,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PoolRegistry {
    pools: HashMap<PoolId, PoolInfo>,
    wards: WardSet,
}

impl PoolRegistry {
    pub fn new(admin: Caller) -> Self {
        Self {
            pools: HashMap::new(),
            wards: WardSet::new(admin),
        }
    }

    pub fn register(
        &mut self,
        caller: Caller,
        pool: PoolId,
        currency: Asset,
    ) -> Result<(), PoolError> {
        self.wards.ensure(caller)?;
        if self.pools.contains_key(&pool) {
            return Err(PoolError::PoolExists(pool));
        }
        self.pools.insert(
            pool,
            PoolInfo {
                currency,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn exists(&self, pool: PoolId) -> bool {
        self.pools.contains_key(&pool)
    }

    /// The pool's accounting currency: the quote asset for every valuation
    /// performed within the pool.
    pub fn currency(&self, pool: PoolId) -> Result<Asset, PoolError> {
        self.pools
            .get(&pool)
            .map(|info| info.currency)
            .ok_or(PoolError::PoolNotFound(pool))
    }

    pub fn authorize(&mut self, caller: Caller, new: Caller) -> Result<(), PoolError> {
        Ok(self.wards.authorize(caller, new)?)
    }

    pub fn revoke(&mut self, caller: Caller, old: Caller) -> Result<(), PoolError> {
        Ok(self.wards.revoke(caller, old)?)
    }
}
