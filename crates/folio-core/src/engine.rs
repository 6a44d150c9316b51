//! Orchestration layer tying the pool registry, ledger, and holdings
//! together.
//!
//! Every holding mutation and its matching balanced ledger entries happen
//! inside a single ledger window, so the per-holding identity
//! `asset == equity + gain − loss` cannot be broken by a caller performing
//! one half and forgetting the other.

use std::sync::Arc;

use folio_primitives::{signed_delta, Asset, AssetId, PoolId, ShareClassId};
use thiserror::Error;
use tracing::instrument;

use crate::accounting::{AccountId, AccountKind, AccountingError, Ledger};
use crate::auth::Caller;
use crate::holdings::{Holdings, HoldingsError, Valuation};
use crate::pool::{PoolError, PoolRegistry};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Accounting(#[from] AccountingError),

    #[error(transparent)]
    Holdings(#[from] HoldingsError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("holding has no bound {0:?} account")]
    MissingAccount(AccountKind),

    #[error("value delta exceeds the signed range")]
    DeltaOverflow,
}

/// Owns the three subsystems under a single internal caller identity.
///
/// The engine's operations stage ledger entries *before* mutating holdings:
/// any failure up to the holding mutation abandons the pending window and
/// leaves both sides untouched, and once the holding mutation succeeds the
/// final `lock` cannot fail (the staged pair is balanced by construction).
/// This relies on valuation providers being deterministic for a given state,
/// which the [`Valuation`] contract requires.
#[derive(Debug)]
pub struct Engine {
    caller: Caller,
    pools: PoolRegistry,
    ledger: Ledger,
    holdings: Holdings,
}

impl Engine {
    pub fn new() -> Self {
        let caller = Caller::new();
        Self {
            caller,
            pools: PoolRegistry::new(caller),
            ledger: Ledger::new(caller),
            holdings: Holdings::new(caller),
        }
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn holdings(&self) -> &Holdings {
        &self.holdings
    }

    pub fn create_pool(&mut self, pool: PoolId, currency: Asset) -> Result<(), EngineError> {
        self.pools.register(self.caller, pool, currency)?;
        Ok(())
    }

    /// Creates the holding's ledger accounts (each on its kind's normal
    /// side), allow-lists the asset, and registers the holding. All four role
    /// accounts are required so every engine operation has a posting target.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset.id))]
    pub fn init_holding(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: Asset,
        valuation: Arc<dyn Valuation>,
        accounts: &[AccountId],
    ) -> Result<(), EngineError> {
        for kind in [
            AccountKind::Asset,
            AccountKind::Equity,
            AccountKind::Gain,
            AccountKind::Loss,
        ] {
            if !accounts.iter().any(|a| a.kind == kind) {
                return Err(EngineError::MissingAccount(kind));
            }
        }
        for account in accounts {
            self.ledger
                .create_account(self.caller, pool, *account, account.kind.normal_side())?;
        }
        self.holdings.allow_asset(self.caller, pool, asset.id, true)?;
        self.holdings.create(
            self.caller,
            &self.pools,
            pool,
            share_class,
            asset,
            valuation,
            accounts,
        )?;
        Ok(())
    }

    /// Increases the holding by `qty` at its stored valuation, debiting the
    /// asset account and crediting the equity account by the value delta.
    /// Returns the delta in pool currency.
    pub fn deposit(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        qty: u128,
    ) -> Result<u128, EngineError> {
        let provider = self.holdings.valuation(pool, share_class, asset)?;
        self.deposit_with(pool, share_class, asset, provider.as_ref(), qty)
    }

    /// [`Self::deposit`] with a one-off valuation provider.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset, qty))]
    pub fn deposit_with(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: &dyn Valuation,
        qty: u128,
    ) -> Result<u128, EngineError> {
        let asset_account = self.role_account(pool, share_class, asset, AccountKind::Asset)?;
        let equity_account = self.role_account(pool, share_class, asset, AccountKind::Equity)?;
        let delta = self.preflight_quote(pool, share_class, asset, valuation, qty)?;

        self.ledger.unlock(self.caller, pool)?;
        self.staged(|engine| {
            engine
                .ledger
                .add_debit(engine.caller, asset_account, delta)?;
            engine
                .ledger
                .add_credit(engine.caller, equity_account, delta)?;
            engine
                .holdings
                .increase(
                    engine.caller,
                    &engine.pools,
                    pool,
                    share_class,
                    asset,
                    valuation,
                    qty,
                )
                .map_err(EngineError::from)
        })?;
        self.ledger.lock(self.caller)?;
        Ok(delta)
    }

    /// Decreases the holding by `qty` at its stored valuation, debiting the
    /// equity account and crediting the asset account by the value delta.
    pub fn withdraw(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        qty: u128,
    ) -> Result<u128, EngineError> {
        let provider = self.holdings.valuation(pool, share_class, asset)?;
        self.withdraw_with(pool, share_class, asset, provider.as_ref(), qty)
    }

    /// [`Self::withdraw`] with a one-off valuation provider.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset, qty))]
    pub fn withdraw_with(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: &dyn Valuation,
        qty: u128,
    ) -> Result<u128, EngineError> {
        let asset_account = self.role_account(pool, share_class, asset, AccountKind::Asset)?;
        let equity_account = self.role_account(pool, share_class, asset, AccountKind::Equity)?;
        let delta = self.preflight_quote(pool, share_class, asset, valuation, qty)?;

        self.ledger.unlock(self.caller, pool)?;
        self.staged(|engine| {
            engine
                .ledger
                .add_debit(engine.caller, equity_account, delta)?;
            engine
                .ledger
                .add_credit(engine.caller, asset_account, delta)?;
            engine
                .holdings
                .decrease(
                    engine.caller,
                    &engine.pools,
                    pool,
                    share_class,
                    asset,
                    valuation,
                    qty,
                )
                .map_err(EngineError::from)
        })?;
        self.ledger.lock(self.caller)?;
        Ok(delta)
    }

    /// Marks the holding to market through its stored provider. A positive
    /// delta debits the asset account and credits gain; a negative delta
    /// debits loss and credits the asset account; zero posts nothing.
    /// Returns the signed delta.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset))]
    pub fn revalue(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<i128, EngineError> {
        let asset_account = self.role_account(pool, share_class, asset, AccountKind::Asset)?;
        let gain_account = self.role_account(pool, share_class, asset, AccountKind::Gain)?;
        let loss_account = self.role_account(pool, share_class, asset, AccountKind::Loss)?;

        let currency = self.pools.currency(pool)?;
        let (base, quantity, old_value, provider) = {
            let holding = self
                .holdings
                .holding(pool, share_class, asset)
                .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;
            (
                holding.asset,
                holding.quantity,
                holding.value,
                holding.valuation(),
            )
        };
        let new_value = provider
            .quote(quantity, base, currency)
            .map_err(HoldingsError::from)?;
        let delta = signed_delta(new_value, old_value).map_err(|_| EngineError::DeltaOverflow)?;

        self.ledger.unlock(self.caller, pool)?;
        self.staged(|engine| {
            if delta > 0 {
                engine
                    .ledger
                    .update_entry(engine.caller, gain_account, asset_account, delta.unsigned_abs())?;
            } else if delta < 0 {
                engine
                    .ledger
                    .update_entry(engine.caller, asset_account, loss_account, delta.unsigned_abs())?;
            }
            engine
                .holdings
                .update(engine.caller, &engine.pools, pool, share_class, asset)
                .map_err(EngineError::from)
                .map(|_| ())
        })?;
        self.ledger.lock(self.caller)?;
        Ok(delta)
    }

    /// Swaps the holding's stored valuation provider.
    pub fn update_valuation(
        &mut self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: Arc<dyn Valuation>,
    ) -> Result<(), EngineError> {
        self.holdings
            .update_valuation(self.caller, pool, share_class, asset, valuation)?;
        Ok(())
    }

    /// Audit read: `asset − (equity + gain − loss)` over the holding's bound
    /// accounts. Zero after every engine operation.
    pub fn holding_identity_gap(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<i128, EngineError> {
        let value = |kind| -> Result<i128, EngineError> {
            let account = self.role_account(pool, share_class, asset, kind)?;
            Ok(self.ledger.account_value(pool, account)?)
        };
        let asset_value = value(AccountKind::Asset)?;
        let equity = value(AccountKind::Equity)?;
        let gain = value(AccountKind::Gain)?;
        let loss = value(AccountKind::Loss)?;

        equity
            .checked_add(gain)
            .and_then(|rhs| rhs.checked_sub(loss))
            .and_then(|rhs| asset_value.checked_sub(rhs))
            .ok_or(EngineError::DeltaOverflow)
    }

    fn role_account(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        kind: AccountKind,
    ) -> Result<AccountId, EngineError> {
        self.holdings
            .account_id(pool, share_class, asset, kind)?
            .ok_or(EngineError::MissingAccount(kind))
    }

    /// Pre-flight valuation of `qty` against the live holding state, before
    /// anything is staged or mutated.
    fn preflight_quote(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: &dyn Valuation,
        qty: u128,
    ) -> Result<u128, EngineError> {
        let currency = self.pools.currency(pool)?;
        let holding = self
            .holdings
            .holding(pool, share_class, asset)
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;
        Ok(valuation
            .quote(qty, holding.asset, currency)
            .map_err(HoldingsError::from)?)
    }

    /// Runs `f` against the open window, abandoning the window if it fails so
    /// no staged entry survives a failed operation.
    fn staged<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.ledger.abandon(self.caller)?;
                Err(err)
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
