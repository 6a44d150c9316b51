use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use folio_primitives::{signed_delta, Asset, AssetId, PoolId, ShareClassId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::accounting::{AccountId, AccountKind};
use crate::auth::{Caller, WardSet};
use crate::holdings::{HoldingsError, Valuation};
use crate::pool::PoolRegistry;

/// Bindings from the four holding roles to ledger accounts in the same pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingAccounts {
    pub asset: Option<AccountId>,
    pub equity: Option<AccountId>,
    pub gain: Option<AccountId>,
    pub loss: Option<AccountId>,
}

impl HoldingAccounts {
    pub fn get(&self, kind: AccountKind) -> Option<AccountId> {
        match kind {
            AccountKind::Asset => self.asset,
            AccountKind::Equity => self.equity,
            AccountKind::Gain => self.gain,
            AccountKind::Loss => self.loss,
            AccountKind::Liability | AccountKind::Expense => None,
        }
    }

    fn bind(&mut self, account: AccountId) -> Result<(), HoldingsError> {
        let slot = match account.kind {
            AccountKind::Asset => &mut self.asset,
            AccountKind::Equity => &mut self.equity,
            AccountKind::Gain => &mut self.gain,
            AccountKind::Loss => &mut self.loss,
            other => return Err(HoldingsError::UnsupportedAccountKind(other)),
        };
        *slot = Some(account);
        Ok(())
    }
}

/// Quantity and pool-currency value of one asset position.
///
/// `value` is the output of the stored valuation provider applied to
/// `quantity` as of the last mutation; it goes stale between a price move and
/// the next `update`.
#[derive(Debug, Clone)]
pub struct Holding {
    pub asset: Asset,
    pub quantity: u128,
    pub value: u128,
    valuation: Arc<dyn Valuation>,
    pub accounts: HoldingAccounts,
    pub updated_at: DateTime<Utc>,
}

impl Holding {
    pub fn valuation(&self) -> Arc<dyn Valuation> {
        Arc::clone(&self.valuation)
    }
}

/// Registry of holdings keyed by (pool, share class, asset), plus the
/// per-pool asset allow-list consulted at creation.
///
/// This layer computes value deltas; it never posts ledger entries itself.
/// Whoever mutates a holding must post the matching debit/credit pair in the
/// same open ledger window ([`crate::engine::Engine`] does both together).
#[derive(Debug)]
pub struct Holdings {
    holdings: HashMap<(PoolId, ShareClassId, AssetId), Holding>,
    allowed: HashSet<(PoolId, AssetId)>,
    wards: WardSet,
}

impl Holdings {
    pub fn new(admin: Caller) -> Self {
        Self {
            holdings: HashMap::new(),
            allowed: HashSet::new(),
            wards: WardSet::new(admin),
        }
    }

    /// Maintains the per-pool allow-list gate consulted by [`Self::create`].
    pub fn allow_asset(
        &mut self,
        caller: Caller,
        pool: PoolId,
        asset: AssetId,
        allowed: bool,
    ) -> Result<(), HoldingsError> {
        self.wards.ensure(caller)?;
        if allowed {
            self.allowed.insert((pool, asset));
        } else {
            self.allowed.remove(&(pool, asset));
        }
        Ok(())
    }

    /// Registers a new holding with its role-account bindings.
    ///
    /// Re-creating an existing (pool, share class, asset) triple fails with
    /// [`HoldingsError::AlreadyExists`]; a live holding is adjusted through
    /// [`Self::set_account_id`] and [`Self::update_valuation`] instead.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset.id))]
    pub fn create(
        &mut self,
        caller: Caller,
        pools: &PoolRegistry,
        pool: PoolId,
        share_class: ShareClassId,
        asset: Asset,
        valuation: Arc<dyn Valuation>,
        accounts: &[AccountId],
    ) -> Result<(), HoldingsError> {
        self.wards.ensure(caller)?;
        // Existence check only; the currency itself is looked up per quote.
        pools.currency(pool)?;
        if share_class.is_null() {
            return Err(HoldingsError::InvalidShareClass);
        }
        if !self.allowed.contains(&(pool, asset.id)) {
            return Err(HoldingsError::AssetNotAllowed(pool, asset.id));
        }
        if self.holdings.contains_key(&(pool, share_class, asset.id)) {
            return Err(HoldingsError::AlreadyExists(pool, share_class, asset.id));
        }

        let mut bindings = HoldingAccounts::default();
        for account in accounts {
            bindings.bind(*account)?;
        }

        self.holdings.insert(
            (pool, share_class, asset.id),
            Holding {
                asset,
                quantity: 0,
                value: 0,
                valuation,
                accounts: bindings,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Adds `qty` to the holding, valued through `valuation` (which may be a
    /// one-off provider different from the stored default). Returns the value
    /// delta in pool currency.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset, qty))]
    pub fn increase(
        &mut self,
        caller: Caller,
        pools: &PoolRegistry,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: &dyn Valuation,
        qty: u128,
    ) -> Result<u128, HoldingsError> {
        self.wards.ensure(caller)?;
        let currency = pools.currency(pool)?;
        let holding = self
            .holdings
            .get_mut(&(pool, share_class, asset))
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;

        let delta = valuation.quote(qty, holding.asset, currency)?;
        let quantity = holding
            .quantity
            .checked_add(qty)
            .ok_or(HoldingsError::AmountOverflow)?;
        let value = holding
            .value
            .checked_add(delta)
            .ok_or(HoldingsError::AmountOverflow)?;

        holding.quantity = quantity;
        holding.value = value;
        holding.updated_at = Utc::now();
        Ok(delta)
    }

    /// Removes `qty` from the holding, valued through `valuation`. Returns
    /// the value delta in pool currency.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset, qty))]
    pub fn decrease(
        &mut self,
        caller: Caller,
        pools: &PoolRegistry,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: &dyn Valuation,
        qty: u128,
    ) -> Result<u128, HoldingsError> {
        self.wards.ensure(caller)?;
        let currency = pools.currency(pool)?;
        let holding = self
            .holdings
            .get_mut(&(pool, share_class, asset))
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;

        let delta = valuation.quote(qty, holding.asset, currency)?;
        let quantity = holding
            .quantity
            .checked_sub(qty)
            .ok_or(HoldingsError::InsufficientBalance)?;
        let value = holding
            .value
            .checked_sub(delta)
            .ok_or(HoldingsError::InsufficientBalance)?;

        holding.quantity = quantity;
        holding.value = value;
        holding.updated_at = Utc::now();
        Ok(delta)
    }

    /// Recomputes `value` at the current quantity through the stored default
    /// provider, returning the signed difference (positive = gain, negative =
    /// loss). Callers route the delta into gain/loss and asset accounts; this
    /// is the mark-to-market hook for price moves without quantity changes.
    #[instrument(skip_all, fields(pool = %pool, share_class = %share_class, asset = %asset))]
    pub fn update(
        &mut self,
        caller: Caller,
        pools: &PoolRegistry,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<i128, HoldingsError> {
        self.wards.ensure(caller)?;
        let currency = pools.currency(pool)?;
        let holding = self
            .holdings
            .get_mut(&(pool, share_class, asset))
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;

        let new_value = holding
            .valuation
            .quote(holding.quantity, holding.asset, currency)?;
        let delta =
            signed_delta(new_value, holding.value).map_err(|_| HoldingsError::DeltaOverflow)?;

        holding.value = new_value;
        holding.updated_at = Utc::now();
        Ok(delta)
    }

    /// Swaps the stored default valuation provider.
    pub fn update_valuation(
        &mut self,
        caller: Caller,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        valuation: Arc<dyn Valuation>,
    ) -> Result<(), HoldingsError> {
        self.wards.ensure(caller)?;
        let holding = self
            .holdings
            .get_mut(&(pool, share_class, asset))
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;
        holding.valuation = valuation;
        holding.updated_at = Utc::now();
        Ok(())
    }

    /// Rebinds the role slot named by `account.kind` on an existing holding.
    pub fn set_account_id(
        &mut self,
        caller: Caller,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        account: AccountId,
    ) -> Result<(), HoldingsError> {
        self.wards.ensure(caller)?;
        let holding = self
            .holdings
            .get_mut(&(pool, share_class, asset))
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))?;
        holding.accounts.bind(account)?;
        holding.updated_at = Utc::now();
        Ok(())
    }

    pub fn value(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<u128, HoldingsError> {
        Ok(self.fetch(pool, share_class, asset)?.value)
    }

    pub fn amount(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<u128, HoldingsError> {
        Ok(self.fetch(pool, share_class, asset)?.quantity)
    }

    pub fn valuation(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<Arc<dyn Valuation>, HoldingsError> {
        Ok(self.fetch(pool, share_class, asset)?.valuation())
    }

    pub fn account_id(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
        kind: AccountKind,
    ) -> Result<Option<AccountId>, HoldingsError> {
        Ok(self.fetch(pool, share_class, asset)?.accounts.get(kind))
    }

    pub fn holding(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Option<&Holding> {
        self.holdings.get(&(pool, share_class, asset))
    }

    pub fn exists(&self, pool: PoolId, share_class: ShareClassId, asset: AssetId) -> bool {
        self.holdings.contains_key(&(pool, share_class, asset))
    }

    pub fn is_allowed(&self, pool: PoolId, asset: AssetId) -> bool {
        self.allowed.contains(&(pool, asset))
    }

    pub fn authorize(&mut self, caller: Caller, new: Caller) -> Result<(), HoldingsError> {
        Ok(self.wards.authorize(caller, new)?)
    }

    pub fn revoke(&mut self, caller: Caller, old: Caller) -> Result<(), HoldingsError> {
        Ok(self.wards.revoke(caller, old)?)
    }

    fn fetch(
        &self,
        pool: PoolId,
        share_class: ShareClassId,
        asset: AssetId,
    ) -> Result<&Holding, HoldingsError> {
        self.holdings
            .get(&(pool, share_class, asset))
            .ok_or(HoldingsError::NotFound(pool, share_class, asset))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use assert_matches::assert_matches;
    use folio_primitives::D18;

    use super::*;
    use crate::holdings::{OneToOneValuation, TransientValuation, ValuationError};
    use crate::pool::PoolError;

    const POOL: PoolId = PoolId::new(1);
    const SC: ShareClassId = ShareClassId::new(1);

    fn tbill() -> Asset {
        Asset::new(AssetId::new(10), 6)
    }

    fn usd6() -> Asset {
        Asset::new(AssetId::new(840), 6)
    }

    fn setup() -> Result<(Holdings, PoolRegistry, Caller)> {
        let admin = Caller::new();
        let mut pools = PoolRegistry::new(admin);
        pools.register(admin, POOL, usd6())?;
        let mut holdings = Holdings::new(admin);
        holdings.allow_asset(admin, POOL, tbill().id, true)?;
        Ok((holdings, pools, admin))
    }

    fn create_default(holdings: &mut Holdings, pools: &PoolRegistry, admin: Caller) -> Result<()> {
        holdings.create(
            admin,
            pools,
            POOL,
            SC,
            tbill(),
            Arc::new(OneToOneValuation),
            &[],
        )?;
        Ok(())
    }

    #[test]
    fn test_create_and_read_back() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        create_default(&mut holdings, &pools, admin)?;

        assert!(holdings.exists(POOL, SC, tbill().id));
        assert_eq!(holdings.amount(POOL, SC, tbill().id)?, 0);
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 0);
        Ok(())
    }

    #[test]
    fn test_create_rejects_null_share_class() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        let result = holdings.create(
            admin,
            &pools,
            POOL,
            ShareClassId::NULL,
            tbill(),
            Arc::new(OneToOneValuation),
            &[],
        );
        assert_matches!(result, Err(HoldingsError::InvalidShareClass));
        Ok(())
    }

    #[test]
    fn test_create_rejects_unlisted_asset() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        let exotic = Asset::new(AssetId::new(99), 8);
        let result = holdings.create(
            admin,
            &pools,
            POOL,
            SC,
            exotic,
            Arc::new(OneToOneValuation),
            &[],
        );
        assert_matches!(result, Err(HoldingsError::AssetNotAllowed(_, _)));
        Ok(())
    }

    #[test]
    fn test_create_rejects_unknown_pool() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        let result = holdings.create(
            admin,
            &pools,
            PoolId::new(9),
            SC,
            tbill(),
            Arc::new(OneToOneValuation),
            &[],
        );
        assert_matches!(result, Err(HoldingsError::Pool(PoolError::PoolNotFound(_))));
        Ok(())
    }

    #[test]
    fn test_recreation_fails_instead_of_overwriting() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        create_default(&mut holdings, &pools, admin)?;
        holdings.increase(
            admin,
            &pools,
            POOL,
            SC,
            tbill().id,
            &OneToOneValuation,
            100,
        )?;

        // A second create must not silently zero the live position.
        let result = holdings.create(
            admin,
            &pools,
            POOL,
            SC,
            tbill(),
            Arc::new(OneToOneValuation),
            &[],
        );
        assert_matches!(result, Err(HoldingsError::AlreadyExists(_, _, _)));
        assert_eq!(holdings.amount(POOL, SC, tbill().id)?, 100);
        Ok(())
    }

    #[test]
    fn test_increase_with_one_off_provider() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        // Stored default quotes unit-for-unit; the per-call provider below
        // overrides it.
        create_default(&mut holdings, &pools, admin)?;

        let ten = TransientValuation::with_price(D18::from_int(10)?);
        let delta = holdings.increase(admin, &pools, POOL, SC, tbill().id, &ten, 20)?;
        assert_eq!(delta, 200);
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 200);

        let six_and_a_quarter = TransientValuation::with_price(D18::from_rational(25, 4)?);
        let delta = holdings.increase(admin, &pools, POOL, SC, tbill().id, &six_and_a_quarter, 8)?;
        assert_eq!(delta, 50);
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 250);
        assert_eq!(holdings.amount(POOL, SC, tbill().id)?, 28);
        Ok(())
    }

    #[test]
    fn test_decrease_offsets_increase() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        create_default(&mut holdings, &pools, admin)?;

        holdings.increase(admin, &pools, POOL, SC, tbill().id, &OneToOneValuation, 500)?;
        let delta =
            holdings.decrease(admin, &pools, POOL, SC, tbill().id, &OneToOneValuation, 500)?;
        assert_eq!(delta, 500);
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 0);
        assert_eq!(holdings.amount(POOL, SC, tbill().id)?, 0);
        Ok(())
    }

    #[test]
    fn test_decrease_beyond_balance_fails() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        create_default(&mut holdings, &pools, admin)?;
        holdings.increase(admin, &pools, POOL, SC, tbill().id, &OneToOneValuation, 10)?;

        assert_matches!(
            holdings.decrease(admin, &pools, POOL, SC, tbill().id, &OneToOneValuation, 11),
            Err(HoldingsError::InsufficientBalance)
        );
        // Failed decrease must leave the position untouched.
        assert_eq!(holdings.amount(POOL, SC, tbill().id)?, 10);
        Ok(())
    }

    #[test]
    fn test_update_tracks_price_move() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        let admin_provider = Arc::new(TransientValuation::with_price(D18::from_int(10)?));
        holdings.create(
            admin,
            &pools,
            POOL,
            SC,
            tbill(),
            admin_provider,
            &[],
        )?;
        holdings.increase(
            admin,
            &pools,
            POOL,
            SC,
            tbill().id,
            &TransientValuation::with_price(D18::from_int(10)?),
            20,
        )?;
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 200);

        // Price drops from 10 to 7.5: value 200 -> 150, delta -50.
        holdings.update_valuation(
            admin,
            POOL,
            SC,
            tbill().id,
            Arc::new(TransientValuation::with_price(D18::from_rational(15, 2)?)),
        )?;
        let delta = holdings.update(admin, &pools, POOL, SC, tbill().id)?;
        assert_eq!(delta, -50);
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 150);

        // No intervening price change: the second update is a no-op.
        assert_eq!(holdings.update(admin, &pools, POOL, SC, tbill().id)?, 0);
        Ok(())
    }

    #[test]
    fn test_update_positive_delta() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        holdings.create(
            admin,
            &pools,
            POOL,
            SC,
            tbill(),
            Arc::new(TransientValuation::with_price(D18::from_int(10)?)),
            &[],
        )?;
        holdings.increase(
            admin,
            &pools,
            POOL,
            SC,
            tbill().id,
            &TransientValuation::with_price(D18::from_int(10)?),
            20,
        )?;

        holdings.update_valuation(
            admin,
            POOL,
            SC,
            tbill().id,
            Arc::new(TransientValuation::with_price(D18::from_int(12)?)),
        )?;
        assert_eq!(holdings.update(admin, &pools, POOL, SC, tbill().id)?, 40);
        assert_eq!(holdings.value(POOL, SC, tbill().id)?, 240);
        Ok(())
    }

    #[test]
    fn test_operations_on_missing_holding() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;

        assert_matches!(
            holdings.increase(admin, &pools, POOL, SC, tbill().id, &OneToOneValuation, 1),
            Err(HoldingsError::NotFound(_, _, _))
        );
        assert_matches!(
            holdings.update(admin, &pools, POOL, SC, tbill().id),
            Err(HoldingsError::NotFound(_, _, _))
        );
        assert_matches!(
            holdings.value(POOL, SC, tbill().id),
            Err(HoldingsError::NotFound(_, _, _))
        );
        Ok(())
    }

    #[test]
    fn test_bind_and_rebind_accounts() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        let asset_account = AccountId::new(1, AccountKind::Asset);
        let equity_account = AccountId::new(2, AccountKind::Equity);
        holdings.create(
            admin,
            &pools,
            POOL,
            SC,
            tbill(),
            Arc::new(OneToOneValuation),
            &[asset_account, equity_account],
        )?;

        assert_eq!(
            holdings.account_id(POOL, SC, tbill().id, AccountKind::Asset)?,
            Some(asset_account)
        );
        assert_eq!(
            holdings.account_id(POOL, SC, tbill().id, AccountKind::Gain)?,
            None
        );

        let replacement = AccountId::new(7, AccountKind::Asset);
        holdings.set_account_id(admin, POOL, SC, tbill().id, replacement)?;
        assert_eq!(
            holdings.account_id(POOL, SC, tbill().id, AccountKind::Asset)?,
            Some(replacement)
        );
        Ok(())
    }

    #[test]
    fn test_bind_rejects_non_role_kind() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        let result = holdings.create(
            admin,
            &pools,
            POOL,
            SC,
            tbill(),
            Arc::new(OneToOneValuation),
            &[AccountId::new(1, AccountKind::Liability)],
        );
        assert_matches!(result, Err(HoldingsError::UnsupportedAccountKind(_)));
        Ok(())
    }

    #[test]
    fn test_valuation_errors_propagate() -> Result<()> {
        let (mut holdings, pools, admin) = setup()?;
        create_default(&mut holdings, &pools, admin)?;

        let unset = TransientValuation::new();
        assert_matches!(
            holdings.increase(admin, &pools, POOL, SC, tbill().id, &unset, 5),
            Err(HoldingsError::Valuation(ValuationError::PriceNotSet))
        );
        Ok(())
    }

    #[test]
    fn test_allow_asset_toggle() -> Result<()> {
        let (mut holdings, _, admin) = setup()?;
        assert!(holdings.is_allowed(POOL, tbill().id));
        holdings.allow_asset(admin, POOL, tbill().id, false)?;
        assert!(!holdings.is_allowed(POOL, tbill().id));
        Ok(())
    }

    #[test]
    fn test_non_ward_is_rejected() -> Result<()> {
        let (mut holdings, pools, _) = setup()?;
        let stranger = Caller::new();
        assert_matches!(
            holdings.create(
                stranger,
                &pools,
                POOL,
                SC,
                tbill(),
                Arc::new(OneToOneValuation),
                &[],
            ),
            Err(HoldingsError::NotAuthorized(_))
        );
        Ok(())
    }
}
