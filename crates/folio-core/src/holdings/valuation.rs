//! Pluggable strategies converting a quantity of one asset into an
//! equivalent amount of another, typically the pool's accounting currency.

use std::collections::HashMap;
use std::fmt;

use folio_primitives::{convert_decimals, Asset, AssetId, FixedPointError, Rounding, D18};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValuationError {
    #[error("no rate known for {0} -> {1}")]
    MissingRate(AssetId, AssetId),

    #[error("override price has not been set")]
    PriceNotSet,

    #[error("rate must be positive")]
    InvalidRate,

    #[error(transparent)]
    Math(#[from] FixedPointError),
}

/// Converts `amount` of `base` into the equivalent amount of `quote`.
///
/// Implementations must be deterministic for a given provider state and must
/// not mutate ledger or holdings state; the ledger layer relies on repeated
/// quotes against an unchanged provider returning the same value.
pub trait Valuation: fmt::Debug + Send + Sync {
    fn quote(&self, amount: u128, base: Asset, quote: Asset) -> Result<u128, ValuationError>;
}

/// Applies `price` (quote units per whole base unit) to a raw base amount,
/// rescaling through the 18-decimal intermediate on both ends.
fn quote_at_price(
    price: D18,
    amount: u128,
    base: Asset,
    quote: Asset,
) -> Result<u128, ValuationError> {
    let normalized = convert_decimals(amount, base.decimals, 18, Rounding::Down)?;
    let valued = price.mul_int(normalized, Rounding::Down)?;
    Ok(convert_decimals(valued, 18, quote.decimals, Rounding::Down)?)
}

/// Price 1.0: one whole base unit is worth one whole quote unit, with the
/// raw amount rescaled between the two precisions.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityValuation;

impl Valuation for IdentityValuation {
    fn quote(&self, amount: u128, base: Asset, quote: Asset) -> Result<u128, ValuationError> {
        Ok(convert_decimals(
            amount,
            base.decimals,
            quote.decimals,
            Rounding::Down,
        )?)
    }
}

/// Raw unit-for-unit passthrough: no price, no rescaling. Only meaningful
/// when base and quote share a precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneToOneValuation;

impl Valuation for OneToOneValuation {
    fn quote(&self, amount: u128, _base: Asset, _quote: Asset) -> Result<u128, ValuationError> {
        Ok(amount)
    }
}

/// Caller-managed override price. The holder of the `&mut` reference is the
/// privileged party; quoting before a price is set fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransientValuation {
    price: Option<D18>,
}

impl TransientValuation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(price: D18) -> Self {
        Self { price: Some(price) }
    }

    pub fn set_price(&mut self, price: D18) {
        self.price = Some(price);
    }

    pub fn price(&self) -> Option<D18> {
        self.price
    }
}

impl Valuation for TransientValuation {
    fn quote(&self, amount: u128, base: Asset, quote: Asset) -> Result<u128, ValuationError> {
        let price = self.price.ok_or(ValuationError::PriceNotSet)?;
        quote_at_price(price, amount, base, quote)
    }
}

/// Rate board keyed by (base, quote) asset pairs. Falls back to the
/// reciprocal of the inverse pair when no direct rate is known.
#[derive(Debug, Clone, Default)]
pub struct OracleValuation {
    rates: HashMap<(AssetId, AssetId), D18>,
}

impl OracleValuation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rate(
        &mut self,
        base: AssetId,
        quote: AssetId,
        rate: D18,
    ) -> Result<(), ValuationError> {
        if rate.is_zero() {
            return Err(ValuationError::InvalidRate);
        }
        self.rates.insert((base, quote), rate);
        Ok(())
    }

    fn rate_for(&self, base: AssetId, quote: AssetId) -> Result<D18, ValuationError> {
        if let Some(rate) = self.rates.get(&(base, quote)) {
            return Ok(*rate);
        }
        if let Some(inverse) = self.rates.get(&(quote, base)) {
            return Ok(inverse.reciprocal(Rounding::Down)?);
        }
        Err(ValuationError::MissingRate(base, quote))
    }
}

impl Valuation for OracleValuation {
    fn quote(&self, amount: u128, base: Asset, quote: Asset) -> Result<u128, ValuationError> {
        if base.id == quote.id {
            return Ok(amount);
        }
        let rate = self.rate_for(base.id, quote.id)?;
        quote_at_price(rate, amount, base, quote)
    }
}
