use std::sync::Arc;

use anyhow::Result;
use folio_core::accounting::{AccountId, AccountKind};
use folio_core::engine::Engine;
use folio_core::holdings::{OracleValuation, TransientValuation};
use folio_primitives::{Asset, AssetId, PoolId, ShareClassId, D18};

/// Simulates a fund accounting day across two holdings.
///
/// Verifies that the public API is cohesive from an external caller's
/// perspective: deposits, mark-to-market in both directions, and a partial
/// withdrawal, with the ledger identity and journal intact throughout.
#[test]
fn simulation_fund_day_cycle() -> Result<()> {
    let pool = PoolId::new(7);
    let growth = ShareClassId::new(1);

    let usd = Asset::new(AssetId::new(840), 6);
    let tbill = Asset::new(AssetId::new(10), 6);
    let weth = Asset::new(AssetId::new(20), 18);

    let tbill_accounts = [
        AccountId::new(1, AccountKind::Asset),
        AccountId::new(1, AccountKind::Equity),
        AccountId::new(1, AccountKind::Gain),
        AccountId::new(1, AccountKind::Loss),
    ];
    let weth_accounts = [
        AccountId::new(2, AccountKind::Asset),
        AccountId::new(2, AccountKind::Equity),
        AccountId::new(2, AccountKind::Gain),
        AccountId::new(2, AccountKind::Loss),
    ];

    let mut engine = Engine::new();
    engine.create_pool(pool, usd)?;

    // T-bills are marked by the fund administrator; WETH comes off an
    // oracle rate board.
    engine.init_holding(
        pool,
        growth,
        tbill,
        Arc::new(TransientValuation::with_price(D18::from_int(100)?)),
        &tbill_accounts,
    )?;

    let mut board = OracleValuation::new();
    board.set_rate(weth.id, usd.id, D18::from_int(2000)?)?;
    engine.init_holding(pool, growth, weth, Arc::new(board), &weth_accounts)?;

    // Morning: fund 5000 bills at $100 and 3 WETH at $2000.
    assert_eq!(
        engine.deposit(pool, growth, tbill.id, 5_000_000_000)?,
        500_000_000_000 // $500,000.00 in 6-decimal units
    );
    assert_eq!(
        engine.deposit(pool, growth, weth.id, 3_000_000_000_000_000_000)?,
        6_000_000_000 // $6000.00 in 6-decimal units
    );

    // Midday: WETH rallies to $2400 -> +$1200 marked as gain.
    let mut board = OracleValuation::new();
    board.set_rate(weth.id, usd.id, D18::from_int(2400)?)?;
    engine.update_valuation(pool, growth, weth.id, Arc::new(board))?;
    assert_eq!(engine.revalue(pool, growth, weth.id)?, 1_200_000_000);

    // Afternoon: redeem 1000 bills at the unchanged $100 mark.
    assert_eq!(
        engine.withdraw(pool, growth, tbill.id, 1_000_000_000)?,
        100_000_000_000
    );

    // Close: bills reprice to $95 -> -$5 per unit on 4000 units.
    engine.update_valuation(
        pool,
        growth,
        tbill.id,
        Arc::new(TransientValuation::with_price(D18::from_int(95)?)),
    )?;
    assert_eq!(engine.revalue(pool, growth, tbill.id)?, -20_000_000_000);

    // Positions: 4000 bills at $95, 3 WETH at $2400.
    assert_eq!(
        engine.holdings().value(pool, growth, tbill.id)?,
        380_000_000_000
    );
    assert_eq!(engine.holdings().amount(pool, growth, tbill.id)?, 4_000_000_000);
    assert_eq!(
        engine.holdings().value(pool, growth, weth.id)?,
        7_200_000_000
    );

    // Ledger: asset accounts carry the marked values, gain/loss the moves.
    assert_eq!(
        engine.ledger().account_value(pool, tbill_accounts[0])?,
        380_000_000_000
    );
    assert_eq!(
        engine.ledger().account_value(pool, weth_accounts[0])?,
        7_200_000_000
    );
    assert_eq!(
        engine.ledger().account_value(pool, weth_accounts[2])?,
        1_200_000_000
    );
    assert_eq!(
        engine.ledger().account_value(pool, tbill_accounts[3])?,
        20_000_000_000
    );

    // Every holding satisfies asset == equity + gain - loss.
    assert_eq!(engine.holding_identity_gap(pool, growth, tbill.id)?, 0);
    assert_eq!(engine.holding_identity_gap(pool, growth, weth.id)?, 0);

    // The pool's books balance and the journal is sequenced 1..=n.
    let (debit, credit) = engine.ledger().trial_balance(pool);
    assert_eq!(debit, credit);
    for (i, batch) in engine.ledger().journal().iter().enumerate() {
        assert_eq!(batch.sequence, i as u64 + 1);
        assert_eq!(batch.pool, pool);
    }
    assert_eq!(engine.ledger().journal().len(), 5);

    Ok(())
}
