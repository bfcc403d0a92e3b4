//! Integration tests for the boostlend protocol.
//!
//! These tests drive the full state machine over the in-memory price feeds
//! and ledger, covering position lifecycles, boost, liquidation, yield
//! routing and fee revenue.

use proptest::prelude::*;

use boostlend::cli::{CliConfig, Scenario, ScenarioRunner};
use boostlend::prelude::*;

type Protocol = ProtocolStateMachine<PriceFeedRegistry, InMemoryLedger>;

const BTC: u128 = 100_000_000;
const START: u64 = 1_700_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn account(label: &str) -> AccountId {
    AccountId::from_label(label)
}

fn admin() -> AccountId {
    account("admin")
}

fn alice() -> AccountId {
    account("alice")
}

fn wbtc() -> AssetId {
    AssetId::new("wBTC").unwrap()
}

fn busd() -> AssetId {
    AssetId::new("bUSD").unwrap()
}

fn boost() -> AssetId {
    AssetId::new("BOOST").unwrap()
}

fn usd(amount: u128) -> u128 {
    amount * WAD
}

fn set_btc_price(p: &mut Protocol, price: u128) {
    let now = p.timestamp();
    p.oracle_mut()
        .set_price(wbtc(), Wad::from_integer(price).unwrap(), now)
        .unwrap();
}

/// wBTC at 60,000 with a 0.75 base factor, 1M bUSD of lending liquidity,
/// 1 wBTC and 10,000 BOOST for alice
fn protocol() -> Protocol {
    let mut p = ProtocolStateMachine::new(
        admin(),
        ProtocolParams::default(),
        PriceFeedRegistry::new(),
        InMemoryLedger::new(),
    )
    .unwrap();
    p.register_asset(&admin(), busd(), 18).unwrap();
    p.register_asset(&admin(), boost(), 18).unwrap();
    p.register_asset(&admin(), wbtc(), 8).unwrap();
    p.set_collateral_factor(&admin(), &wbtc(), Wad::from_bps(7_500)).unwrap();
    p.add_reward_asset(&admin(), busd()).unwrap();
    p.configure(&admin()).unwrap();
    p.begin_block(1, START).unwrap();
    set_btc_price(&mut p, 60_000);

    let custody = p.lending().custody();
    p.ledger_mut().mint(&busd(), &custody, usd(1_000_000)).unwrap();
    p.ledger_mut().mint(&wbtc(), &alice(), BTC).unwrap();
    p.ledger_mut().mint(&boost(), &alice(), usd(10_000)).unwrap();
    p
}

/// Alice's 1 wBTC position with 45,000 bUSD of debt
fn indebted_protocol() -> (Protocol, PositionId) {
    let mut p = protocol();
    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    p.borrow(alice(), id, usd(45_000)).unwrap();
    (p, id)
}

fn snapshot(p: &Protocol) -> (InMemoryLedger, Hash, String) {
    let positions: Vec<&Position> = p.lending().positions().all_positions().collect();
    (
        p.ledger().clone(),
        p.state_hash().unwrap(),
        serde_json::to_string(&positions).unwrap(),
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// BORROWING LIMITS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_borrow_limit_at_base_factor() {
    let mut p = protocol();
    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    assert_eq!(p.max_borrow(id).unwrap(), usd(45_000));

    let err = p.borrow(alice(), id, usd(46_000)).unwrap_err();
    assert!(matches!(err, Error::InsufficientHealthFactor { .. }));

    let hf = p.borrow(alice(), id, usd(40_000)).unwrap();
    assert_eq!(hf, Wad::from_ratio(45_000, 40_000).unwrap());
    assert_eq!(p.ledger().balance_of(&busd(), &alice()), usd(40_000));
}

#[test]
fn test_borrow_exactly_at_threshold() {
    let (p, id) = indebted_protocol();
    assert_eq!(p.health_factor(id).unwrap(), Wad::ONE);
    assert_eq!(p.max_borrow(id).unwrap(), 0);
}

#[test]
fn test_stake_boost_permits_larger_borrow() {
    let mut p = protocol();
    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();

    let err = p.borrow(alice(), id, usd(48_000)).unwrap_err();
    assert!(matches!(err, Error::InsufficientHealthFactor { .. }));

    p.stake(alice(), usd(5_000)).unwrap();
    assert_eq!(p.lending().boost().bonus_of(&alice()).unwrap(), Wad::from_bps(1_000));
    assert_eq!(
        p.position_report(id).unwrap().effective_factor,
        Wad::from_bps(8_500)
    );

    p.borrow(alice(), id, usd(48_000)).unwrap();
    assert!(p.health_factor(id).unwrap() >= Wad::ONE);
}

#[test]
fn test_unstake_that_breaks_health_fails() {
    let mut p = protocol();
    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    p.stake(alice(), usd(5_000)).unwrap();
    p.borrow(alice(), id, usd(48_000)).unwrap();

    let before = snapshot(&p);
    let err = p.unstake(alice(), usd(5_000)).unwrap_err();
    assert!(matches!(err, Error::UnstakeViolatesHealthFactor { position_id: 1, .. }));
    assert_eq!(snapshot(&p), before);

    // 4,000 staked keeps +8pp: 0.83 * 60,000 = 49,800 >= 48,000
    assert_eq!(p.unstake(alice(), usd(1_000)).unwrap(), usd(4_000));
    assert_eq!(p.ledger().balance_of(&boost(), &alice()), usd(6_000));
}

#[test]
fn test_unstake_without_debt_is_free() {
    let mut p = protocol();
    p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    p.stake(alice(), usd(5_000)).unwrap();
    assert_eq!(p.unstake(alice(), usd(5_000)).unwrap(), 0);

    let err = p.unstake(alice(), 1).unwrap_err();
    assert!(matches!(err, Error::InsufficientStake { .. }));
}

#[test]
fn test_unstake_checks_every_indebted_position() {
    let mut p = protocol();
    let weth = AssetId::new("wETH").unwrap();
    p.register_asset(&admin(), weth.clone(), 18).unwrap();
    p.set_collateral_factor(&admin(), &weth, Wad::from_bps(7_000)).unwrap();
    let now = p.timestamp();
    p.oracle_mut()
        .set_price(weth.clone(), Wad::from_integer(3_000).unwrap(), now)
        .unwrap();
    p.ledger_mut().mint(&weth, &alice(), 10 * WAD).unwrap();

    p.stake(alice(), usd(5_000)).unwrap();
    let btc_id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    let eth_id = p.deposit_collateral(alice(), weth, 10 * WAD).unwrap();
    // 0.75 * 60,000 covers 40,000 without the boost
    p.borrow(alice(), btc_id, usd(40_000)).unwrap();
    // 0.80 * 30,000 = 24,000 boosted, 21,000 unboosted
    p.borrow(alice(), eth_id, usd(23_000)).unwrap();

    let payer = fund_fees(&mut p, usd(1_000));
    p.collect_fees(payer, busd(), usd(1_000)).unwrap();
    let reward = p.calculate_reward(&alice(), &busd()).unwrap();

    let before = snapshot(&p);
    let err = p.unstake(alice(), usd(5_000)).unwrap_err();
    assert!(matches!(
        err,
        Error::UnstakeViolatesHealthFactor { position_id, .. } if position_id == eth_id.0
    ));
    assert_eq!(snapshot(&p), before);
    assert_eq!(p.lending().boost().stake_of(&alice()), usd(5_000));
    assert_eq!(p.calculate_reward(&alice(), &busd()).unwrap(), reward);
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION LIFECYCLE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_round_trip_restores_collateral() {
    let mut p = protocol();
    let before = p.ledger().balance_of(&wbtc(), &alice());

    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    p.borrow(alice(), id, usd(40_000)).unwrap();
    assert_eq!(p.repay(alice(), id, usd(40_000)).unwrap(), usd(40_000));
    assert_eq!(p.withdraw_collateral(alice(), id, BTC).unwrap(), 0);

    assert_eq!(p.ledger().balance_of(&wbtc(), &alice()), before);
    assert_eq!(p.ledger().balance_of(&busd(), &alice()), 0);
    assert_eq!(p.position(id).unwrap().status, PositionStatus::Closed);

    let log = p.end_block();
    for kind in [
        "PositionOpened",
        "CollateralDeposited",
        "Borrowed",
        "Repaid",
        "CollateralWithdrawn",
        "PositionClosed",
    ] {
        assert_eq!(log.filter_by_type(kind).len(), 1, "{}", kind);
    }
}

#[test]
fn test_redeposit_after_close_opens_new_position() {
    let mut p = protocol();
    let first = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    p.withdraw_collateral(alice(), first, BTC).unwrap();

    let second = p.deposit_collateral(alice(), wbtc(), BTC / 2).unwrap();
    assert_ne!(first, second);
    assert!(p.position(second).unwrap().is_active());

    let err = p.deposit_collateral(alice(), wbtc(), 0).unwrap_err();
    assert_eq!(err, Error::ZeroAmount);
}

#[test]
fn test_repay_is_clamped_and_open_to_anyone() {
    let (mut p, id) = indebted_protocol();
    let helper = account("helper");
    p.ledger_mut().mint(&busd(), &helper, usd(50_000)).unwrap();

    assert_eq!(p.repay(helper, id, usd(50_000)).unwrap(), usd(45_000));
    assert_eq!(p.ledger().balance_of(&busd(), &helper), usd(5_000));
    assert_eq!(p.position(id).unwrap().debt, 0);
    assert!(p.position(id).unwrap().is_active());
    assert_eq!(p.repay(helper, id, 1).unwrap(), 0);
}

#[test]
fn test_dust_debt_reads_as_unbounded_health() {
    let mut p = protocol();
    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    assert!(p.borrow(alice(), id, 1).unwrap().is_max());

    p.borrow(alice(), id, usd(30_000)).unwrap();
    let debt = p.position(id).unwrap().debt;
    p.repay(alice(), id, debt - 50).unwrap();
    assert_eq!(p.position(id).unwrap().debt, 50);
    assert!(p.health_factor(id).unwrap().is_max());

    p.withdraw_collateral(alice(), id, BTC / 10).unwrap();
    p.stake(alice(), usd(1_000)).unwrap();
    p.unstake(alice(), usd(1_000)).unwrap();
    assert!(p.find_liquidatable().is_empty());
    assert!(p.position_report(id).unwrap().health_factor.is_max());
}

#[test]
fn test_failed_withdraw_leaves_state_identical() {
    let (mut p, id) = indebted_protocol();
    let before = snapshot(&p);

    let err = p.withdraw_collateral(alice(), id, 1).unwrap_err();
    assert!(matches!(err, Error::WithdrawalViolatesHealthFactor { .. }));
    assert_eq!(snapshot(&p), before);

    let err = p.withdraw_collateral(alice(), id, BTC + 1).unwrap_err();
    assert!(matches!(err, Error::InsufficientCollateral { .. }));

    let err = p.withdraw_collateral(account("mallory"), id, 1).unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));
    assert_eq!(snapshot(&p), before);
}

#[test]
fn test_dry_custody_aborts_borrow() {
    let mut p = ProtocolStateMachine::new(
        admin(),
        ProtocolParams::default(),
        PriceFeedRegistry::new(),
        InMemoryLedger::new(),
    )
    .unwrap();
    p.register_asset(&admin(), busd(), 18).unwrap();
    p.register_asset(&admin(), wbtc(), 8).unwrap();
    p.set_collateral_factor(&admin(), &wbtc(), Wad::from_bps(7_500)).unwrap();
    p.configure(&admin()).unwrap();
    p.begin_block(1, START).unwrap();
    set_btc_price(&mut p, 60_000);
    p.ledger_mut().mint(&wbtc(), &alice(), BTC).unwrap();

    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();
    let err = p.borrow(alice(), id, usd(1_000)).unwrap_err();
    assert!(matches!(err, Error::TransferFailed { .. }));
    assert_eq!(p.position(id).unwrap().debt, 0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_stale_and_missing_prices() {
    let mut p = protocol();
    let id = p.deposit_collateral(alice(), wbtc(), BTC).unwrap();

    p.begin_block(2, START + 3_601).unwrap();
    assert!(matches!(
        p.borrow(alice(), id, usd(1)).unwrap_err(),
        Error::StalePrice { .. }
    ));

    let eth = AssetId::new("wETH").unwrap();
    p.register_asset(&admin(), eth.clone(), 18).unwrap();
    p.set_collateral_factor(&admin(), &eth, Wad::from_bps(8_000)).unwrap();
    p.ledger_mut().mint(&eth, &alice(), usd(1)).unwrap();
    let eth_id = p.deposit_collateral(alice(), eth, usd(1)).unwrap();
    assert!(matches!(
        p.borrow(alice(), eth_id, usd(1)).unwrap_err(),
        Error::NoFeedConfigured(_)
    ));
}

#[test]
fn test_unsupported_collateral() {
    let mut p = protocol();
    p.ledger_mut().mint(&boost(), &alice(), 1).unwrap();
    let err = p.deposit_collateral(alice(), boost(), 1).unwrap_err();
    assert!(matches!(err, Error::UnsupportedAsset(_)));
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

fn fund_liquidator(p: &mut Protocol, amount: u128) -> AccountId {
    let liquidator = account("keeper");
    p.ledger_mut().mint(&busd(), &liquidator, amount).unwrap();
    liquidator
}

#[test]
fn test_healthy_loan_cannot_be_liquidated() {
    let (mut p, id) = indebted_protocol();
    let liquidator = fund_liquidator(&mut p, usd(45_000));
    let err = p.liquidate(liquidator, id, usd(45_000)).unwrap_err();
    assert!(matches!(err, Error::LoanIsHealthy { position_id: 1, .. }));
    assert!(p.find_liquidatable().is_empty());
}

#[test]
fn test_liquidation_after_price_drop_seizes_with_bonus() {
    let (mut p, id) = indebted_protocol();
    set_btc_price(&mut p, 50_000);
    let liquidator = fund_liquidator(&mut p, usd(45_000));

    let at_risk = p.find_liquidatable();
    assert_eq!(at_risk.len(), 1);
    assert_eq!(at_risk[0].0, id);

    let record = p.liquidate(liquidator, id, usd(45_000)).unwrap();
    assert_eq!(record.collateral_seized, 94_500_000);
    assert_eq!(record.remaining_debt, 0);
    assert_eq!(record.remaining_collateral, 5_500_000);
    assert_eq!(record.written_off, 0);

    assert_eq!(p.ledger().balance_of(&wbtc(), &liquidator), 94_500_000);
    assert_eq!(p.ledger().balance_of(&busd(), &liquidator), 0);
    assert!(p.position(id).unwrap().is_active());
}

#[test]
fn test_partial_liquidation_keeps_position_open() {
    let (mut p, id) = indebted_protocol();
    set_btc_price(&mut p, 50_000);
    let liquidator = fund_liquidator(&mut p, usd(10_000));

    let record = p.liquidate(liquidator, id, usd(10_000)).unwrap();
    assert_eq!(record.collateral_seized, 21_000_000);

    let position = p.position(id).unwrap();
    assert!(position.is_active());
    assert_eq!(position.debt, usd(35_000));
    assert_eq!(position.collateral, 79_000_000);
}

#[test]
fn test_overcovered_liquidation_writes_off_residual() {
    let (mut p, id) = indebted_protocol();
    set_btc_price(&mut p, 30_000);
    let liquidator = fund_liquidator(&mut p, usd(40_000));

    let record = p.liquidate(liquidator, id, usd(40_000)).unwrap();
    assert_eq!(record.collateral_seized, BTC);
    assert_eq!(record.written_off, usd(5_000));
    assert_eq!(p.lending().bad_debt(), usd(5_000));
    assert_eq!(p.position(id).unwrap().status, PositionStatus::Closed);

    let log = p.end_block();
    assert_eq!(log.filter_by_type("BadDebtWrittenOff").len(), 1);
    assert_eq!(log.filter_by_type("PositionClosed").len(), 1);
}

#[test]
fn test_failed_liquidation_leaves_state_identical() {
    let (mut p, id) = indebted_protocol();
    set_btc_price(&mut p, 50_000);
    let liquidator = fund_liquidator(&mut p, usd(1_000));
    let before = snapshot(&p);

    let err = p.liquidate(liquidator, id, usd(45_000)).unwrap_err();
    assert!(matches!(err, Error::TransferFailed { .. }));
    assert_eq!(snapshot(&p), before);
}

// ═══════════════════════════════════════════════════════════════════════════════
// YIELD ROUTING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_keeper_routes_yield_to_repayment() {
    let (mut p, id) = indebted_protocol();
    let keeper = account("harvester");
    let router = p.router().account();
    p.ledger_mut().mint(&busd(), &router, usd(50_000)).unwrap();

    let err = p.route_yield_to_repayment(keeper, id, usd(1_000)).unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));

    p.set_keeper(&admin(), keeper, true).unwrap();
    assert_eq!(p.route_yield_to_repayment(keeper, id, usd(1_000)).unwrap(), usd(1_000));
    assert_eq!(p.position(id).unwrap().debt, usd(44_000));

    // clamped to the remaining debt
    assert_eq!(p.route_yield_to_repayment(keeper, id, usd(50_000)).unwrap(), usd(44_000));
    assert_eq!(p.router().applied_to(id), usd(45_000));
    assert_eq!(p.ledger().balance_of(&busd(), &router), usd(5_000));
}

#[test]
fn test_harvest_claims_vault_yield_into_debt() {
    let (mut p, id) = indebted_protocol();
    let keeper = account("harvester");
    let vault = account("wbtc-vault");
    let router = p.router().account();
    p.set_keeper(&admin(), keeper, true).unwrap();

    let err = p.harvest_and_apply(keeper, id).unwrap_err();
    assert!(matches!(err, Error::NoYieldSource(_)));

    assert!(matches!(
        p.set_yield_vault(&alice(), wbtc(), Some(vault)),
        Err(Error::NotAuthorized(_))
    ));
    p.set_yield_vault(&admin(), wbtc(), Some(vault)).unwrap();
    assert_eq!(p.yield_vaults().vault_of(&wbtc()), Some(vault));
    p.ledger_mut().mint(&busd(), &vault, usd(1_000)).unwrap();

    let err = p.harvest_and_apply(alice(), id).unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));
    assert_eq!(p.ledger().balance_of(&busd(), &vault), usd(1_000));

    let record = p.harvest_and_apply(keeper, id).unwrap();
    assert_eq!(record, HarvestRecord { claimed: usd(1_000), applied: usd(1_000) });
    assert_eq!(p.position(id).unwrap().debt, usd(44_000));
    assert_eq!(p.ledger().balance_of(&busd(), &vault), 0);

    // only the debt is applied; the surplus stays with the router
    p.ledger_mut().mint(&busd(), &vault, usd(50_000)).unwrap();
    let record = p.harvest_and_apply(keeper, id).unwrap();
    assert_eq!(record, HarvestRecord { claimed: usd(50_000), applied: usd(44_000) });
    assert_eq!(p.position(id).unwrap().debt, 0);
    assert_eq!(p.ledger().balance_of(&busd(), &router), usd(6_000));
    assert_eq!(p.router().applied_to(id), usd(45_000));
    assert_eq!(p.end_block().filter_by_type("YieldHarvested").len(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// REVENUE
// ═══════════════════════════════════════════════════════════════════════════════

fn fund_fees(p: &mut Protocol, amount: u128) -> AccountId {
    let payer = account("fee-source");
    p.ledger_mut().mint(&busd(), &payer, amount).unwrap();
    payer
}

#[test]
fn test_fee_split_and_sole_staker_claim() {
    let mut p = protocol();
    p.stake(alice(), usd(5_000)).unwrap();
    let payer = fund_fees(&mut p, usd(10_000));

    let split = p.collect_fees(payer, busd(), usd(10_000)).unwrap();
    assert_eq!(split, FeeSplit { disbursement: usd(1_000), rewards: usd(9_000) });
    let pool = p.splitter().disbursement_pool();
    assert_eq!(p.ledger().balance_of(&busd(), &pool), usd(1_000));

    assert_eq!(p.calculate_reward(&alice(), &busd()).unwrap(), usd(9_000));
    assert_eq!(p.claim_reward(alice(), busd()).unwrap(), usd(9_000));
    assert_eq!(p.claim_reward(alice(), busd()).unwrap(), 0);
    assert_eq!(p.ledger().balance_of(&busd(), &alice()), usd(9_000));
}

#[test]
fn test_rewards_pro_rata_and_late_joiner() {
    let mut p = protocol();
    let (bob, carol, dave) = (account("bob"), account("carol"), account("dave"));
    for (who, amount) in [(bob, 1_000), (carol, 3_000), (dave, 1_000)] {
        p.ledger_mut().mint(&boost(), &who, usd(amount)).unwrap();
    }
    p.stake(bob, usd(1_000)).unwrap();
    p.stake(carol, usd(3_000)).unwrap();

    let payer = fund_fees(&mut p, usd(20_000));
    p.collect_fees(payer, busd(), usd(10_000)).unwrap();

    let bob_reward = p.calculate_reward(&bob, &busd()).unwrap();
    let carol_reward = p.calculate_reward(&carol, &busd()).unwrap();
    assert_eq!(bob_reward, usd(2_250));
    assert_eq!(carol_reward, bob_reward * 3);

    p.stake(dave, usd(1_000)).unwrap();
    assert_eq!(p.calculate_reward(&dave, &busd()).unwrap(), 0);

    // second round: 9,000 over 5,000 staked
    p.collect_fees(payer, busd(), usd(10_000)).unwrap();
    assert_eq!(p.calculate_reward(&dave, &busd()).unwrap(), usd(1_800));
    assert_eq!(p.calculate_reward(&bob, &busd()).unwrap(), usd(2_250 + 1_800));
}

#[test]
fn test_disbursement_requires_whitelist() {
    let mut p = protocol();
    let payer = fund_fees(&mut p, usd(10_000));
    p.collect_fees(payer, busd(), usd(10_000)).unwrap();
    let grantee = account("grantee");

    let err = p.disburse(admin(), busd(), grantee, usd(100)).unwrap_err();
    assert!(matches!(err, Error::RecipientNotWhitelisted(_)));

    p.set_recipient(&admin(), grantee, true).unwrap();
    let err = p.disburse(alice(), busd(), grantee, usd(100)).unwrap_err();
    assert!(matches!(err, Error::NotAuthorized(_)));

    p.disburse(admin(), busd(), grantee, usd(100)).unwrap();
    assert_eq!(p.ledger().balance_of(&busd(), &grantee), usd(100));
    assert_eq!(p.splitter().disbursed_of(&busd()), usd(100));
}

#[test]
fn test_fees_without_stakers_wait_for_first_stake() {
    let mut p = protocol();
    let payer = fund_fees(&mut p, usd(20_000));
    p.collect_fees(payer, busd(), usd(10_000)).unwrap();
    assert_eq!(p.splitter().pool(&busd()).unwrap().undistributed(), usd(9_000));

    p.stake(alice(), usd(1_000)).unwrap();
    p.collect_fees(payer, busd(), usd(10_000)).unwrap();
    assert_eq!(p.calculate_reward(&alice(), &busd()).unwrap(), usd(18_000));
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMINISTRATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_admin_gates() {
    let mut p = protocol();
    let mallory = account("mallory");
    assert!(matches!(
        p.register_asset(&mallory, AssetId::new("XYZ").unwrap(), 6),
        Err(Error::NotAuthorized(_))
    ));
    assert!(matches!(
        p.set_liquidation_bonus(&mallory, 100),
        Err(Error::NotAuthorized(_))
    ));
    assert!(matches!(
        p.set_keeper(&mallory, mallory, true),
        Err(Error::NotAuthorized(_))
    ));
    assert!(p.set_liquidation_bonus(&admin(), 800).is_ok());
    assert_eq!(p.liquidation().bonus_bps(), 800);
}

#[test]
fn test_operation_json_replay() {
    let mut p = protocol();
    let op: Operation = serde_json::from_str(&format!(
        r#"{{ "deposit_collateral": {{ "owner": "{}", "asset": "wBTC", "amount": {} }} }}"#,
        alice().to_hex(),
        BTC
    ))
    .unwrap();
    let outcome = p.execute(op).unwrap();
    assert_eq!(outcome, OperationOutcome::Deposited { position_id: PositionId(1) });
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_scenario_file_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("liquidation.json");
    std::fs::write(
        &path,
        r#"{
            "name": "price crash",
            "start_time": 1000,
            "steps": [
                { "action": "register_asset", "asset": "bUSD", "decimals": 18 },
                { "action": "register_asset", "asset": "wBTC", "decimals": 8, "collateral_factor": "0.75" },
                { "action": "configure" },
                { "action": "set_price", "asset": "wBTC", "price": "60000" },
                { "action": "mint", "account": "alice", "asset": "wBTC", "amount": "1" },
                { "action": "mint", "account": "boostlend/lending-custody", "asset": "bUSD", "amount": "100000" },
                { "action": "mint", "account": "keeper", "asset": "bUSD", "amount": "45000" },
                { "action": "deposit", "account": "alice", "asset": "wBTC", "amount": "1" },
                { "action": "borrow", "account": "alice", "position": 1, "amount": "45000" },
                { "action": "advance_block" },
                { "action": "set_price", "asset": "wBTC", "price": "50000" },
                { "action": "liquidate", "liquidator": "keeper", "position": 1, "amount": "45000" }
            ]
        }"#,
    )
    .unwrap();

    let scenario = Scenario::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let report = ScenarioRunner::run(&scenario, CliConfig::default().params).unwrap();
    assert_eq!(report.failures(), 0, "{:?}", report.steps);
    assert_eq!(report.positions[0].position.collateral, 5_500_000);
    assert!(report.events.iter().any(|e| e.event_type() == "Liquidated"));

    let out = dir.path().join("report.json");
    serde_json::to_writer(std::fs::File::create(&out).unwrap(), &report).unwrap();
    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.contains(&report.state_hash));
}

#[test]
fn test_scenario_harvest_steps() {
    let scenario = Scenario::from_json(
        r#"{
            "name": "vault harvest",
            "start_time": 1000,
            "steps": [
                { "action": "register_asset", "asset": "bUSD", "decimals": 18 },
                { "action": "register_asset", "asset": "wBTC", "decimals": 8, "collateral_factor": "0.75" },
                { "action": "configure" },
                { "action": "set_price", "asset": "wBTC", "price": "60000" },
                { "action": "set_keeper", "keeper": "keeper" },
                { "action": "set_yield_vault", "asset": "wBTC", "vault": "wbtc-vault" },
                { "action": "mint", "account": "alice", "asset": "wBTC", "amount": "1" },
                { "action": "mint", "account": "boostlend/lending-custody", "asset": "bUSD", "amount": "100000" },
                { "action": "deposit", "account": "alice", "asset": "wBTC", "amount": "1" },
                { "action": "borrow", "account": "alice", "position": 1, "amount": "10000" },
                { "action": "mint", "account": "wbtc-vault", "asset": "bUSD", "amount": "2500" },
                { "action": "harvest", "keeper": "keeper", "position": 1 },
                { "action": "set_yield_vault", "asset": "wBTC" },
                { "action": "harvest", "keeper": "keeper", "position": 1 }
            ]
        }"#,
    )
    .unwrap();

    let report = ScenarioRunner::run(&scenario, CliConfig::default().params).unwrap();
    assert_eq!(report.failures(), 1, "{:?}", report.steps);
    assert_eq!(report.positions[0].position.debt, usd(7_500));
    assert!(report.events.iter().any(|e| e.event_type() == "YieldHarvested"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTIES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
enum Action {
    Deposit(usize, u128),
    Borrow(usize, u128),
    Repay(usize, u128),
    Withdraw(usize, u128),
    Stake(usize, u128),
    Unstake(usize, u128),
}

fn action() -> impl Strategy<Value = Action> {
    prop_oneof![
        (0..2usize, 1..2 * BTC).prop_map(|(u, a)| Action::Deposit(u, a)),
        (0..2usize, 1..60_000u128).prop_map(|(u, a)| Action::Borrow(u, usd(a))),
        (0..2usize, 1..60_000u128).prop_map(|(u, a)| Action::Repay(u, usd(a))),
        (0..2usize, 1..2 * BTC).prop_map(|(u, a)| Action::Withdraw(u, a)),
        (0..2usize, 1..6_000u128).prop_map(|(u, a)| Action::Stake(u, usd(a))),
        (0..2usize, 1..6_000u128).prop_map(|(u, a)| Action::Unstake(u, usd(a))),
    ]
}

fn users() -> [AccountId; 2] {
    [account("user-0"), account("user-1")]
}

fn property_protocol() -> Protocol {
    let mut p = protocol();
    for user in users() {
        p.ledger_mut().mint(&wbtc(), &user, 5 * BTC).unwrap();
        p.ledger_mut().mint(&boost(), &user, usd(10_000)).unwrap();
    }
    p
}

fn open_position(p: &Protocol, owner: &AccountId) -> Option<PositionId> {
    p.lending().positions().find_open(owner, &wbtc())
}

fn apply(p: &mut Protocol, action: &Action) -> Result<()> {
    let users = users();
    match *action {
        Action::Deposit(u, a) => p.deposit_collateral(users[u], wbtc(), a).map(drop),
        Action::Borrow(u, a) => match open_position(p, &users[u]) {
            Some(id) => p.borrow(users[u], id, a).map(drop),
            None => Ok(()),
        },
        Action::Repay(u, a) => match open_position(p, &users[u]) {
            Some(id) => p.repay(users[u], id, a).map(drop),
            None => Ok(()),
        },
        Action::Withdraw(u, a) => match open_position(p, &users[u]) {
            Some(id) => p.withdraw_collateral(users[u], id, a).map(drop),
            None => Ok(()),
        },
        Action::Stake(u, a) => p.stake(users[u], a).map(drop),
        Action::Unstake(u, a) => p.unstake(users[u], a).map(drop),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_positions_stay_healthy(actions in prop::collection::vec(action(), 1..40)) {
        let mut p = property_protocol();
        let custody = p.lending().custody();

        for action in &actions {
            let before = p.state_hash().unwrap();
            if apply(&mut p, action).is_err() {
                prop_assert_eq!(p.state_hash().unwrap(), before);
            }

            let mut locked = 0u128;
            for position in p.lending().positions().open_positions() {
                locked += position.collateral;
                if position.has_debt() {
                    prop_assert!(p.health_factor(position.id).unwrap() >= Wad::ONE);
                }
            }
            prop_assert_eq!(p.ledger().balance_of(&wbtc(), &custody), locked);
        }
    }

    #[test]
    fn prop_rewards_are_conserved(
        steps in prop::collection::vec((0..4u8, 0..3usize, 1..5_000u128), 1..40)
    ) {
        let mut p = protocol();
        let stakers = [account("s0"), account("s1"), account("s2")];
        for who in stakers {
            p.ledger_mut().mint(&boost(), &who, usd(10_000)).unwrap();
        }
        let payer = fund_fees(&mut p, usd(1_000_000_000));
        let reward_pool = p.splitter().reward_pool();

        for (kind, who, amount) in steps {
            let who = stakers[who];
            let _ = match kind {
                0 => p.stake(who, usd(amount)).map(drop),
                1 => p.unstake(who, usd(amount)).map(drop),
                2 => p.collect_fees(payer, busd(), amount * 1_000_003).map(drop),
                _ => p.claim_reward(who, busd()).map(drop),
            };

            let pool = p.splitter().pool(&busd()).unwrap();
            let balance = p.ledger().balance_of(&busd(), &reward_pool);
            prop_assert_eq!(pool.total_received() - pool.total_claimed(), balance);

            let mut claimable = 0u128;
            for s in stakers {
                claimable += p.calculate_reward(&s, &busd()).unwrap();
            }
            prop_assert!(claimable + pool.undistributed() <= balance);
        }
    }
}
