//! Position Manager Simulation.
//!
//! Runs the position manager against the in-memory ledger: fee collection, per-owner fee
//! isolation, atomic batches and a hostile observer.

use std::sync::Arc;

use posm_core::*;

const MANAGER: AccountId = AccountId(1_000);
const ALICE: AccountId = AccountId(1);
const BOB: AccountId = AccountId(2);
const TRADER: AccountId = AccountId(3);
const USDC: Currency = Currency(1);
const WETH: Currency = Currency(2);

fn main() {
    tracing_subscriber::fmt::init();

    println!("Concentrated Liquidity Position Manager Simulation");
    println!("Single Pool, In-Memory Ledger, Atomic Sessions\n");

    let scenarios: [(&str, fn() -> Result<(), ManagerError>); 4] = [
        ("single-sided fees", scenario_1_single_sided_fees),
        ("two owners", scenario_2_two_owners),
        ("atomic batch", scenario_3_atomic_batch),
        ("hostile observer", scenario_4_hostile_observer),
    ];

    for (name, scenario) in scenarios {
        if let Err(e) = scenario() {
            eprintln!("Scenario '{}' failed: {} ({:?})", name, e, e.class());
            std::process::exit(1);
        }
    }

    println!("\nAll simulations completed successfully.");
}

fn pool() -> PoolKey {
    PoolKey::new(USDC, WETH, 200, 60)
}

// aligned to the 60 tick spacing
fn range() -> Range {
    Range {
        pool: pool(),
        tick_lower: -60,
        tick_upper: 60,
    }
}

fn setup() -> Result<PositionManager<InMemoryLedger>, ManagerError> {
    let mut ledger = InMemoryLedger::new();
    ledger.initialize_pool(pool(), 0)?;
    for account in [ALICE, BOB, TRADER] {
        ledger.mint_tokens(account, USDC, 100_000);
        ledger.mint_tokens(account, WETH, 100_000);
    }
    let mut manager = PositionManager::new(ManagerConfig::default(), ledger, MANAGER)?;
    manager.set_time(Timestamp::now());
    Ok(manager)
}

fn mint_params(owner: AccountId, liquidity: u128) -> MintParams {
    MintParams {
        range: range(),
        liquidity,
        deadline: Timestamp::MAX,
        owner,
        hook_data: Vec::new(),
    }
}

fn mint_step(owner: AccountId, liquidity: u128) -> Step {
    Step::Mint(mint_params(owner, liquidity))
}

fn mint(manager: &mut PositionManager<InMemoryLedger>, owner: AccountId, liquidity: u128) -> Result<ReceiptId, ManagerError> {
    let (receipt, settled) =
        manager.unlock_with(owner, &[USDC, WETH], |m, s| m.mint(s, mint_params(owner, liquidity)))?;
    println!("  {} mints {} on {} as {}, paid {:?}", owner, liquidity, range(), receipt, settled);
    Ok(receipt)
}

fn collect(manager: &mut PositionManager<InMemoryLedger>, owner: AccountId, receipt: ReceiptId) -> Result<BalanceDelta, ManagerError> {
    let (fees, _) = manager.unlock_with(owner, &[USDC, WETH], |m, s| {
        m.collect(
            s,
            CollectParams {
                receipt,
                recipient: owner,
                hook_data: Vec::new(),
                use_credit: false,
            },
        )
    })?;
    Ok(fees)
}

/// One position, one swap, fees in the input currency only.
fn scenario_1_single_sided_fees() -> Result<(), ManagerError> {
    println!("Scenario 1: Single-Sided Fee Collection\n");

    let mut manager = setup()?;
    let receipt = mint(&mut manager, ALICE, 1_000)?;

    let out = manager.ledger_mut()?.swap_exact_in(TRADER, &pool(), true, 500)?;
    println!("  Trader swaps 500 USDC for {} WETH (2% fee)", out);

    let (owed0, owed1) = manager.fees_owed(receipt)?;
    println!("  Fees owed before collect: ({}, {})", owed0, owed1);

    let fees = collect(&mut manager, ALICE, receipt)?;
    println!("  Alice collects {}", fees);

    let (owed0, owed1) = manager.fees_owed(receipt)?;
    println!("  Fees owed after collect: ({}, {})\n", owed0, owed1);
    Ok(())
}

/// Two equal positions on one range earn equal fees, not a pooled share.
fn scenario_2_two_owners() -> Result<(), ManagerError> {
    println!("Scenario 2: Two Owners, Isolated Fees\n");

    let mut manager = setup()?;
    let alice = mint(&mut manager, ALICE, 1_000)?;
    let bob = mint(&mut manager, BOB, 1_000)?;

    let out = manager.ledger_mut()?.swap_exact_in(TRADER, &pool(), true, 1_000)?;
    println!("  Trader swaps 1000 USDC for {} WETH", out);

    let alice_fees = collect(&mut manager, ALICE, alice)?;
    let bob_fees = collect(&mut manager, BOB, bob)?;
    println!("  Alice collects {}, Bob collects {}", alice_fees, bob_fees);
    println!(
        "  Manager residual credit: {} USDC, {} WETH\n",
        manager.manager_credit(USDC),
        manager.manager_credit(WETH)
    );
    Ok(())
}

/// A plan minting two positions settles as one unit; a bad step undoes everything.
fn scenario_3_atomic_batch() -> Result<(), ManagerError> {
    println!("Scenario 3: Atomic Batch\n");

    let mut manager = setup()?;
    let payload = Plan::new()
        .with(mint_step(ALICE, 1_000))?
        .with(mint_step(BOB, 2_000))?
        .finalize_liquidity(&pool())?;

    let settled = manager.unlock_and_execute(ALICE, &payload, &[USDC, WETH])?;
    println!("  Batch [mint, mint, close, close] settled {:?}", settled);
    println!("  Alice holds {:?}, Bob holds {:?}", manager.positions_of(ALICE), manager.positions_of(BOB));

    let bad = Plan::new()
        .with(mint_step(ALICE, 500))?
        .with(Step::Burn(BurnParams { receipt: ReceiptId(99) }))?
        .finalize_liquidity(&pool())?;
    match manager.unlock_and_execute(ALICE, &bad, &[USDC, WETH]) {
        Ok(_) => println!("  Unexpected: bad batch settled"),
        Err(e) => println!("  Bad batch aborted: {}", e),
    }
    println!(
        "  Next receipt still {}, Alice holds {:?}\n",
        manager.next_receipt_id(),
        manager.positions_of(ALICE)
    );
    Ok(())
}

#[derive(Debug)]
struct Griefer;

impl Subscriber for Griefer {
    fn notify_subscribe(&self, _: ReceiptId, _: &[u8], _: &mut GasBudget) -> Result<(), NotifyError> {
        Ok(())
    }

    fn notify_unsubscribe(&self, _: ReceiptId, _: &[u8], gas: &mut GasBudget) -> Result<(), NotifyError> {
        loop {
            gas.charge(21_000)?;
        }
    }

    fn notify_modify_liquidity(&self, _: ReceiptId, _: i128, _: BalanceDelta, _: &mut GasBudget) -> Result<(), NotifyError> {
        Err(NotifyError::Reverted("griefing".into()))
    }

    fn notify_transfer(&self, _: ReceiptId, _: AccountId, _: AccountId, _: &mut GasBudget) -> Result<(), NotifyError> {
        Err(NotifyError::Reverted("griefing".into()))
    }
}

/// An observer that burns its stipend cannot keep a position hostage.
fn scenario_4_hostile_observer() -> Result<(), ManagerError> {
    println!("Scenario 4: Hostile Observer\n");

    let mut manager = setup()?;
    let receipt = mint(&mut manager, ALICE, 1_000)?;
    manager.subscribe(ALICE, receipt, &range(), Arc::new(Griefer), &[])?;
    println!("  Griefer subscribed to {}", receipt);

    manager.transfer(ALICE, receipt, BOB)?;
    println!("  Transfer to {} went through, owner now {}", BOB, manager.position_info(receipt)?.owner);

    let outcome = manager.unsubscribe(BOB, receipt, &range(), &[])?;
    println!(
        "  Unsubscribed anyway: notification {:?}, gas used {} of {}",
        outcome.notification,
        outcome.gas_used,
        manager.config().unsubscribe_gas_limit()
    );

    let failures = manager
        .events()
        .iter()
        .filter(|event| matches!(event.payload, EventPayload::NotificationFailed(_)))
        .count();
    println!("  Swallowed notification failures: {}\n", failures);
    Ok(())
}
