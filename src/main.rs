//! Margin exchange core simulation.
//!
//! Drives the clearinghouse through the full lifecycle: deposits, spot and
//! perp trading, pooled liquidity, interest and funding ticks, and a
//! liquidation ending in socialized loss.

use settle_core::*;

const QUOTE: ProductId = ProductId(0);
const ETH_SPOT: ProductId = ProductId(1);
const ETH_PERP: ProductId = ProductId(2);

fn main() {
    env_logger::init();

    println!("Margin Exchange Core Simulation");
    println!("Spot + Perp, Cross Margin, Full Lifecycle\n");

    scenario_1_spot_trading();
    scenario_2_pooled_liquidity();
    scenario_3_perp_funding_and_pnl();
    scenario_4_interest_accrual();
    scenario_5_liquidation();

    println!("\nAll simulations completed successfully.");
}

fn new_exchange() -> Clearinghouse {
    let mut config = EngineConfig::default();
    config.spreads.push(SpreadPair {
        spot: ETH_SPOT,
        perp: ETH_PERP,
    });
    let mut ch = Clearinghouse::new(config).expect("valid config");

    let weights = RiskCurve::symmetric(
        Fixed18::from_ratio(9, 10).expect("ratio"),
        Fixed18::from_ratio(95, 100).expect("ratio"),
    );
    ch.list_product(ProductConfig::spot(QUOTE, RiskCurve::riskless()), Fixed18::ONE)
        .expect("quote product");
    ch.list_product(ProductConfig::spot(ETH_SPOT, weights), Fixed18::from_int(2_000))
        .expect("spot product");
    ch.list_product(ProductConfig::perp(ETH_PERP, weights), Fixed18::from_int(2_000))
        .expect("perp product");
    ch.state.time = Timestamp::from_secs(1_700_000_000);
    ch
}

fn order(tag: u64, who: Subaccount, product: ProductId, price: i64, amount_milli: i64) -> Order {
    Order {
        digest: OrderDigest::from_tag(tag),
        subaccount: who,
        product,
        price: Fixed18::from_int(price),
        amount: Fixed18::from_ratio(amount_milli as i128, 1_000).expect("ratio"),
        expiration: Timestamp::from_secs(0),
        reduce_only: false,
    }
}

/// Two traders cross a spot order at the maker's price.
fn scenario_1_spot_trading() {
    println!("Scenario 1: Spot Order Matching\n");

    let mut ch = new_exchange();
    let alice = Subaccount::from_tag(1);
    let bob = Subaccount::from_tag(2);

    ch.deposit(alice, QUOTE, Fixed18::from_int(50_000)).expect("deposit");
    ch.deposit(bob, QUOTE, Fixed18::from_int(50_000)).expect("deposit");
    println!("  Alice and Bob each deposit $50,000");

    let taker = order(1, alice, ETH_SPOT, 2_010, 5_000);
    let maker = order(2, bob, ETH_SPOT, 2_000, -10_000);
    let result = ch.match_orders(&taker, &maker).expect("match");

    println!(
        "  Alice buys {} ETH @ ${} (taker fee ${})",
        result.filled_base, result.price, result.taker_fee
    );
    println!(
        "  Alice health: ${}, Bob health: ${}\n",
        ch.health(&alice, HealthType::Initial).expect("health"),
        ch.health(&bob, HealthType::Initial).expect("health"),
    );
}

/// LP mint, a taker fill against the pool, and a pro-rata burn.
fn scenario_2_pooled_liquidity() {
    println!("Scenario 2: Pooled Liquidity\n");

    let mut ch = new_exchange();
    let lp = Subaccount::from_tag(1);
    let taker_acct = Subaccount::from_tag(2);

    ch.deposit(lp, QUOTE, Fixed18::from_int(100_000)).expect("deposit");
    ch.deposit(lp, ETH_SPOT, Fixed18::from_int(20)).expect("deposit");
    ch.deposit(taker_acct, QUOTE, Fixed18::from_int(50_000)).expect("deposit");

    let mint = ch
        .mint_lp(
            lp,
            ETH_SPOT,
            Fixed18::from_int(20),
            Fixed18::ZERO,
            Fixed18::from_int(50_000),
        )
        .expect("mint");
    println!(
        "  LP provides 20 ETH + ${} quote for {} shares",
        mint.quote_in, mint.shares
    );

    let taker = order(1, taker_acct, ETH_SPOT, 2_100, 3_000);
    let result = ch.match_with_pool(&taker).expect("pool match");
    println!(
        "  Taker buys {} ETH from the pool @ ${}",
        result.filled_base, result.price
    );

    let burn = ch.burn_lp(lp, ETH_SPOT, None).expect("burn");
    println!(
        "  LP burns all shares for {} ETH + ${} quote\n",
        burn.base_out, burn.quote_out
    );
}

/// Perp trading with a funding tick and pnl settlement through the pot.
fn scenario_3_perp_funding_and_pnl() {
    println!("Scenario 3: Perp Funding and PnL\n");

    let mut ch = new_exchange();
    let long = Subaccount::from_tag(1);
    let short = Subaccount::from_tag(2);

    ch.deposit(long, QUOTE, Fixed18::from_int(20_000)).expect("deposit");
    ch.deposit(short, QUOTE, Fixed18::from_int(20_000)).expect("deposit");

    let taker = order(1, long, ETH_PERP, 2_000, 5_000);
    let maker = order(2, short, ETH_PERP, 2_000, -5_000);
    ch.match_orders(&taker, &maker).expect("match");
    println!("  5 ETH perp opened at $2,000");

    // longs pay $1.50 per unit this interval
    let next = Timestamp::from_secs(ch.state.time.as_secs() + 3_600);
    ch.tick(next, &[(ETH_PERP, Fixed18::from_ratio(3, 2).expect("ratio"))])
        .expect("tick");
    println!("  Funding tick: longs pay $1.50 per ETH");

    ch.update_price(ETH_PERP, Fixed18::from_int(2_100)).expect("price");
    let close_l = order(3, long, ETH_PERP, 2_100, -5_000);
    let close_s = order(4, short, ETH_PERP, 2_100, 5_000);
    ch.match_orders(&close_l, &close_s).expect("close");

    let lost = ch.settle_pnl(short, ETH_PERP).expect("settle");
    let won = ch.settle_pnl(long, ETH_PERP).expect("settle");
    println!("  Price to $2,100: short settles ${}, long settles ${}\n", lost, won);
}

/// Borrow interest compounds over a day and pays the protocol fee.
fn scenario_4_interest_accrual() {
    println!("Scenario 4: Interest Accrual\n");

    let mut ch = new_exchange();
    let saver = Subaccount::from_tag(1);
    let borrower = Subaccount::from_tag(2);

    ch.deposit(saver, QUOTE, Fixed18::from_int(100_000)).expect("deposit");
    ch.deposit(borrower, QUOTE, Fixed18::from_int(100_000)).expect("deposit");
    ch.deposit(borrower, ETH_SPOT, Fixed18::from_int(100)).expect("deposit");

    // the borrower sells ETH and over-withdraws quote to create a borrow
    ch.withdraw(borrower, QUOTE, Fixed18::from_int(150_000)).expect("withdraw");
    println!("  Borrower draws $50,000 against ETH collateral");

    let next = Timestamp::from_secs(ch.state.time.as_secs() + 86_400);
    ch.tick(next, &[]).expect("tick");

    let quote = ch.state.product(QUOTE).expect("product").as_spot().expect("spot");
    println!(
        "  After 1 day: utilization {}, saver balance ${}\n",
        quote.state.utilization().expect("utilization"),
        quote.balance_real(&saver).expect("balance"),
    );
}

/// A price crash makes a long liquidatable; the position transfers at a
/// penalized price and the insurance fund takes its fee.
fn scenario_5_liquidation() {
    println!("Scenario 5: Liquidation\n");

    let mut ch = new_exchange();
    let risky = Subaccount::from_tag(1);
    let counter = Subaccount::from_tag(2);
    let keeper = Subaccount::from_tag(3);

    ch.deposit(risky, QUOTE, Fixed18::from_int(1_200)).expect("deposit");
    ch.deposit(counter, QUOTE, Fixed18::from_int(100_000)).expect("deposit");
    ch.deposit(keeper, QUOTE, Fixed18::from_int(100_000)).expect("deposit");

    let taker = order(1, risky, ETH_PERP, 2_000, 5_000);
    let maker = order(2, counter, ETH_PERP, 2_000, -5_000);
    ch.match_orders(&taker, &maker).expect("match");
    println!("  Risky opens 5 ETH long with $1,200 margin");

    ch.update_price(ETH_PERP, Fixed18::from_int(1_800)).expect("price");
    println!(
        "  Price crashes to $1,800, maintenance health ${}",
        ch.health(&risky, HealthType::Maintenance).expect("health")
    );

    let outcome = ch
        .liquidate(
            keeper,
            risky,
            LiquidationTarget::Perp(ETH_PERP),
            Fixed18::from_int(3),
        )
        .expect("liquidate");
    match outcome {
        LiquidationOutcome::Paid { amount, price, insurance_fee, .. } => {
            println!(
                "  Keeper takes {} ETH @ ${} (insurance fee ${})",
                amount, price, insurance_fee
            );
        }
        other => println!("  Outcome: {:?}", other),
    }
    println!(
        "  Insurance fund: ${}, events logged: {}",
        ch.state.insurance_balance(&ch.config).expect("insurance"),
        ch.events.len(),
    );
}
