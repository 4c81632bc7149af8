// 9.x matching.rs: order validation and fill settlement.
//
// orders arrive pre-sequenced and pre-authenticated; the core re-derives
// everything it cannot trust. an order carries its ORIGINAL signed amount and
// the engine keeps a per-digest fill record, so remaining size is derived,
// never client-supplied, and a replayed order can only fill up to its
// original size.
//
// two execution paths: order-vs-order settles at the maker's limit price,
// order-vs-pool prices the counter leg off the constant-product invariant.
// both end with the same post-conditions: fills recorded, fees accrued, and
// every touched account initial-healthy. the one carve-out: an account below
// initial margin may still fill if the fill strictly shrinks its position
// and does not cost it health.

use crate::config::EngineConfig;
use crate::engine::core::CoreState;
use crate::engine::results::{EngineError, MatchResult, OrderRejectReason};
use crate::fixed::Fixed18;
use crate::health::account_health;
use crate::types::{HealthType, OrderDigest, ProductId, Subaccount, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub digest: OrderDigest,
    pub subaccount: Subaccount,
    pub product: ProductId,
    // limit price, quote per base
    pub price: Fixed18,
    // original signed size; positive buys base
    pub amount: Fixed18,
    // zero means good-till-cancel
    pub expiration: Timestamp,
    pub reduce_only: bool,
}

fn reject(reason: OrderRejectReason) -> EngineError {
    EngineError::InvalidOrder { reason }
}

/// Remaining signed size: original amount minus the recorded fills.
pub fn remaining(state: &CoreState, order: &Order) -> Result<Fixed18, EngineError> {
    let left = order.amount.sub(state.filled(&order.digest))?;
    // a fill record past the original size means corrupted sequencing
    if left.signum() * order.amount.signum() < 0 {
        return Err(reject(OrderRejectReason::OverFilled));
    }
    Ok(left)
}

/// Stateless-plus-fill-record order checks. Returns the executable signed
/// size (reduce-only orders are clamped to the closable position).
pub fn validate_order(
    state: &CoreState,
    order: &Order,
    now: Timestamp,
) -> Result<Fixed18, EngineError> {
    if !order.price.is_positive() {
        return Err(reject(OrderRejectReason::NonPositivePrice));
    }
    if order.expiration.as_secs() != 0 && order.expiration < now {
        return Err(reject(OrderRejectReason::Expired));
    }
    let mut left = remaining(state, order)?;
    if left.is_zero() {
        return Err(reject(OrderRejectReason::ZeroSize));
    }

    if order.reduce_only {
        let position = state
            .product(order.product)?
            .base_exposure(&order.subaccount)?;
        // must oppose the position, and never flip it
        if left.signum() * position.signum() >= 0 {
            return Err(reject(OrderRejectReason::ReduceOnlyIncreases));
        }
        if left.abs() > position.abs() {
            left = position.neg()?;
        }
    }
    Ok(left)
}

/// Settle a crossing taker/maker pair at the maker's limit price.
pub fn match_orders(
    state: &mut CoreState,
    config: &EngineConfig,
    taker: &Order,
    maker: &Order,
) -> Result<MatchResult, EngineError> {
    if taker.product != maker.product {
        return Err(EngineError::ProductKindMismatch {
            product: maker.product,
        });
    }
    if taker.subaccount == maker.subaccount {
        return Err(reject(OrderRejectReason::SelfTrade));
    }

    let now = state.time;
    let taker_left = validate_order(state, taker, now)?;
    let maker_left = validate_order(state, maker, now)?;
    if taker_left.signum() == maker_left.signum() {
        return Err(reject(OrderRejectReason::SameSide));
    }

    // taker crosses the maker's price, fill settles at the maker's price
    let crossing = if taker_left.is_positive() {
        taker.price >= maker.price
    } else {
        taker.price <= maker.price
    };
    if !crossing {
        return Err(reject(OrderRejectReason::NotCrossing));
    }

    let price = maker.price;
    let size_increment = state.product(taker.product)?.config.size_increment;
    let magnitude = taker_left
        .abs()
        .min(maker_left.abs())
        .round_down_to(size_increment)?;
    if magnitude.is_zero() {
        return Ok(MatchResult::no_fill(taker.product, price));
    }
    let taker_base = Fixed18::from_raw(magnitude.raw() * taker_left.signum());
    let taker_quote = taker_base.mul(price)?.neg()?;

    let taker_pre = account_health(state, config, &taker.subaccount, HealthType::Initial)?;
    let maker_pre = account_health(state, config, &maker.subaccount, HealthType::Initial)?;
    let taker_pre_pos = state.product(taker.product)?.base_exposure(&taker.subaccount)?;
    let maker_pre_pos = state.product(taker.product)?.base_exposure(&maker.subaccount)?;

    let taker_fee = fee_for(state, config, taker, taker_quote)?;
    let maker_fee = {
        let rates = config.fee_rates(&maker.subaccount, &state.product(maker.product)?.config);
        taker_quote.abs().mul(rates.maker)?
    };

    apply_trade_leg(state, config, taker.product, taker.subaccount, taker_base, taker_quote)?;
    apply_trade_leg(
        state,
        config,
        taker.product,
        maker.subaccount,
        taker_base.neg()?,
        taker_quote.neg()?,
    )?;
    charge_fee(state, config, taker.product, taker.subaccount, taker_fee)?;
    charge_fee(state, config, taker.product, maker.subaccount, maker_fee)?;

    state.record_fill(taker.digest, taker_base)?;
    state.record_fill(maker.digest, taker_base.neg()?)?;

    let taker_post = account_health(state, config, &taker.subaccount, HealthType::Initial)?;
    let taker_post_pos = state.product(taker.product)?.base_exposure(&taker.subaccount)?;
    if !post_fill_ok(taker_pre, taker_post, taker_pre_pos, taker_post_pos) {
        return Err(EngineError::UnhealthyTaker { health: taker_post });
    }
    let maker_post = account_health(state, config, &maker.subaccount, HealthType::Initial)?;
    let maker_post_pos = state.product(taker.product)?.base_exposure(&maker.subaccount)?;
    if !post_fill_ok(maker_pre, maker_post, maker_pre_pos, maker_post_pos) {
        return Err(EngineError::UnhealthyMaker { health: maker_post });
    }

    Ok(MatchResult {
        product: taker.product,
        filled_base: taker_base,
        filled_quote: taker_quote,
        price,
        taker_fee,
        maker_fee,
    })
}

/// Settle a taker against the product's LP pool. The pool fills up to the
/// reserve level implied by the taker's limit price.
pub fn match_with_pool(
    state: &mut CoreState,
    config: &EngineConfig,
    taker: &Order,
) -> Result<MatchResult, EngineError> {
    let now = state.time;
    let taker_left = validate_order(state, taker, now)?;

    let delta = {
        let product = state.product(taker.product)?;
        product.lp.swap_quote(
            taker_left,
            taker.price,
            product.config.keep_rate()?,
            product.config.size_increment,
        )?
    };
    if delta.base.is_zero() {
        return Ok(MatchResult::no_fill(taker.product, taker.price));
    }
    let price = delta.quote.div(delta.base)?.abs();

    let taker_pre = account_health(state, config, &taker.subaccount, HealthType::Initial)?;
    let taker_pre_pos = state.product(taker.product)?.base_exposure(&taker.subaccount)?;
    let taker_fee = fee_for(state, config, taker, delta.quote)?;

    {
        let product = state.product_mut(taker.product)?;
        product.lp.swap(delta.base.neg()?, delta.quote.neg()?)?;
    }
    apply_trade_leg(state, config, taker.product, taker.subaccount, delta.base, delta.quote)?;
    charge_fee(state, config, taker.product, taker.subaccount, taker_fee)?;
    state.record_fill(taker.digest, delta.base)?;

    let taker_post = account_health(state, config, &taker.subaccount, HealthType::Initial)?;
    let taker_post_pos = state.product(taker.product)?.base_exposure(&taker.subaccount)?;
    if !post_fill_ok(taker_pre, taker_post, taker_pre_pos, taker_post_pos) {
        return Err(EngineError::UnhealthyTaker { health: taker_post });
    }

    Ok(MatchResult {
        product: taker.product,
        filled_base: delta.base,
        filled_quote: delta.quote,
        price,
        taker_fee,
        maker_fee: Fixed18::ZERO,
    })
}

// a fill must leave the account at or above initial margin. an account
// already below it may only shrink its position, and never at a health loss.
fn post_fill_ok(
    pre_health: Fixed18,
    post_health: Fixed18,
    pre_position: Fixed18,
    post_position: Fixed18,
) -> bool {
    if !post_health.is_negative() {
        return true;
    }
    post_position.abs() < pre_position.abs() && post_health >= pre_health
}

// taker fee: rate on quote notional, plus the product's flat fee on the
// digest's first fill only
fn fee_for(
    state: &CoreState,
    config: &EngineConfig,
    order: &Order,
    quote: Fixed18,
) -> Result<Fixed18, EngineError> {
    let product_cfg = &state.product(order.product)?.config;
    let rates = config.fee_rates(&order.subaccount, product_cfg);
    let mut fee = quote.abs().mul(rates.taker)?;
    if state.filled(&order.digest).is_zero() {
        fee = fee.add(product_cfg.min_notional_fee)?;
    }
    Ok(fee)
}

// route one side's (base, quote) delta into the right ledgers: spot base in
// the product ledger with quote in the quote product, perp both legs in the
// perp row
fn apply_trade_leg(
    state: &mut CoreState,
    config: &EngineConfig,
    product_id: ProductId,
    account: Subaccount,
    base: Fixed18,
    quote: Fixed18,
) -> Result<(), EngineError> {
    let product = state.product_mut(product_id)?;
    if product.is_perp() {
        product.as_perp_mut()?.update_balance(account, base, quote)?;
    } else {
        product.as_spot_mut()?.update_balance(account, base)?;
        state.update_quote(config, account, quote)?;
    }
    Ok(())
}

fn charge_fee(
    state: &mut CoreState,
    config: &EngineConfig,
    product_id: ProductId,
    account: Subaccount,
    fee: Fixed18,
) -> Result<(), EngineError> {
    if !fee.is_positive() {
        return Ok(());
    }
    state.update_quote(config, account, fee.neg()?)?;
    state.product_mut(product_id)?.accrue_fee(fee)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeeRates, ProductConfig};
    use crate::risk::RiskCurve;

    fn acct(tag: u64) -> Subaccount {
        Subaccount::from_tag(tag)
    }

    fn curve() -> RiskCurve {
        RiskCurve::symmetric(
            Fixed18::from_ratio(8, 10).unwrap(),
            Fixed18::from_ratio(9, 10).unwrap(),
        )
    }

    fn setup() -> (CoreState, EngineConfig) {
        let cfg = EngineConfig::default();
        let mut state = CoreState::with_system_accounts(&cfg);
        state.add_product(
            ProductConfig::spot(cfg.quote_product, RiskCurve::riskless()),
            Fixed18::ONE,
        );
        state.add_product(
            ProductConfig::spot(ProductId(1), curve()),
            Fixed18::from_int(100),
        );
        state.add_product(
            ProductConfig::perp(ProductId(2), curve()),
            Fixed18::from_int(100),
        );
        state.time = Timestamp::from_secs(1_000);
        // both traders well capitalized
        state.update_quote(&cfg, acct(1), Fixed18::from_int(100_000)).unwrap();
        state.update_quote(&cfg, acct(2), Fixed18::from_int(100_000)).unwrap();
        (state, cfg)
    }

    fn order(tag: u64, who: u64, product: u32, price: i64, amount: i64) -> Order {
        Order {
            digest: OrderDigest::from_tag(tag),
            subaccount: acct(who),
            product: ProductId(product),
            price: Fixed18::from_int(price),
            amount: Fixed18::from_int(amount),
            expiration: Timestamp::from_secs(0),
            reduce_only: false,
        }
    }

    #[test]
    fn spot_match_settles_at_maker_price() {
        let (mut state, cfg) = setup();
        let taker = order(1, 1, 1, 102, 5);
        let maker = order(2, 2, 1, 100, -10);

        let result = match_orders(&mut state, &cfg, &taker, &maker).unwrap();
        assert_eq!(result.price, Fixed18::from_int(100));
        assert_eq!(result.filled_base, Fixed18::from_int(5));
        assert_eq!(result.filled_quote, Fixed18::from_int(-500));

        let spot = state.product(ProductId(1)).unwrap().as_spot().unwrap();
        assert_eq!(spot.balance_real(&acct(1)).unwrap(), Fixed18::from_int(5));
        assert_eq!(spot.balance_real(&acct(2)).unwrap(), Fixed18::from_int(-5));

        // taker paid 500 quote plus 2bp fee = 0.1
        let quote = state.product(cfg.quote_product).unwrap().as_spot().unwrap();
        assert_eq!(
            quote.balance_real(&acct(1)).unwrap(),
            Fixed18::from_int(100_000)
                .sub(Fixed18::from_int(500))
                .unwrap()
                .sub(Fixed18::from_ratio(1, 10).unwrap())
                .unwrap()
        );
        // maker fee rate is zero by default
        assert_eq!(
            quote.balance_real(&acct(2)).unwrap(),
            Fixed18::from_int(100_500)
        );
    }

    #[test]
    fn perp_match_settles_into_v_quote() {
        let (mut state, cfg) = setup();
        let taker = order(1, 1, 2, 100, 3);
        let maker = order(2, 2, 2, 100, -3);

        match_orders(&mut state, &cfg, &taker, &maker).unwrap();

        let perp = state.product(ProductId(2)).unwrap().as_perp().unwrap();
        let long = perp.balance(&acct(1));
        assert_eq!(long.amount, Fixed18::from_int(3));
        assert_eq!(long.v_quote_balance, Fixed18::from_int(-300));
        assert_eq!(perp.net_position().unwrap(), Fixed18::ZERO);
    }

    #[test]
    fn replay_cannot_exceed_original_size() {
        let (mut state, cfg) = setup();
        let taker = order(1, 1, 1, 100, 5);
        let maker1 = order(2, 2, 1, 100, -3);
        let maker2 = order(3, 2, 1, 100, -10);

        let first = match_orders(&mut state, &cfg, &taker, &maker1).unwrap();
        assert_eq!(first.filled_base, Fixed18::from_int(3));

        // the replayed taker only has 2 left
        let second = match_orders(&mut state, &cfg, &taker, &maker2).unwrap();
        assert_eq!(second.filled_base, Fixed18::from_int(2));

        // fully filled now
        assert!(matches!(
            match_orders(&mut state, &cfg, &taker, &maker2),
            Err(EngineError::InvalidOrder {
                reason: OrderRejectReason::ZeroSize
            })
        ));
    }

    #[test]
    fn rejects_not_crossing_and_same_side() {
        let (mut state, cfg) = setup();
        let buy_low = order(1, 1, 1, 95, 5);
        let sell_high = order(2, 2, 1, 100, -5);
        assert!(matches!(
            match_orders(&mut state, &cfg, &buy_low, &sell_high),
            Err(EngineError::InvalidOrder {
                reason: OrderRejectReason::NotCrossing
            })
        ));

        let buy_a = order(3, 1, 1, 100, 5);
        let buy_b = order(4, 2, 1, 100, 5);
        assert!(matches!(
            match_orders(&mut state, &cfg, &buy_a, &buy_b),
            Err(EngineError::InvalidOrder {
                reason: OrderRejectReason::SameSide
            })
        ));
    }

    #[test]
    fn rejects_self_trade_and_expired() {
        let (mut state, cfg) = setup();
        let taker = order(1, 1, 1, 100, 5);
        let maker_same = order(2, 1, 1, 100, -5);
        assert!(matches!(
            match_orders(&mut state, &cfg, &taker, &maker_same),
            Err(EngineError::InvalidOrder {
                reason: OrderRejectReason::SelfTrade
            })
        ));

        let mut stale = order(3, 2, 1, 100, -5);
        stale.expiration = Timestamp::from_secs(999); // state.time is 1000
        assert!(matches!(
            match_orders(&mut state, &cfg, &taker, &stale),
            Err(EngineError::InvalidOrder {
                reason: OrderRejectReason::Expired
            })
        ));
    }

    #[test]
    fn fills_round_down_to_size_increment() {
        let (mut state, cfg) = setup();
        // 5.0005 vs -10: the 0.0005 above the 0.001 increment is dropped
        let mut taker = order(1, 1, 1, 100, 0);
        taker.amount = Fixed18::from_ratio(50_005, 10_000).unwrap();
        let maker = order(2, 2, 1, 100, -10);

        let result = match_orders(&mut state, &cfg, &taker, &maker).unwrap();
        assert_eq!(result.filled_base, Fixed18::from_int(5));
    }

    #[test]
    fn reduce_only_clamps_and_rejects_increases() {
        let (mut state, cfg) = setup();
        // open a 5-long for acct 1
        let open = order(1, 1, 1, 100, 5);
        let counter = order(2, 2, 1, 100, -5);
        match_orders(&mut state, &cfg, &open, &counter).unwrap();

        // reduce-only sell of 8 clamps to 5
        let mut close = order(3, 1, 1, 100, -8);
        close.reduce_only = true;
        let left = validate_order(&state, &close, state.time).unwrap();
        assert_eq!(left, Fixed18::from_int(-5));

        // reduce-only buy would increase the long
        let mut bad = order(4, 1, 1, 100, 3);
        bad.reduce_only = true;
        assert!(matches!(
            validate_order(&state, &bad, state.time),
            Err(EngineError::InvalidOrder {
                reason: OrderRejectReason::ReduceOnlyIncreases
            })
        ));
    }

    #[test]
    fn undercapitalized_taker_rejected() {
        let (mut state, cfg) = setup();
        let poor = acct(3);
        state.update_quote(&cfg, poor, Fixed18::from_int(10)).unwrap();

        // 10 quote cannot carry a 500-notional long at 0.8 weight
        let taker = order(1, 3, 1, 100, 5);
        let maker = order(2, 2, 1, 100, -5);
        assert!(matches!(
            match_orders(&mut state, &cfg, &taker, &maker),
            Err(EngineError::UnhealthyTaker { .. })
        ));
    }

    #[test]
    fn unhealthy_account_cannot_add_exposure() {
        let (mut state, mut cfg) = setup();
        let trader = acct(3);
        // waive fees so the fill is exactly health-neutral: buying at
        // 80 = 0.8 initial weight * 100 oracle adds value equal to cost
        cfg.fee_overrides.insert(
            trader,
            FeeRates {
                maker: Fixed18::ZERO,
                taker: Fixed18::ZERO,
            },
        );
        state.update_quote(&cfg, trader, Fixed18::from_int(-100)).unwrap();

        let taker = order(1, 3, 1, 80, 5);
        let maker = order(2, 2, 1, 80, -5);
        // the dispatcher discards the state on this error
        assert!(matches!(
            match_orders(&mut state, &cfg, &taker, &maker),
            Err(EngineError::UnhealthyTaker { .. })
        ));
    }

    #[test]
    fn risk_reducing_close_allowed_while_unhealthy() {
        let (mut state, cfg) = setup();
        let trader = acct(3);
        state.update_quote(&cfg, trader, Fixed18::from_int(150)).unwrap();

        // open a small long, then crash the price so the account is unhealthy
        let open = order(1, 3, 2, 100, 5);
        let counter = order(2, 2, 2, 100, -5);
        match_orders(&mut state, &cfg, &open, &counter).unwrap();
        state
            .product_mut(ProductId(2))
            .unwrap()
            .set_oracle_price(Fixed18::from_int(80))
            .unwrap();
        assert!(
            account_health(&state, &cfg, &trader, HealthType::Initial)
                .unwrap()
                .is_negative()
        );

        // closing at the market is still allowed: health strictly improves
        let close = order(3, 3, 2, 80, -5);
        let bid = order(4, 2, 2, 80, 5);
        let result = match_orders(&mut state, &cfg, &close, &bid).unwrap();
        assert_eq!(result.filled_base, Fixed18::from_int(-5));
    }

    #[test]
    fn pool_match_fills_to_limit_reserve() {
        let (mut state, cfg) = setup();
        {
            let product = state.product_mut(ProductId(1)).unwrap();
            product
                .lp
                .mint(
                    acct(9),
                    Fixed18::from_int(100),
                    Fixed18::ZERO,
                    Fixed18::from_int(100_000),
                    Fixed18::from_int(100),
                )
                .unwrap();
        }

        let taker = order(1, 1, 1, 110, 2);
        let result = match_with_pool(&mut state, &cfg, &taker).unwrap();
        assert!(result.is_fill());
        assert_eq!(result.filled_base, Fixed18::from_int(2));
        // effective price between pool price and limit
        assert!(result.price > Fixed18::from_int(100));
        assert!(result.price <= Fixed18::from_int(110));

        // pool took the other side
        let lp = &state.product(ProductId(1)).unwrap().lp;
        assert_eq!(lp.state.base, Fixed18::from_int(98));
        assert!(lp.state.quote > Fixed18::from_int(10_000));
    }

    #[test]
    fn pool_match_no_liquidity_is_no_fill() {
        let (mut state, cfg) = setup();
        let taker = order(1, 1, 1, 110, 2);
        let result = match_with_pool(&mut state, &cfg, &taker).unwrap();
        assert!(!result.is_fill());
    }

    #[test]
    fn flat_first_fill_fee_charged_once() {
        let (mut state, cfg) = setup();
        state
            .product_mut(ProductId(1))
            .unwrap()
            .config
            .min_notional_fee = Fixed18::ONE;

        let taker = order(1, 1, 1, 100, 4);
        let maker1 = order(2, 2, 1, 100, -2);
        let maker2 = order(3, 2, 1, 100, -2);

        let first = match_orders(&mut state, &cfg, &taker, &maker1).unwrap();
        let second = match_orders(&mut state, &cfg, &taker, &maker2).unwrap();

        // 2bp of 200 = 0.04; flat 1 only on the first fill
        let rate_fee = Fixed18::from_ratio(4, 100).unwrap();
        assert_eq!(first.taker_fee, rate_fee.add(Fixed18::ONE).unwrap());
        assert_eq!(second.taker_fee, rate_fee);
    }
}
