// 6.x health.rs: risk-weighted account valuation.
//
// health is the signed sum over all products of weighted exposures: riskless
// quote balance, weighted position value at oracle price, LP value at a
// manipulation-resistant geometric-mean valuation, and unsettled perp carry.
// configured spot/perp basis pairs net into a spread position that gets a
// preferential weight, since a hedged basis carries far less risk than its
// unhedged legs.
//
// this module only reads ledger state, it never mutates.

use crate::engine::core::CoreState;
use crate::engine::results::EngineError;
use crate::config::EngineConfig;
use crate::fixed::Fixed18;
use crate::risk::RiskCurve;
use crate::types::{HealthType, ProductId, Subaccount};
use std::collections::HashMap;

/// Risk-weighted net worth of one account.
///
/// Returns `Fixed18::MIN` the moment any exposure touches an untradeable
/// product (the 2.0 weight sentinel): such products must not help an account
/// pass a margin check.
pub fn account_health(
    state: &CoreState,
    cfg: &EngineConfig,
    account: &Subaccount,
    health_type: HealthType,
) -> Result<Fixed18, EngineError> {
    let mut total = state
        .product(cfg.quote_product)?
        .as_spot()?
        .balance_real(account)?;

    // base exposures per product, kept for spread netting below
    let mut exposures: HashMap<ProductId, Fixed18> = HashMap::new();

    for (id, product) in state.products() {
        if *id == cfg.quote_product {
            continue;
        }
        let amount = product.base_exposure(account)?;
        let carry = product.quote_carry(account)?;
        let lp_row = product.lp.balance(account);

        if amount.is_zero() && carry.is_zero() && lp_row.amount.is_zero() {
            continue;
        }

        let weight = product.config.risk.weight(amount, health_type);
        if RiskCurve::is_untradeable(weight) {
            return Ok(Fixed18::MIN);
        }

        if !amount.is_zero() {
            exposures.insert(*id, amount);
            total = total.add(
                amount.mul(weight)?.mul(product.oracle_price)?,
            )?;
        }

        // v_quote and unsettled funding are quote-denominated: unweighted
        total = total.add(carry)?;

        if lp_row.amount.is_positive() {
            total = total.add(lp_value(product, account, health_type)?)?;
        }
    }

    // basis netting: swap the standard weights of the hedged portion for the
    // discounted ones
    for pair in &cfg.spreads {
        let spot = match exposures.get(&pair.spot) {
            Some(s) => *s,
            None => continue,
        };
        let perp = match exposures.get(&pair.perp) {
            Some(p) => *p,
            None => continue,
        };
        if spot.signum() * perp.signum() >= 0 {
            continue;
        }
        let basis_abs = spot.abs().min(perp.abs());
        let basis_spot = Fixed18::from_raw(basis_abs.raw() * spot.signum());
        let basis_perp = basis_spot.neg()?;

        for (leg, id) in [(basis_spot, pair.spot), (basis_perp, pair.perp)] {
            let product = state.product(id)?;
            let standard = product.config.risk.weight(leg, health_type);
            let discounted = discount_weight(standard, cfg.spread_discount)?;
            let adjustment = leg
                .mul(discounted.sub(standard)?)?
                .mul(product.oracle_price)?;
            total = total.add(adjustment)?;
        }
    }

    Ok(total)
}

// move a weight toward 1.0, keeping only `discount` of its penalty.
// works for both sides: 0.9 -> 0.98, 1.1 -> 1.02 at discount 1/5.
fn discount_weight(weight: Fixed18, discount: Fixed18) -> Result<Fixed18, EngineError> {
    Ok(Fixed18::ONE.add(weight.sub(Fixed18::ONE)?.mul(discount)?)?)
}

// LP value from pooled reserves at the geometric-mean valuation: the fair
// reserves at oracle price P are (sqrt(b*q/P), sqrt(b*q*P)), so the pro-rata
// claim is worth shares/supply * sqrt(b*q*P) * (1 + long_weight). raw spot
// reserves are never used directly, so a manipulated pool ratio cannot
// inflate health.
fn lp_value(
    product: &crate::product::ProductEngine,
    account: &Subaccount,
    health_type: HealthType,
) -> Result<Fixed18, EngineError> {
    let lp = &product.lp;
    let row = lp.balance(account);
    if lp.state.supply.is_zero() {
        return Ok(Fixed18::ZERO);
    }

    // LP base exposure is long by construction; the caller has already
    // rejected untradeable products
    let weight = product.config.risk.weight(Fixed18::ONE, health_type);

    let fair_quote = lp
        .state
        .base
        .mul(lp.state.quote)?
        .mul(product.oracle_price)?
        .sqrt()?;
    let pool_value = fair_quote.mul(Fixed18::ONE.add(weight)?)?;
    let pro_rata = pool_value.mul(row.amount)?.div(lp.state.supply)?;

    pro_rata
        .sub(lp.unsettled_funding(account)?)
        .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProductConfig;
    use crate::engine::core::CoreState;
    use crate::types::SpreadPair;

    fn acct(tag: u64) -> Subaccount {
        Subaccount::from_tag(tag)
    }

    fn curve() -> RiskCurve {
        RiskCurve::symmetric(
            Fixed18::from_ratio(8, 10).unwrap(),
            Fixed18::from_ratio(9, 10).unwrap(),
        )
    }

    fn state_with_products() -> (CoreState, EngineConfig) {
        let cfg = EngineConfig::default();
        let mut state = CoreState::new();
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
        (state, cfg)
    }

    #[test]
    fn quote_balance_is_unweighted() {
        let (mut state, cfg) = state_with_products();
        let a = acct(1);
        state
            .product_mut(cfg.quote_product)
            .unwrap()
            .as_spot_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(500))
            .unwrap();

        for ty in [HealthType::Initial, HealthType::Maintenance, HealthType::Pnl] {
            assert_eq!(
                account_health(&state, &cfg, &a, ty).unwrap(),
                Fixed18::from_int(500)
            );
        }
    }

    #[test]
    fn long_spot_discounted_short_inflated() {
        let (mut state, cfg) = state_with_products();
        let long = acct(1);
        let short = acct(2);
        {
            let spot = state.product_mut(ProductId(1)).unwrap().as_spot_mut().unwrap();
            spot.update_balance(long, Fixed18::from_int(10)).unwrap();
            spot.update_balance(short, Fixed18::from_int(-10)).unwrap();
        }

        // long: 10 * 0.8 * 100 = 800
        assert_eq!(
            account_health(&state, &cfg, &long, HealthType::Initial).unwrap(),
            Fixed18::from_int(800)
        );
        // short: -10 * 1.2 * 100 = -1200
        assert_eq!(
            account_health(&state, &cfg, &short, HealthType::Initial).unwrap(),
            Fixed18::from_int(-1200)
        );
        // pnl is unweighted
        assert_eq!(
            account_health(&state, &cfg, &long, HealthType::Pnl).unwrap(),
            Fixed18::from_int(1000)
        );
    }

    #[test]
    fn perp_carry_counts_unweighted() {
        let (mut state, cfg) = state_with_products();
        let a = acct(1);
        state
            .product_mut(ProductId(2))
            .unwrap()
            .as_perp_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(5), Fixed18::from_int(-480))
            .unwrap();

        // 5 * 0.9 * 100 - 480 = -30
        assert_eq!(
            account_health(&state, &cfg, &a, HealthType::Maintenance).unwrap(),
            Fixed18::from_int(-30)
        );
    }

    #[test]
    fn untradeable_sentinel_floors_health() {
        let (mut state, cfg) = state_with_products();
        let a = acct(1);
        state
            .product_mut(cfg.quote_product)
            .unwrap()
            .as_spot_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(1_000_000))
            .unwrap();
        {
            let product = state.product_mut(ProductId(1)).unwrap();
            product.config.risk = RiskCurve::untradeable();
            product
                .as_spot_mut()
                .unwrap()
                .update_balance(a, Fixed18::from_int(1))
                .unwrap();
        }

        // a huge quote balance cannot rescue an untradeable holding
        assert_eq!(
            account_health(&state, &cfg, &a, HealthType::Initial).unwrap(),
            Fixed18::MIN
        );
    }

    #[test]
    fn lp_value_uses_geometric_mean() {
        let (mut state, cfg) = state_with_products();
        let a = acct(1);
        {
            let product = state.product_mut(ProductId(1)).unwrap();
            product
                .lp
                .mint(
                    a,
                    Fixed18::from_int(10),
                    Fixed18::ZERO,
                    Fixed18::from_int(10_000),
                    Fixed18::from_int(100),
                )
                .unwrap();
        }

        // pool 10 base / 1000 quote at price 100: sqrt(10*1000*100) = 1000,
        // sole holder, maintenance weight 0.9 => 1000 * 1.9 = 1900
        let health = account_health(&state, &cfg, &a, HealthType::Maintenance).unwrap();
        let diff = health.sub(Fixed18::from_int(1900)).unwrap().abs();
        assert!(diff < Fixed18::from_raw(100));
    }

    #[test]
    fn manipulated_pool_ratio_does_not_inflate_health() {
        let (mut state, cfg) = state_with_products();
        let a = acct(1);
        {
            let product = state.product_mut(ProductId(1)).unwrap();
            product
                .lp
                .mint(
                    a,
                    Fixed18::from_int(10),
                    Fixed18::ZERO,
                    Fixed18::from_int(10_000),
                    Fixed18::from_int(100),
                )
                .unwrap();
        }
        let before = account_health(&state, &cfg, &a, HealthType::Initial).unwrap();

        // shove the pool ratio around without changing k appreciably:
        // a balanced swap keeps sqrt(b*q) stable, so health barely moves
        {
            let product = state.product_mut(ProductId(1)).unwrap();
            product
                .lp
                .swap(Fixed18::from_int(-5), Fixed18::from_int(1000))
                .unwrap();
        }
        let after = account_health(&state, &cfg, &a, HealthType::Initial).unwrap();
        // k went from 10_000 to 10_000: valuation unchanged up to rounding
        let diff = after.sub(before).unwrap().abs();
        assert!(diff < Fixed18::from_int(1));
    }

    #[test]
    fn basis_pair_nets_to_smaller_penalty() {
        let (mut state, mut cfg) = state_with_products();
        cfg.spreads.push(SpreadPair {
            spot: ProductId(1),
            perp: ProductId(2),
        });
        let a = acct(1);
        state
            .product_mut(ProductId(1))
            .unwrap()
            .as_spot_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(10))
            .unwrap();
        state
            .product_mut(ProductId(2))
            .unwrap()
            .as_perp_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(-10), Fixed18::ZERO)
            .unwrap();

        let netted = account_health(&state, &cfg, &a, HealthType::Initial).unwrap();

        let mut unhedged_cfg = cfg.clone();
        unhedged_cfg.spreads.clear();
        let unhedged = account_health(&state, &unhedged_cfg, &a, HealthType::Initial).unwrap();

        // unhedged: 10*0.8*100 + (-10)*1.2*100 = -400
        assert_eq!(unhedged, Fixed18::from_int(-400));
        // netted at 1/5 discount: weights 0.96 / 1.04 => -80
        assert_eq!(netted, Fixed18::from_int(-80));
        assert!(netted > unhedged);
    }

    #[test]
    fn residual_leg_keeps_standard_weight() {
        let (mut state, mut cfg) = state_with_products();
        cfg.spreads.push(SpreadPair {
            spot: ProductId(1),
            perp: ProductId(2),
        });
        let a = acct(1);
        state
            .product_mut(ProductId(1))
            .unwrap()
            .as_spot_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(10))
            .unwrap();
        // only 4 units hedged; 6 long spot units stay at standard weight
        state
            .product_mut(ProductId(2))
            .unwrap()
            .as_perp_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(-4), Fixed18::ZERO)
            .unwrap();

        let health = account_health(&state, &cfg, &a, HealthType::Initial).unwrap();
        // basis 4: 4*0.96*100 - 4*1.04*100 = -32; residual 6*0.8*100 = 480
        assert_eq!(health, Fixed18::from_int(448));
    }
}
