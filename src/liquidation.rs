// 10.0 liquidation.rs: the staged liquidation pipeline.
//
// a liquidation intent walks fixed gates in order and terminates at the
// first one that applies:
//   1. eligibility: maintenance health must be negative
//   2. finalize: nothing takeable or assumable left -> insurance pays,
//      then socialize
//   3. LP decomposition: pooled shares force-burn before position transfer;
//      terminal only when this alone restores initial health
//   4. liability gate: borrows transfer only once assets are gone, funded
//      by the liquidatee's quote plus insurance
//   5. amount assertion: the requested size must close, never flip, and
//      must sit on the product's size increment
//   6. payment: position transfer at the penalized oracle price
//
// prices favor the liquidator by a configured fraction of the maintenance
// weight gap, and the liquidatee funds an insurance fee out of the same gap.
// the post-conditions are strict both ways: the liquidatee must not come out
// initial-healthy (no over-liquidation) and the liquidator must stay
// initial-healthy (no cascading).

use crate::config::EngineConfig;
use crate::engine::core::CoreState;
use crate::engine::results::{EngineError, LiquidationOutcome};
use crate::fixed::{Fixed18, MathError};
use crate::health::account_health;
use crate::product::ProductLedger;
use crate::types::{HealthType, LiquidationTarget, ProductId, Subaccount};

pub fn liquidate(
    state: &mut CoreState,
    config: &EngineConfig,
    liquidator: Subaccount,
    liquidatee: Subaccount,
    target: LiquidationTarget,
    amount: Fixed18,
) -> Result<LiquidationOutcome, EngineError> {
    if liquidator == liquidatee || state.accounts.is_protected(&liquidatee) {
        return Err(EngineError::NotLiquidatable {
            health: Fixed18::ZERO,
        });
    }

    // 1. eligibility
    let maintenance = account_health(state, config, &liquidatee, HealthType::Maintenance)?;
    if !maintenance.is_negative() {
        return Err(EngineError::NotLiquidatable {
            health: maintenance,
        });
    }

    // 2. finalize: nothing a liquidator could take over, and no borrow that
    // the account's quote plus insurance could still pay someone to assume
    let closable = has_closable_assets(state, config, &liquidatee)?;
    if !closable {
        let assumable = has_spot_liabilities(state, config, &liquidatee)?
            && liability_coverage(state, config, &liquidatee)?.is_positive();
        if !assumable {
            return finalize(state, config, liquidatee);
        }
    }

    // 3. LP decomposition on the targeted product(s)
    let legs: Vec<ProductId> = match target {
        LiquidationTarget::Spot(id) | LiquidationTarget::Perp(id) => vec![id],
        LiquidationTarget::Spread(pair) => vec![pair.spot, pair.perp],
    };
    let mut shares_burned = Fixed18::ZERO;
    let mut lp_fee = Fixed18::ZERO;
    for id in &legs {
        let (shares, fee) = decompose_lp(state, config, *id, liquidatee)?;
        shares_burned = shares_burned.add(shares)?;
        lp_fee = lp_fee.add(fee)?;
    }
    if shares_burned.is_positive() {
        // terminal only if the burn alone restored initial health; otherwise
        // the same intent proceeds to the transfer gates below
        let restored = account_health(state, config, &liquidatee, HealthType::Initial)?;
        if !restored.is_negative() {
            return Ok(LiquidationOutcome::LpDecomposed {
                shares_burned,
                fee_to_insurance: lp_fee,
            });
        }
    }

    // 4-6. liability gate, amount assertion and payment per leg
    let (price, insurance_fee) = match target {
        LiquidationTarget::Spot(id) | LiquidationTarget::Perp(id) => {
            let position = state.product(id)?.base_exposure(&liquidatee)?;
            let increment = state.product(id)?.config.size_increment;
            let liability =
                matches!(target, LiquidationTarget::Spot(_)) && position.is_negative();
            if liability && closable {
                // a borrow transfer must wait for every asset to clear first
                return Err(EngineError::NotLiquidatableLiabilities);
            }
            if liability {
                // residual perp winnings turn into quote coverage first
                settle_positive_pnl(state, config, liquidatee)?;
            }
            assert_amount(amount, position, increment)?;
            if liability {
                assume_liability(state, config, id, liquidatee, liquidator, amount)?
            } else {
                transfer_leg(
                    state,
                    config,
                    id,
                    liquidatee,
                    liquidator,
                    amount,
                    config.liquidation.single_leg_penalty,
                )?
            }
        }
        LiquidationTarget::Spread(pair) => {
            let spot_pos = state.product(pair.spot)?.base_exposure(&liquidatee)?;
            let perp_pos = state.product(pair.perp)?.base_exposure(&liquidatee)?;
            if spot_pos.signum() * perp_pos.signum() >= 0 {
                return Err(EngineError::NotLiquidatableAmount { amount });
            }
            // both legs move by the same magnitude, so the amount must fit
            // both positions and both increments
            assert_amount(amount, spot_pos, state.product(pair.spot)?.config.size_increment)?;
            assert_amount(
                amount.neg()?,
                perp_pos,
                state.product(pair.perp)?.config.size_increment,
            )?;
            let (spot_price, spot_fee) = transfer_leg(
                state,
                config,
                pair.spot,
                liquidatee,
                liquidator,
                amount,
                config.liquidation.spread_penalty,
            )?;
            let (_, perp_fee) = transfer_leg(
                state,
                config,
                pair.perp,
                liquidatee,
                liquidator,
                amount.neg()?,
                config.liquidation.spread_penalty,
            )?;
            (spot_price, spot_fee.add(perp_fee)?)
        }
    };

    // post-conditions
    let after = account_health(state, config, &liquidatee, HealthType::Initial)?;
    if after.is_positive() {
        return Err(EngineError::LiquidatedTooMuch { health: after });
    }
    let liquidator_health = account_health(state, config, &liquidator, HealthType::Initial)?;
    if liquidator_health.is_negative() && !state.accounts.is_protected(&liquidator) {
        return Err(EngineError::SubaccountHealth {
            account: liquidator,
            health: liquidator_health,
        });
    }

    Ok(LiquidationOutcome::Paid {
        target,
        amount,
        price,
        insurance_fee,
    })
}

// anything a liquidator could still take over at a discount
fn has_closable_assets(
    state: &CoreState,
    config: &EngineConfig,
    account: &Subaccount,
) -> Result<bool, EngineError> {
    for (id, product) in state.products() {
        if *id == config.quote_product {
            continue;
        }
        if product.lp.balance(account).amount.is_positive() {
            return Ok(true);
        }
        match &product.ledger {
            ProductLedger::Spot(spot) => {
                if spot.balance_real(account)?.is_positive() {
                    return Ok(true);
                }
            }
            ProductLedger::Perp(perp) => {
                if !perp.balance(account).amount.is_zero() {
                    return Ok(true);
                }
            }
        }
    }
    Ok(false)
}

// any spot balance still owed to the ledger, quote aside
fn has_spot_liabilities(
    state: &CoreState,
    config: &EngineConfig,
    account: &Subaccount,
) -> Result<bool, EngineError> {
    for (id, product) in state.products() {
        if *id == config.quote_product {
            continue;
        }
        if let ProductLedger::Spot(spot) = &product.ledger {
            if spot.balance_real(account)?.is_negative() {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

// what a liability takeover can draw on: the account's own quote plus
// whatever insurance holds
fn liability_coverage(
    state: &CoreState,
    config: &EngineConfig,
    account: &Subaccount,
) -> Result<Fixed18, EngineError> {
    let quote = state
        .product(config.quote_product)?
        .as_spot()?
        .balance_real(account)?
        .max(Fixed18::ZERO);
    let insurance = state.insurance_balance(config)?.max(Fixed18::ZERO);
    Ok(quote.add(insurance)?)
}

fn assert_amount(
    amount: Fixed18,
    position: Fixed18,
    increment: Fixed18,
) -> Result<(), EngineError> {
    if amount.is_zero()
        || amount.signum() != position.signum()
        || amount.abs() > position.abs()
        || amount.round_down_to(increment)? != amount
    {
        return Err(EngineError::NotLiquidatableAmount { amount });
    }
    Ok(())
}

// `oracle * (1 - (1 - w_maint) * penalty)`: below oracle for a long leg
// (w < 1), above for a short or borrowed leg (w > 1), favoring the
// liquidator in both directions
fn penalized_price(
    oracle: Fixed18,
    weight: Fixed18,
    penalty: Fixed18,
) -> Result<Fixed18, MathError> {
    let gap_rate = Fixed18::ONE.sub(weight)?.mul(penalty)?;
    oracle.mul(Fixed18::ONE.sub(gap_rate)?)
}

// residual perp winnings convert to quote before a liability transfer, so
// they count toward the funding the takeover draws on
fn settle_positive_pnl(
    state: &mut CoreState,
    config: &EngineConfig,
    account: Subaccount,
) -> Result<(), EngineError> {
    for id in state.product_ids() {
        if !state.product(id)?.is_perp() {
            continue;
        }
        let v_quote = {
            let perp = state.product_mut(id)?.as_perp_mut()?;
            perp.settle_funding(account)?.v_quote_balance
        };
        if v_quote.is_positive() {
            let settlement = state.product_mut(id)?.as_perp_mut()?.settle_pnl(account)?;
            state.update_quote(config, account, settlement.settled)?;
        }
    }
    Ok(())
}

/// Transfer a spot borrow to the liquidator at a premium to oracle. The
/// liquidatee pays for the takeover out of its own quote, insurance covers
/// any overdraft, and the whole cost must fit inside that funding.
fn assume_liability(
    state: &mut CoreState,
    config: &EngineConfig,
    product_id: ProductId,
    liquidatee: Subaccount,
    liquidator: Subaccount,
    amount: Fixed18,
) -> Result<(Fixed18, Fixed18), EngineError> {
    let (oracle, weight) = {
        let product = state.product(product_id)?;
        (
            product.oracle_price,
            product.config.risk.weight(amount, HealthType::Maintenance),
        )
    };
    let liq_price = penalized_price(oracle, weight, config.liquidation.single_leg_penalty)?;
    let payment = amount.abs().mul(liq_price)?;
    let gap = liq_price.sub(oracle)?.abs().mul(amount.abs())?;
    let fee = gap.mul(config.liquidation.insurance_fee_fraction)?;
    let cost = payment.add(fee)?;
    let coverage = liability_coverage(state, config, &liquidatee)?;
    if cost > coverage {
        return Err(EngineError::LiquidatedTooMuch {
            health: coverage.sub(cost)?,
        });
    }

    let (price, insurance_fee) = transfer_leg(
        state,
        config,
        product_id,
        liquidatee,
        liquidator,
        amount,
        config.liquidation.single_leg_penalty,
    )?;

    // the takeover may overdraw the liquidatee's quote; insurance tops it
    // back up to zero
    let quote = state
        .product(config.quote_product)?
        .as_spot()?
        .balance_real(&liquidatee)?;
    if quote.is_negative() {
        let available = state.insurance_balance(config)?.max(Fixed18::ZERO);
        let topped = quote.neg()?.min(available);
        if topped.is_positive() {
            state.update_quote(config, config.insurance_account, topped.neg()?)?;
            state.update_quote(config, liquidatee, topped)?;
        }
    }
    Ok((price, insurance_fee))
}

/// Force-burn the liquidatee's whole LP holding in one product. Proceeds
/// land in their own balances, less a skim on the quote leg to insurance.
fn decompose_lp(
    state: &mut CoreState,
    config: &EngineConfig,
    product_id: ProductId,
    account: Subaccount,
) -> Result<(Fixed18, Fixed18), EngineError> {
    let held = state.product(product_id)?.lp.balance(&account).amount;
    if !held.is_positive() {
        return Ok((Fixed18::ZERO, Fixed18::ZERO));
    }

    let is_perp = state.product(product_id)?.is_perp();
    let burn = state.product_mut(product_id)?.lp.burn(account, None)?;
    let fee = burn
        .quote_out
        .mul(config.liquidation.lp_decomposition_fee)?;
    let quote_net = burn.quote_out.sub(fee)?;

    if is_perp {
        state
            .product_mut(product_id)?
            .as_perp_mut()?
            .update_balance(account, burn.base_out, quote_net)?;
    } else {
        state
            .product_mut(product_id)?
            .as_spot_mut()?
            .update_balance(account, burn.base_out)?;
        state.update_quote(config, account, quote_net)?;
    }
    if !burn.funding_owed.is_zero() {
        state.update_quote(config, account, burn.funding_owed.neg()?)?;
    }
    if fee.is_positive() {
        state.update_quote(config, config.insurance_account, fee)?;
    }
    Ok((burn.shares, fee))
}

/// Move `amount` of one leg from liquidatee to liquidator at the penalized
/// oracle price, and charge the insurance fee out of the price gap.
fn transfer_leg(
    state: &mut CoreState,
    config: &EngineConfig,
    product_id: ProductId,
    liquidatee: Subaccount,
    liquidator: Subaccount,
    amount: Fixed18,
    penalty: Fixed18,
) -> Result<(Fixed18, Fixed18), EngineError> {
    let (oracle, weight, is_perp) = {
        let product = state.product(product_id)?;
        (
            product.oracle_price,
            product.config.risk.weight(amount, HealthType::Maintenance),
            product.is_perp(),
        )
    };
    let liq_price = penalized_price(oracle, weight, penalty)?;
    let quote = amount.mul(liq_price)?;

    if is_perp {
        let perp = state.product_mut(product_id)?.as_perp_mut()?;
        perp.update_balance(liquidatee, amount.neg()?, quote)?;
        perp.update_balance(liquidator, amount, quote.neg()?)?;
    } else {
        let spot = state.product_mut(product_id)?.as_spot_mut()?;
        spot.update_balance(liquidatee, amount.neg()?)?;
        spot.update_balance(liquidator, amount)?;
        state.update_quote(config, liquidatee, quote)?;
        state.update_quote(config, liquidator, quote.neg()?)?;
    }

    let gap = oracle.sub(liq_price)?.abs().mul(amount.abs())?;
    let insurance_fee = gap.mul(config.liquidation.insurance_fee_fraction)?;
    if insurance_fee.is_positive() {
        state.update_quote(config, liquidatee, insurance_fee.neg()?)?;
        state.update_quote(config, config.insurance_account, insurance_fee)?;
    }
    Ok((liq_price, insurance_fee))
}

/// Terminal stage: convert every residual balance to quote at oracle, pay
/// the consolidated shortfall from insurance, and socialize whatever is
/// left. Perp losses socialize across that product's open interest; spot
/// losses scale the quote depositors down.
fn finalize(
    state: &mut CoreState,
    config: &EngineConfig,
    account: Subaccount,
) -> Result<LiquidationOutcome, EngineError> {
    let mut insurance_paid = Fixed18::ZERO;
    let mut socialized = Fixed18::ZERO;

    for id in state.product_ids() {
        if id == config.quote_product {
            continue;
        }
        let oracle = state.product(id)?.oracle_price;
        let is_perp = state.product(id)?.is_perp();
        if is_perp {
            let v_quote = {
                let perp = state.product_mut(id)?.as_perp_mut()?;
                perp.settle_funding(account)?.v_quote_balance
            };
            if v_quote.is_positive() {
                // winnings settle through the capped pot like everyone else
                let settlement = state.product_mut(id)?.as_perp_mut()?.settle_pnl(account)?;
                state.update_quote(config, account, settlement.settled)?;
            } else if v_quote.is_negative() {
                let need = v_quote.neg()?;
                let available = state.insurance_balance(config)?.max(Fixed18::ZERO);
                let paid = need.min(available);
                if paid.is_positive() {
                    // insurance backs the winners' claims on this pot
                    state.update_quote(config, config.insurance_account, paid.neg()?)?;
                    state.product_mut(id)?.as_perp_mut()?.add_available_settle(paid)?;
                    insurance_paid = insurance_paid.add(paid)?;
                }
                let remainder = need.sub(paid)?;
                if remainder.is_positive() {
                    state
                        .product_mut(id)?
                        .as_perp_mut()?
                        .socialize_loss(remainder)?;
                    socialized = socialized.add(remainder)?;
                }
                state
                    .product_mut(id)?
                    .as_perp_mut()?
                    .update_balance(account, Fixed18::ZERO, need)?;
            }
        } else {
            let balance = state.product(id)?.as_spot()?.balance_real(&account)?;
            if !balance.is_zero() {
                state
                    .product_mut(id)?
                    .as_spot_mut()?
                    .update_balance(account, balance.neg()?)?;
                state.update_quote(config, account, balance.mul(oracle)?)?;
            }
        }
    }

    let quote = state
        .product(config.quote_product)?
        .as_spot()?
        .balance_real(&account)?;
    if quote.is_negative() {
        let shortfall = quote.neg()?;
        let available = state.insurance_balance(config)?.max(Fixed18::ZERO);
        let paid = shortfall.min(available);
        if paid.is_positive() {
            state.update_quote(config, config.insurance_account, paid.neg()?)?;
            state.update_quote(config, account, paid)?;
            insurance_paid = insurance_paid.add(paid)?;
        }
        if shortfall > paid {
            let spread = state
                .product_mut(config.quote_product)?
                .as_spot_mut()?
                .socialize(account)?;
            socialized = socialized.add(spread)?;
        }
    }

    Ok(LiquidationOutcome::Finalized {
        insurance_paid,
        socialized,
    })
}
