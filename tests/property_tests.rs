//! Property-based tests for the core math.
//!
//! These tests verify invariants hold under random inputs.

use proptest::prelude::*;
use settle_core::*;

// bounded values around +/- 1e9 with nano resolution, wide enough to hit
// interesting magnitudes without tripping intentional overflow errors
fn fixed_strategy() -> impl Strategy<Value = Fixed18> {
    (-1_000_000_000_000_000_000i64..1_000_000_000_000_000_000i64)
        .prop_map(|raw| Fixed18::from_raw(raw as i128 * 1_000_000_000))
}

fn positive_strategy() -> impl Strategy<Value = Fixed18> {
    (1_000_000i64..1_000_000_000_000_000i64)
        .prop_map(|raw| Fixed18::from_raw(raw as i128 * 1_000_000_000))
}

proptest! {
    /// Addition and subtraction invert exactly.
    #[test]
    fn add_sub_roundtrip(a in fixed_strategy(), b in fixed_strategy()) {
        let there = a.add(b).unwrap();
        prop_assert_eq!(there.sub(b).unwrap(), a);
    }

    /// mul-then-div returns close to the original; both steps truncate
    /// toward zero so the drift is bounded, never inflationary.
    #[test]
    fn mul_div_roundtrip_bounded(a in fixed_strategy(), b in positive_strategy()) {
        let roundtrip = a.mul(b).unwrap().div(b).unwrap();
        let diff = roundtrip.sub(a).unwrap().abs();
        // one raw unit of mul error amplified by 1/b, plus the div's own unit
        let tolerance = Fixed18::ONE.div(b).unwrap().add(Fixed18::from_raw(1)).unwrap();
        prop_assert!(diff <= tolerance, "diff {} tolerance {}", diff, tolerance);
    }

    /// Integer sqrt is the floor square root: s*s never exceeds x and the
    /// next representable root would overshoot.
    #[test]
    fn sqrt_is_floor_root(x in positive_strategy()) {
        let s = x.sqrt().unwrap();
        let squared = s.mul(s).unwrap();
        prop_assert!(squared <= x);
        let overshoot = x.sub(squared).unwrap();
        // (s+1)^2 - s^2 = 2s + 1, in raw radicand units
        let bound = s.mul(Fixed18::from_raw(3)).unwrap().add(Fixed18::from_raw(2)).unwrap();
        prop_assert!(overshoot <= bound, "overshoot {} bound {}", overshoot, bound);
    }

    /// Compounding a growth factor >= 1 is monotone in the exponent.
    #[test]
    fn powi_monotone(rate_ppm in 0i64..1_000i64, exp in 1u64..5_000u64) {
        let base = Fixed18::ONE
            .add(Fixed18::from_ratio(rate_ppm as i128, 1_000_000).unwrap())
            .unwrap();
        let shorter = base.powi(exp).unwrap();
        let longer = base.powi(exp + 1).unwrap();
        prop_assert!(longer >= shorter);
        prop_assert!(shorter >= Fixed18::ONE);
    }

    /// Rounding down to an increment yields an exact multiple that never
    /// moves away from zero by more than one increment.
    #[test]
    fn round_down_is_exact_multiple(x in fixed_strategy(), inc_milli in 1i64..10_000i64) {
        let inc = Fixed18::from_ratio(inc_milli as i128, 1_000).unwrap();
        let rounded = x.round_down_to(inc).unwrap();
        prop_assert_eq!(rounded.raw() % inc.raw(), 0);
        prop_assert!(rounded.abs() <= x.abs());
        prop_assert!(x.sub(rounded).unwrap().abs() < inc);
    }
}

proptest! {
    /// A spot ledger with no interest accrual conserves value exactly:
    /// the sum of real balances equals the sum of applied deltas.
    #[test]
    fn spot_ledger_conserves_deltas(deltas in prop::collection::vec((0u64..8u64, -500i64..500i64), 1..40)) {
        let mut ledger = SpotLedger::new();
        let mut expected = Fixed18::ZERO;
        for (tag, delta) in deltas {
            let delta = Fixed18::from_int(delta);
            ledger.update_balance(Subaccount::from_tag(tag), delta).unwrap();
            expected = expected.add(delta).unwrap();
        }
        let mut total = Fixed18::ZERO;
        let accounts: Vec<Subaccount> = ledger.accounts().map(|(a, _)| *a).collect();
        for account in accounts {
            total = total.add(ledger.balance_real(&account).unwrap()).unwrap();
        }
        prop_assert_eq!(total, expected);
    }

    /// Funding never creates or destroys value: across any balanced book
    /// and any tick sequence, settled v_quote sums to zero.
    #[test]
    fn perp_funding_is_zero_sum(
        amounts in prop::collection::vec(1i64..1_000i64, 1..10),
        ticks in prop::collection::vec(-100i64..100i64, 1..10),
    ) {
        let mut perp = PerpLedger::new();
        // balanced book: each long paired with an equal short
        for (i, amount) in amounts.iter().enumerate() {
            let size = Fixed18::from_int(*amount);
            perp.update_balance(Subaccount::from_tag(i as u64), size, Fixed18::ZERO).unwrap();
            perp.update_balance(
                Subaccount::from_tag(1_000 + i as u64),
                size.neg().unwrap(),
                Fixed18::ZERO,
            )
            .unwrap();
        }
        for tick in &ticks {
            perp.apply_funding_tick(Fixed18::from_ratio(*tick as i128, 100).unwrap()).unwrap();
        }

        let mut total = Fixed18::ZERO;
        for i in 0..amounts.len() as u64 {
            total = total
                .add(perp.settle_funding(Subaccount::from_tag(i)).unwrap().v_quote_balance)
                .unwrap();
            total = total
                .add(perp.settle_funding(Subaccount::from_tag(1_000 + i)).unwrap().v_quote_balance)
                .unwrap();
        }
        prop_assert_eq!(total, Fixed18::ZERO);
        prop_assert_eq!(perp.net_position().unwrap(), Fixed18::ZERO);
    }

    /// The pool invariant k = base * quote never shrinks under taker flow,
    /// and the realized price respects the taker's limit.
    #[test]
    fn pool_invariant_never_shrinks(
        trades in prop::collection::vec((prop::bool::ANY, 1i64..50i64, 50i64..200i64), 1..20),
    ) {
        let mut lp = LpLedger::new();
        lp.mint(
            Subaccount::from_tag(1),
            Fixed18::from_int(1_000),
            Fixed18::ZERO,
            Fixed18::from_int(200_000),
            Fixed18::from_int(100),
        )
        .unwrap();
        let keep_rate = Fixed18::from_ratio(997, 1_000).unwrap();
        let increment = Fixed18::from_ratio(1, 1_000).unwrap();

        for (buy, size, limit) in trades {
            let k_before = lp.state.base.mul(lp.state.quote).unwrap();
            let amount = if buy {
                Fixed18::from_int(size)
            } else {
                Fixed18::from_int(-size)
            };
            let limit = Fixed18::from_int(limit);
            let delta = lp.swap_quote(amount, limit, keep_rate, increment).unwrap();
            if delta.base.is_zero() {
                continue;
            }
            let price = delta.quote.div(delta.base).unwrap().abs();
            if buy {
                prop_assert!(price <= limit);
            } else {
                prop_assert!(price >= limit.mul(keep_rate).unwrap());
            }
            lp.swap(delta.base.neg().unwrap(), delta.quote.neg().unwrap()).unwrap();
            let k_after = lp.state.base.mul(lp.state.quote).unwrap();
            prop_assert!(k_after >= k_before);
        }
    }

    /// Health is monotone in the quote balance: adding riskless collateral
    /// never lowers any health flavor.
    #[test]
    fn health_monotone_in_quote(
        position in -50i64..50i64,
        extra in 1i64..10_000i64,
    ) {
        let cfg = EngineConfig::default();
        let mut state = CoreState::with_system_accounts(&cfg);
        state.add_product(
            ProductConfig::spot(ProductId(0), RiskCurve::riskless()),
            Fixed18::ONE,
        );
        state.add_product(
            ProductConfig::perp(
                ProductId(1),
                RiskCurve::symmetric(
                    Fixed18::from_ratio(8, 10).unwrap(),
                    Fixed18::from_ratio(9, 10).unwrap(),
                ),
            ),
            Fixed18::from_int(100),
        );
        let account = Subaccount::from_tag(1);
        state
            .product_mut(ProductId(1))
            .unwrap()
            .as_perp_mut()
            .unwrap()
            .update_balance(account, Fixed18::from_int(position), Fixed18::ZERO)
            .unwrap();

        for ty in [HealthType::Initial, HealthType::Maintenance, HealthType::Pnl] {
            let before = account_health(&state, &cfg, &account, ty).unwrap();
            let mut richer = state.clone();
            richer.update_quote(&cfg, account, Fixed18::from_int(extra)).unwrap();
            let after = account_health(&richer, &cfg, &account, ty).unwrap();
            prop_assert!(after >= before);
            prop_assert_eq!(after.sub(before).unwrap(), Fixed18::from_int(extra));
        }
    }

    /// Initial health is never laxer than maintenance health.
    #[test]
    fn initial_no_laxer_than_maintenance(
        position in -50i64..50i64,
        quote in -5_000i64..5_000i64,
    ) {
        let cfg = EngineConfig::default();
        let mut state = CoreState::with_system_accounts(&cfg);
        state.add_product(
            ProductConfig::spot(ProductId(0), RiskCurve::riskless()),
            Fixed18::ONE,
        );
        state.add_product(
            ProductConfig::spot(
                ProductId(1),
                RiskCurve::symmetric(
                    Fixed18::from_ratio(8, 10).unwrap(),
                    Fixed18::from_ratio(9, 10).unwrap(),
                ),
            ),
            Fixed18::from_int(100),
        );
        let account = Subaccount::from_tag(1);
        state.update_quote(&cfg, account, Fixed18::from_int(quote)).unwrap();
        state
            .product_mut(ProductId(1))
            .unwrap()
            .as_spot_mut()
            .unwrap()
            .update_balance(account, Fixed18::from_int(position))
            .unwrap();

        let initial = account_health(&state, &cfg, &account, HealthType::Initial).unwrap();
        let maintenance = account_health(&state, &cfg, &account, HealthType::Maintenance).unwrap();
        let pnl = account_health(&state, &cfg, &account, HealthType::Pnl).unwrap();
        prop_assert!(initial <= maintenance);
        prop_assert!(maintenance <= pnl);
    }
}
