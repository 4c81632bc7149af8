// 3.x ledger.rs: per-product spot balances with normalized amounts and
// continuously-compounding interest multipliers.
//
// a stored balance is "normalized": real amount = normalized * multiplier,
// where the multiplier is the deposit one for positive balances and the
// borrow one for negative balances. interest accrual only bumps the two
// product-level multipliers; account rows are rescaled lazily on touch, so
// there is no per-account interest job.

use crate::engine::results::EngineError;
use crate::fixed::Fixed18;
use crate::types::Subaccount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const SECONDS_PER_YEAR: u64 = 31_536_000;

// interest ticks longer than this are a sequencer fault
pub const MAX_INTEREST_INTERVAL_SECS: u64 = 7 * 86_400;

/// Annualized borrower rate as a 3-segment piecewise-linear function of
/// utilization: a floor, a linear ramp up to the inflection point, and a
/// steeper ramp beyond it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestCurve {
    pub floor: Fixed18,
    pub inflection: Fixed18,
    pub small_cap: Fixed18,
    pub large_cap: Fixed18,
}

impl Default for InterestCurve {
    fn default() -> Self {
        Self {
            // 1% floor, ramp inflects at 80% utilization, 4% small-segment cap
            floor: Fixed18::from_raw(10_000_000_000_000_000),
            inflection: Fixed18::from_raw(800_000_000_000_000_000),
            small_cap: Fixed18::from_raw(40_000_000_000_000_000),
            large_cap: Fixed18::ONE,
        }
    }
}

impl InterestCurve {
    pub fn annual_borrow_rate(&self, utilization: Fixed18) -> Result<Fixed18, EngineError> {
        let u = utilization.max(Fixed18::ZERO).min(Fixed18::ONE);
        let rate = if u <= self.inflection {
            self.floor.add(self.small_cap.mul(u.div(self.inflection)?)?)?
        } else {
            let over = u.sub(self.inflection)?;
            let span = Fixed18::ONE.sub(self.inflection)?;
            self.floor
                .add(self.small_cap)?
                .add(self.large_cap.mul(over.div(span)?)?)?
        };
        Ok(rate)
    }
}

// 3.1: product-level interest state. multipliers start at 1 and only grow,
// except when socialization scales the deposit multiplier down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotState {
    pub cumulative_deposits_multiplier: Fixed18,
    pub cumulative_borrows_multiplier: Fixed18,
    // sum of positive normalized balances
    pub total_deposits_normalized: Fixed18,
    // sum of |negative normalized balances|, stored positive
    pub total_borrows_normalized: Fixed18,
}

impl Default for SpotState {
    fn default() -> Self {
        Self {
            cumulative_deposits_multiplier: Fixed18::ONE,
            cumulative_borrows_multiplier: Fixed18::ONE,
            total_deposits_normalized: Fixed18::ZERO,
            total_borrows_normalized: Fixed18::ZERO,
        }
    }
}

impl SpotState {
    pub fn total_deposits_real(&self) -> Result<Fixed18, EngineError> {
        Ok(self
            .total_deposits_normalized
            .mul(self.cumulative_deposits_multiplier)?)
    }

    pub fn total_borrows_real(&self) -> Result<Fixed18, EngineError> {
        Ok(self
            .total_borrows_normalized
            .mul(self.cumulative_borrows_multiplier)?)
    }

    pub fn utilization(&self) -> Result<Fixed18, EngineError> {
        let deposits = self.total_deposits_real()?;
        if deposits.is_zero() {
            return Ok(Fixed18::ZERO);
        }
        Ok(self.total_borrows_real()?.div(deposits)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InterestAccrual {
    pub utilization: Fixed18,
    pub annual_borrow_rate: Fixed18,
    pub borrow_growth: Fixed18,
    pub deposit_growth: Fixed18,
    pub protocol_fee_paid: Fixed18,
}

// 3.2: one product's spot ledger. rows are never deleted, only zeroed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpotLedger {
    pub state: SpotState,
    balances: HashMap<Subaccount, Fixed18>,
}

impl SpotLedger {
    pub fn new() -> Self {
        Self {
            state: SpotState::default(),
            balances: HashMap::new(),
        }
    }

    pub fn balance_normalized(&self, account: &Subaccount) -> Fixed18 {
        self.balances.get(account).copied().unwrap_or(Fixed18::ZERO)
    }

    fn multiplier_for(&self, normalized: Fixed18) -> Fixed18 {
        if normalized.is_negative() {
            self.state.cumulative_borrows_multiplier
        } else {
            self.state.cumulative_deposits_multiplier
        }
    }

    /// Real (interest-adjusted) balance for one account.
    pub fn balance_real(&self, account: &Subaccount) -> Result<Fixed18, EngineError> {
        let normalized = self.balance_normalized(account);
        Ok(normalized.mul(self.multiplier_for(normalized))?)
    }

    /// Apply a real-amount delta, rescaling the stored normalized row and the
    /// product totals. Returns the new real balance.
    pub fn update_balance(
        &mut self,
        account: Subaccount,
        delta_real: Fixed18,
    ) -> Result<Fixed18, EngineError> {
        let old_normalized = self.balance_normalized(&account);
        let old_real = old_normalized.mul(self.multiplier_for(old_normalized))?;
        let new_real = old_real.add(delta_real)?;
        let new_normalized = if new_real.is_negative() {
            new_real.div(self.state.cumulative_borrows_multiplier)?
        } else {
            new_real.div(self.state.cumulative_deposits_multiplier)?
        };

        self.remove_from_totals(old_normalized)?;
        self.add_to_totals(new_normalized)?;
        self.balances.insert(account, new_normalized);
        Ok(new_real)
    }

    fn remove_from_totals(&mut self, normalized: Fixed18) -> Result<(), EngineError> {
        if normalized.is_negative() {
            self.state.total_borrows_normalized =
                self.state.total_borrows_normalized.sub(normalized.abs())?;
        } else {
            self.state.total_deposits_normalized =
                self.state.total_deposits_normalized.sub(normalized)?;
        }
        Ok(())
    }

    fn add_to_totals(&mut self, normalized: Fixed18) -> Result<(), EngineError> {
        if normalized.is_negative() {
            self.state.total_borrows_normalized =
                self.state.total_borrows_normalized.add(normalized.abs())?;
        } else {
            self.state.total_deposits_normalized =
                self.state.total_deposits_normalized.add(normalized)?;
        }
        Ok(())
    }

    /// One batched interest tick for this product.
    ///
    /// The borrow multiplier compounds at the curve rate per second over
    /// `dt_secs`. Depositors realize `utilization * (borrow_growth - 1)`
    /// minus the protocol fee fraction, which is credited to `fee_account`
    /// instead of discarded. An optional minimum deposit rate compounds on
    /// top, independently of utilization.
    pub fn accrue_interest(
        &mut self,
        dt_secs: u64,
        curve: &InterestCurve,
        protocol_fee_fraction: Fixed18,
        min_deposit_rate: Option<Fixed18>,
        fee_account: Subaccount,
    ) -> Result<InterestAccrual, EngineError> {
        if dt_secs == 0 || dt_secs >= MAX_INTEREST_INTERVAL_SECS {
            return Err(EngineError::InvalidInterval { dt_secs });
        }

        let utilization = self.state.utilization()?;
        let annual_rate = curve.annual_borrow_rate(utilization)?;
        let per_second = annual_rate.div(Fixed18::from_int(SECONDS_PER_YEAR as i64))?;
        let borrow_growth = Fixed18::ONE.add(per_second)?.powi(dt_secs)?;

        let deposits_real_before = self.state.total_deposits_real()?;

        // depositors earn the borrowers' interest pro-rata by utilization,
        // less the protocol cut
        let gross_deposit_factor = utilization.mul(borrow_growth.sub(Fixed18::ONE)?)?;
        let fee_factor = gross_deposit_factor.mul(protocol_fee_fraction)?;
        let net_deposit_factor = gross_deposit_factor.sub(fee_factor)?;
        let mut deposit_growth = Fixed18::ONE.add(net_deposit_factor)?;

        if let Some(min_rate) = min_deposit_rate {
            let min_per_second = min_rate.div(Fixed18::from_int(SECONDS_PER_YEAR as i64))?;
            let min_growth = Fixed18::ONE.add(min_per_second)?.powi(dt_secs)?;
            deposit_growth = deposit_growth.max(min_growth);
        }

        self.state.cumulative_borrows_multiplier = self
            .state
            .cumulative_borrows_multiplier
            .mul(borrow_growth)?;
        self.state.cumulative_deposits_multiplier = self
            .state
            .cumulative_deposits_multiplier
            .mul(deposit_growth)?;

        let protocol_fee_paid = deposits_real_before.mul(fee_factor)?;
        if protocol_fee_paid.is_positive() {
            self.update_balance(fee_account, protocol_fee_paid)?;
        }

        Ok(InterestAccrual {
            utilization,
            annual_borrow_rate: annual_rate,
            borrow_growth,
            deposit_growth,
            protocol_fee_paid,
        })
    }

    /// Last-resort loss socialization: zero a negative balance by scaling the
    /// deposit multiplier down, so every depositor of this product absorbs
    /// the shortfall pro-rata. Only called when insurance is exhausted.
    /// Returns the socialized real amount.
    pub fn socialize(&mut self, account: Subaccount) -> Result<Fixed18, EngineError> {
        let normalized = self.balance_normalized(&account);
        if !normalized.is_negative() {
            return Ok(Fixed18::ZERO);
        }
        let shortfall = normalized
            .mul(self.state.cumulative_borrows_multiplier)?
            .abs();

        // clear the bad row first so totals reflect survivors only
        self.remove_from_totals(normalized)?;
        self.balances.insert(account, Fixed18::ZERO);

        let deposits_real = self.state.total_deposits_real()?;
        if deposits_real <= shortfall || self.state.total_deposits_normalized.is_zero() {
            // nothing left to spread across; deposits go to (near) zero
            self.state.cumulative_deposits_multiplier = Fixed18::from_raw(1);
            return Ok(shortfall);
        }

        self.state.cumulative_deposits_multiplier = deposits_real
            .sub(shortfall)?
            .div(self.state.total_deposits_normalized)?;
        Ok(shortfall)
    }

    // solvency check: real deposits cover real borrows
    pub fn is_solvent(&self) -> Result<bool, EngineError> {
        Ok(self.state.total_deposits_real()? >= self.state.total_borrows_real()?)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Subaccount, &Fixed18)> {
        self.balances.iter()
    }
}
