// 4.x perp.rs: perpetual position balances and funding accrual.
//
// a perp row is {amount, v_quote_balance, last_cumulative_funding}. funding
// accrues once per tick into product-level cumulative trackers, split by
// side; rows settle lazily against the trackers on every touch. unsettled
// pnl lives in v_quote_balance until a settle-pnl intent moves it into the
// spot quote balance (bounded by the product's available_settle pot).

use crate::engine::results::EngineError;
use crate::fixed::Fixed18;
use crate::types::Subaccount;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerpBalance {
    pub amount: Fixed18,
    pub v_quote_balance: Fixed18,
    pub last_cumulative_funding: Fixed18,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PerpState {
    pub cumulative_funding_long: Fixed18,
    pub cumulative_funding_short: Fixed18,
    // quote collected from trades/funding that positive pnl can settle against
    pub available_settle: Fixed18,
    // sum of long amounts
    pub open_interest: Fixed18,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerpLedger {
    pub state: PerpState,
    balances: HashMap<Subaccount, PerpBalance>,
}

#[derive(Debug, Clone, Default)]
pub struct PnlSettlement {
    pub settled: Fixed18,
}

impl PerpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &Subaccount) -> PerpBalance {
        self.balances.get(account).copied().unwrap_or_default()
    }

    fn cumulative_funding_for(&self, amount: Fixed18) -> Fixed18 {
        if amount.is_negative() {
            self.state.cumulative_funding_short
        } else {
            self.state.cumulative_funding_long
        }
    }

    /// Funding owed since the row was last touched, without mutating.
    pub fn unsettled_funding(&self, account: &Subaccount) -> Result<Fixed18, EngineError> {
        let row = self.balance(account);
        let delta = self
            .cumulative_funding_for(row.amount)
            .sub(row.last_cumulative_funding)?;
        // positive cumulative funding means longs pay
        Ok(delta.mul(row.amount)?.neg()?)
    }

    /// Fold accrued funding into v_quote and stamp the tracker.
    pub fn settle_funding(&mut self, account: Subaccount) -> Result<PerpBalance, EngineError> {
        let mut row = self.balance(&account);
        let current = self.cumulative_funding_for(row.amount);
        let delta = current.sub(row.last_cumulative_funding)?;
        if !delta.is_zero() {
            row.v_quote_balance = row.v_quote_balance.sub(delta.mul(row.amount)?)?;
        }
        row.last_cumulative_funding = current;
        self.balances.insert(account, row);
        Ok(row)
    }

    /// Apply a (base, v_quote) delta. Funding settles first so the row never
    /// mixes funding epochs across a sign change.
    pub fn update_balance(
        &mut self,
        account: Subaccount,
        base_delta: Fixed18,
        v_quote_delta: Fixed18,
    ) -> Result<PerpBalance, EngineError> {
        let mut row = self.settle_funding(account)?;

        let old_amount = row.amount;
        row.amount = row.amount.add(base_delta)?;
        row.v_quote_balance = row.v_quote_balance.add(v_quote_delta)?;
        // crossing sides re-bases the funding epoch
        row.last_cumulative_funding = self.cumulative_funding_for(row.amount);

        if old_amount.is_positive() {
            self.state.open_interest = self.state.open_interest.sub(old_amount)?;
        }
        if row.amount.is_positive() {
            self.state.open_interest = self.state.open_interest.add(row.amount)?;
        }

        self.balances.insert(account, row);
        Ok(row)
    }

    /// One funding tick: `payment_per_unit` is the signed quote amount each
    /// long unit pays (negative means shorts pay). Applied once per tick to
    /// the cumulative trackers; rows catch up lazily.
    pub fn apply_funding_tick(&mut self, payment_per_unit: Fixed18) -> Result<(), EngineError> {
        self.state.cumulative_funding_long = self
            .state
            .cumulative_funding_long
            .add(payment_per_unit)?;
        self.state.cumulative_funding_short = self
            .state
            .cumulative_funding_short
            .add(payment_per_unit)?;
        Ok(())
    }

    pub fn add_available_settle(&mut self, amount: Fixed18) -> Result<(), EngineError> {
        self.state.available_settle = self.state.available_settle.add(amount)?;
        Ok(())
    }

    /// Move settled pnl out of v_quote. Negative pnl settles in full;
    /// positive pnl is capped by the product's available_settle pot. The
    /// caller credits the returned amount to the spot quote balance.
    pub fn settle_pnl(&mut self, account: Subaccount) -> Result<PnlSettlement, EngineError> {
        let mut row = self.settle_funding(account)?;

        let settled = if row.v_quote_balance.is_negative() {
            row.v_quote_balance
        } else {
            row.v_quote_balance.min(self.state.available_settle.max(Fixed18::ZERO))
        };

        row.v_quote_balance = row.v_quote_balance.sub(settled)?;
        self.state.available_settle = self.state.available_settle.sub(settled)?;
        self.balances.insert(account, row);
        Ok(PnlSettlement { settled })
    }

    /// Spread a positive loss across open interest: the long tracker rises
    /// and the short tracker falls by the same per-unit charge, so every
    /// open position pays pro-rata. Fallback when insurance is exhausted.
    pub fn socialize_loss(&mut self, amount: Fixed18) -> Result<Fixed18, EngineError> {
        if !amount.is_positive() || self.state.open_interest.is_zero() {
            return Ok(Fixed18::ZERO);
        }
        let per_unit = amount.div(self.state.open_interest.mul(Fixed18::TWO)?)?;
        self.state.cumulative_funding_long =
            self.state.cumulative_funding_long.add(per_unit)?;
        self.state.cumulative_funding_short =
            self.state.cumulative_funding_short.sub(per_unit)?;
        Ok(amount)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Subaccount, &PerpBalance)> {
        self.balances.iter()
    }

    // net position across all rows; zero when the book is balanced
    pub fn net_position(&self) -> Result<Fixed18, EngineError> {
        let mut net = Fixed18::ZERO;
        for row in self.balances.values() {
            net = net.add(row.amount)?;
        }
        Ok(net)
    }
}
