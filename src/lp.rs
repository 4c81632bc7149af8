// 5.x lp.rs: liquidity-pool share accounting and constant-product swap math.
//
// shares are fungible pro-rata claims on pool reserves. minting prices the
// quote leg off the pool's current base:quote ratio (oracle price when the
// pool is empty); burning is a straight pro-rata withdrawal. the AMM counter
// leg of a market order is priced here too: clamp the trade at the
// equilibrium reserve implied by the limit price, then apply the LP spread
// asymmetrically through the keep rate.

use crate::engine::results::EngineError;
use crate::fixed::Fixed18;
use crate::types::{Delta, Subaccount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LpState {
    pub base: Fixed18,
    pub quote: Fixed18,
    pub supply: Fixed18,
    // per-share funding charge for perp pools, settled lazily per holder
    pub cumulative_funding_per_lp: Fixed18,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LpBalance {
    pub amount: Fixed18,
    pub last_cumulative_funding: Fixed18,
}

#[derive(Debug, Clone, Default)]
pub struct LpMint {
    pub shares: Fixed18,
    pub base_in: Fixed18,
    pub quote_in: Fixed18,
    // funding settled on touch; the caller debits it from spot quote
    pub funding_owed: Fixed18,
}

#[derive(Debug, Clone, Default)]
pub struct LpBurn {
    pub shares: Fixed18,
    pub base_out: Fixed18,
    pub quote_out: Fixed18,
    pub funding_owed: Fixed18,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LpLedger {
    pub state: LpState,
    balances: HashMap<Subaccount, LpBalance>,
}

impl LpLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn balance(&self, account: &Subaccount) -> LpBalance {
        self.balances.get(account).copied().unwrap_or_default()
    }

    pub fn has_liquidity(&self) -> bool {
        self.state.base.is_positive() && self.state.quote.is_positive()
    }

    /// Pool mid price, quote per base. None when the pool is empty.
    pub fn pool_price(&self) -> Result<Option<Fixed18>, EngineError> {
        if !self.has_liquidity() {
            return Ok(None);
        }
        Ok(Some(self.state.quote.div(self.state.base)?))
    }

    /// Mint shares for `base_in` plus the ratio-implied quote amount.
    /// The caller debits both legs from the minter on success.
    pub fn mint(
        &mut self,
        account: Subaccount,
        base_in: Fixed18,
        quote_low: Fixed18,
        quote_high: Fixed18,
        oracle_price: Fixed18,
    ) -> Result<LpMint, EngineError> {
        if !base_in.is_positive() {
            return Err(EngineError::InvalidAmount { amount: base_in });
        }

        let quote_in = if self.has_liquidity() {
            base_in.mul(self.state.quote)?.div(self.state.base)?
        } else {
            base_in.mul(oracle_price)?
        };
        if quote_in < quote_low || quote_in > quote_high {
            return Err(EngineError::SlippageExceeded { required: quote_in });
        }

        let shares = if self.state.supply.is_zero() {
            base_in.add(quote_in)?
        } else {
            self.state.supply.mul(base_in)?.div(self.state.base)?
        };

        self.state.base = self.state.base.add(base_in)?;
        self.state.quote = self.state.quote.add(quote_in)?;
        self.state.supply = self.state.supply.add(shares)?;

        let funding_owed = self.settle_funding(account)?;
        let mut row = self.balance(&account);
        row.amount = row.amount.add(shares)?;
        self.balances.insert(account, row);

        Ok(LpMint {
            shares,
            base_in,
            quote_in,
            funding_owed,
        })
    }

    /// Burn shares pro-rata. `None` burns the whole holding.
    pub fn burn(
        &mut self,
        account: Subaccount,
        shares: Option<Fixed18>,
    ) -> Result<LpBurn, EngineError> {
        let funding_owed = self.settle_funding(account)?;
        let mut row = self.balance(&account);
        let shares = match shares {
            Some(s) => {
                if s > row.amount || s.is_negative() {
                    return Err(EngineError::InsufficientShares {
                        requested: s,
                        held: row.amount,
                    });
                }
                s
            }
            None => row.amount,
        };
        if shares.is_zero() {
            return Ok(LpBurn {
                funding_owed,
                ..LpBurn::default()
            });
        }

        let base_out = self.state.base.mul(shares)?.div(self.state.supply)?;
        let quote_out = self.state.quote.mul(shares)?.div(self.state.supply)?;

        self.state.base = self.state.base.sub(base_out)?;
        self.state.quote = self.state.quote.sub(quote_out)?;
        self.state.supply = self.state.supply.sub(shares)?;
        row.amount = row.amount.sub(shares)?;
        self.balances.insert(account, row);

        Ok(LpBurn {
            shares,
            base_out,
            quote_out,
            funding_owed,
        })
    }

    /// Apply a caller-validated reserve delta (the AMM leg of a match).
    /// Reserves must stay non-negative; pricing is the caller's proof.
    pub fn swap(&mut self, base_delta: Fixed18, quote_delta: Fixed18) -> Result<(), EngineError> {
        let new_base = self.state.base.add(base_delta)?;
        let new_quote = self.state.quote.add(quote_delta)?;
        if new_base.is_negative() || new_quote.is_negative() {
            return Err(EngineError::InvalidAmount { amount: base_delta });
        }
        self.state.base = new_base;
        self.state.quote = new_quote;
        Ok(())
    }

    /// Price the pool's counter-leg for a taker wanting `taker_amount` base
    /// (signed) under `limit_price`, with `keep_rate` = 1 - LP spread.
    ///
    /// The pool trades toward, never past, the equilibrium base reserve
    /// `sqrt(base*quote/limit)`. The spread lands asymmetrically: a base
    /// buyer pays the invariant quote scaled up by 1/keep_rate, a base
    /// seller receives it scaled down by keep_rate, so the pool's realized
    /// price always improves on the raw invariant price.
    ///
    /// Returns the taker's delta; the pool applies the negation.
    pub fn swap_quote(
        &self,
        taker_amount: Fixed18,
        limit_price: Fixed18,
        keep_rate: Fixed18,
        size_increment: Fixed18,
    ) -> Result<Delta, EngineError> {
        if !self.has_liquidity() || taker_amount.is_zero() {
            return Ok(Delta::default());
        }
        if !limit_price.is_positive() {
            return Err(EngineError::InvalidPrice { price: limit_price });
        }

        let base = self.state.base;
        let quote = self.state.quote;
        let k = base.mul(quote)?;
        let equilibrium_base = k.div(limit_price)?.sqrt()?;

        if taker_amount.is_positive() {
            // pool sells base until its price rises to the limit
            let max_out = base.sub(equilibrium_base)?.max(Fixed18::ZERO);
            let filled = taker_amount.min(max_out).round_down_to(size_increment)?;
            if !filled.is_positive() {
                return Ok(Delta::default());
            }
            let quote_invariant = k.div(base.sub(filled)?)?.sub(quote)?;
            let quote_paid = quote_invariant.div(keep_rate)?;
            Ok(Delta {
                base: filled,
                quote: quote_paid.neg()?,
            })
        } else {
            // pool buys base until its price falls to the limit
            let max_in = equilibrium_base.sub(base)?.max(Fixed18::ZERO);
            let filled = taker_amount.abs().min(max_in).round_down_to(size_increment)?;
            if !filled.is_positive() {
                return Ok(Delta::default());
            }
            let quote_invariant = quote.sub(k.div(base.add(filled)?)?)?;
            let quote_received = quote_invariant.mul(keep_rate)?;
            Ok(Delta {
                base: filled.neg()?,
                quote: quote_received,
            })
        }
    }

    /// Per-share funding tick for perp pools: the pool's base reserve pays
    /// `payment_per_unit`, charged to holders lazily.
    pub fn apply_funding_tick(&mut self, payment_per_unit: Fixed18) -> Result<(), EngineError> {
        if self.state.supply.is_zero() {
            return Ok(());
        }
        let per_share = payment_per_unit.mul(self.state.base)?.div(self.state.supply)?;
        self.state.cumulative_funding_per_lp =
            self.state.cumulative_funding_per_lp.add(per_share)?;
        Ok(())
    }

    /// Funding owed by one holder since last touch, without mutating.
    pub fn unsettled_funding(&self, account: &Subaccount) -> Result<Fixed18, EngineError> {
        let row = self.balance(account);
        let delta = self
            .state
            .cumulative_funding_per_lp
            .sub(row.last_cumulative_funding)?;
        Ok(delta.mul(row.amount)?)
    }

    /// Stamp the tracker and return the owed funding; the caller debits it
    /// from the holder's quote balance.
    pub fn settle_funding(&mut self, account: Subaccount) -> Result<Fixed18, EngineError> {
        let owed = self.unsettled_funding(&account)?;
        let mut row = self.balance(&account);
        row.last_cumulative_funding = self.state.cumulative_funding_per_lp;
        self.balances.insert(account, row);
        Ok(owed)
    }

    pub fn accounts(&self) -> impl Iterator<Item = (&Subaccount, &LpBalance)> {
        self.balances.iter()
    }
}
