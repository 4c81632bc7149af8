// 8.1 engine/intents.rs: the Clearinghouse, the single-writer intent surface.
//
// every public method is one intent: it clones the core state, runs the
// operation against the live state, and on any error restores the clone.
// events are appended only after the intent commits, so the log never
// records a rolled-back effect. the sequencer owns time: intents never read
// a clock.

use crate::config::{ConfigError, EngineConfig, ProductConfig};
use crate::engine::core::CoreState;
use crate::engine::results::{EngineError, LiquidationOutcome, MatchResult};
use crate::events::{EventLog, EventPayload};
use crate::fixed::Fixed18;
use crate::health::account_health;
use crate::liquidation;
use crate::lp::{LpBurn, LpMint};
use crate::matching::{self, Order};
use crate::types::{HealthType, LiquidationTarget, ProductId, Subaccount, Timestamp};

/// The wire-level intent set, for sequencers that drive the engine
/// generically. Library callers use the typed methods directly.
#[derive(Debug, Clone)]
pub enum Intent {
    Deposit {
        account: Subaccount,
        product: ProductId,
        amount: Fixed18,
    },
    Withdraw {
        account: Subaccount,
        product: ProductId,
        amount: Fixed18,
    },
    Match {
        taker: Order,
        maker: Order,
    },
    MatchAmm {
        taker: Order,
    },
    MintLp {
        account: Subaccount,
        product: ProductId,
        base_amount: Fixed18,
        quote_low: Fixed18,
        quote_high: Fixed18,
    },
    BurnLp {
        account: Subaccount,
        product: ProductId,
        shares: Option<Fixed18>,
    },
    Liquidate {
        liquidator: Subaccount,
        liquidatee: Subaccount,
        target: LiquidationTarget,
        amount: Fixed18,
    },
    SettlePnl {
        account: Subaccount,
        product: ProductId,
    },
    UpdatePrice {
        product: ProductId,
        price: Fixed18,
    },
    Tick {
        time: Timestamp,
        funding: Vec<(ProductId, Fixed18)>,
    },
    SweepFees,
}

#[derive(Debug)]
pub struct Clearinghouse {
    pub config: EngineConfig,
    pub state: CoreState,
    pub events: EventLog,
}

impl Clearinghouse {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let state = CoreState::with_system_accounts(&config);
        let events = EventLog::new(config.max_events);
        Ok(Self {
            config,
            state,
            events,
        })
    }

    pub fn list_product(
        &mut self,
        product: ProductConfig,
        oracle_price: Fixed18,
    ) -> Result<(), ConfigError> {
        product.validate()?;
        self.state.add_product(product, oracle_price);
        Ok(())
    }

    pub fn health(
        &self,
        account: &Subaccount,
        health_type: HealthType,
    ) -> Result<Fixed18, EngineError> {
        account_health(&self.state, &self.config, account, health_type)
    }

    // all-or-nothing execution: restore the pre-intent snapshot on error
    fn atomically<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let snapshot = self.state.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                log::debug!("intent rolled back: {err}");
                self.state = snapshot;
                Err(err)
            }
        }
    }

    fn record(&mut self, payload: EventPayload) {
        let time = self.state.time;
        self.events.record(time, payload);
    }

    /// Generic dispatch for sequencer-driven replay.
    pub fn execute(&mut self, intent: Intent) -> Result<(), EngineError> {
        match intent {
            Intent::Deposit {
                account,
                product,
                amount,
            } => self.deposit(account, product, amount).map(drop),
            Intent::Withdraw {
                account,
                product,
                amount,
            } => self.withdraw(account, product, amount).map(drop),
            Intent::Match { taker, maker } => self.match_orders(&taker, &maker).map(drop),
            Intent::MatchAmm { taker } => self.match_with_pool(&taker).map(drop),
            Intent::MintLp {
                account,
                product,
                base_amount,
                quote_low,
                quote_high,
            } => self
                .mint_lp(account, product, base_amount, quote_low, quote_high)
                .map(drop),
            Intent::BurnLp {
                account,
                product,
                shares,
            } => self.burn_lp(account, product, shares).map(drop),
            Intent::Liquidate {
                liquidator,
                liquidatee,
                target,
                amount,
            } => self
                .liquidate(liquidator, liquidatee, target, amount)
                .map(drop),
            Intent::SettlePnl { account, product } => {
                self.settle_pnl(account, product).map(drop)
            }
            Intent::UpdatePrice { product, price } => self.update_price(product, price),
            Intent::Tick { time, funding } => self.tick(time, &funding),
            Intent::SweepFees => self.sweep_fees(),
        }
    }

    /// Credit an externally-bridged amount into a spot balance. Creates the
    /// subaccount on first touch.
    pub fn deposit(
        &mut self,
        account: Subaccount,
        product: ProductId,
        amount: Fixed18,
    ) -> Result<Fixed18, EngineError> {
        let balance = self.atomically(|ch| {
            if !amount.is_positive() {
                return Err(EngineError::InvalidAmount { amount });
            }
            let now = ch.state.time;
            ch.state.accounts.ensure(account, now);
            ch.state
                .product_mut(product)?
                .as_spot_mut()?
                .update_balance(account, amount)
        })?;
        self.record(EventPayload::Deposit {
            account,
            product,
            amount,
        });
        Ok(balance)
    }

    /// Debit a spot balance for bridging out. The account must be
    /// initial-healthy afterwards; borrowing by over-withdrawing is allowed
    /// exactly as far as health permits.
    pub fn withdraw(
        &mut self,
        account: Subaccount,
        product: ProductId,
        amount: Fixed18,
    ) -> Result<Fixed18, EngineError> {
        let balance = self.atomically(|ch| {
            if !amount.is_positive() {
                return Err(EngineError::InvalidAmount { amount });
            }
            let balance = ch
                .state
                .product_mut(product)?
                .as_spot_mut()?
                .update_balance(account, amount.neg()?)?;
            let health = ch.health(&account, HealthType::Initial)?;
            if health.is_negative() {
                return Err(EngineError::SubaccountHealth { account, health });
            }
            Ok(balance)
        })?;
        self.record(EventPayload::Withdrawal {
            account,
            product,
            amount,
        });
        Ok(balance)
    }

    pub fn match_orders(
        &mut self,
        taker: &Order,
        maker: &Order,
    ) -> Result<MatchResult, EngineError> {
        let result =
            self.atomically(|ch| matching::match_orders(&mut ch.state, &ch.config, taker, maker))?;
        if result.is_fill() {
            self.record(EventPayload::Fill {
                product: result.product,
                taker: taker.subaccount,
                maker: Some(maker.subaccount),
                taker_digest: taker.digest,
                base: result.filled_base,
                quote: result.filled_quote,
                price: result.price,
                taker_fee: result.taker_fee,
                maker_fee: result.maker_fee,
            });
        }
        Ok(result)
    }

    pub fn match_with_pool(&mut self, taker: &Order) -> Result<MatchResult, EngineError> {
        let result =
            self.atomically(|ch| matching::match_with_pool(&mut ch.state, &ch.config, taker))?;
        if result.is_fill() {
            self.record(EventPayload::Fill {
                product: result.product,
                taker: taker.subaccount,
                maker: None,
                taker_digest: taker.digest,
                base: result.filled_base,
                quote: result.filled_quote,
                price: result.price,
                taker_fee: result.taker_fee,
                maker_fee: result.maker_fee,
            });
        }
        Ok(result)
    }

    /// Provide liquidity: the base leg and the ratio-implied quote leg move
    /// from the account's balances into the pool.
    pub fn mint_lp(
        &mut self,
        account: Subaccount,
        product: ProductId,
        base_amount: Fixed18,
        quote_low: Fixed18,
        quote_high: Fixed18,
    ) -> Result<LpMint, EngineError> {
        let mint = self.atomically(|ch| {
            let oracle = ch.state.product(product)?.oracle_price;
            let is_perp = ch.state.product(product)?.is_perp();
            let mint = ch.state.product_mut(product)?.lp.mint(
                account,
                base_amount,
                quote_low,
                quote_high,
                oracle,
            )?;

            if is_perp {
                ch.state.product_mut(product)?.as_perp_mut()?.update_balance(
                    account,
                    mint.base_in.neg()?,
                    mint.quote_in.neg()?,
                )?;
            } else {
                ch.state
                    .product_mut(product)?
                    .as_spot_mut()?
                    .update_balance(account, mint.base_in.neg()?)?;
                ch.state
                    .update_quote(&ch.config, account, mint.quote_in.neg()?)?;
            }
            if !mint.funding_owed.is_zero() {
                ch.state
                    .update_quote(&ch.config, account, mint.funding_owed.neg()?)?;
            }

            let health = ch.health(&account, HealthType::Initial)?;
            if health.is_negative() {
                return Err(EngineError::SubaccountHealth { account, health });
            }
            Ok(mint)
        })?;
        self.record(EventPayload::LpMinted {
            product,
            account,
            shares: mint.shares,
            base_in: mint.base_in,
            quote_in: mint.quote_in,
        });
        Ok(mint)
    }

    /// Redeem shares pro-rata back into balances. `None` burns everything.
    pub fn burn_lp(
        &mut self,
        account: Subaccount,
        product: ProductId,
        shares: Option<Fixed18>,
    ) -> Result<LpBurn, EngineError> {
        let burn = self.atomically(|ch| {
            let is_perp = ch.state.product(product)?.is_perp();
            let burn = ch.state.product_mut(product)?.lp.burn(account, shares)?;

            if is_perp {
                ch.state.product_mut(product)?.as_perp_mut()?.update_balance(
                    account,
                    burn.base_out,
                    burn.quote_out,
                )?;
            } else {
                ch.state
                    .product_mut(product)?
                    .as_spot_mut()?
                    .update_balance(account, burn.base_out)?;
                ch.state.update_quote(&ch.config, account, burn.quote_out)?;
            }
            if !burn.funding_owed.is_zero() {
                ch.state
                    .update_quote(&ch.config, account, burn.funding_owed.neg()?)?;
            }
            Ok(burn)
        })?;
        self.record(EventPayload::LpBurned {
            product,
            account,
            shares: burn.shares,
            base_out: burn.base_out,
            quote_out: burn.quote_out,
        });
        Ok(burn)
    }

    pub fn liquidate(
        &mut self,
        liquidator: Subaccount,
        liquidatee: Subaccount,
        target: LiquidationTarget,
        amount: Fixed18,
    ) -> Result<LiquidationOutcome, EngineError> {
        let outcome = self.atomically(|ch| {
            liquidation::liquidate(
                &mut ch.state,
                &ch.config,
                liquidator,
                liquidatee,
                target,
                amount,
            )
        })?;
        self.record(EventPayload::Liquidation {
            liquidator,
            liquidatee,
            outcome: outcome.clone(),
        });
        Ok(outcome)
    }

    /// Move settled perp pnl into the quote balance. Losses settle in full,
    /// winnings up to the product's settle pot.
    pub fn settle_pnl(
        &mut self,
        account: Subaccount,
        product: ProductId,
    ) -> Result<Fixed18, EngineError> {
        let settled = self.atomically(|ch| {
            let settlement = ch
                .state
                .product_mut(product)?
                .as_perp_mut()?
                .settle_pnl(account)?;
            ch.state
                .update_quote(&ch.config, account, settlement.settled)?;
            Ok(settlement.settled)
        })?;
        if !settled.is_zero() {
            self.record(EventPayload::PnlSettled {
                product,
                account,
                amount: settled,
            });
        }
        Ok(settled)
    }

    pub fn update_price(
        &mut self,
        product: ProductId,
        price: Fixed18,
    ) -> Result<(), EngineError> {
        self.atomically(|ch| ch.state.product_mut(product)?.set_oracle_price(price))?;
        self.record(EventPayload::PriceUpdated { product, price });
        Ok(())
    }

    /// Advance engine time: accrue interest on every spot product and apply
    /// the sequencer-computed funding payments to the perp products and
    /// their pools.
    pub fn tick(
        &mut self,
        time: Timestamp,
        funding: &[(ProductId, Fixed18)],
    ) -> Result<(), EngineError> {
        let mut pending = Vec::new();
        self.atomically(|ch| {
            let dt = ch.state.time.elapsed_secs(time);
            if dt <= 0 {
                return Err(EngineError::InvalidInterval {
                    dt_secs: dt.max(0) as u64,
                });
            }

            let fee_fraction = ch.config.interest_fee_fraction;
            let fee_account = ch.config.fee_account;
            for id in ch.state.product_ids() {
                let product = ch.state.product_mut(id)?;
                if product.is_perp() {
                    continue;
                }
                let curve = product.config.interest;
                let min_rate = product.config.min_deposit_rate;
                let accrual = product.as_spot_mut()?.accrue_interest(
                    dt as u64,
                    &curve,
                    fee_fraction,
                    min_rate,
                    fee_account,
                )?;
                pending.push(EventPayload::InterestAccrued {
                    product: id,
                    utilization: accrual.utilization,
                    annual_borrow_rate: accrual.annual_borrow_rate,
                    protocol_fee_paid: accrual.protocol_fee_paid,
                });
            }

            for (id, payment) in funding {
                let product = ch.state.product_mut(*id)?;
                product.as_perp_mut()?.apply_funding_tick(*payment)?;
                product.lp.apply_funding_tick(*payment)?;
                pending.push(EventPayload::FundingTick {
                    product: *id,
                    payment_per_unit: *payment,
                });
            }

            ch.state.time = time;
            Ok(())
        })?;
        for payload in pending {
            self.record(payload);
        }
        Ok(())
    }

    /// Move accumulated trading fees from every product into the insurance
    /// account's quote balance.
    pub fn sweep_fees(&mut self) -> Result<(), EngineError> {
        let mut pending = Vec::new();
        self.atomically(|ch| {
            for id in ch.state.product_ids() {
                let amount = ch.state.product_mut(id)?.sweep_fees();
                if amount.is_positive() {
                    ch.state
                        .update_quote(&ch.config, ch.config.insurance_account, amount)?;
                    pending.push(EventPayload::FeesSwept {
                        product: id,
                        amount,
                    });
                }
            }
            Ok(())
        })?;
        for payload in pending {
            self.record(payload);
        }
        Ok(())
    }
}
