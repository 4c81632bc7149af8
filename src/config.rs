// 7.0 config.rs: all settings in one place. product listings, fees, interest
// curves, liquidation penalties, spread pairs.

use crate::fixed::Fixed18;
use crate::ledger::InterestCurve;
use crate::risk::RiskCurve;
use crate::types::{ProductId, SpreadPair, Subaccount};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKindTag {
    Spot,
    Perp,
}

// per-product listing config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductConfig {
    pub id: ProductId,
    pub kind: ProductKindTag,
    pub risk: RiskCurve,
    // fills round down to a multiple of this
    pub size_increment: Fixed18,
    pub maker_fee_rate: Fixed18,
    pub taker_fee_rate: Fixed18,
    // flat fee charged once, on an order's first partial fill
    pub min_notional_fee: Fixed18,
    // LP spread; the pool's keep rate is 1 - spread
    pub lp_spread: Fixed18,
    // spot only
    pub interest: InterestCurve,
    pub min_deposit_rate: Option<Fixed18>,
}

impl ProductConfig {
    pub fn spot(id: ProductId, risk: RiskCurve) -> Self {
        Self {
            id,
            kind: ProductKindTag::Spot,
            risk,
            // 0.001 lot, 2bp taker, 30bp pool spread
            size_increment: Fixed18::from_raw(1_000_000_000_000_000),
            maker_fee_rate: Fixed18::ZERO,
            taker_fee_rate: Fixed18::from_raw(200_000_000_000_000),
            min_notional_fee: Fixed18::ZERO,
            lp_spread: Fixed18::from_raw(3_000_000_000_000_000),
            interest: InterestCurve::default(),
            min_deposit_rate: None,
        }
    }

    pub fn perp(id: ProductId, risk: RiskCurve) -> Self {
        Self {
            kind: ProductKindTag::Perp,
            ..Self::spot(id, risk)
        }
    }

    pub fn keep_rate(&self) -> Result<Fixed18, crate::fixed::MathError> {
        Fixed18::ONE.sub(self.lp_spread)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.size_increment.is_positive() {
            return Err(ConfigError::InvalidProduct {
                reason: "size increment must be positive".to_string(),
            });
        }
        if !self.risk.validate() {
            return Err(ConfigError::InvalidProduct {
                reason: "risk weights out of order".to_string(),
            });
        }
        if self.lp_spread.is_negative() || self.lp_spread >= Fixed18::ONE {
            return Err(ConfigError::InvalidProduct {
                reason: "lp spread must be in [0, 1)".to_string(),
            });
        }
        Ok(())
    }
}

// per-account maker/taker overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRates {
    pub maker: Fixed18,
    pub taker: Fixed18,
}

/** 7.2: liquidation penalty fractions. protocol-tuned constants carried as
config, not hard-coded. */
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationParams {
    // fraction of the maintenance-weight gap moved from oracle price
    pub spread_penalty: Fixed18,     // spread legs
    pub single_leg_penalty: Fixed18, // single-leg liquidations
    // skim on force-burned LP proceeds, into insurance
    pub lp_decomposition_fee: Fixed18,
    // fraction of the price/oracle gap charged to the liquidatee as an
    // insurance-replenishing fee
    pub insurance_fee_fraction: Fixed18,
}

impl Default for LiquidationParams {
    fn default() -> Self {
        Self {
            spread_penalty: Fixed18::from_raw(200_000_000_000_000_000), // 1/5
            single_leg_penalty: Fixed18::from_raw(40_000_000_000_000_000), // 1/25
            lp_decomposition_fee: Fixed18::from_raw(20_000_000_000_000_000), // 1/50
            insurance_fee_fraction: Fixed18::from_raw(250_000_000_000_000_000), // 1/4
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // the riskless settlement asset; every quote leg clears here
    pub quote_product: ProductId,
    pub spreads: Vec<SpreadPair>,
    // preferential weight discount for netted basis positions
    pub spread_discount: Fixed18,
    // protocol cut of accrued deposit interest
    pub interest_fee_fraction: Fixed18,
    pub liquidation: LiquidationParams,
    pub insurance_account: Subaccount,
    pub fee_account: Subaccount,
    pub fee_overrides: HashMap<Subaccount, FeeRates>,
    pub max_events: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quote_product: ProductId(0),
            spreads: Vec::new(),
            spread_discount: Fixed18::from_raw(200_000_000_000_000_000), // 1/5
            interest_fee_fraction: Fixed18::from_raw(200_000_000_000_000_000), // 20%
            liquidation: LiquidationParams::default(),
            insurance_account: Subaccount::from_tag(u64::MAX),
            fee_account: Subaccount::from_tag(u64::MAX - 1),
            fee_overrides: HashMap::new(),
            max_events: 100_000,
        }
    }
}

impl EngineConfig {
    pub fn fee_rates(&self, account: &Subaccount, product: &ProductConfig) -> FeeRates {
        self.fee_overrides
            .get(account)
            .copied()
            .unwrap_or(FeeRates {
                maker: product.maker_fee_rate,
                taker: product.taker_fee_rate,
            })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interest_fee_fraction.is_negative()
            || self.interest_fee_fraction >= Fixed18::ONE
        {
            return Err(ConfigError::InvalidEngine {
                reason: "interest fee fraction must be in [0, 1)".to_string(),
            });
        }
        if self.insurance_account == self.fee_account {
            return Err(ConfigError::InvalidEngine {
                reason: "insurance and fee accounts must differ".to_string(),
            });
        }
        for pair in &self.spreads {
            if pair.spot == pair.perp || pair.spot == self.quote_product {
                return Err(ConfigError::InvalidEngine {
                    reason: "malformed spread pair".to_string(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid product config: {reason}")]
    InvalidProduct { reason: String },
    #[error("invalid engine config: {reason}")]
    InvalidEngine { reason: String },
}
