//! Risk weights for collateral valuation.
//!
//! Each product carries four static weight coefficients: long/short crossed
//! with initial/maintenance. Long weights discount collateral value (<= 1),
//! short weights inflate liabilities (>= 1). Initial weights are the wider
//! pair: opening new risk is held to a stricter bar than keeping it.
//!
//! A weight of exactly 2.0 is a sentinel marking the product untradeable as
//! collateral. Callers must not apply it numerically: an account holding any
//! exposure to such a product is maximally unhealthy.

use crate::fixed::Fixed18;
use crate::types::HealthType;
use serde::{Deserialize, Serialize};

// the untradeable sentinel. never a real weight.
pub const UNTRADEABLE_WEIGHT: Fixed18 = Fixed18::TWO;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCurve {
    pub long_weight_initial: Fixed18,
    pub long_weight_maintenance: Fixed18,
    pub short_weight_initial: Fixed18,
    pub short_weight_maintenance: Fixed18,
}

impl RiskCurve {
    // riskless product (the quote asset): all weights 1
    pub fn riskless() -> Self {
        Self {
            long_weight_initial: Fixed18::ONE,
            long_weight_maintenance: Fixed18::ONE,
            short_weight_initial: Fixed18::ONE,
            short_weight_maintenance: Fixed18::ONE,
        }
    }

    // long weights as fractions of 1e18, short weights mirrored around 1.
    // e.g. symmetric(0.9e18, 0.95e18) => shorts at 1.1 / 1.05.
    pub fn symmetric(long_initial: Fixed18, long_maintenance: Fixed18) -> Self {
        let mirror = |w: Fixed18| Fixed18::from_raw(2 * Fixed18::ONE.raw() - w.raw());
        Self {
            long_weight_initial: long_initial,
            long_weight_maintenance: long_maintenance,
            short_weight_initial: mirror(long_initial),
            short_weight_maintenance: mirror(long_maintenance),
        }
    }

    // every weight pinned to the sentinel: delisted / not usable as collateral
    pub fn untradeable() -> Self {
        Self {
            long_weight_initial: UNTRADEABLE_WEIGHT,
            long_weight_maintenance: UNTRADEABLE_WEIGHT,
            short_weight_initial: UNTRADEABLE_WEIGHT,
            short_weight_maintenance: UNTRADEABLE_WEIGHT,
        }
    }

    /// Select the weight for a signed position size. Zero sizes count as
    /// long: the weight multiplies zero anyway. `Pnl` is always unweighted.
    pub fn weight(&self, amount: Fixed18, health_type: HealthType) -> Fixed18 {
        match health_type {
            HealthType::Pnl => Fixed18::ONE,
            HealthType::Initial => {
                if amount.is_negative() {
                    self.short_weight_initial
                } else {
                    self.long_weight_initial
                }
            }
            HealthType::Maintenance => {
                if amount.is_negative() {
                    self.short_weight_maintenance
                } else {
                    self.long_weight_maintenance
                }
            }
        }
    }

    pub fn is_untradeable(weight: Fixed18) -> bool {
        weight == UNTRADEABLE_WEIGHT
    }

    // sanity bounds: long <= 1 <= short, maintenance no wider than initial
    pub fn validate(&self) -> bool {
        self.long_weight_initial <= self.long_weight_maintenance
            && self.long_weight_maintenance <= Fixed18::ONE
            && Fixed18::ONE <= self.short_weight_maintenance
            && self.short_weight_maintenance <= self.short_weight_initial
    }
}
