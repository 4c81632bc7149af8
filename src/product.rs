// 12.x product.rs: one listed product's runtime state.
//
// a ProductEngine composes the pieces a product needs: a spot or perp ledger
// (tagged union, per the balance-update contract both variants share), the
// LP pool, the risk curve and the last oracle price. the matching and
// liquidation engines are generic over the variant through these methods.

use crate::config::{ProductConfig, ProductKindTag};
use crate::engine::results::EngineError;
use crate::fixed::Fixed18;
use crate::ledger::SpotLedger;
use crate::lp::LpLedger;
use crate::perp::PerpLedger;
use crate::types::Subaccount;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProductLedger {
    Spot(SpotLedger),
    Perp(PerpLedger),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductEngine {
    pub config: ProductConfig,
    pub ledger: ProductLedger,
    pub lp: LpLedger,
    pub oracle_price: Fixed18,
    // trading fees parked here until a fee sweep moves them to insurance
    pub fee_accumulator: Fixed18,
}

impl ProductEngine {
    pub fn new(config: ProductConfig, oracle_price: Fixed18) -> Self {
        let ledger = match config.kind {
            ProductKindTag::Spot => ProductLedger::Spot(SpotLedger::new()),
            ProductKindTag::Perp => ProductLedger::Perp(PerpLedger::new()),
        };
        Self {
            config,
            ledger,
            lp: LpLedger::new(),
            oracle_price,
            fee_accumulator: Fixed18::ZERO,
        }
    }

    pub fn is_perp(&self) -> bool {
        matches!(self.ledger, ProductLedger::Perp(_))
    }

    pub fn as_spot(&self) -> Result<&SpotLedger, EngineError> {
        match &self.ledger {
            ProductLedger::Spot(spot) => Ok(spot),
            ProductLedger::Perp(_) => Err(EngineError::ProductKindMismatch {
                product: self.config.id,
            }),
        }
    }

    pub fn as_spot_mut(&mut self) -> Result<&mut SpotLedger, EngineError> {
        match &mut self.ledger {
            ProductLedger::Spot(spot) => Ok(spot),
            ProductLedger::Perp(_) => Err(EngineError::ProductKindMismatch {
                product: self.config.id,
            }),
        }
    }

    pub fn as_perp(&self) -> Result<&PerpLedger, EngineError> {
        match &self.ledger {
            ProductLedger::Perp(perp) => Ok(perp),
            ProductLedger::Spot(_) => Err(EngineError::ProductKindMismatch {
                product: self.config.id,
            }),
        }
    }

    pub fn as_perp_mut(&mut self) -> Result<&mut PerpLedger, EngineError> {
        match &mut self.ledger {
            ProductLedger::Perp(perp) => Ok(perp),
            ProductLedger::Spot(_) => Err(EngineError::ProductKindMismatch {
                product: self.config.id,
            }),
        }
    }

    /// Signed base exposure for one account, interest/funding adjusted.
    pub fn base_exposure(&self, account: &Subaccount) -> Result<Fixed18, EngineError> {
        match &self.ledger {
            ProductLedger::Spot(spot) => spot.balance_real(account),
            ProductLedger::Perp(perp) => Ok(perp.balance(account).amount),
        }
    }

    /// Quote-denominated carry for one account: zero for spot, v_quote plus
    /// unsettled funding for perp.
    pub fn quote_carry(&self, account: &Subaccount) -> Result<Fixed18, EngineError> {
        match &self.ledger {
            ProductLedger::Spot(_) => Ok(Fixed18::ZERO),
            ProductLedger::Perp(perp) => {
                let row = perp.balance(account);
                row.v_quote_balance
                    .add(perp.unsettled_funding(account)?)
                    .map_err(Into::into)
            }
        }
    }

    pub fn set_oracle_price(&mut self, price: Fixed18) -> Result<(), EngineError> {
        if !price.is_positive() {
            return Err(EngineError::InvalidPrice { price });
        }
        self.oracle_price = price;
        Ok(())
    }

    pub fn accrue_fee(&mut self, fee: Fixed18) -> Result<(), EngineError> {
        self.fee_accumulator = self.fee_accumulator.add(fee)?;
        Ok(())
    }

    /// Drain the fee accumulator (fee-sweep intent).
    pub fn sweep_fees(&mut self) -> Fixed18 {
        std::mem::replace(&mut self.fee_accumulator, Fixed18::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::RiskCurve;
    use crate::types::ProductId;

    fn spot_product() -> ProductEngine {
        ProductEngine::new(
            ProductConfig::spot(ProductId(1), RiskCurve::riskless()),
            Fixed18::from_int(100),
        )
    }

    fn perp_product() -> ProductEngine {
        ProductEngine::new(
            ProductConfig::perp(ProductId(2), RiskCurve::riskless()),
            Fixed18::from_int(100),
        )
    }

    #[test]
    fn kind_accessors() {
        let mut spot = spot_product();
        assert!(spot.as_spot().is_ok());
        assert!(spot.as_perp().is_err());
        assert!(spot.as_spot_mut().is_ok());
        assert!(!spot.is_perp());

        let perp = perp_product();
        assert!(perp.as_perp().is_ok());
        assert!(perp.as_spot().is_err());
    }

    #[test]
    fn oracle_price_must_be_positive() {
        let mut product = spot_product();
        assert!(product.set_oracle_price(Fixed18::ZERO).is_err());
        assert!(product.set_oracle_price(Fixed18::from_int(-5)).is_err());
        assert!(product.set_oracle_price(Fixed18::from_int(120)).is_ok());
        assert_eq!(product.oracle_price, Fixed18::from_int(120));
    }

    #[test]
    fn fee_sweep_drains_accumulator() {
        let mut product = spot_product();
        product.accrue_fee(Fixed18::from_int(3)).unwrap();
        product.accrue_fee(Fixed18::from_int(2)).unwrap();
        assert_eq!(product.sweep_fees(), Fixed18::from_int(5));
        assert_eq!(product.fee_accumulator, Fixed18::ZERO);
    }

    #[test]
    fn exposure_by_kind() {
        let mut spot = spot_product();
        let a = Subaccount::from_tag(1);
        spot.as_spot_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(7))
            .unwrap();
        assert_eq!(spot.base_exposure(&a).unwrap(), Fixed18::from_int(7));
        assert_eq!(spot.quote_carry(&a).unwrap(), Fixed18::ZERO);

        let mut perp = perp_product();
        perp.as_perp_mut()
            .unwrap()
            .update_balance(a, Fixed18::from_int(-2), Fixed18::from_int(200))
            .unwrap();
        assert_eq!(perp.base_exposure(&a).unwrap(), Fixed18::from_int(-2));
        assert_eq!(perp.quote_carry(&a).unwrap(), Fixed18::from_int(200));
    }
}
