// 8.0 engine/core.rs: the whole-exchange state snapshot.
//
// CoreState is one plain value: every product engine, the account registry
// and the order fill records. it is Clone on purpose. an intent executes
// against the live state; if any step errors, the dispatcher restores the
// pre-intent clone, so a failed intent can never half-apply.
//
// single writer: the sequencer applies intents strictly one at a time.
// nothing in here locks.

use crate::account::{AccountRegistry, AccountRole};
use crate::config::{EngineConfig, ProductConfig};
use crate::engine::results::EngineError;
use crate::fixed::Fixed18;
use crate::product::ProductEngine;
use crate::types::{OrderDigest, ProductId, Subaccount, Timestamp};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
pub struct CoreState {
    products: BTreeMap<ProductId, ProductEngine>,
    pub accounts: AccountRegistry,
    // signed base filled so far, keyed by order digest. monotone per digest.
    fills: HashMap<OrderDigest, Fixed18>,
    pub time: Timestamp,
}

impl CoreState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh state with the config's system accounts registered.
    pub fn with_system_accounts(config: &EngineConfig) -> Self {
        let mut state = Self::new();
        state.accounts.register_system(
            config.insurance_account,
            AccountRole::InsuranceProxy,
            Timestamp::from_secs(0),
        );
        state.accounts.register_system(
            config.fee_account,
            AccountRole::FeeCollector,
            Timestamp::from_secs(0),
        );
        state
    }

    pub fn add_product(&mut self, config: ProductConfig, oracle_price: Fixed18) {
        let id = config.id;
        self.products.insert(id, ProductEngine::new(config, oracle_price));
    }

    pub fn product(&self, id: ProductId) -> Result<&ProductEngine, EngineError> {
        self.products.get(&id).ok_or(EngineError::ProductNotFound(id))
    }

    pub fn product_mut(&mut self, id: ProductId) -> Result<&mut ProductEngine, EngineError> {
        self.products
            .get_mut(&id)
            .ok_or(EngineError::ProductNotFound(id))
    }

    pub fn products(&self) -> impl Iterator<Item = (&ProductId, &ProductEngine)> {
        self.products.iter()
    }

    pub fn products_mut(&mut self) -> impl Iterator<Item = (&ProductId, &mut ProductEngine)> {
        self.products.iter_mut()
    }

    pub fn product_ids(&self) -> Vec<ProductId> {
        self.products.keys().copied().collect()
    }

    /// Signed base filled so far against one order digest.
    pub fn filled(&self, digest: &OrderDigest) -> Fixed18 {
        self.fills.get(digest).copied().unwrap_or(Fixed18::ZERO)
    }

    pub fn record_fill(
        &mut self,
        digest: OrderDigest,
        base_delta: Fixed18,
    ) -> Result<Fixed18, EngineError> {
        let total = self.filled(&digest).add(base_delta)?;
        self.fills.insert(digest, total);
        Ok(total)
    }

    /// Insurance fund balance: the insurance account's quote deposit.
    pub fn insurance_balance(&self, config: &EngineConfig) -> Result<Fixed18, EngineError> {
        self.product(config.quote_product)?
            .as_spot()?
            .balance_real(&config.insurance_account)
    }

    /// Quote-ledger credit/debit, the common settlement move.
    pub fn update_quote(
        &mut self,
        config: &EngineConfig,
        account: Subaccount,
        delta: Fixed18,
    ) -> Result<Fixed18, EngineError> {
        self.product_mut(config.quote_product)?
            .as_spot_mut()?
            .update_balance(account, delta)
    }
}
