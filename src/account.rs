// 10.x account.rs: subaccount registry and side table.
// parent/isolation links are explicit rows here, never packed into the
// 32-byte identifier. system accounts (insurance proxy, fee collector) are
// protected: they can never be liquidated.

use crate::types::{Subaccount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountRole {
    Trader,
    // pays out bad debt; exempt from the liquidator health post-condition
    InsuranceProxy,
    // accumulates swept trading fees and interest fees per product
    FeeCollector,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubaccountInfo {
    pub role: AccountRole,
    // isolated subaccounts carry their funding parent and a caller-chosen tag
    pub parent: Option<Subaccount>,
    pub isolation_tag: Option<u32>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountRegistry {
    accounts: HashMap<Subaccount, SubaccountInfo>,
}

impl AccountRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // implicit creation on first touch. idempotent.
    pub fn ensure(&mut self, subaccount: Subaccount, now: Timestamp) -> &SubaccountInfo {
        self.accounts.entry(subaccount).or_insert(SubaccountInfo {
            role: AccountRole::Trader,
            parent: None,
            isolation_tag: None,
            created_at: now,
        })
    }

    pub fn register_system(&mut self, subaccount: Subaccount, role: AccountRole, now: Timestamp) {
        self.accounts.insert(
            subaccount,
            SubaccountInfo {
                role,
                parent: None,
                isolation_tag: None,
                created_at: now,
            },
        );
    }

    pub fn register_isolated(
        &mut self,
        subaccount: Subaccount,
        parent: Subaccount,
        isolation_tag: u32,
        now: Timestamp,
    ) {
        self.accounts.insert(
            subaccount,
            SubaccountInfo {
                role: AccountRole::Trader,
                parent: Some(parent),
                isolation_tag: Some(isolation_tag),
                created_at: now,
            },
        );
    }

    pub fn get(&self, subaccount: &Subaccount) -> Option<&SubaccountInfo> {
        self.accounts.get(subaccount)
    }

    pub fn is_protected(&self, subaccount: &Subaccount) -> bool {
        matches!(
            self.accounts.get(subaccount).map(|info| info.role),
            Some(AccountRole::InsuranceProxy) | Some(AccountRole::FeeCollector)
        )
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
