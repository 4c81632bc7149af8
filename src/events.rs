// 11.x events.rs: the append-only engine event log.
//
// every state-changing intent that commits emits one or more events. the log
// is bounded (ring semantics): once max_events is reached the oldest entries
// fall off. downstream indexers consume these; the core never reads them back.

use crate::engine::results::LiquidationOutcome;
use crate::fixed::Fixed18;
use crate::types::{OrderDigest, ProductId, Subaccount, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub time: Timestamp,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Deposit {
        account: Subaccount,
        product: ProductId,
        amount: Fixed18,
    },
    Withdrawal {
        account: Subaccount,
        product: ProductId,
        amount: Fixed18,
    },
    Fill {
        product: ProductId,
        taker: Subaccount,
        // None when the pool is the counterparty
        maker: Option<Subaccount>,
        taker_digest: OrderDigest,
        base: Fixed18,
        quote: Fixed18,
        price: Fixed18,
        taker_fee: Fixed18,
        maker_fee: Fixed18,
    },
    LpMinted {
        product: ProductId,
        account: Subaccount,
        shares: Fixed18,
        base_in: Fixed18,
        quote_in: Fixed18,
    },
    LpBurned {
        product: ProductId,
        account: Subaccount,
        shares: Fixed18,
        base_out: Fixed18,
        quote_out: Fixed18,
    },
    Liquidation {
        liquidator: Subaccount,
        liquidatee: Subaccount,
        outcome: LiquidationOutcome,
    },
    InterestAccrued {
        product: ProductId,
        utilization: Fixed18,
        annual_borrow_rate: Fixed18,
        protocol_fee_paid: Fixed18,
    },
    FundingTick {
        product: ProductId,
        payment_per_unit: Fixed18,
    },
    PnlSettled {
        product: ProductId,
        account: Subaccount,
        amount: Fixed18,
    },
    PriceUpdated {
        product: ProductId,
        price: Fixed18,
    },
    FeesSwept {
        product: ProductId,
        amount: Fixed18,
    },
}

#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: VecDeque<Event>,
    next_id: u64,
    max_events: usize,
}

impl EventLog {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::new(),
            next_id: 0,
            max_events,
        }
    }

    pub fn record(&mut self, time: Timestamp, payload: EventPayload) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push_back(Event { id, time, payload });
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
        id
    }

    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.events.iter()
    }

    pub fn last(&self) -> Option<&Event> {
        self.events.back()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
