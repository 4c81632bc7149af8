// 1.1 types.rs: primitives. IDs, subaccounts, timestamps, health types.
// each is a newtype so the compiler catches type mixups.

use crate::fixed::Fixed18;
use serde::{Deserialize, Serialize};
use std::fmt;

// product = one listed market (spot or perp). product 0 is the quote asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub u32);

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "product:{}", self.0)
    }
}

// 1.2: opaque 32-byte subaccount identifier. created implicitly on first
// deposit, never deleted, only zeroed. isolation/parent links live in the
// account side table, never packed into these bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subaccount(pub [u8; 32]);

impl Subaccount {
    // test/demo helper: low 8 bytes from an integer tag
    pub fn from_tag(tag: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&tag.to_be_bytes());
        Self(bytes)
    }
}

impl fmt::Display for Subaccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0[..8] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, "..")
    }
}

// 1.3: order digest, computed and authenticated upstream by the dispatcher.
// the core only uses it as a fill-record key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderDigest(pub [u8; 32]);

impl OrderDigest {
    pub fn from_tag(tag: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&tag.to_be_bytes());
        Self(bytes)
    }
}

// 1.4: second-resolution timestamp. the sequencer supplies time; the core
// never reads a clock outside the demo binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp())
    }

    pub fn from_secs(secs: i64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> i64 {
        self.0
    }

    pub fn elapsed_secs(&self, later: Timestamp) -> i64 {
        later.0 - self.0
    }
}

// 1.5: two strictness levels of health plus unweighted pnl.
// initial gates opening new risk, maintenance gates liquidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HealthType {
    Initial,
    Maintenance,
    Pnl,
}

// a configured basis pair: opposite-signed exposure across these two
// products nets into a preferentially-weighted spread position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpreadPair {
    pub spot: ProductId,
    pub perp: ProductId,
}

// liquidation target: one leg or a configured spread pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationTarget {
    Spot(ProductId),
    Perp(ProductId),
    Spread(SpreadPair),
}

// signed base/quote delta pair, used wherever a trade touches both legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Delta {
    pub base: Fixed18,
    pub quote: Fixed18,
}
