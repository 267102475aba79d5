//! Product registry (§4.2, component 3).
//!
//! A product runtime is a tagged capability bundle rather than a class
//! hierarchy (§9 design note): `dyn ProductRuntime` trait objects, keyed by
//! `ProductTypeId`, carrying product-specific `OrderData`/`PositionData` as
//! opaque `serde_json::Value` payloads. This mirrors the teacher's
//! `FeeConfig`-style small capability structs while giving every registered
//! product its own comparator, pricing, position update, hit predicate, and
//! payout function.

pub mod range_payout;

use crate::domain::{AccountId, ProductTypeId, Timestamp};
use crate::ledger::{BalanceChange, BalanceChanges};
use crate::orderbook::{Order, Position};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

pub use range_payout::RangePayoutProduct;

/// Output of `ProductRuntime::update_position` (§4.2): the taker's
/// new/updated position plus the collateral locks to apply.
#[derive(Debug, Clone)]
pub struct PositionUpdate {
    pub position: Position,
    pub locks: Vec<BalanceChange>,
}

/// A product's pluggable contract semantics.
///
/// Implementations must be pure functions of their inputs: `update_position`
/// in particular must be idempotent for identical inputs (§4.2).
pub trait ProductRuntime: Send + Sync {
    /// Strict weak order over orders within a price bucket. Ties are broken
    /// by FIFO insertion order by the orderbook, not by this comparator.
    fn compare_orders(&self, a: &Order, b: &Order) -> Ordering;

    /// Single deterministic price used for bucket placement and bound
    /// checks.
    fn order_price(&self, order: &Order) -> Decimal;

    /// Pure function from (order, existing position, fill size, time,
    /// price, taker) to the updated position and the locks to apply.
    fn update_position(
        &self,
        order: &Order,
        existing: Option<&Position>,
        size: Decimal,
        now: Timestamp,
        price: Decimal,
        account_id: &AccountId,
    ) -> PositionUpdate;

    /// Hit predicate. Only called when `now` falls inside the order's
    /// trigger window.
    fn verify_hit(&self, order: &Order, position: &Position, price: Decimal, now: Timestamp) -> bool;

    /// Settlement changes for a hit position. Credits must balance debits
    /// per asset (ignoring unlocks).
    fn payout(&self, order: &Order, position: &Position, price_at_hit: Decimal) -> BalanceChanges;
}

/// Registry of product runtimes, keyed by `ProductTypeId` (§4.5
/// `registerProduct`).
#[derive(Default)]
pub struct ProductRegistry {
    runtimes: HashMap<ProductTypeId, Arc<dyn ProductRuntime>>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, product_type_id: ProductTypeId, runtime: Arc<dyn ProductRuntime>) {
        self.runtimes.insert(product_type_id, runtime);
    }

    pub fn get(&self, product_type_id: &ProductTypeId) -> Option<&Arc<dyn ProductRuntime>> {
        self.runtimes.get(product_type_id)
    }

    pub fn is_registered(&self, product_type_id: &ProductTypeId) -> bool {
        self.runtimes.contains_key(product_type_id)
    }
}
