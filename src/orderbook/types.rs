//! Orderbook entities (§3): orders, positions, price buckets, time columns,
//! and the reports each mutating operation returns.

use crate::domain::{AccountId, Asset, OrderId, OrderbookId, PositionId, ProductTypeId, TimeWindow, Timestamp};
use crate::domain::OrdersBounds;
use crate::ledger::BalanceChange;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Immutable-after-creation orderbook configuration (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookConfig {
    pub id: OrderbookId,
    pub product_type_id: ProductTypeId,
    pub timeframe: Timestamp,
    pub price_step: Decimal,
    pub place_orders_bounds: OrdersBounds,
    pub update_orders_bounds: OrdersBounds,
    pub cancel_orders_bounds: OrdersBounds,
    pub symbol: String,
}

/// Caller-supplied order to place (§6 `placeOrder` command input). The
/// maker is the command's `accountId`, not part of this payload.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub data: serde_json::Value,
    pub size_total: Decimal,
    pub time_placed: Timestamp,
    pub trigger_window: TimeWindow,
}

/// An order resting in the orderbook (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub maker_id: AccountId,
    pub data: serde_json::Value,
    pub size_total: Decimal,
    pub size_remaining: Decimal,
    pub time_placed: Timestamp,
    pub trigger_window: TimeWindow,
    pub pending_positions: Vec<PositionId>,
}

/// A taker's stake against one order (§3). At most one active position per
/// (taker, order) pair — enforced by the deterministic id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub order_id: OrderId,
    pub taker_id: AccountId,
    pub size: Decimal,
    pub collateral_locked: Decimal,
    pub collateral_asset: Asset,
    pub time_created: Timestamp,
    pub data: serde_json::Value,
}

/// Orders at one price level, stored in priority order (§3).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceBucket {
    pub key: Decimal,
    pub order_ids: Vec<OrderId>,
}

impl PriceBucket {
    pub fn new(key: Decimal) -> Self {
        Self {
            key,
            order_ids: Vec::new(),
        }
    }
}

/// A set of price buckets sharing a trigger window start (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeColumn {
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub price_buckets: BTreeMap<Decimal, PriceBucket>,
}

impl TimeColumn {
    pub fn new(window_start: Timestamp, window_end: Timestamp) -> Self {
        Self {
            window_start,
            window_end,
            price_buckets: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------

/// A resolved trade resulting from a fill (§4.4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub order_id: OrderId,
    pub maker_id: AccountId,
    pub taker_id: AccountId,
    pub fill_size: Decimal,
    pub fill_price: Decimal,
    pub size_remaining: Decimal,
}

/// A single (account, asset) balance/lock snapshot after a ledger change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub asset: Asset,
    pub balance: Decimal,
    pub locked: Decimal,
}

/// Result of a successful `fillOrder` (§4.4.2 step 10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillReport {
    pub position: Position,
    pub trade: Trade,
    pub balances: Vec<BalanceSnapshot>,
    pub locks: Vec<BalanceChange>,
}

/// A position that hit its product's predicate this tick (§4.6
/// `verification_hit`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub order_id: OrderId,
    pub position_id: PositionId,
    pub maker_id: AccountId,
    pub taker_id: AccountId,
    pub price: Decimal,
}

/// A solvent settlement applied during Phase C (§4.4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReport {
    pub order_id: OrderId,
    pub position_id: PositionId,
    pub maker_id: AccountId,
    pub taker_id: AccountId,
    pub price: Decimal,
    pub total_credit: Decimal,
    pub balances: Vec<BalanceSnapshot>,
}

/// A position that expired with its containing column (§4.4.3 Phase A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpirationReport {
    pub order_id: OrderId,
    pub position_id: PositionId,
    pub maker_id: AccountId,
    pub taker_id: AccountId,
    pub size: Decimal,
}

/// A maker-insolvency unwind of an order, with the takers it refunded
/// (§4.4.3 Phase C.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsolvencyReport {
    pub order_id: OrderId,
    pub maker_id: AccountId,
    pub balances: Vec<BalanceSnapshot>,
}

/// Full result of `advancePriceAndTime` (§4.4.3): expirations from Phase A
/// precede any settlement/verification from Phase C.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvanceReport {
    pub expirations: Vec<ExpirationReport>,
    pub verification_hits: Vec<VerificationReport>,
    pub settlements: Vec<SettlementReport>,
    pub insolvencies: Vec<InsolvencyReport>,
}

/// How a `TradeRecord` was produced — a fill against an order, or a
/// later settlement against the position that fill created (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Fill,
    Settlement,
}

/// Capacity of `EphemeralOrderbook::recent_trades` (§3.1 supplement):
/// oldest entries are evicted once the ring is full.
pub const RECENT_TRADES_CAPACITY: usize = 512;

/// One entry in an orderbook's bounded recent-trade ring (§3.1 supplement,
/// grounded in the teacher's `HistoryManager` / `TradeExecution`). Pure
/// introspection: recording a trade never changes ledger or position
/// state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub order_id: OrderId,
    pub position_id: PositionId,
    pub maker_id: AccountId,
    pub taker_id: AccountId,
    pub price: Decimal,
    pub size: Decimal,
    pub kind: TradeKind,
    pub ts: Timestamp,
}

/// Read-only orderbook introspection snapshot (§3.1 supplement), mirroring
/// the teacher's `Orderbook::snapshot()`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub orderbook_id: OrderbookId,
    pub symbol: String,
    pub time: Timestamp,
    pub price: Decimal,
    pub column_count: usize,
    pub order_count: usize,
    pub position_count: usize,
}
