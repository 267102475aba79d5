//! Error taxonomy (§7).
//!
//! One `thiserror` enum per subsystem, mirroring `MatchingError` /
//! `SettlementError` / `OracleError` in the teacher: each rejection kind the
//! spec names becomes a variant carrying whatever detail the caller needs to
//! build an `order_rejected` event payload. `EngineError` is the dispatcher
//! boundary type, composing the subsystem errors the way the teacher's
//! service errors `#[from]`-compose `sqlx::Error`.

use crate::domain::{AccountId, OrderId, OrderbookId, ProductTypeId};
use rust_decimal::Decimal;
use serde::Serialize;

/// Placement rejection kinds (§7).
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "reason", content = "details")]
pub enum PlacementError {
    #[error("orderbook not found: {0}")]
    OrderbookNotFound(OrderbookId),

    #[error("product not registered: {0}")]
    ProductNotRegistered(ProductTypeId),

    #[error("maker not authorized: {0}")]
    MakerNotAuthorized(AccountId),

    #[error("invalid price step")]
    InvalidPriceStep,

    #[error("duplicate order id: {0}")]
    DuplicateOrderId(OrderId),

    #[error("missing order id")]
    MissingOrderId,

    #[error("trigger window start too early: window_start={window_start} now={now} time_buffer={time_buffer}")]
    StartTooEarly {
        window_start: i64,
        now: i64,
        time_buffer: i64,
    },

    #[error("trigger window start too late: window_start={window_start} now={now} time_limit={time_limit}")]
    StartTooLate {
        window_start: i64,
        now: i64,
        time_limit: i64,
    },

    #[error("order price {order_price} above bound {bound} (reference price {reference_price})")]
    PriceAboveBound {
        order_price: Decimal,
        reference_price: Decimal,
        bound: Decimal,
    },

    #[error("order price {order_price} below bound {bound} (reference price {reference_price})")]
    PriceBelowBound {
        order_price: Decimal,
        reference_price: Decimal,
        bound: Decimal,
    },

    #[error("trigger window misaligned: duration={duration} timeframe={timeframe}")]
    TimeWindowMisaligned { duration: i64, timeframe: i64 },

    #[error("trigger window nonpositive: start={start} end={end}")]
    TimeWindowNonpositive { start: i64, end: i64 },
}

impl PlacementError {
    /// Stable machine-readable tag, used as the `order_rejected` event's
    /// `violatedConstraint.reason` (spec §8 scenario 1).
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OrderbookNotFound(_) => "orderbook_not_found",
            Self::ProductNotRegistered(_) => "product_not_registered",
            Self::MakerNotAuthorized(_) => "maker_not_authorized",
            Self::InvalidPriceStep => "invalid_price_step",
            Self::DuplicateOrderId(_) => "duplicate_order_id",
            Self::MissingOrderId => "missing_order_id",
            Self::StartTooEarly { .. } | Self::StartTooLate { .. } => "time_bound_violation",
            Self::PriceAboveBound { .. } | Self::PriceBelowBound { .. } => "price_bound_violation",
            Self::TimeWindowMisaligned { .. } => "time_window_misaligned",
            Self::TimeWindowNonpositive { .. } => "time_window_nonpositive",
        }
    }
}

/// Fill rejection kinds (§7).
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "reason", content = "details")]
pub enum FillError {
    #[error("orderbook not found: {0}")]
    OrderbookNotFound(OrderbookId),

    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("order is cancel-only: {0}")]
    OrderCancelOnly(OrderId),

    #[error("non-positive fill size: {0}")]
    NonPositiveFillSize(Decimal),

    #[error("no remaining size on order: {0}")]
    NoRemainingSize(OrderId),
}

impl FillError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::OrderbookNotFound(_) => "orderbook_not_found",
            Self::OrderNotFound(_) => "order_not_found",
            Self::OrderCancelOnly(_) => "order_cancel_only",
            Self::NonPositiveFillSize(_) => "non_positive_fill_size",
            Self::NoRemainingSize(_) => "no_remaining_size",
        }
    }
}

/// Ledger rejection kinds enforced at the dispatcher layer (§7).
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[serde(tag = "reason", content = "details")]
pub enum LedgerRejection {
    #[error("non-positive amount: {0}")]
    NonPositiveAmount(Decimal),

    #[error("insufficient balance: have {available}, need {requested}")]
    InsufficientBalance {
        available: Decimal,
        requested: Decimal,
    },
}

impl LedgerRejection {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NonPositiveAmount(_) => "non_positive_amount",
            Self::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}

/// Dispatcher-wide error, composing every subsystem's rejections.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Placement(#[from] PlacementError),

    #[error(transparent)]
    Fill(#[from] FillError),

    #[error(transparent)]
    Ledger(#[from] LedgerRejection),
}

impl EngineError {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Placement(e) => e.reason(),
            Self::Fill(e) => e.reason(),
            Self::Ledger(e) => e.reason(),
        }
    }
}
