//! The command surface (§6): one variant per dispatcher entry point, plus
//! the polymorphic result type `dispatch_command` returns.

use crate::domain::{AccountId, Asset, OrderId, OrderbookId, OrdersBounds, ProductTypeId, Timestamp};
use crate::orderbook::{FillReport, NewOrder};
use crate::product::ProductRuntime;
use rust_decimal::Decimal;
use std::sync::Arc;

/// `OrderbookConfig` without an id — the dispatcher allocates one on
/// `createOrderbook` (§6).
#[derive(Debug, Clone)]
pub struct NewOrderbookConfig {
    pub product_type_id: ProductTypeId,
    pub timeframe: Timestamp,
    pub price_step: Decimal,
    pub place_orders_bounds: OrdersBounds,
    pub update_orders_bounds: OrdersBounds,
    pub cancel_orders_bounds: OrdersBounds,
    pub symbol: String,
}

/// The dispatcher's single mutation surface (§6 command table).
pub enum Command {
    RegisterProduct {
        product_type_id: ProductTypeId,
        runtime: Arc<dyn ProductRuntime>,
    },
    CreateOrderbook(NewOrderbookConfig),
    WhitelistMaker {
        orderbook_id: OrderbookId,
        maker_id: AccountId,
    },
    RevokeMaker {
        maker_id: AccountId,
    },
    PlaceOrder {
        account_id: AccountId,
        orderbook_id: OrderbookId,
        product_type_id: ProductTypeId,
        order: NewOrder,
    },
    FillOrder {
        account_id: AccountId,
        orderbook_id: OrderbookId,
        product_type_id: ProductTypeId,
        order_id: OrderId,
        size: Decimal,
    },
    CreditAccount {
        account_id: AccountId,
        asset: Asset,
        amount: Decimal,
        metadata: Option<serde_json::Value>,
    },
    DebitAccount {
        account_id: AccountId,
        asset: Asset,
        amount: Decimal,
        metadata: Option<serde_json::Value>,
    },
}

/// `dispatch_command`'s polymorphic success value — one variant per command
/// result shape in §6.
#[derive(Debug)]
pub enum CommandOutcome {
    Unit,
    OrderbookId(OrderbookId),
    OrderId(OrderId),
    FillReport(FillReport),
}
