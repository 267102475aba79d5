//! The shipped "range payout" product (§4.2): hit when the observed price
//! falls in `[startRange, endRange)`; pays `multiplier * size` from maker to
//! taker on hit, after locking `size` units of collateral from the taker.

use super::{PositionUpdate, ProductRuntime};
use crate::domain::{AccountId, Asset, Timestamp};
use crate::ledger::{BalanceChange, BalanceChanges};
use crate::orderbook::{Order, Position};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Opaque `Order.data` payload for this product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangePayoutOrderData {
    pub start_range: Decimal,
    pub end_range: Decimal,
    pub multiplier: Decimal,
    pub asset: String,
}

impl RangePayoutOrderData {
    fn from_order(order: &Order) -> Self {
        serde_json::from_value(order.data.clone())
            .expect("range payout order data must deserialize to RangePayoutOrderData")
    }
}

#[derive(Debug, Default)]
pub struct RangePayoutProduct;

impl RangePayoutProduct {
    pub fn new() -> Self {
        Self
    }
}

impl ProductRuntime for RangePayoutProduct {
    fn compare_orders(&self, a: &Order, b: &Order) -> Ordering {
        a.time_placed.cmp(&b.time_placed)
    }

    fn order_price(&self, order: &Order) -> Decimal {
        RangePayoutOrderData::from_order(order).start_range
    }

    fn update_position(
        &self,
        order: &Order,
        existing: Option<&Position>,
        size: Decimal,
        now: Timestamp,
        _price: Decimal,
        account_id: &AccountId,
    ) -> PositionUpdate {
        let data = RangePayoutOrderData::from_order(order);
        let asset = Asset::new(&data.asset);

        let cumulative_size = existing.map(|p| p.size).unwrap_or(Decimal::ZERO) + size;
        let cumulative_collateral =
            existing.map(|p| p.collateral_locked).unwrap_or(Decimal::ZERO) + size;
        let time_created = existing.map(|p| p.time_created).unwrap_or(now);

        let position = Position {
            id: crate::domain::PositionId::for_taker_order(account_id, &order.id),
            order_id: order.id.clone(),
            taker_id: account_id.clone(),
            size: cumulative_size,
            collateral_locked: cumulative_collateral,
            collateral_asset: asset.clone(),
            time_created,
            data: serde_json::Value::Null,
        };

        PositionUpdate {
            position,
            locks: vec![BalanceChange::new(account_id.clone(), asset, size)],
        }
    }

    fn verify_hit(&self, order: &Order, _position: &Position, price: Decimal, _now: Timestamp) -> bool {
        let data = RangePayoutOrderData::from_order(order);
        price >= data.start_range && price < data.end_range
    }

    fn payout(&self, order: &Order, position: &Position, _price_at_hit: Decimal) -> BalanceChanges {
        let data = RangePayoutOrderData::from_order(order);
        let asset = Asset::new(&data.asset);
        let total = data.multiplier * position.size;

        BalanceChanges {
            credits: vec![BalanceChange::new(position.taker_id.clone(), asset.clone(), total)],
            debits: vec![BalanceChange::new(order.maker_id.clone(), asset, total)],
            locks: Vec::new(),
            unlocks: vec![BalanceChange::new(
                position.taker_id.clone(),
                position.collateral_asset.clone(),
                position.collateral_locked,
            )],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OrderId, TimeWindow};
    use rust_decimal_macros::dec;

    fn sample_order(start_range: Decimal, end_range: Decimal, multiplier: Decimal) -> Order {
        Order {
            id: OrderId::from("order-1"),
            maker_id: AccountId::from("maker"),
            data: serde_json::json!({
                "start_range": start_range,
                "end_range": end_range,
                "multiplier": multiplier,
                "asset": "USD",
            }),
            size_total: dec!(10),
            size_remaining: dec!(10),
            time_placed: 0,
            trigger_window: TimeWindow::new(0, 1000),
            pending_positions: Vec::new(),
        }
    }

    #[test]
    fn hit_predicate_is_half_open() {
        let product = RangePayoutProduct::new();
        let order = sample_order(dec!(110), dec!(130), dec!(10));
        let position = Position {
            id: crate::domain::PositionId::for_taker_order(&AccountId::from("taker"), &order.id),
            order_id: order.id.clone(),
            taker_id: AccountId::from("taker"),
            size: dec!(2),
            collateral_locked: dec!(2),
            collateral_asset: Asset::from("USD"),
            time_created: 0,
            data: serde_json::Value::Null,
        };

        assert!(product.verify_hit(&order, &position, dec!(110), 500));
        assert!(product.verify_hit(&order, &position, dec!(129.99), 500));
        assert!(!product.verify_hit(&order, &position, dec!(130), 500));
        assert!(!product.verify_hit(&order, &position, dec!(109.99), 500));
    }

    #[test]
    fn payout_pays_multiplier_times_size_and_unlocks_collateral() {
        let product = RangePayoutProduct::new();
        let order = sample_order(dec!(110), dec!(130), dec!(10));
        let position = Position {
            id: crate::domain::PositionId::for_taker_order(&AccountId::from("taker"), &order.id),
            order_id: order.id.clone(),
            taker_id: AccountId::from("taker"),
            size: dec!(2),
            collateral_locked: dec!(2),
            collateral_asset: Asset::from("USD"),
            time_created: 0,
            data: serde_json::Value::Null,
        };

        let changes = product.payout(&order, &position, dec!(115));
        assert_eq!(changes.credits[0].amount, dec!(20));
        assert_eq!(changes.debits[0].amount, dec!(20));
        assert_eq!(changes.unlocks[0].amount, dec!(2));
    }

    #[test]
    fn update_position_aggregates_cumulative_size_and_collateral() {
        let product = RangePayoutProduct::new();
        let order = sample_order(dec!(110), dec!(130), dec!(10));
        let taker = AccountId::from("taker");

        let first = product.update_position(&order, None, dec!(2), 100, dec!(100), &taker);
        let second =
            product.update_position(&order, Some(&first.position), dec!(1), 200, dec!(100), &taker);

        assert_eq!(second.position.size, dec!(3));
        assert_eq!(second.position.collateral_locked, dec!(3));
        assert_eq!(second.locks[0].amount, dec!(1));
    }
}
