//! `EphemeralOrderbook` (§4.4): the time-column × price-bucket index and its
//! three mutating operations.

use super::types::{
    AdvanceReport, BalanceSnapshot, ExpirationReport, FillReport, InsolvencyReport, NewOrder,
    Order, OrderbookConfig, OrderbookSnapshot, PriceBucket, SettlementReport, TimeColumn, Trade,
    TradeKind, TradeRecord, VerificationReport, RECENT_TRADES_CAPACITY,
};
use crate::domain::{Asset, EventId, OrderId, OrdersBounds, PositionId, Timestamp};
use crate::error::{FillError, PlacementError};
use crate::ledger::{BalanceChange, Ledger, LedgerEntry};
use crate::product::ProductRuntime;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, instrument, trace};

/// Floor-divide `price` into its bucket key (§4.4.1 step 5).
fn bucket_key(price: Decimal, step: Decimal) -> Decimal {
    (price / step).floor() * step
}

fn check_bounds(
    bounds: &OrdersBounds,
    now: Timestamp,
    current_price: Decimal,
    order_price: Decimal,
    window_start: Timestamp,
) -> Result<(), PlacementError> {
    if window_start < now + bounds.time_buffer {
        return Err(PlacementError::StartTooEarly {
            window_start,
            now,
            time_buffer: bounds.time_buffer,
        });
    }
    if bounds.time_limit > 0 && window_start > now + bounds.time_limit {
        return Err(PlacementError::StartTooLate {
            window_start,
            now,
            time_limit: bounds.time_limit,
        });
    }
    let upper = current_price + bounds.price_plus_bound;
    if order_price > upper {
        return Err(PlacementError::PriceAboveBound {
            order_price,
            reference_price: current_price,
            bound: bounds.price_plus_bound,
        });
    }
    let lower = current_price - bounds.price_minus_bound;
    if order_price < lower {
        return Err(PlacementError::PriceBelowBound {
            order_price,
            reference_price: current_price,
            bound: bounds.price_minus_bound,
        });
    }
    Ok(())
}

/// The ephemeral orderbook (§3, §4.4). Owns its columns, orders, and
/// positions exclusively; the dispatcher lends it a `&mut Ledger` for the
/// duration of each call rather than the orderbook holding a reference of
/// its own (§9 ownership note).
#[derive(Debug)]
pub struct EphemeralOrderbook {
    config: OrderbookConfig,
    time: Timestamp,
    price: Decimal,
    columns: std::collections::BTreeMap<Timestamp, TimeColumn>,
    orders: HashMap<OrderId, Order>,
    positions: HashMap<PositionId, crate::orderbook::types::Position>,
    order_index: HashMap<OrderId, (Timestamp, Decimal)>,
    cancel_only: HashSet<OrderId>,
    recent_trades: VecDeque<TradeRecord>,
}

impl EphemeralOrderbook {
    pub fn new(config: OrderbookConfig, initial_time: Timestamp, initial_price: Decimal) -> Self {
        Self {
            config,
            time: initial_time,
            price: initial_price,
            columns: std::collections::BTreeMap::new(),
            orders: HashMap::new(),
            positions: HashMap::new(),
            order_index: HashMap::new(),
            cancel_only: HashSet::new(),
            recent_trades: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &OrderbookConfig {
        &self.config
    }

    pub fn time(&self) -> Timestamp {
        self.time
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn order(&self, id: &OrderId) -> Option<&Order> {
        self.orders.get(id)
    }

    pub fn position(&self, id: &PositionId) -> Option<&crate::orderbook::types::Position> {
        self.positions.get(id)
    }

    pub fn is_cancel_only(&self, id: &OrderId) -> bool {
        self.cancel_only.contains(id)
    }

    /// Most recent trades first, newest-to-oldest — the bounded ring
    /// kept per orderbook for introspection (§3.1 supplement).
    pub fn recent_trades(&self) -> impl Iterator<Item = &TradeRecord> {
        self.recent_trades.iter().rev()
    }

    fn record_trade(&mut self, record: TradeRecord) {
        if self.recent_trades.len() >= RECENT_TRADES_CAPACITY {
            self.recent_trades.pop_front();
        }
        self.recent_trades.push_back(record);
    }

    pub fn snapshot(&self) -> OrderbookSnapshot {
        OrderbookSnapshot {
            orderbook_id: self.config.id.clone(),
            symbol: self.config.symbol.clone(),
            time: self.time,
            price: self.price,
            column_count: self.columns.len(),
            order_count: self.orders.len(),
            position_count: self.positions.len(),
        }
    }

    // -----------------------------------------------------------------
    // Placement (§4.4.1)
    // -----------------------------------------------------------------

    #[instrument(skip(self, product, order), fields(orderbook = %self.config.id, order_id = %order.id))]
    pub fn place_order(
        &mut self,
        product: &dyn ProductRuntime,
        maker_id: crate::domain::AccountId,
        order: NewOrder,
    ) -> Result<OrderId, PlacementError> {
        if self.orders.contains_key(&order.id) {
            return Err(PlacementError::DuplicateOrderId(order.id));
        }

        let duration = order.trigger_window.end - order.trigger_window.start;
        if duration <= 0 || self.config.timeframe <= 0 {
            return Err(PlacementError::TimeWindowNonpositive {
                start: order.trigger_window.start,
                end: order.trigger_window.end,
            });
        }
        if duration % self.config.timeframe != 0 {
            return Err(PlacementError::TimeWindowMisaligned {
                duration,
                timeframe: self.config.timeframe,
            });
        }

        let resting = Order {
            id: order.id.clone(),
            maker_id,
            data: order.data,
            size_total: order.size_total,
            size_remaining: order.size_total,
            time_placed: order.time_placed,
            trigger_window: order.trigger_window,
            pending_positions: Vec::new(),
        };
        let order_price = product.order_price(&resting);

        check_bounds(
            &self.config.place_orders_bounds,
            self.time,
            self.price,
            order_price,
            resting.trigger_window.start,
        )?;

        let key = bucket_key(order_price, self.config.price_step);
        let window_start = resting.trigger_window.start;
        let window_end = resting.trigger_window.end;

        let column = self
            .columns
            .entry(window_start)
            .or_insert_with(|| TimeColumn::new(window_start, window_end));
        let bucket = column
            .price_buckets
            .entry(key)
            .or_insert_with(|| PriceBucket::new(key));

        insert_sorted(&mut bucket.order_ids, &self.orders, &resting, product);

        self.cancel_only.remove(&order.id);
        self.order_index
            .insert(order.id.clone(), (window_start, key));
        let id = order.id.clone();
        self.orders.insert(order.id, resting);

        debug!(order_id = %id, order_price = %order_price, bucket = %key, "order placed");
        Ok(id)
    }

    // -----------------------------------------------------------------
    // Fill (§4.4.2)
    // -----------------------------------------------------------------

    #[instrument(skip(self, product, ledger), fields(orderbook = %self.config.id))]
    pub fn fill_order(
        &mut self,
        product: &dyn ProductRuntime,
        ledger: &mut Ledger,
        order_id: &OrderId,
        size: Decimal,
        taker_account_id: &crate::domain::AccountId,
        now: Timestamp,
    ) -> Result<FillReport, FillError> {
        if size <= Decimal::ZERO {
            return Err(FillError::NonPositiveFillSize(size));
        }
        if self.cancel_only.contains(order_id) {
            return Err(FillError::OrderCancelOnly(order_id.clone()));
        }
        let order = self
            .orders
            .get(order_id)
            .ok_or_else(|| FillError::OrderNotFound(order_id.clone()))?;
        if order.size_remaining <= Decimal::ZERO {
            return Err(FillError::NoRemainingSize(order_id.clone()));
        }

        self.time = now;

        let effective_size = size.min(order.size_remaining);
        let position_id = PositionId::for_taker_order(taker_account_id, order_id);
        let existing = self.positions.get(&position_id);

        let update = product.update_position(
            order,
            existing,
            effective_size,
            now,
            self.price,
            taker_account_id,
        );

        let previous_size = existing.map(|p| p.size).unwrap_or(Decimal::ZERO);
        let filled_delta = (update.position.size - previous_size).max(Decimal::ZERO);

        let order = self.orders.get_mut(order_id).expect("checked above");
        order.size_remaining -= filled_delta;
        if !order.pending_positions.contains(&position_id) {
            order.pending_positions.push(position_id.clone());
        }
        let size_remaining = order.size_remaining;
        let maker_id = order.maker_id.clone();

        if size_remaining <= Decimal::ZERO {
            self.cancel_only.insert(order_id.clone());
        }

        self.positions.insert(position_id.clone(), update.position.clone());

        // Re-insert at the (possibly new) priority position.
        if let Some((window_start, key)) = self.order_index.get(order_id).copied() {
            if let Some(column) = self.columns.get_mut(&window_start) {
                if let Some(bucket) = column.price_buckets.get_mut(&key) {
                    bucket.order_ids.retain(|id| id != order_id);
                    let order_ref = self.orders.get(order_id).expect("checked above");
                    insert_sorted(&mut bucket.order_ids, &self.orders, order_ref, product);
                }
            }
        }

        let mut touched = Vec::new();
        if !update.locks.is_empty() {
            touched = ledger.apply_changes(LedgerEntry {
                id: EventId::new(),
                ts: now,
                changes: crate::ledger::BalanceChanges {
                    locks: update.locks.clone(),
                    ..Default::default()
                },
                metadata: None,
            });
        }
        let balances = touched
            .into_iter()
            .map(|(account_id, asset)| BalanceSnapshot {
                balance: ledger.get_balance(&account_id, &asset),
                locked: ledger.get_locked(&account_id, &asset),
                account_id,
                asset,
            })
            .collect();

        trace!(order_id = %order_id, filled_delta = %filled_delta, "fill applied");

        self.record_trade(TradeRecord {
            order_id: order_id.clone(),
            position_id: position_id.clone(),
            maker_id: maker_id.clone(),
            taker_id: taker_account_id.clone(),
            price: self.price,
            size: filled_delta,
            kind: TradeKind::Fill,
            ts: now,
        });

        Ok(FillReport {
            position: update.position,
            trade: Trade {
                order_id: order_id.clone(),
                maker_id,
                taker_id: taker_account_id.clone(),
                fill_size: filled_delta,
                fill_price: self.price,
                size_remaining,
            },
            balances,
            locks: update.locks,
        })
    }

    // -----------------------------------------------------------------
    // Price/time advancement (§4.4.3)
    // -----------------------------------------------------------------

    #[instrument(skip(self, product, ledger), fields(orderbook = %self.config.id))]
    pub fn advance_price_and_time(
        &mut self,
        product: &dyn ProductRuntime,
        ledger: &mut Ledger,
        new_price: Decimal,
        new_time: Timestamp,
    ) -> AdvanceReport {
        let mut report = AdvanceReport::default();

        // Phase A — expire past columns.
        while let Some(window_start) = self.columns.keys().next().copied() {
            let window_end = self.columns[&window_start].window_end;
            if new_time < window_end {
                break;
            }
            let column = self.columns.remove(&window_start).expect("just peeked");
            for bucket in column.price_buckets.values() {
                for order_id in &bucket.order_ids {
                    if let Some(order) = self.orders.remove(order_id) {
                        for position_id in &order.pending_positions {
                            if let Some(position) = self.positions.remove(position_id) {
                                report.expirations.push(ExpirationReport {
                                    order_id: order_id.clone(),
                                    position_id: position_id.clone(),
                                    maker_id: order.maker_id.clone(),
                                    taker_id: position.taker_id.clone(),
                                    size: position.size,
                                });
                            }
                        }
                    }
                    self.order_index.remove(order_id);
                    self.cancel_only.remove(order_id);
                }
            }
        }

        // Phase B — set state.
        self.time = new_time;
        self.price = new_price;

        // Phase C — evaluate the active column.
        let head_window_start = match self.columns.keys().next().copied() {
            Some(w) => w,
            None => return report,
        };
        let head_window_end = self.columns[&head_window_start].window_end;
        if new_time >= head_window_end {
            return report;
        }

        let key = bucket_key(new_price, self.config.price_step);
        let order_ids: Vec<OrderId> = match self.columns[&head_window_start].price_buckets.get(&key)
        {
            Some(bucket) => bucket.order_ids.clone(),
            None => return report,
        };

        for order_id in order_ids {
            let (maker_id, trigger_ok, pending_positions) = {
                let order = match self.orders.get(&order_id) {
                    Some(o) => o,
                    None => continue,
                };
                let trigger_ok =
                    order.trigger_window.start <= self.time && self.time < order.trigger_window.end;
                (order.maker_id.clone(), trigger_ok, order.pending_positions.clone())
            };
            if !trigger_ok {
                continue;
            }

            let order_snapshot = self.orders.get(&order_id).expect("checked above").clone();
            let mut candidates: Vec<(PositionId, crate::ledger::BalanceChanges)> = Vec::new();
            for position_id in &pending_positions {
                let position = match self.positions.get(position_id) {
                    Some(p) => p,
                    None => continue,
                };
                if product.verify_hit(&order_snapshot, position, self.price, self.time) {
                    let payout = product.payout(&order_snapshot, position, self.price);
                    candidates.push((position_id.clone(), payout));
                }
            }
            if candidates.is_empty() {
                continue;
            }

            let mut net_outflow: HashMap<Asset, Decimal> = HashMap::new();
            for (_, payout) in &candidates {
                for (asset, amount) in payout.net_outflow_for(&maker_id) {
                    *net_outflow.entry(asset).or_default() += amount;
                }
            }
            let insolvent = net_outflow
                .iter()
                .any(|(asset, outflow)| *outflow > ledger.get_balance(&maker_id, asset));

            if insolvent {
                let mut balances = Vec::new();
                for position_id in &pending_positions {
                    if let Some(position) = self.positions.remove(position_id) {
                        let touched = ledger.apply_changes(LedgerEntry {
                            id: EventId::new(),
                            ts: self.time,
                            changes: crate::ledger::BalanceChanges {
                                unlocks: vec![BalanceChange::new(
                                    position.taker_id.clone(),
                                    position.collateral_asset.clone(),
                                    position.collateral_locked,
                                )],
                                ..Default::default()
                            },
                            metadata: Some(serde_json::json!({"reason": "maker_insufficient_funds"})),
                        });
                        for (account_id, asset) in touched {
                            balances.push(BalanceSnapshot {
                                balance: ledger.get_balance(&account_id, &asset),
                                locked: ledger.get_locked(&account_id, &asset),
                                account_id,
                                asset,
                            });
                        }
                    }
                }
                self.remove_order_fully(&order_id);
                report.insolvencies.push(InsolvencyReport {
                    order_id: order_id.clone(),
                    maker_id: maker_id.clone(),
                    balances,
                });
                continue;
            }

            for (position_id, payout) in candidates {
                let position = match self.positions.get(&position_id) {
                    Some(p) => p.clone(),
                    None => continue,
                };
                report.verification_hits.push(VerificationReport {
                    order_id: order_id.clone(),
                    position_id: position_id.clone(),
                    maker_id: maker_id.clone(),
                    taker_id: position.taker_id.clone(),
                    price: self.price,
                });

                let total_credit: Decimal = payout.credits.iter().map(|c| c.amount).sum();
                let touched = ledger.apply_changes(LedgerEntry {
                    id: EventId::new(),
                    ts: self.time,
                    changes: payout,
                    metadata: None,
                });
                let balances = touched
                    .into_iter()
                    .map(|(account_id, asset)| BalanceSnapshot {
                        balance: ledger.get_balance(&account_id, &asset),
                        locked: ledger.get_locked(&account_id, &asset),
                        account_id,
                        asset,
                    })
                    .collect();

                self.record_trade(TradeRecord {
                    order_id: order_id.clone(),
                    position_id: position_id.clone(),
                    maker_id: maker_id.clone(),
                    taker_id: position.taker_id.clone(),
                    price: self.price,
                    size: position.size,
                    kind: TradeKind::Settlement,
                    ts: self.time,
                });

                report.settlements.push(SettlementReport {
                    order_id: order_id.clone(),
                    position_id: position_id.clone(),
                    maker_id: maker_id.clone(),
                    taker_id: position.taker_id.clone(),
                    price: self.price,
                    total_credit,
                    balances,
                });

                self.positions.remove(&position_id);
                if let Some(order) = self.orders.get_mut(&order_id) {
                    order.pending_positions.retain(|p| p != &position_id);
                }
            }

            let done = self
                .orders
                .get(&order_id)
                .map(|o| o.size_remaining <= Decimal::ZERO && o.pending_positions.is_empty())
                .unwrap_or(false);
            if done {
                self.remove_order_fully(&order_id);
            }
        }

        report
    }

    fn remove_order_fully(&mut self, order_id: &OrderId) {
        if let Some((window_start, key)) = self.order_index.remove(order_id) {
            if let Some(column) = self.columns.get_mut(&window_start) {
                if let Some(bucket) = column.price_buckets.get_mut(&key) {
                    bucket.order_ids.retain(|id| id != order_id);
                }
            }
        }
        self.orders.remove(order_id);
        self.cancel_only.remove(order_id);
    }
}

/// Stable binary insertion: new entries equal under the comparator are
/// placed after existing equal entries, preserving FIFO tie-break (§I-style
/// comparator stability property, §8).
fn insert_sorted(
    order_ids: &mut Vec<OrderId>,
    orders: &HashMap<OrderId, Order>,
    candidate: &Order,
    product: &dyn ProductRuntime,
) {
    let idx = order_ids.partition_point(|id| {
        let existing = &orders[id];
        product.compare_orders(existing, candidate) != Ordering::Greater
    });
    order_ids.insert(idx, candidate.id.clone());
}
