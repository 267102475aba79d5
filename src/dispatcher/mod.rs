//! Clearing-house dispatcher (§4.5, component 5) and oracle intake (§4.5,
//! component 7). The single mutation surface: every state change in the
//! engine is reached through `dispatch_command` or
//! `handle_price_and_time_update`.

mod command;

pub use command::{Command, CommandOutcome, NewOrderbookConfig};

use crate::bus::{EventBus, EventName};
use crate::domain::{AccountId, Asset, OrderbookId, ProductTypeId, Timestamp};
use crate::error::{EngineError, LedgerRejection, PlacementError};
use crate::ledger::{BalanceChange, BalanceChanges, Ledger, LedgerEntry};
use crate::orderbook::EphemeralOrderbook;
use crate::product::ProductRegistry;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{info, instrument, warn};

/// Owns the ledger, the product registry, every orderbook, and the event
/// bus exclusively (§5 shared-resource policy). Command submitters pass by
/// value; the dispatcher never hands back a mutable reference into its own
/// state.
pub struct ClearingHouse {
    ledger: Ledger,
    registry: ProductRegistry,
    orderbooks: BTreeMap<OrderbookId, EphemeralOrderbook>,
    whitelists: HashMap<OrderbookId, HashSet<AccountId>>,
    revoked_makers: HashSet<AccountId>,
    symbol_price: HashMap<String, Decimal>,
    current_time: Timestamp,
    bus: EventBus,
}

impl ClearingHouse {
    pub fn new(config: &crate::config::EngineConfig) -> Self {
        Self {
            ledger: Ledger::new(),
            registry: ProductRegistry::new(),
            orderbooks: BTreeMap::new(),
            whitelists: HashMap::new(),
            revoked_makers: HashSet::new(),
            symbol_price: HashMap::new(),
            current_time: 0,
            bus: EventBus::new(config.event_broadcast_capacity),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn orderbook(&self, id: &OrderbookId) -> Option<&EphemeralOrderbook> {
        self.orderbooks.get(id)
    }

    pub fn subscribe(&self) -> crate::bus::EventStream {
        self.bus.subscribe()
    }

    pub fn clock_seq(&self) -> u64 {
        self.bus.clock_seq()
    }

    fn is_maker_authorized(&self, orderbook_id: &OrderbookId, maker_id: &AccountId) -> bool {
        !self.revoked_makers.contains(maker_id)
            && self
                .whitelists
                .get(orderbook_id)
                .map_or(false, |set| set.contains(maker_id))
    }

    /// Single mutation entry point (§4.5). Runs `dispatch_all()` on the
    /// event bus whether the command succeeded or failed, so synchronous
    /// subscribers observe any events published before a failure.
    #[instrument(skip(self, command))]
    pub fn dispatch_command(&mut self, command: Command) -> Result<CommandOutcome, EngineError> {
        let result = self.dispatch_inner(command);
        self.bus.dispatch_all();
        result
    }

    fn dispatch_inner(&mut self, command: Command) -> Result<CommandOutcome, EngineError> {
        match command {
            Command::RegisterProduct {
                product_type_id,
                runtime,
            } => {
                self.registry.register(product_type_id, runtime);
                Ok(CommandOutcome::Unit)
            }

            Command::CreateOrderbook(new_config) => {
                if !self.registry.is_registered(&new_config.product_type_id) {
                    return Err(PlacementError::ProductNotRegistered(new_config.product_type_id).into());
                }
                let id = OrderbookId::new();
                let last_price = self
                    .symbol_price
                    .get(&new_config.symbol)
                    .copied()
                    .unwrap_or(Decimal::ZERO);
                let config = crate::orderbook::OrderbookConfig {
                    id: id.clone(),
                    product_type_id: new_config.product_type_id,
                    timeframe: new_config.timeframe,
                    price_step: new_config.price_step,
                    place_orders_bounds: new_config.place_orders_bounds,
                    update_orders_bounds: new_config.update_orders_bounds,
                    cancel_orders_bounds: new_config.cancel_orders_bounds,
                    symbol: new_config.symbol,
                };
                let orderbook = EphemeralOrderbook::new(config, self.current_time, last_price);
                self.orderbooks.insert(id.clone(), orderbook);
                info!(orderbook_id = %id, "orderbook created");
                Ok(CommandOutcome::OrderbookId(id))
            }

            Command::WhitelistMaker {
                orderbook_id,
                maker_id,
            } => {
                self.whitelists
                    .entry(orderbook_id)
                    .or_default()
                    .insert(maker_id);
                Ok(CommandOutcome::Unit)
            }

            Command::RevokeMaker { maker_id } => {
                self.revoked_makers.insert(maker_id);
                Ok(CommandOutcome::Unit)
            }

            Command::PlaceOrder {
                account_id,
                orderbook_id,
                product_type_id,
                order,
            } => self.place_order(account_id, orderbook_id, product_type_id, order),

            Command::FillOrder {
                account_id,
                orderbook_id,
                product_type_id,
                order_id,
                size,
            } => self.fill_order(account_id, orderbook_id, product_type_id, order_id, size),

            Command::CreditAccount {
                account_id,
                asset,
                amount,
                metadata,
            } => {
                if amount <= Decimal::ZERO {
                    return Err(LedgerRejection::NonPositiveAmount(amount).into());
                }
                self.apply_account_change(account_id, asset, amount, true, metadata);
                Ok(CommandOutcome::Unit)
            }

            Command::DebitAccount {
                account_id,
                asset,
                amount,
                metadata,
            } => {
                if amount <= Decimal::ZERO {
                    return Err(LedgerRejection::NonPositiveAmount(amount).into());
                }
                let available = self.ledger.get_balance(&account_id, &asset);
                if available < amount {
                    return Err(LedgerRejection::InsufficientBalance {
                        available,
                        requested: amount,
                    }
                    .into());
                }
                self.apply_account_change(account_id, asset, amount, false, metadata);
                Ok(CommandOutcome::Unit)
            }
        }
    }

    fn apply_account_change(
        &mut self,
        account_id: AccountId,
        asset: Asset,
        amount: Decimal,
        is_credit: bool,
        metadata: Option<serde_json::Value>,
    ) {
        let change = BalanceChange::new(account_id, asset, amount);
        let mut changes = BalanceChanges::default();
        if is_credit {
            changes.credits.push(change);
        } else {
            changes.debits.push(change);
        }
        let touched = self.ledger.apply_changes(LedgerEntry {
            id: crate::domain::EventId::new(),
            ts: self.current_time,
            changes,
            metadata,
        });
        self.publish_balance_updates(None, touched);
    }

    fn publish_balance_updates(
        &mut self,
        orderbook_id: Option<OrderbookId>,
        touched: Vec<(AccountId, Asset)>,
    ) {
        for (account_id, asset) in touched {
            let balance = self.ledger.get_balance(&account_id, &asset);
            let locked = self.ledger.get_locked(&account_id, &asset);
            self.bus.publish(
                EventName::BalanceUpdated,
                orderbook_id.clone(),
                self.current_time,
                serde_json::json!({
                    "accountId": account_id,
                    "asset": asset,
                    "balance": balance,
                    "locked": locked,
                }),
            );
        }
    }

    fn try_place_order(
        &mut self,
        account_id: &AccountId,
        orderbook_id: &OrderbookId,
        product_type_id: &ProductTypeId,
        order: crate::orderbook::NewOrder,
    ) -> Result<crate::domain::OrderId, PlacementError> {
        if !self.orderbooks.contains_key(orderbook_id) {
            return Err(PlacementError::OrderbookNotFound(orderbook_id.clone()));
        }
        let product = self
            .registry
            .get(product_type_id)
            .ok_or_else(|| PlacementError::ProductNotRegistered(product_type_id.clone()))?
            .clone();
        if !self.is_maker_authorized(orderbook_id, account_id) {
            return Err(PlacementError::MakerNotAuthorized(account_id.clone()));
        }
        let orderbook = self.orderbooks.get_mut(orderbook_id).expect("checked above");
        if orderbook.config().price_step <= Decimal::ZERO {
            return Err(PlacementError::InvalidPriceStep);
        }
        orderbook.place_order(product.as_ref(), account_id.clone(), order)
    }

    fn place_order(
        &mut self,
        account_id: AccountId,
        orderbook_id: OrderbookId,
        product_type_id: ProductTypeId,
        order: crate::orderbook::NewOrder,
    ) -> Result<CommandOutcome, EngineError> {
        let outcome = self.try_place_order(&account_id, &orderbook_id, &product_type_id, order);

        match outcome {
            Ok(order_id) => {
                self.bus.publish(
                    EventName::OrderPlaced,
                    Some(orderbook_id),
                    self.current_time,
                    serde_json::json!({ "orderId": order_id.clone(), "makerId": account_id }),
                );
                Ok(CommandOutcome::OrderId(order_id))
            }
            Err(err) => {
                warn!(reason = err.reason(), "order placement rejected");
                let details = serde_json::to_value(&err).unwrap_or(serde_json::Value::Null);
                self.bus.publish(
                    EventName::OrderRejected,
                    Some(orderbook_id),
                    self.current_time,
                    serde_json::json!({
                        "violatedConstraint": { "reason": err.reason() },
                        "details": details,
                    }),
                );
                Err(err.into())
            }
        }
    }

    fn fill_order(
        &mut self,
        account_id: AccountId,
        orderbook_id: OrderbookId,
        product_type_id: ProductTypeId,
        order_id: crate::domain::OrderId,
        size: Decimal,
    ) -> Result<CommandOutcome, EngineError> {
        let product = self
            .registry
            .get(&product_type_id)
            .ok_or_else(|| PlacementError::ProductNotRegistered(product_type_id.clone()))?
            .clone();
        let orderbook = self
            .orderbooks
            .get_mut(&orderbook_id)
            .ok_or_else(|| crate::error::FillError::OrderbookNotFound(orderbook_id.clone()))?;

        let report = orderbook.fill_order(
            product.as_ref(),
            &mut self.ledger,
            &order_id,
            size,
            &account_id,
            self.current_time,
        )?;

        self.bus.publish(
            EventName::OrderFilled,
            Some(orderbook_id.clone()),
            self.current_time,
            serde_json::json!({ "trade": report.trade, "position": report.position }),
        );
        for balance in &report.balances {
            self.bus.publish(
                EventName::BalanceUpdated,
                Some(orderbook_id.clone()),
                self.current_time,
                serde_json::json!({
                    "accountId": balance.account_id,
                    "asset": balance.asset,
                    "balance": balance.balance,
                    "locked": balance.locked,
                }),
            );
        }

        Ok(CommandOutcome::FillReport(report))
    }

    /// Oracle intake (§4.5): not a command, never fails, always runs to
    /// completion. Advances every orderbook whose `symbol` matches and
    /// publishes `price_update`, `clock_tick`, then the Phase C/A reports
    /// in that fixed order (§5 ordering guarantees).
    #[instrument(skip(self))]
    pub fn handle_price_and_time_update(&mut self, symbol: &str, price: Decimal, time: Timestamp) {
        self.current_time = time;

        let matching: Vec<OrderbookId> = self
            .orderbooks
            .iter()
            .filter(|(_, book)| book.config().symbol == symbol)
            .map(|(id, _)| id.clone())
            .collect();

        for orderbook_id in matching {
            let product_type_id = self
                .orderbooks
                .get(&orderbook_id)
                .expect("matched above")
                .config()
                .product_type_id
                .clone();
            let product = match self.registry.get(&product_type_id) {
                Some(p) => p.clone(),
                None => continue,
            };
            let orderbook = self.orderbooks.get_mut(&orderbook_id).expect("matched above");
            let report =
                orderbook.advance_price_and_time(product.as_ref(), &mut self.ledger, price, time);

            self.bus.publish(
                EventName::PriceUpdate,
                Some(orderbook_id.clone()),
                time,
                serde_json::json!({ "symbol": symbol, "price": price }),
            );
            self.bus.publish(
                EventName::ClockTick,
                Some(orderbook_id.clone()),
                time,
                serde_json::json!({ "reason": "price_update" }),
            );
            for hit in &report.verification_hits {
                self.bus.publish(
                    EventName::VerificationHit,
                    Some(orderbook_id.clone()),
                    time,
                    serde_json::to_value(hit).expect("VerificationReport serializes"),
                );
            }
            for settlement in &report.settlements {
                self.bus.publish(
                    EventName::PayoutSettled,
                    Some(orderbook_id.clone()),
                    time,
                    serde_json::to_value(settlement).expect("SettlementReport serializes"),
                );
                self.publish_balance_updates(
                    Some(orderbook_id.clone()),
                    settlement
                        .balances
                        .iter()
                        .map(|b| (b.account_id.clone(), b.asset.clone()))
                        .collect(),
                );
            }
            for expiration in &report.expirations {
                self.bus.publish(
                    EventName::PayoutExpired,
                    Some(orderbook_id.clone()),
                    time,
                    serde_json::to_value(expiration).expect("ExpirationReport serializes"),
                );
            }
            for insolvency in &report.insolvencies {
                self.publish_balance_updates(
                    Some(orderbook_id.clone()),
                    insolvency
                        .balances
                        .iter()
                        .map(|b| (b.account_id.clone(), b.asset.clone()))
                        .collect(),
                );
            }
        }

        self.symbol_price.insert(symbol.to_string(), price);
        self.bus.dispatch_all();
    }
}
