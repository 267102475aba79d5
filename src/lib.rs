//! In-process clearing core for short-duration conditional payout
//! contracts: an ephemeral orderbook keyed by time column and price
//! bucket, a balance ledger, a pluggable product registry, and the
//! single-threaded dispatcher that ties them together behind one
//! `dispatch_command` surface.

pub mod bus;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod ledger;
pub mod orderbook;
pub mod product;

pub use bus::{EventBus, EventEnvelope, EventName, EventStream};
pub use config::EngineConfig;
pub use dispatcher::{ClearingHouse, Command, CommandOutcome, NewOrderbookConfig};
pub use error::{EngineError, FillError, LedgerRejection, PlacementError};
pub use ledger::Ledger;
pub use orderbook::{EphemeralOrderbook, NewOrder, OrderbookConfig};
pub use product::{ProductRegistry, ProductRuntime, RangePayoutProduct};
