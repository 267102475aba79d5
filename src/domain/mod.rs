//! Domain primitives: identifiers and time/price scalars shared by every
//! other module (component 1 in the system overview).

pub mod ids;
pub mod time;

pub use ids::{AccountId, Asset, EventId, OrderId, OrderbookId, PositionId, ProductTypeId};
pub use time::{Duration, OrdersBounds, TimeWindow, Timestamp};
