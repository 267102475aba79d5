//! Opaque string identifiers shared across the clearing core.
//!
//! Each id is a thin newtype over `String` rather than a raw `String` so the
//! type system catches an `OrderId` handed to a function expecting a
//! `PositionId`. Ids minted by the engine itself use `uuid::Uuid::new_v4`;
//! ids supplied by a caller (account ids, product type ids) are taken as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! opaque_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// Mint a fresh, globally-unique id.
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

opaque_id!(AccountId);
opaque_id!(OrderId);
opaque_id!(PositionId);
opaque_id!(OrderbookId);
opaque_id!(ProductTypeId);
opaque_id!(EventId);

impl PositionId {
    /// Deterministic id so repeated fills by the same (taker, order) pair
    /// aggregate into a single position (spec I6 / §4.4.2 step 4).
    pub fn for_taker_order(account_id: &AccountId, order_id: &OrderId) -> Self {
        Self(format!("pos_{}_{}", account_id.as_str(), order_id.as_str()))
    }
}

/// An asset/token tag for ledger balances (e.g. `"USD"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Asset(pub String);

impl Asset {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_position_id_is_stable() {
        let account = AccountId::from("0xtaker");
        let order = OrderId::from("order-1");

        let a = PositionId::for_taker_order(&account, &order);
        let b = PositionId::for_taker_order(&account, &order);

        assert_eq!(a, b);
        assert_eq!(a.as_str(), "pos_0xtaker_order-1");
    }

    #[test]
    fn ids_display_their_inner_string() {
        let id = OrderId::from("abc");
        assert_eq!(id.to_string(), "abc");
    }
}
