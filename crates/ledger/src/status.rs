//! Order status derivation.

use serde::{Deserialize, Serialize};

/// Fulfillment completeness of an order.
///
/// The status is a cached field derived from the order's item quantities.
/// It is recomputed exclusively by the fulfillment engine on every shipment
/// commit; no other write path exists.
///
/// ```text
/// new ──► partial ──► completed
///  └──────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Nothing has shipped yet.
    #[default]
    New,

    /// Some, but not all, ordered units have shipped.
    Partial,

    /// Every ordered unit has shipped.
    Completed,
}

impl OrderStatus {
    /// Derives the status from quantity totals across all items of an order.
    pub fn derive(total_ordered: u64, total_shipped: u64) -> Self {
        if total_shipped == 0 {
            OrderStatus::New
        } else if total_shipped < total_ordered {
            OrderStatus::Partial
        } else {
            OrderStatus::Completed
        }
    }

    /// Returns the lowercase wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Partial => "partial",
            OrderStatus::Completed => "completed",
        }
    }

    /// Parses a lowercase wire name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(OrderStatus::New),
            "partial" => Some(OrderStatus::Partial),
            "completed" => Some(OrderStatus::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Number of orders per status, for the shipping-panel badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub new: u64,
    pub partial: u64,
    pub completed: u64,
}

impl StatusCounts {
    /// Total number of orders across all statuses.
    pub fn total(&self) -> u64 {
        self.new + self.partial + self.completed
    }
}
