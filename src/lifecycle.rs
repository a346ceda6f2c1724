//! Order lifecycle: status buckets, handler actions and the transition table.
//!
//! ```text
//! Confirmed --pick up--> To Ship --deliver (proof)--> Delivered --(backend)--> Completed
//!                                \--cancel--------> Cancelled
//! ```
//!
//! Every transition is checked here before a request leaves the client.

use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::order::{Order, OrderStatus};

/// Status transitions a handler may request. Delivered -> Completed is
/// performed by the backend and is deliberately absent.
const ALLOWED_TRANSITIONS: &[(OrderStatus, OrderStatus)] = &[
    (OrderStatus::Confirmed, OrderStatus::ToShip),
    (OrderStatus::ToShip, OrderStatus::Delivered),
    (OrderStatus::ToShip, OrderStatus::Cancelled),
];

pub fn is_allowed(from: OrderStatus, to: OrderStatus) -> bool {
    ALLOWED_TRANSITIONS.contains(&(from, to))
}

/// Reject a transition that is not in the table.
pub fn check_transition(from: OrderStatus, to: OrderStatus) -> Result<()> {
    if is_allowed(from, to) {
        Ok(())
    } else {
        Err(Error::IllegalTransition { from, to })
    }
}

/// Filter tabs on the board. Each bucket shows exactly one status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Bucket {
    #[default]
    ToPickUp,
    ToShip,
    Delivered,
    Cancelled,
    Completed,
}

impl Bucket {
    /// Display order of the tabs.
    pub const ALL: [Bucket; 5] = [
        Self::ToPickUp,
        Self::ToShip,
        Self::Delivered,
        Self::Cancelled,
        Self::Completed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::ToPickUp => "To Pick Up",
            Self::ToShip => "To Ship",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
        }
    }

    pub fn status(self) -> OrderStatus {
        match self {
            Self::ToPickUp => OrderStatus::Confirmed,
            Self::ToShip => OrderStatus::ToShip,
            Self::Delivered => OrderStatus::Delivered,
            Self::Cancelled => OrderStatus::Cancelled,
            Self::Completed => OrderStatus::Completed,
        }
    }

    pub fn contains(self, order: &Order) -> bool {
        order.status == Some(self.status())
    }

    /// Actions offered on each order row while this bucket is active.
    pub fn actions(self) -> &'static [Action] {
        match self {
            Self::ToPickUp => &[Action::PickUp],
            Self::ToShip => &[Action::Deliver, Action::Cancel],
            Self::Delivered | Self::Cancelled | Self::Completed => &[],
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Bucket {
    type Err = String;

    /// Accepts the tab label in any case, with spaces, dashes or
    /// underscores ("To Pick Up", "to-pick-up", "TO_SHIP").
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '_'))
            .collect::<String>()
            .to_ascii_lowercase();
        match key.as_str() {
            "topickup" | "pickup" | "confirmed" => Ok(Self::ToPickUp),
            "toship" => Ok(Self::ToShip),
            "delivered" => Ok(Self::Delivered),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            "completed" => Ok(Self::Completed),
            _ => Err(format!(
                "unknown bucket '{s}' (expected one of: to-pick-up, to-ship, delivered, cancelled, completed)"
            )),
        }
    }
}

/// A handler action on a single order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    PickUp,
    Deliver,
    Cancel,
}

impl Action {
    pub fn label(self) -> &'static str {
        match self {
            Self::PickUp => "Pick Up",
            Self::Deliver => "Delivered",
            Self::Cancel => "Cancel",
        }
    }

    /// Status the order must hold before the action.
    pub fn source_status(self) -> OrderStatus {
        match self {
            Self::PickUp => OrderStatus::Confirmed,
            Self::Deliver | Self::Cancel => OrderStatus::ToShip,
        }
    }

    /// Status requested from the backend.
    pub fn target(self) -> OrderStatus {
        match self {
            Self::PickUp => OrderStatus::ToShip,
            Self::Deliver => OrderStatus::Delivered,
            Self::Cancel => OrderStatus::Cancelled,
        }
    }

    pub fn requires_proof(self) -> bool {
        matches!(self, Self::Deliver)
    }
}
