//! Order records as the board sees them.
//!
//! The backend owns every order; the board only holds the copy from the
//! latest fetch. Display fields are plain strings with the same fallbacks
//! the handler app has always shown ("Unknown", "Not Assigned", "None").

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

use crate::error::{Error, Result};

/// Lifecycle status of an order. Serialized with the backend's spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    Confirmed,
    #[serde(rename = "To Ship", alias = "ToShip")]
    ToShip,
    Delivered,
    Cancelled,
    Completed,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        Self::Confirmed,
        Self::ToShip,
        Self::Delivered,
        Self::Cancelled,
        Self::Completed,
    ];

    /// Value stored in the backend's `status` attribute.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Confirmed => "Confirmed",
            Self::ToShip => "To Ship",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
            Self::Completed => "Completed",
        }
    }

    /// Parse a backend status. Accepts both "To Ship" and "ToShip".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Confirmed" => Some(Self::Confirmed),
            "To Ship" | "ToShip" => Some(Self::ToShip),
            "Delivered" => Some(Self::Delivered),
            "Cancelled" => Some(Self::Cancelled),
            "Completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One order from the latest fetch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: String,
    /// `None` when the backend sent a status this client does not know.
    /// Such orders never show up in a bucket.
    pub status: Option<OrderStatus>,
    pub payment_id: String,
    pub address: String,
    pub phone: String,
    pub username: String,
    /// Handler the order is assigned to, exactly as the backend sent it.
    pub delivery_assignment: Option<String>,
    pub total_order_amount: String,
    pub notes: String,
    pub delivery_proof: Option<String>,
}

impl Order {
    /// Short order number shown to handlers: the first 8 characters of the
    /// payment reference.
    pub fn order_number(&self) -> String {
        self.payment_id.chars().take(8).collect()
    }

    /// Exact match against the handler's username; no trimming or case
    /// folding.
    pub fn is_assigned_to(&self, handler: &str) -> bool {
        self.delivery_assignment.as_deref() == Some(handler)
    }

    /// Assignment as shown to handlers.
    pub fn delivery_personnel(&self) -> &str {
        match self.delivery_assignment.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => "Not Assigned",
        }
    }
}

/// Body of an order update. `delivery_proof` is only sent on delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderUpdate {
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_proof: Option<Value>,
}

impl OrderUpdate {
    pub fn status(status: OrderStatus) -> Self {
        Self {
            status,
            delivery_proof: None,
        }
    }

    pub fn with_proof(status: OrderStatus, asset_id: &str) -> Self {
        // Numeric asset ids go back out as numbers; the backend's relation
        // field rejects quoted ids.
        let proof = asset_id
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(asset_id.to_string()));
        Self {
            status,
            delivery_proof: Some(proof),
        }
    }

    /// Request envelope expected by the backend: `{"data": {...}}`.
    pub fn to_body(&self) -> Value {
        serde_json::json!({ "data": self })
    }
}

// ---------------------------------------------------------------------------
// Response mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OrderRecord {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    attributes: OrderAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAttributes {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_id: Option<Value>,
    #[serde(default)]
    address: Option<Value>,
    #[serde(default)]
    phone: Option<Value>,
    #[serde(default)]
    username: Option<Value>,
    #[serde(default, rename = "delivery_assignment")]
    delivery_assignment: Option<Value>,
    #[serde(default)]
    total_order_amount: Option<Value>,
    #[serde(default)]
    notes: Option<Value>,
    #[serde(default, rename = "delivery_proof")]
    delivery_proof: Option<Value>,
}

/// Render a scalar JSON value as text. Blank strings, nulls and
/// containers count as missing; other strings are kept verbatim.
pub(crate) fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => {
            if s.trim().is_empty() {
                None
            } else {
                Some(s.clone())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn text_or(v: Option<&Value>, fallback: &str) -> String {
    v.and_then(scalar_text)
        .unwrap_or_else(|| fallback.to_string())
}

/// The proof relation comes back either as a bare id or, when populated,
/// as `{ "data": { "id": .. } }`.
fn proof_id(v: &Value) -> Option<String> {
    scalar_text(v).or_else(|| v.pointer("/data/id").and_then(scalar_text))
}

impl OrderRecord {
    fn into_order(self) -> Option<Order> {
        let id = scalar_text(&self.id)?;
        let attrs = self.attributes;
        let status = match attrs.status.as_deref() {
            Some(raw) => {
                let parsed = OrderStatus::parse(raw);
                if parsed.is_none() {
                    warn!(order_id = %id, status = %raw, "order has unrecognised status");
                }
                parsed
            }
            None => None,
        };
        Some(Order {
            id,
            status,
            payment_id: text_or(attrs.payment_id.as_ref(), "Unknown"),
            address: text_or(attrs.address.as_ref(), "Unknown"),
            phone: text_or(attrs.phone.as_ref(), "Unknown"),
            username: text_or(attrs.username.as_ref(), "Unknown"),
            delivery_assignment: match attrs.delivery_assignment {
                Some(Value::String(raw)) => Some(raw),
                other => other.as_ref().and_then(scalar_text),
            },
            total_order_amount: text_or(attrs.total_order_amount.as_ref(), "Unknown"),
            notes: text_or(attrs.notes.as_ref(), "None"),
            delivery_proof: attrs.delivery_proof.as_ref().and_then(proof_id),
        })
    }
}

/// Map the backend's order collection (`{"data": [...]}`) into orders.
///
/// Records without a usable id are skipped with a warning; a body whose
/// `data` is not an array is an unexpected response.
pub fn parse_orders(body: &Value) -> Result<Vec<Order>> {
    let records = body.get("data").and_then(Value::as_array).ok_or_else(|| {
        Error::UnexpectedResponse("No orders found or unexpected response structure".into())
    })?;

    let mut orders = Vec::with_capacity(records.len());
    for raw in records {
        match serde_json::from_value::<OrderRecord>(raw.clone()) {
            Ok(record) => match record.into_order() {
                Some(order) => orders.push(order),
                None => warn!("skipping order record without an id"),
            },
            Err(e) => warn!(error = %e, "skipping malformed order record"),
        }
    }
    Ok(orders)
}
