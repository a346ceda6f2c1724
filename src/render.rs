//! Plain-text rendering of the order board for the terminal.

use std::fmt::Write;

use crate::board::CleanupReport;
use crate::db::PendingCleanup;
use crate::lifecycle::Bucket;
use crate::order::Order;

pub fn welcome(username: &str) -> String {
    format!("Welcome, {username}")
}

/// Tab strip with per-bucket counts; the active bucket is bracketed.
pub fn tabs(counts: &[(Bucket, usize)], active: Bucket) -> String {
    counts
        .iter()
        .map(|(bucket, n)| {
            if *bucket == active {
                format!("[{bucket} ({n})]")
            } else {
                format!("{bucket} ({n})")
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// One order card. Actions are listed for the bucket the order is shown in.
pub fn order_card(order: &Order, bucket: Bucket) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Order Number: {}", order.order_number());
    let _ = writeln!(out, "  Id: {}", order.id);
    let _ = writeln!(out, "  Total Amount: \u{20b1}{}", order.total_order_amount);
    let _ = writeln!(out, "  Name: {}", order.username);
    let _ = writeln!(out, "  Address: {}", order.address);
    let _ = writeln!(out, "  Notes: {}", order.notes);
    let _ = writeln!(out, "  Phone: {}", order.phone);
    let _ = writeln!(out, "  Delivery Personnel: {}", order.delivery_personnel());

    let actions = bucket.actions();
    if !actions.is_empty() {
        let labels: Vec<String> = actions
            .iter()
            .map(|a| {
                if a.requires_proof() {
                    format!("{} (photo proof)", a.label())
                } else {
                    a.label().to_string()
                }
            })
            .collect();
        let _ = writeln!(out, "  Actions: {}", labels.join(", "));
    }
    out
}

/// Every order of a bucket, or a placeholder line when it is empty.
pub fn order_list(orders: &[&Order], bucket: Bucket) -> String {
    if orders.is_empty() {
        return format!("No orders in {bucket}.\n");
    }
    orders
        .iter()
        .map(|o| order_card(o, bucket))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn pending_list(entries: &[PendingCleanup]) -> String {
    if entries.is_empty() {
        return "No orphaned proof assets.\n".to_string();
    }
    let mut out = String::new();
    for e in entries {
        let _ = writeln!(
            out,
            "asset {} (order {}) recorded {} attempts {}",
            e.asset_id, e.order_id, e.recorded_at, e.attempts
        );
        if let Some(err) = &e.last_error {
            let _ = writeln!(out, "  last error: {err}");
        }
    }
    out
}

pub fn cleanup_summary(report: &CleanupReport) -> String {
    format!(
        "Removed {} orphaned asset(s), {} still pending.",
        report.removed, report.remaining
    )
}
