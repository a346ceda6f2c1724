//! The handler's order board.
//!
//! Runs the fetch cycle (resolve the handler, fetch every order, keep the
//! ones assigned to the handler), answers bucket queries, and performs the
//! three handler transitions. Each transition is checked against the
//! lifecycle table before any request is sent, and a successful transition
//! is always followed by a full re-fetch; the local copy is never patched.
//!
//! Delivery uploads the proof first and only then updates the order. When
//! the update fails the uploaded asset is deleted again, and if that fails
//! too it is written to the local cleanup ledger.

use serde::Serialize;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::api::Backend;
use crate::db::{self, DbState, PendingCleanup};
use crate::error::{Error, Result};
use crate::lifecycle::{check_transition, Action, Bucket};
use crate::media::{MediaPicker, ProofImage};
use crate::order::{Order, OrderStatus, OrderUpdate};
use crate::session::SessionManager;

/// Result of a delivery attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeliveryOutcome {
    /// Order moved to Delivered with this proof asset.
    Delivered { asset_id: String },
    /// Handler cancelled the photo selection; nothing was sent.
    Cancelled,
}

/// Summary of a cleanup pass over the orphaned-asset ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub removed: usize,
    pub remaining: usize,
}

pub struct OrderBoard<B: Backend> {
    backend: B,
    sessions: SessionManager,
    ledger: DbState,
    /// Orders assigned to the handler, from the latest fetch.
    orders: Vec<Order>,
    username: Option<String>,
    active: Bucket,
}

impl<B: Backend> OrderBoard<B> {
    pub fn new(backend: B, sessions: SessionManager, ledger: DbState) -> Self {
        Self {
            backend,
            sessions,
            ledger,
            orders: Vec::new(),
            username: None,
            active: Bucket::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn sessions_mut(&mut self) -> &mut SessionManager {
        &mut self.sessions
    }

    pub fn ledger(&self) -> &DbState {
        &self.ledger
    }

    /// Handler identity from the latest fetch.
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn active_bucket(&self) -> Bucket {
        self.active
    }

    pub fn select_bucket(&mut self, bucket: Bucket) {
        self.active = bucket;
    }

    /// Every order assigned to the handler, regardless of bucket.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn order(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    /// Orders shown under `bucket`.
    pub fn visible(&self, bucket: Bucket) -> Vec<&Order> {
        self.orders.iter().filter(|o| bucket.contains(o)).collect()
    }

    /// Orders shown under the active bucket.
    pub fn active_orders(&self) -> Vec<&Order> {
        self.visible(self.active)
    }

    /// Order count per bucket, in tab order.
    pub fn counts(&self) -> Vec<(Bucket, usize)> {
        Bucket::ALL
            .iter()
            .map(|b| (*b, self.visible(*b).len()))
            .collect()
    }

    /// Logout: forget the session and the fetched orders.
    pub fn logout(&mut self) -> Result<()> {
        self.orders.clear();
        self.username = None;
        crate::auth::logout(&mut self.sessions)
    }

    fn token(&self) -> Result<Zeroizing<String>> {
        Ok(Zeroizing::new(self.sessions.require()?.token().to_string()))
    }

    /// Invalidate the session when the backend rejected the token.
    fn note_auth_failure(&mut self, err: &Error) {
        if let Error::Unauthorized(reason) = err {
            warn!(reason = %reason, "backend rejected the session token");
            self.sessions.invalidate();
            self.orders.clear();
            self.username = None;
        }
    }

    fn check_auth<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.note_auth_failure(e);
        }
        result
    }

    // -----------------------------------------------------------------------
    // Fetch cycle
    // -----------------------------------------------------------------------

    /// Resolve the handler, fetch all orders and keep the handler's own.
    ///
    /// Without a session this returns [`Error::NotLoggedIn`] and sends
    /// nothing.
    pub async fn refresh(&mut self) -> Result<&[Order]> {
        let token = self.token()?;

        let user = self.backend.current_user(&token).await;
        let user = self.check_auth(user).map_err(|e| e.during("fetching orders"))?;
        if let Some(session) = self.sessions.current_mut() {
            session.set_username(&user.username);
        }

        let all = self.backend.list_orders(&token).await;
        let all = self.check_auth(all).map_err(|e| e.during("fetching orders"))?;
        let total = all.len();

        self.orders = all
            .into_iter()
            .filter(|o| o.is_assigned_to(&user.username))
            .collect();
        info!(
            handler = %user.username,
            total,
            assigned = self.orders.len(),
            "orders refreshed"
        );
        self.username = Some(user.username);
        Ok(&self.orders)
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    /// Check that `action` is legal for the order as last fetched.
    fn guard(&self, order_id: &str, action: Action) -> Result<()> {
        let order = self
            .order(order_id)
            .ok_or_else(|| Error::OrderNotFound(order_id.to_string()))?;
        let from = order.status.ok_or_else(|| {
            Error::UnexpectedResponse(format!("Order {order_id} has no known status"))
        })?;
        check_transition(from, action.target())
    }

    /// Confirmed -> To Ship.
    pub async fn pick_up(&mut self, order_id: &str) -> Result<()> {
        self.status_transition(order_id, Action::PickUp).await
    }

    /// To Ship -> Cancelled.
    pub async fn cancel(&mut self, order_id: &str) -> Result<()> {
        self.status_transition(order_id, Action::Cancel).await
    }

    /// Run a transition that carries no payload besides the new status.
    async fn status_transition(&mut self, order_id: &str, action: Action) -> Result<()> {
        let token = self.token()?;
        self.guard(order_id, action)?;

        let update = OrderUpdate::status(action.target());
        let result = self.backend.update_order(&token, order_id, &update).await;
        self.check_auth(result)
            .map_err(|e| e.during("updating order status"))?;
        info!(order_id, status = %action.target(), "order status updated");

        self.refresh().await?;
        Ok(())
    }

    /// To Ship -> Delivered with a photo proof.
    ///
    /// Cancelling the picker sends nothing. The status update is only sent
    /// once the upload has returned an asset id.
    pub async fn deliver(
        &mut self,
        order_id: &str,
        picker: &dyn MediaPicker,
    ) -> Result<DeliveryOutcome> {
        let token = self.token()?;
        self.guard(order_id, Action::Deliver)?;

        let picked = match picker.pick_image().await? {
            Some(p) => p,
            None => {
                info!(order_id, "image upload canceled");
                return Ok(DeliveryOutcome::Cancelled);
            }
        };
        let image = ProofImage::from_picked(&picked)?;

        let uploaded = self.backend.upload(&token, &image).await;
        let uploaded = self
            .check_auth(uploaded)
            .map_err(|e| e.during("uploading image"))?;
        let asset_id = uploaded
            .first()
            .map(|f| f.id.clone())
            .ok_or_else(|| Error::UnexpectedResponse("Upload returned no files".into()))?;

        let update = OrderUpdate::with_proof(OrderStatus::Delivered, &asset_id);
        let result = self.backend.update_order(&token, order_id, &update).await;
        if let Err(e) = result {
            self.compensate_upload(&token, order_id, &asset_id, &e).await;
            self.note_auth_failure(&e);
            return Err(e.during("updating order status"));
        }
        info!(order_id, asset_id = %asset_id, "order delivered with proof");

        self.refresh().await?;
        Ok(DeliveryOutcome::Delivered { asset_id })
    }

    /// Delete an asset whose order update failed; ledger it if that fails.
    async fn compensate_upload(
        &self,
        token: &str,
        order_id: &str,
        asset_id: &str,
        cause: &Error,
    ) {
        match self.backend.delete_upload(token, asset_id).await {
            Ok(()) => info!(order_id, asset_id, "orphaned proof asset deleted"),
            Err(delete_err) => {
                let reason = format!("status update failed: {cause}; delete failed: {delete_err}");
                if let Err(e) = db::record_pending_cleanup(&self.ledger, asset_id, order_id, &reason)
                {
                    error!(asset_id, order_id, error = %e, "failed to record orphaned asset");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Orphaned asset cleanup
    // -----------------------------------------------------------------------

    pub fn pending_cleanup(&self) -> Result<Vec<PendingCleanup>> {
        db::list_pending_cleanup(&self.ledger)
    }

    /// Retry deletion of every orphaned asset in the ledger.
    ///
    /// An asset the backend no longer has (404) counts as removed. An
    /// authorization failure stops the pass and invalidates the session.
    pub async fn cleanup_pending(&mut self) -> Result<CleanupReport> {
        let token = self.token()?;
        let entries = db::list_pending_cleanup(&self.ledger)?;
        let mut report = CleanupReport::default();

        for entry in entries {
            match self.backend.delete_upload(&token, &entry.asset_id).await {
                Ok(()) | Err(Error::Backend { status: 404, .. }) => {
                    db::remove_pending_cleanup(&self.ledger, &entry.id)?;
                    report.removed += 1;
                }
                Err(e @ Error::Unauthorized(_)) => {
                    return self.check_auth(Err(e));
                }
                Err(e) => {
                    db::mark_cleanup_attempt(&self.ledger, &entry.id, &e.to_string())?;
                    report.remaining += 1;
                }
            }
        }
        info!(
            removed = report.removed,
            remaining = report.remaining,
            "orphaned asset cleanup finished"
        );
        Ok(report)
    }
}
