//! Delivery Board
//!
//! Client for delivery handlers: log in against the order backend, see the
//! orders assigned to you grouped by lifecycle bucket, pick them up, cancel
//! them, or mark them delivered with a photo proof.
//!
//! The `delivery-board` binary is a thin CLI over [`board::OrderBoard`] and
//! [`auth`].

pub mod api;
pub mod auth;
pub mod board;
pub mod config;
pub mod db;
pub mod diagnostics;
pub mod error;
pub mod lifecycle;
pub mod media;
pub mod order;
pub mod render;
pub mod session;
pub mod storage;

pub use api::{Backend, HttpBackend, UserProfile};
pub use board::{CleanupReport, DeliveryOutcome, OrderBoard};
pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::{Action, Bucket};
pub use order::{Order, OrderStatus};
pub use session::SessionManager;
