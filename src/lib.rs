//! PIX charges with webhook-driven VIP entitlements.
//!
//! A charge is created at Mercado Pago, stored locally as pending, and
//! reconciled when the provider reports its status. The first approval of a
//! charge extends the subscriber's VIP window.

pub mod bot;
pub mod charges;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod payments;
pub mod reconcile;
pub mod telegram;
pub mod util;
pub mod vip;
