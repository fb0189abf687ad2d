//! Per-user notifications
//!
//! Driven by polling and cache invalidation, independent of the real-time socket.

pub mod client;
pub mod store;

pub use client::NotificationClient;
pub use store::NotificationStore;
