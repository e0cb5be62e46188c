//! Delivery confirmation and read receipts.

pub mod receipts;
pub mod tracker;

pub use receipts::ReadReceiptStore;
pub use tracker::{DeliveryEntry, DeliveryStats, DeliveryTracker, SweepReport};
