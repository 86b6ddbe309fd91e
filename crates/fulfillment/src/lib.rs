//! Shipment processing for the order ledger.
//!
//! The engine is the only writer of shipped quantities and order status.
//! It validates a whole request against an order snapshot, commits it
//! atomically through the ledger, and hands status transitions to the
//! notifier after the commit.

pub mod engine;
pub mod error;

pub use engine::{FulfillmentEngine, RequestedLine, ShipmentRequest};
pub use error::{FulfillmentError, Result};
