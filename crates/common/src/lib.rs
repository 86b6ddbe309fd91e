pub mod types;

pub use types::{Money, OrderId, OrderItemId, ShipmentId, UserId};
