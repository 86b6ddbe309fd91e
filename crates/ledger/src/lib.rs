pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod status;
pub mod store;

pub use common::{Money, OrderId, OrderItemId, ShipmentId, UserId};
pub use error::{LedgerError, Result};
pub use memory::InMemoryLedger;
pub use postgres::PostgresLedger;
pub use record::{
    CommittedShipment, NewOrder, NewOrderItem, OrderItemRecord, OrderRecord, OrderSnapshot,
    ShipmentCommit, ShipmentItemRecord, ShipmentLine, ShipmentRecord,
};
pub use status::{OrderStatus, StatusCounts};
pub use store::Ledger;
