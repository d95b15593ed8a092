pub mod error;
pub mod ports;
pub mod state;

pub use error::{Result, TestbedError};
pub use ports::{PortAllocation, PortReservation, PortTriple, free_port};
pub use state::WorkspaceState;
