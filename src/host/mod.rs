//! Host-facing command contract and stdio bridge for native shells.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod stdio;

pub use channel::{HostCommandClient, HostCommandServer, TaskCommandHandler, command_channel};
pub use contract::{CommandEnvelope, CommandName, EventEnvelope, ResponseEnvelope};
pub use handler::{HostNotificationSink, TrackerCommandHandler};
pub use stdio::{run_bridge, run_stdio_bridge};
