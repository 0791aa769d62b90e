//! Zone controller gateway.
//!
//! Bridges the controller's serial line to the cloud hub's WebSocket:
//!
//! ```text
//!  cloud hub  --JSON envelope-->  command pump   --frame-->  controller
//!  cloud hub  <--JSON envelope--  telemetry pump <--frame--  controller
//! ```
//!
//! The [`Supervisor`] owns both links. It connects the socket, then the
//! serial port, runs the two pumps until either reports a failure, tears
//! everything down and starts over. Transports are reached through the
//! [`Transport`] trait so the supervisor can be driven by in-memory links.

mod config;
mod error;
mod link;
mod logging;
mod pumps;
mod supervisor;
mod transport;

pub use config::*;
pub use error::*;
pub use link::*;
pub use logging::*;
pub use pumps::*;
pub use supervisor::*;
pub use transport::*;
