//! Differential-testing front end for the CHERIoT simulator core.
//!
//! The rig receives instruction words over a socket, executes them one at a
//! time against [`cheriot_sim_core`], and replies with a retirement trace
//! record per instruction for comparison against a reference implementation.

pub mod decoder;
pub mod packets;
pub mod rig;

pub use decoder::{DecodeInfo, RigDecoder};
pub use rig::{serve_connection, CheriotTestRig, MAX_TRACE_VERSION};
