//! Transports and plumbing for bench instrument drivers.
//!
//! The crate provides the pieces a device driver is assembled from:
//!
//! * [`Address`]: parsing of address strings such as
//!   `serial::/dev/ttyUSB0::9600::8N1` or `prologix::/dev/ttyUSB1::12`
//! * transports: serial, TCP, Prologix-GPIB, raw USB and Modbus, each
//!   running on a dedicated I/O task
//! * [`Connection`] and [`Comm`]: the line-oriented `write`/`ask`/`values`
//!   surface drivers talk to
//! * [`property`]: validators, value conversion and the `measurement!` /
//!   `control!` / `setting!` macros that expand command tables into typed
//!   async accessors
//!
//! Device drivers themselves live in the `labctl-instruments` crate.

mod error;

pub mod address;
pub mod instrument;
pub mod iotask;
pub mod property;
pub mod protocol;
pub mod transport;

pub use address::Address;
pub use error::{Error, Result};
pub use instrument::{Adapter, Comm, Connection, Scpi};
pub use property::ScpiValue;
