//! Device drivers for bench instruments.
//!
//! One module per manufacturer. Drivers own a [`labctl::Connection`] (or a
//! register-level client for Modbus devices) and expose their command
//! tables as typed async properties; see the `labctl::property` docs for
//! the recipe.

pub mod fwbell;
pub mod hp;
pub mod keithley;
pub mod keysight;
pub mod lakeshore;
pub mod mcc;
pub mod omega;
pub mod signalrecovery;
pub mod srs;
pub mod superlogics;
pub mod tdk;
