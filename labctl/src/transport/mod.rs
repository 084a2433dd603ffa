//! Physical transports. Each transport owns its connection on a dedicated
//! I/O task (see [`crate::iotask`]) and reconnects lazily.

pub mod mock;
pub mod modbus;
pub mod serial;
pub mod tcp;
pub mod usb;
