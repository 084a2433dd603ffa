//! Wire protocols spoken on top of the raw transports.

pub mod bytestream;
pub mod prologix;
pub mod scpi;
