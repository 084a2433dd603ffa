//! Parsing of address strings of the form `serial::/dev/ttyUSB0::9600::8N1`.
//!
//! An address names a transport plus the settings needed to open it. It maps
//! to a unique hardware resource (see [`HandleId`]) but may carry additional
//! settings for the communication link, such as the baud rate or the GPIB
//! address behind a Prologix dongle.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::transport::serial::SerialParams;
use crate::Error;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModbusLink {
    Tcp { addr: SocketAddr },
    Rtu { path: String, params: SerialParams },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Address {
    /// `serial::<path>::<baud>::<config>`
    Serial { path: String, params: SerialParams },
    /// `prologix::<path>::<gpib-addr>`
    Prologix { path: String, gpib_addr: u8 },
    /// `tcp::<host>:<port>`
    Tcp { addr: SocketAddr },
    /// `modbus::tcp::<host>:<port>[::<unit>]` or
    /// `modbus::rtu::<path>::<baud>::<config>[::<unit>]`
    Modbus { link: ModbusLink, unit: u8 },
    /// `usb::<vid>::<pid>` with hexadecimal ids
    Usb { vid: u16, pid: u16 },
}

const DEFAULT_MODBUS_UNIT: u8 = 1;

impl Address {
    /// Parse an address string. Returns `Error::InvalidAddress` if the
    /// string does not match any of the known schemes.
    pub fn parse(addr: &str) -> crate::Result<Self> {
        let splits: Vec<&str> = addr.split("::").collect();
        let invalid = || Error::InvalidAddress(addr.to_string());
        if splits.len() < 2 {
            return Err(invalid());
        }
        match splits[0].to_lowercase().as_str() {
            "serial" => {
                // serial::/dev/ttyUSB0::9600::8N1
                if splits.len() != 4 {
                    return Err(invalid());
                }
                let (path, params) = SerialParams::from_address(&splits[1..4]).ok_or_else(invalid)?;
                Ok(Address::Serial { path, params })
            }
            "prologix" => {
                // prologix::/dev/ttyUSB0::12
                if splits.len() != 3 {
                    return Err(invalid());
                }
                let gpib_addr: u8 = splits[2].parse().map_err(|_| invalid())?;
                Ok(Address::Prologix {
                    path: splits[1].to_string(),
                    gpib_addr,
                })
            }
            "tcp" => {
                // tcp::192.168.0.1:1234
                if splits.len() != 2 {
                    return Err(invalid());
                }
                let addr: SocketAddr = splits[1].parse().map_err(|_| invalid())?;
                Ok(Address::Tcp { addr })
            }
            "modbus" => Self::parse_modbus(&splits).ok_or_else(invalid),
            "usb" => {
                // usb::0x16a2::0x5100
                if splits.len() != 3 {
                    return Err(invalid());
                }
                let vid = parse_hex_id(splits[1]).ok_or_else(invalid)?;
                let pid = parse_hex_id(splits[2]).ok_or_else(invalid)?;
                Ok(Address::Usb { vid, pid })
            }
            _ => Err(invalid()),
        }
    }

    fn parse_modbus(splits: &[&str]) -> Option<Self> {
        if splits.len() < 3 {
            return None;
        }
        match splits[1].to_lowercase().as_str() {
            "tcp" => {
                // modbus::tcp::192.168.0.1:502{::17}
                if splits.len() > 4 {
                    return None;
                }
                let addr: SocketAddr = splits[2].parse().ok()?;
                let unit = match splits.get(3) {
                    Some(x) => x.parse().ok()?,
                    None => DEFAULT_MODBUS_UNIT,
                };
                Some(Address::Modbus {
                    link: ModbusLink::Tcp { addr },
                    unit,
                })
            }
            "rtu" => {
                // modbus::rtu::/dev/ttyUSB0::9600::8N1{::17}
                if splits.len() != 5 && splits.len() != 6 {
                    return None;
                }
                let (path, params) = SerialParams::from_address(&splits[2..5])?;
                let unit = match splits.get(5) {
                    Some(x) => x.parse().ok()?,
                    None => DEFAULT_MODBUS_UNIT,
                };
                Some(Address::Modbus {
                    link: ModbusLink::Rtu { path, params },
                    unit,
                })
            }
            _ => None,
        }
    }

    /// Identifier of the exclusive hardware resource behind this address.
    /// Two addresses with the same handle contend for the same device file
    /// or socket, whatever their link settings are.
    pub fn handle_id(&self) -> HandleId {
        match self {
            Address::Serial { path, .. } => HandleId::new(path.clone()),
            Address::Prologix { path, .. } => HandleId::new(path.clone()),
            Address::Tcp { addr } => HandleId::new(addr.to_string()),
            Address::Modbus { link, .. } => match link {
                ModbusLink::Tcp { addr } => HandleId::new(addr.to_string()),
                ModbusLink::Rtu { path, .. } => HandleId::new(path.clone()),
            },
            Address::Usb { vid, pid } => HandleId::new(format!("{:04x}:{:04x}", vid, pid)),
        }
    }
}

fn parse_hex_id(x: &str) -> Option<u16> {
    let x = x.strip_prefix("0x").or_else(|| x.strip_prefix("0X")).unwrap_or(x);
    u16::from_str_radix(x, 16).ok()
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        match addr {
            Address::Serial { path, params } => format!("serial::{}::{}", path, params),
            Address::Prologix { path, gpib_addr } => format!("prologix::{}::{}", path, gpib_addr),
            Address::Tcp { addr } => format!("tcp::{}", addr),
            Address::Modbus { link, unit } => match link {
                ModbusLink::Tcp { addr } => format!("modbus::tcp::{}::{}", addr, unit),
                ModbusLink::Rtu { path, params } => {
                    format!("modbus::rtu::{}::{}::{}", path, params, unit)
                }
            },
            Address::Usb { vid, pid } => format!("usb::{:#06x}::{:#06x}", vid, pid),
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x: String = self.clone().into();
        f.write_str(&x)
    }
}

/// Identifier for an exclusive hardware resource, such as a serial port or
/// a TCP connection. There can be only one open link per handle.
#[derive(Hash, Clone, PartialEq, Eq, Debug)]
pub struct HandleId {
    inner: String,
}

impl HandleId {
    pub fn new(inner: String) -> Self {
        Self { inner }
    }
}

impl Display for HandleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::serial::{DataBits, Parity, StopBits};

    #[test]
    fn parse_serial() {
        let addr = Address::parse("serial::COM1::115200::8N1").unwrap();
        match addr {
            Address::Serial { path, params } => {
                assert_eq!(path, "COM1");
                assert_eq!(
                    params,
                    SerialParams {
                        baud: 115200,
                        data_bits: DataBits::Eight,
                        stop_bits: StopBits::One,
                        parity: Parity::None,
                    }
                );
            }
            _ => panic!(),
        }

        let addr = Address::parse("serial::/dev/ttyS0::9600::5E2").unwrap();
        match addr {
            Address::Serial { path, params } => {
                assert_eq!(path, "/dev/ttyS0");
                assert_eq!(
                    params,
                    SerialParams {
                        baud: 9600,
                        data_bits: DataBits::Five,
                        stop_bits: StopBits::Two,
                        parity: Parity::Even,
                    }
                );
            }
            _ => panic!(),
        }

        assert!(Address::parse("serial::COM1::115200").is_err());
        assert!(Address::parse("serial::COM1::115200::9N1").is_err());
    }

    #[test]
    fn parse_prologix() {
        let addr = Address::parse("prologix::/dev/ttyUSB0::10").unwrap();
        match addr {
            Address::Prologix { path, gpib_addr } => {
                assert_eq!(path, "/dev/ttyUSB0");
                assert_eq!(gpib_addr, 10);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn parse_tcp() {
        let addr = Address::parse("tcp::192.168.1.1:123").unwrap();
        match addr {
            Address::Tcp { addr } => {
                assert_eq!(addr, "192.168.1.1:123".parse().unwrap())
            }
            _ => panic!(),
        }
    }

    #[test]
    fn parse_modbus() {
        let ref_sock: SocketAddr = "192.168.1.1:502".parse().unwrap();
        let addr = Address::parse("modbus::tcp::192.168.1.1:502").unwrap();
        match addr {
            Address::Modbus { link, unit } => {
                assert_eq!(link, ModbusLink::Tcp { addr: ref_sock });
                assert_eq!(unit, 1);
            }
            _ => panic!(),
        }

        let addr = Address::parse("modbus::rtu::/dev/ttyUSB0::115200::8N1::17").unwrap();
        match addr {
            Address::Modbus { link, unit } => {
                match link {
                    ModbusLink::Rtu { path, params } => {
                        assert_eq!(path, "/dev/ttyUSB0");
                        assert_eq!(params.baud, 115200);
                    }
                    _ => panic!(),
                }
                assert_eq!(unit, 17);
            }
            _ => panic!(),
        }
    }

    #[test]
    fn parse_usb() {
        let addr = Address::parse("usb::0x16a2::0x5100").unwrap();
        match addr {
            Address::Usb { vid, pid } => {
                assert_eq!(vid, 0x16a2);
                assert_eq!(pid, 0x5100);
            }
            _ => panic!(),
        }
        assert!(Address::parse("usb::16a2::5100").is_ok());
        assert!(Address::parse("usb::xyz::5100").is_err());
    }

    #[test]
    fn unknown_scheme() {
        assert!(Address::parse("gpib::1").is_err());
        assert!(Address::parse("justoneword").is_err());
    }

    #[test]
    fn handles_follow_the_hardware_resource() {
        // same serial port, different link settings or bus addresses
        let a = Address::parse("serial::/dev/ttyUSB0::9600::8N1").unwrap();
        let b = Address::parse("prologix::/dev/ttyUSB0::10").unwrap();
        let c = Address::parse("prologix::/dev/ttyUSB0::12").unwrap();
        assert_eq!(a.handle_id(), b.handle_id());
        assert_eq!(b.handle_id(), c.handle_id());

        let d = Address::parse("tcp::192.168.1.1:5025").unwrap();
        assert_ne!(a.handle_id(), d.handle_id());
    }

    #[test]
    fn roundtrip() {
        for addr in [
            "serial::/dev/ttyUSB0::9600::8N1",
            "prologix::/dev/ttyUSB0::10",
            "tcp::192.168.1.1:123",
            "modbus::tcp::192.168.1.1:502::17",
            "usb::0x16a2::0x5100",
        ] {
            let parsed = Address::parse(addr).unwrap();
            assert_eq!(String::from(parsed), addr);
        }
    }
}
