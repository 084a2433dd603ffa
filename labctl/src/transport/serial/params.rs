use core::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

#[derive(Debug, Eq, PartialEq, Clone, Copy, Serialize, Deserialize, Hash)]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Serialize, Deserialize, Hash)]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Eq, PartialEq, Clone, Copy, Serialize, Deserialize, Hash)]
pub enum StopBits {
    One,
    Two,
}

/// Link settings of a serial port, printed and parsed in the usual
/// `9600::8N1` notation.
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize, Hash)]
pub struct SerialParams {
    pub baud: u32,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
}

impl SerialParams {
    pub fn new(baud: u32, data_bits: DataBits, parity: Parity, stop_bits: StopBits) -> Self {
        SerialParams {
            baud,
            data_bits,
            stop_bits,
            parity,
        }
    }

    /// Parse the `[path, baud, config]` tail of an address string.
    pub fn from_address(splits: &[&str]) -> Option<(String, SerialParams)> {
        if splits.len() != 3 {
            return None;
        }
        let path = splits[0].to_string();
        let baud: u32 = splits[1].parse().ok()?;
        let (data_bits, parity, stop_bits) = parse_config(splits[2])?;
        Some((
            path,
            SerialParams {
                baud,
                data_bits,
                stop_bits,
                parity,
            },
        ))
    }
}

/// Parse a three character port config such as `8N1` or `7o1`.
fn parse_config(config: &str) -> Option<(DataBits, Parity, StopBits)> {
    let chars = config.as_bytes();
    if chars.len() != 3 {
        return None;
    }
    let data_bits = match chars[0] {
        b'5' => DataBits::Five,
        b'6' => DataBits::Six,
        b'7' => DataBits::Seven,
        b'8' => DataBits::Eight,
        _ => return None,
    };
    let parity = match chars[1].to_ascii_lowercase() {
        b'n' => Parity::None,
        b'o' => Parity::Odd,
        b'e' => Parity::Even,
        _ => return None,
    };
    let stop_bits = match chars[2] {
        b'1' => StopBits::One,
        b'2' => StopBits::Two,
        _ => return None,
    };
    Some((data_bits, parity, stop_bits))
}

impl Display for SerialParams {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}{}{}", self.baud, self.data_bits, self.parity, self.stop_bits)
    }
}

impl Display for DataBits {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x = match self {
            DataBits::Five => "5",
            DataBits::Six => "6",
            DataBits::Seven => "7",
            DataBits::Eight => "8",
        };
        f.write_str(x)
    }
}

impl Display for Parity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x = match self {
            Parity::None => "N",
            Parity::Odd => "O",
            Parity::Even => "E",
        };
        f.write_str(x)
    }
}

impl Display for StopBits {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let x = match self {
            StopBits::One => "1",
            StopBits::Two => "2",
        };
        f.write_str(x)
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(x: DataBits) -> Self {
        match x {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(x: Parity) -> Self {
        match x {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(x: StopBits) -> Self {
        match x {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let (path, params) = SerialParams::from_address(&["/dev/ttyUSB0", "9600", "7o1"]).unwrap();
        assert_eq!(path, "/dev/ttyUSB0");
        assert_eq!(params.data_bits, DataBits::Seven);
        assert_eq!(params.parity, Parity::Odd);
        assert_eq!(params.to_string(), "9600::7O1");
    }

    #[test]
    fn rejects_bad_config() {
        assert!(SerialParams::from_address(&["COM3", "9600", "9N1"]).is_none());
        assert!(SerialParams::from_address(&["COM3", "9600", "8X1"]).is_none());
        assert!(SerialParams::from_address(&["COM3", "fast", "8N1"]).is_none());
        assert!(SerialParams::from_address(&["COM3", "9600", "8N11"]).is_none());
    }
}
