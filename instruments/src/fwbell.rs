//! F.W. Bell model 5180 handheld gaussmeter.
//!
//! The 5180 does not speak SCPI on the wire: it exchanges fixed 8-byte
//! command frames over a pair of raw USB bulk endpoints and answers with
//! frames of its own. The command table below carries the pre-computed
//! frames, checksum included; replies are decoded field by field.

use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use labctl::property::strict_range;
use labctl::transport::usb::UsbAdapter;
use labctl::{Adapter, Error};

pub const VENDOR_ID: u16 = 0x16a2;
pub const PRODUCT_ID: u16 = 0x5100;

const REPLY_LEN: usize = 128;

const IDN_QUERY: [u8; 8] = [0x01, 0x2B, 0x18, 0x00, 0xD0, 0x7B, 0x00, 0x00];
const MEASURE_FLUX_QUERY: [u8; 8] = [0x01, 0x2B, 0x10, 0x00, 0x10, 0x7C, 0x00, 0x00];
// the flux query frame doubles as the units query; only the decoding differs
const UNITS_QUERY: [u8; 8] = MEASURE_FLUX_QUERY;
const RANGE_QUERY: [u8; 8] = [0x01, 0x2B, 0x1A, 0x00, 0xB0, 0x7A, 0x00, 0x00];
const AUTO_RANGE: [u8; 8] = [0x01, 0x2B, 0x20, 0x01, 0x01, 0xBE, 0xD1, 0x00];
const RESET: [u8; 8] = [0x01, 0x2B, 0x37, 0x02, 0x00, 0x01, 0xB8, 0x4B];

const SET_RANGE: [[u8; 8]; 3] = [
    [0x01, 0x2B, 0x19, 0x01, 0x00, 0x73, 0xC0, 0x00],
    [0x01, 0x2B, 0x19, 0x01, 0x01, 0xB3, 0x01, 0x00],
    [0x01, 0x2B, 0x19, 0x01, 0x02, 0xB2, 0x41, 0x00],
];

/// Measurement units, AC or DC coupled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Units {
    AcGauss,
    AcTesla,
    AcAmpPerMeter,
    DcGauss,
    DcTesla,
    DcAmpPerMeter,
}

impl Units {
    fn frame(&self) -> [u8; 8] {
        match self {
            Units::AcGauss => [0x01, 0x2B, 0x12, 0x02, 0x00, 0x01, 0xB4, 0x40],
            Units::AcTesla => [0x01, 0x2B, 0x12, 0x02, 0x01, 0x01, 0x24, 0x41],
            Units::AcAmpPerMeter => [0x01, 0x2B, 0x12, 0x02, 0x02, 0x01, 0xD4, 0x41],
            Units::DcGauss => [0x01, 0x2B, 0x12, 0x02, 0x00, 0x00, 0x74, 0x81],
            Units::DcTesla => [0x01, 0x2B, 0x12, 0x02, 0x01, 0x00, 0xE4, 0x80],
            Units::DcAmpPerMeter => [0x01, 0x2B, 0x12, 0x02, 0x02, 0x00, 0x14, 0x80],
        }
    }
}

/// Decode the identification reply: a length byte followed by ASCII,
/// NUL padded.
fn decode_idn(frame: &[u8]) -> labctl::Result<String> {
    let len = *frame.get(3).ok_or_else(short_frame)? as usize;
    let text = frame.get(4..4 + len).ok_or_else(short_frame)?;
    let text = std::str::from_utf8(text).map_err(|_| Error::UnexpectedResponse("IDN is not ASCII".to_string()))?;
    Ok(text.trim_matches('\0').to_string())
}

/// Decode a flux reading: a signed 16-bit mantissa scaled by the range
/// code. Byte 10 flags a settled reading.
fn decode_field(frame: &[u8]) -> labctl::Result<f64> {
    if *frame.get(10).ok_or_else(short_frame)? != 10 {
        return Err(Error::UnexpectedResponse("reading not valid".to_string()));
    }
    let mantissa = BigEndian::read_i16(frame.get(4..6).ok_or_else(short_frame)?) as f64;
    let scale = match frame[7] {
        0 => 1e-5,
        1 => 1e-4,
        _ => 1e-3,
    };
    Ok(mantissa * scale)
}

fn decode_units(frame: &[u8]) -> labctl::Result<Units> {
    let ac = *frame.get(9).ok_or_else(short_frame)? != 0;
    match (*frame.get(6).ok_or_else(short_frame)?, ac) {
        (0, true) => Ok(Units::AcGauss),
        (1, true) => Ok(Units::AcTesla),
        (2, true) => Ok(Units::AcAmpPerMeter),
        (0, false) => Ok(Units::DcGauss),
        (1, false) => Ok(Units::DcTesla),
        (2, false) => Ok(Units::DcAmpPerMeter),
        (mode, _) => Err(Error::UnexpectedResponse(format!("unknown unit code {}", mode))),
    }
}

fn decode_range(frame: &[u8]) -> labctl::Result<u8> {
    let scale = *frame.get(7).ok_or_else(short_frame)?;
    Ok(scale.min(2))
}

fn short_frame() -> Error {
    Error::UnexpectedResponse("reply frame too short".to_string())
}

pub struct Fwbell5180 {
    adapter: Box<dyn Adapter>,
    timeout: Duration,
}

impl Fwbell5180 {
    /// Find the meter on the USB bus by its fixed vendor/product id.
    pub fn open() -> labctl::Result<Self> {
        let adapter = UsbAdapter::open(VENDOR_ID, PRODUCT_ID)?;
        Ok(Self::with_adapter(Box::new(adapter)))
    }

    pub fn with_adapter(adapter: Box<dyn Adapter>) -> Self {
        Fwbell5180 {
            adapter,
            timeout: Duration::from_secs(1),
        }
    }

    async fn transact(&mut self, frame: [u8; 8]) -> labctl::Result<Vec<u8>> {
        self.adapter.write(&frame).await?;
        self.adapter.read_exact(REPLY_LEN, self.timeout).await
    }

    async fn send(&mut self, frame: [u8; 8]) -> labctl::Result<()> {
        self.adapter.write(&frame).await
    }

    /// Model and firmware identification.
    pub async fn idn(&mut self) -> labctl::Result<String> {
        let reply = self.transact(IDN_QUERY).await?;
        decode_idn(&reply)
    }

    /// One field reading, in the currently selected units.
    pub async fn field(&mut self) -> labctl::Result<f64> {
        let reply = self.transact(MEASURE_FLUX_QUERY).await?;
        decode_field(&reply)
    }

    /// Sample `count` consecutive field readings.
    pub async fn fields(&mut self, count: usize) -> labctl::Result<Vec<f64>> {
        let mut ret = Vec::with_capacity(count);
        for _ in 0..count {
            ret.push(self.field().await?);
        }
        Ok(ret)
    }

    pub async fn units(&mut self) -> labctl::Result<Units> {
        let reply = self.transact(UNITS_QUERY).await?;
        decode_units(&reply)
    }

    pub async fn set_units(&mut self, units: Units) -> labctl::Result<()> {
        self.send(units.frame()).await
    }

    /// Measurement range code, 0 (smallest) to 2 (largest).
    pub async fn range(&mut self) -> labctl::Result<u8> {
        let reply = self.transact(RANGE_QUERY).await?;
        decode_range(&reply)
    }

    pub async fn set_range(&mut self, range: u8) -> labctl::Result<()> {
        let range = strict_range(range, 0, 2)?;
        self.send(SET_RANGE[range as usize]).await
    }

    pub async fn auto_range(&mut self) -> labctl::Result<()> {
        self.send(AUTO_RANGE).await
    }

    pub async fn reset(&mut self) -> labctl::Result<()> {
        self.send(RESET).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn reply_frame(fill: &[(usize, u8)]) -> Vec<u8> {
        let mut frame = vec![0u8; REPLY_LEN];
        for (idx, value) in fill {
            frame[*idx] = *value;
        }
        frame
    }

    #[test]
    fn field_decoding_scales_by_range() {
        // mantissa 1234, range code 1 -> 0.1234
        let mut frame = reply_frame(&[(10, 10), (7, 1)]);
        BigEndian::write_i16(&mut frame[4..6], 1234);
        assert!((decode_field(&frame).unwrap() - 0.1234).abs() < 1e-9);

        // negative mantissa on the coarsest range
        let mut frame = reply_frame(&[(10, 10), (7, 2)]);
        BigEndian::write_i16(&mut frame[4..6], -500);
        assert!((decode_field(&frame).unwrap() + 0.5).abs() < 1e-9);
    }

    #[test]
    fn invalid_reading_is_an_error() {
        let frame = reply_frame(&[(10, 0)]);
        assert!(matches!(decode_field(&frame), Err(Error::UnexpectedResponse(_))));
    }

    #[test]
    fn unit_decoding() {
        let frame = reply_frame(&[(6, 1), (9, 1)]);
        assert_eq!(decode_units(&frame).unwrap(), Units::AcTesla);
        let frame = reply_frame(&[(6, 0), (9, 0)]);
        assert_eq!(decode_units(&frame).unwrap(), Units::DcGauss);
        let frame = reply_frame(&[(6, 7)]);
        assert!(decode_units(&frame).is_err());
    }

    #[test]
    fn idn_decoding() {
        let mut frame = reply_frame(&[(3, 6)]);
        frame[4..10].copy_from_slice(b"FW5180");
        assert_eq!(decode_idn(&frame).unwrap(), "FW5180");
    }

    #[tokio::test]
    async fn driver_sends_command_frames() {
        let mut reading = reply_frame(&[(10, 10), (7, 0)]);
        BigEndian::write_i16(&mut reading[4..6], 2000);
        let mock = MockAdapter::new()
            .expect(MEASURE_FLUX_QUERY, reading)
            .expect_write(Units::DcTesla.frame())
            .expect_write(SET_RANGE[1]);
        let mut meter = Fwbell5180::with_adapter(Box::new(mock));
        assert!((meter.field().await.unwrap() - 0.02).abs() < 1e-9);
        meter.set_units(Units::DcTesla).await.unwrap();
        meter.set_range(1).await.unwrap();
        assert!(meter.set_range(3).await.is_err());
    }
}
