//! Measurement Computing (MCC / CBCOM) DAQ modules.
//!
//! The modules hang off an RS-485 daisy chain behind an RS-232 adapter
//! board and speak a terse ASCII dialect: `#AA` and `$AA<cmd>` frames where
//! `AA` is the module address as two uppercase hex digits. Valid replies
//! are prefixed with `!` or `>`, errors with `?`.

use std::ops::{Deref, DerefMut};

use labctl::property::strict_range;
use labctl::transport::serial::{DataBits, Parity, SerialParams, StopBits};
use labctl::{Address, Comm, Connection, Error, ScpiValue};

pub struct DaqModule {
    conn: Connection,
    address: String,
}

impl Comm for DaqModule {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl DaqModule {
    /// Port settings of the factory configuration.
    pub fn default_params() -> SerialParams {
        SerialParams::new(9600, DataBits::Eight, Parity::None, StopBits::One)
    }

    pub fn new(conn: Connection, address: u8) -> Self {
        DaqModule {
            conn,
            address: format!("{:02X}", address),
        }
    }

    /// Open a module on the daisy chain; `address` is the module number.
    pub async fn open(addr: &Address, address: u8) -> labctl::Result<Self> {
        let conn = Connection::open(addr).await?.terminators(b'\r', b'\r');
        Ok(Self::new(conn, address))
    }

    /// Validate a reply and strip its `!`/`>` delimiter.
    fn strip_delimiter(reply: &str) -> labctl::Result<&str> {
        match reply.chars().next() {
            Some('!') | Some('>') => Ok(&reply[1..]),
            Some('?') => Err(Error::UnexpectedResponse(format!("module rejected command: {}", reply))),
            _ => Err(Error::UnexpectedResponse(format!("malformed reply: {:?}", reply))),
        }
    }

    async fn command(&mut self, cmd: String) -> labctl::Result<String> {
        let reply = self.ask(&cmd).await?;
        Self::strip_delimiter(&reply).map(|x| x.to_string())
    }

    /// Readings of all input channels, concatenated in the module's fixed
    /// width engineering format.
    pub async fn measure_all_channels(&mut self) -> labctl::Result<String> {
        let cmd = format!("#{}", self.address);
        self.command(cmd).await
    }

    /// Reading of a single input channel, 0–7. Assumes the module's data
    /// format is set to engineering or percent format.
    pub async fn measure_channel(&mut self, channel: u8) -> labctl::Result<f64> {
        let channel = strict_range(channel, 0, 7)?;
        let cmd = format!("#{}{}", self.address, channel);
        let value = self.command(cmd).await?;
        f64::parse(&value)
    }

    /// Perform span calibration; returns the module address digits.
    pub async fn span_calibration(&mut self) -> labctl::Result<String> {
        let cmd = format!("${}0", self.address);
        self.command(cmd).await
    }

    /// Perform zero calibration; returns the module address digits.
    pub async fn zero_calibration(&mut self) -> labctl::Result<String> {
        let cmd = format!("${}1", self.address);
        self.command(cmd).await
    }

    /// Module configuration as `AATTCCFF`: address, input type code, baud
    /// rate code and data format code.
    pub async fn configuration(&mut self) -> labctl::Result<String> {
        let cmd = format!("${}2", self.address);
        self.command(cmd).await
    }

    /// Cold junction compensation temperature in celsius.
    pub async fn cjc_temperature(&mut self) -> labctl::Result<f64> {
        let cmd = format!("${}3", self.address);
        let value = self.command(cmd).await?;
        f64::parse(&value)
    }

    /// Which of the eight input channels are enabled; the module reports a
    /// two digit hex bitmask.
    pub async fn channels_enabled(&mut self) -> labctl::Result<[bool; 8]> {
        let cmd = format!("${}6", self.address);
        let reply = self.command(cmd).await?;
        let mask = reply
            .get(reply.len().saturating_sub(2)..)
            .and_then(|x| u8::from_str_radix(x, 16).ok())
            .ok_or_else(|| Error::UnexpectedResponse(format!("bad channel mask: {:?}", reply)))?;
        let mut status = [false; 8];
        for (idx, flag) in status.iter_mut().enumerate() {
            *flag = mask & (1 << idx) != 0;
        }
        Ok(status)
    }
}

/// MCC CB-7018 8-channel voltage and thermocouple input module.
pub struct Cb7018 {
    inner: DaqModule,
}

impl Cb7018 {
    pub fn new(conn: Connection, address: u8) -> Self {
        Cb7018 {
            inner: DaqModule::new(conn, address),
        }
    }

    pub async fn open(addr: &Address, address: u8) -> labctl::Result<Self> {
        Ok(Cb7018 {
            inner: DaqModule::open(addr, address).await?,
        })
    }
}

impl Deref for Cb7018 {
    type Target = DaqModule;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for Cb7018 {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn module(mock: MockAdapter, address: u8) -> DaqModule {
        DaqModule::new(Connection::with_adapter(Box::new(mock)).terminators(b'\r', b'\r'), address)
    }

    #[tokio::test]
    async fn address_renders_as_hex() {
        let mock = MockAdapter::new().expect("#FF2\r", ">+025.12\r");
        let mut dev = module(mock, 255);
        assert_eq!(dev.measure_channel(2).await.unwrap(), 25.12);
    }

    #[tokio::test]
    async fn channel_number_is_validated() {
        let mut dev = module(MockAdapter::new(), 1);
        assert!(dev.measure_channel(8).await.is_err());
    }

    #[tokio::test]
    async fn question_mark_reply_is_an_error() {
        let mock = MockAdapter::new().expect("$013\r", "?01\r");
        let mut dev = module(mock, 1);
        assert!(matches!(
            dev.cjc_temperature().await,
            Err(Error::UnexpectedResponse(_))
        ));
    }

    #[tokio::test]
    async fn channel_mask_decodes() {
        let mock = MockAdapter::new().expect("$016\r", "!01A5\r");
        let mut dev = module(mock, 1);
        let enabled = dev.channels_enabled().await.unwrap();
        // 0xA5 = 0b10100101
        assert_eq!(
            enabled,
            [true, false, true, false, false, true, false, true]
        );
    }

    #[tokio::test]
    async fn calibration_and_configuration() {
        let mock = MockAdapter::new()
            .expect("$010\r", "!01\r")
            .expect("$012\r", "!01050600\r");
        let mut dev = module(mock, 1);
        assert_eq!(dev.span_calibration().await.unwrap(), "01");
        assert_eq!(dev.configuration().await.unwrap(), "01050600");
    }
}
