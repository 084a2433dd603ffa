//! The transport-agnostic surface drivers are written against.
//!
//! [`Adapter`] is the byte-level seam each transport implements.
//! [`Connection`] layers line termination and reply timeouts on top and
//! provides the `write`/`ask`/`values` vocabulary. Drivers embed a
//! `Connection` and implement [`Comm`]; SCPI-speaking devices additionally
//! opt into [`Scpi`] for the IEEE 488.2 common commands.

use std::time::Duration;

use async_trait::async_trait;

use crate::address::Address;
use crate::property::ScpiValue;
use crate::protocol::scpi;
use crate::transport::serial::{PrologixAdapter, SerialAdapter};
use crate::transport::tcp::TcpAdapter;
use crate::transport::usb::UsbAdapter;
use crate::Error;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_TERMINATOR: u8 = b'\n';

/// Byte-level transport seam.
#[async_trait]
pub trait Adapter: Send {
    async fn write(&mut self, data: &[u8]) -> crate::Result<()>;

    /// Read until `term` shows up; the terminator is consumed but not
    /// returned.
    async fn read_until(&mut self, term: u8, timeout: Duration) -> crate::Result<Vec<u8>>;

    async fn read_exact(&mut self, count: usize, timeout: Duration) -> crate::Result<Vec<u8>>;

    /// Discard and return whatever input is already buffered.
    async fn drain(&mut self) -> crate::Result<Vec<u8>>;
}

/// A boxed transport plus the line discipline of one instrument.
pub struct Connection {
    adapter: Box<dyn Adapter>,
    write_term: u8,
    read_term: u8,
    timeout: Duration,
}

impl Connection {
    /// Open the transport named by an address, with `\n` terminators and a
    /// 2 s reply timeout. Modbus addresses are register-level and have no
    /// line discipline; use [`crate::transport::modbus::ModbusClient`].
    pub async fn open(addr: &Address) -> crate::Result<Self> {
        let adapter: Box<dyn Adapter> = match addr {
            Address::Serial { path, params } => Box::new(SerialAdapter::new(path, params.clone())),
            Address::Prologix { path, gpib_addr } => Box::new(PrologixAdapter::new(path, *gpib_addr)),
            Address::Tcp { addr } => Box::new(TcpAdapter::new(*addr)),
            Address::Usb { vid, pid } => Box::new(UsbAdapter::open(*vid, *pid)?),
            Address::Modbus { .. } => {
                return Err(Error::argument(format!(
                    "{} is register-level, not a byte stream",
                    addr
                )))
            }
        };
        Ok(Self::with_adapter(adapter))
    }

    pub fn with_adapter(adapter: Box<dyn Adapter>) -> Self {
        Connection {
            adapter,
            write_term: DEFAULT_TERMINATOR,
            read_term: DEFAULT_TERMINATOR,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn terminators(mut self, write: u8, read: u8) -> Self {
        self.write_term = write;
        self.read_term = read;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Send a command line, appending the write terminator.
    pub async fn write(&mut self, cmd: &str) -> crate::Result<()> {
        let mut data = cmd.as_bytes().to_vec();
        data.push(self.write_term);
        self.adapter.write(&data).await
    }

    /// Read one reply line. A trailing `\r` left over from `\r\n`
    /// terminated devices is stripped.
    pub async fn read(&mut self) -> crate::Result<String> {
        let data = self.adapter.read_until(self.read_term, self.timeout).await?;
        let reply = String::from_utf8(data).map_err(|x| Error::unexpected(format!("not UTF-8: {:?}", x.as_bytes())))?;
        Ok(reply.trim_end_matches('\r').to_string())
    }

    /// Discard stale input, send a query and read the reply line.
    pub async fn ask(&mut self, cmd: &str) -> crate::Result<String> {
        let stale = self.adapter.drain().await?;
        if !stale.is_empty() {
            log::debug!("discarding {} stale bytes before query", stale.len());
        }
        self.write(cmd).await?;
        self.read().await
    }

    /// Read raw bytes, for replies that are not line oriented.
    pub async fn read_bytes(&mut self, count: usize) -> crate::Result<Vec<u8>> {
        self.adapter.read_exact(count, self.timeout).await
    }

    /// Query and split the comma-separated reply into fields.
    pub async fn values(&mut self, cmd: &str) -> crate::Result<Vec<String>> {
        let reply = self.ask(cmd).await?;
        Ok(scpi::split_values(&reply).into_iter().map(|x| x.to_string()).collect())
    }

    /// Query a reply framed as an IEEE 488.2 definite-length block.
    pub async fn ask_binary(&mut self, cmd: &str) -> crate::Result<Vec<u8>> {
        self.adapter.drain().await?;
        self.write(cmd).await?;
        let mut frame = self.adapter.read_exact(2, self.timeout).await?;
        if frame.len() != 2 || frame[0] != b'#' || !frame[1].is_ascii_digit() {
            return Err(Error::unexpected(format!("bad block header: {:?}", frame)));
        }
        let digits = (frame[1] - b'0') as usize;
        if digits == 0 {
            return Err(Error::unexpected("indefinite-length block"));
        }
        let len_field = self.adapter.read_exact(digits, self.timeout).await?;
        let len: usize = std::str::from_utf8(&len_field)
            .ok()
            .and_then(|x| x.parse().ok())
            .ok_or_else(|| Error::unexpected(format!("bad block length: {:?}", len_field)))?;
        frame.extend_from_slice(&len_field);
        let mut remaining = len;
        while remaining > 0 {
            let chunk = self.adapter.read_exact(remaining, self.timeout).await?;
            if chunk.is_empty() {
                return Err(Error::Timeout);
            }
            remaining -= chunk.len();
            frame.extend_from_slice(&chunk);
        }
        // trailing terminator, if the device sends one, is left for drain()
        scpi::parse_block(&frame).map(|x| x.to_vec())
    }
}

/// Driver-facing communication surface. Drivers get the default
/// pass-through behaviour for free and override single methods where a
/// device deviates from it (command echo, `OK` handshakes, ...).
#[async_trait]
pub trait Comm: Send {
    fn conn(&mut self) -> &mut Connection;

    async fn write(&mut self, cmd: &str) -> crate::Result<()> {
        self.conn().write(cmd).await
    }

    async fn read(&mut self) -> crate::Result<String> {
        self.conn().read().await
    }

    async fn ask(&mut self, cmd: &str) -> crate::Result<String> {
        self.conn().ask(cmd).await
    }

    async fn values(&mut self, cmd: &str) -> crate::Result<Vec<String>> {
        self.conn().values(cmd).await
    }

    async fn read_bytes(&mut self, count: usize) -> crate::Result<Vec<u8>> {
        self.conn().read_bytes(count).await
    }

    async fn ask_binary(&mut self, cmd: &str) -> crate::Result<Vec<u8>> {
        self.conn().ask_binary(cmd).await
    }
}

/// IEEE 488.2 common commands, for instruments that implement them.
#[async_trait]
pub trait Scpi: Comm {
    async fn idn(&mut self) -> crate::Result<String> {
        self.ask("*IDN?").await
    }

    async fn reset(&mut self) -> crate::Result<()> {
        self.write("*RST").await
    }

    async fn clear_status(&mut self) -> crate::Result<()> {
        self.write("*CLS").await
    }

    async fn operation_complete(&mut self) -> crate::Result<bool> {
        Ok(self.ask("*OPC?").await?.trim() == "1")
    }

    async fn status_byte(&mut self) -> crate::Result<u8> {
        let reply = self.ask("*STB?").await?;
        u8::parse(reply.trim())
    }

    /// Drain the error queue via `SYST:ERR?`. Returns the collected
    /// `code,message` entries, oldest first.
    async fn system_errors(&mut self) -> crate::Result<Vec<String>> {
        let mut errors = Vec::new();
        // cap the loop; a device that never reports code 0 is broken
        for _ in 0..32 {
            let reply = self.ask("SYST:ERR?").await?;
            let code = reply.split(',').next().unwrap_or("").trim();
            if code == "0" || code == "+0" {
                break;
            }
            log::warn!("instrument error: {}", reply);
            errors.push(reply);
        }
        Ok(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::scpi::format_block;
    use crate::transport::mock::MockAdapter;

    struct Dummy {
        conn: Connection,
    }

    impl Comm for Dummy {
        fn conn(&mut self) -> &mut Connection {
            &mut self.conn
        }
    }

    impl Scpi for Dummy {}

    fn dummy(mock: MockAdapter) -> Dummy {
        Dummy {
            conn: Connection::with_adapter(Box::new(mock)),
        }
    }

    #[tokio::test]
    async fn ask_roundtrip() {
        let mock = MockAdapter::new().expect("*IDN?\n", "ACME,4000,0,1.0\r\n");
        let mut dev = dummy(mock);
        assert_eq!(dev.idn().await.unwrap(), "ACME,4000,0,1.0");
    }

    #[tokio::test]
    async fn values_splits_fields() {
        let mock = MockAdapter::new().expect("DVC?\n", "1.0, 2.0 ,3.5\n");
        let mut dev = dummy(mock);
        assert_eq!(dev.values("DVC?").await.unwrap(), vec!["1.0", "2.0", "3.5"]);
    }

    #[tokio::test]
    async fn binary_block() {
        let mut reply = format_block(&[1, 2, 3, 4, 5]);
        reply.push(b'\n');
        let mock = MockAdapter::new().expect(":WAV:DATA?\n", reply);
        let mut dev = dummy(mock);
        assert_eq!(dev.ask_binary(":WAV:DATA?").await.unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn system_errors_drains_queue() {
        let mock = MockAdapter::new()
            .expect("SYST:ERR?\n", "-222,\"Data out of range\"\n")
            .expect("SYST:ERR?\n", "0,\"No error\"\n");
        let mut dev = dummy(mock);
        let errors = dev.system_errors().await.unwrap();
        assert_eq!(errors, vec!["-222,\"Data out of range\""]);
    }

    #[tokio::test]
    async fn custom_terminators() {
        let mock = MockAdapter::new().expect("MV?\r", "39.95\r");
        let mut conn = Connection::with_adapter(Box::new(mock)).terminators(b'\r', b'\r');
        assert_eq!(conn.ask("MV?").await.unwrap(), "39.95");
    }
}
