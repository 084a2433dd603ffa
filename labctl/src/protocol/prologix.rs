//! Protocol for the Prologix USB to GPIB dongle.
//!
//! The dongle is driven with `++` control commands on the serial line; any
//! other line is forwarded to the currently addressed GPIB device. Replies
//! are fetched explicitly with `++read eoi`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

use crate::protocol::bytestream::{read_all, read_line};
use crate::Error;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// One-time configuration after the serial port has been (re)opened:
/// no EEPROM writes, no read-after-write, and manual line termination.
pub async fn init<T: AsyncRead + AsyncWrite + Unpin>(serial: &mut T) -> crate::Result<()> {
    log::debug!("initializing prologix");
    write(serial, "++savecfg 0\n").await?;
    write(serial, "++auto 0\n").await?;
    write(serial, "++eos 3\n").await
}

/// Address the device and forward one command line to it.
pub async fn send<T: AsyncRead + AsyncWrite + Unpin>(
    serial: &mut T,
    gpib_addr: u8,
    line: &str,
) -> crate::Result<()> {
    log::debug!("prologix send to gpib address {}", gpib_addr);
    let _ = read_all(serial).await.map_err(Error::transport)?;
    write(serial, &format!("++addr {}\n", gpib_addr)).await?;
    let mut line = line.to_string();
    if !line.ends_with('\n') {
        line.push('\n');
    }
    write(serial, &line).await
}

/// Ask the dongle to read from the addressed device until EOI and return
/// the reply line.
pub async fn read<T: AsyncRead + AsyncWrite + Unpin>(
    serial: &mut T,
    gpib_addr: u8,
    timeout: Duration,
) -> crate::Result<String> {
    write(serial, &format!("++addr {}\n", gpib_addr)).await?;
    write(serial, "++read eoi\n").await?;
    read_line(serial, b'\n', timeout).await
}

async fn write<T: AsyncWrite + Unpin>(serial: &mut T, msg: &str) -> crate::Result<()> {
    serial.write_all(msg.as_bytes()).await.map_err(Error::transport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn send_appends_newline_and_addresses() {
        let (mut dongle, mut host) = tokio::io::duplex(256);
        send(&mut host, 12, "*IDN?").await.unwrap();
        let mut buf = vec![0; 64];
        let n = dongle.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"++addr 12\n*IDN?\n");
    }
}
