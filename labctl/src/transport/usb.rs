//! Raw USB bulk-endpoint transport.
//!
//! A few handheld meters skip USB-TMC and talk fixed-size frames on a pair
//! of bulk endpoints. The adapter claims interface 0 and exposes plain
//! write/read on the configured endpoint pair.

use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use nusb::transfer::RequestBuffer;
use nusb::Interface;
use tokio::time::timeout;

use crate::instrument::Adapter;
use crate::Error;

pub const DEFAULT_ENDPOINT_OUT: u8 = 0x01;
pub const DEFAULT_ENDPOINT_IN: u8 = 0x81;

pub struct UsbAdapter {
    interface: Interface,
    ep_out: u8,
    ep_in: u8,
}

impl UsbAdapter {
    /// Find a device by vendor/product id and claim interface 0.
    pub fn open(vid: u16, pid: u16) -> crate::Result<Self> {
        Self::open_with_endpoints(vid, pid, DEFAULT_ENDPOINT_OUT, DEFAULT_ENDPOINT_IN)
    }

    pub fn open_with_endpoints(vid: u16, pid: u16, ep_out: u8, ep_in: u8) -> crate::Result<Self> {
        let info = nusb::list_devices()
            .map_err(Error::transport)?
            .find(|dev| dev.vendor_id() == vid && dev.product_id() == pid)
            .ok_or_else(|| Error::InvalidAddress(format!("no USB device {:04x}:{:04x}", vid, pid)))?;
        let device = info.open().map_err(Error::transport)?;
        let interface = device.claim_interface(0).map_err(Error::transport)?;
        Ok(UsbAdapter {
            interface,
            ep_out,
            ep_in,
        })
    }

    pub async fn write_bulk(&mut self, data: &[u8]) -> crate::Result<()> {
        log::debug!("usb write: {:02x?}", data);
        self.interface
            .bulk_out(self.ep_out, data.to_vec())
            .await
            .into_result()
            .map_err(|x| Error::other(anyhow!(x)))?;
        Ok(())
    }

    /// Read one transfer of at most `max_len` bytes.
    pub async fn read_bulk(&mut self, max_len: usize, deadline: Duration) -> crate::Result<Vec<u8>> {
        let fut = self.interface.bulk_in(self.ep_in, RequestBuffer::new(max_len));
        match timeout(deadline, fut).await {
            Ok(completion) => completion.into_result().map_err(|x| Error::other(anyhow!(x))),
            Err(_) => Err(Error::Timeout),
        }
    }
}

#[async_trait]
impl Adapter for UsbAdapter {
    async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        self.write_bulk(data).await
    }

    async fn read_until(&mut self, _term: u8, _timeout: Duration) -> crate::Result<Vec<u8>> {
        Err(Error::NotSupported)
    }

    async fn read_exact(&mut self, count: usize, timeout: Duration) -> crate::Result<Vec<u8>> {
        self.read_bulk(count, timeout).await
    }

    async fn drain(&mut self) -> crate::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}
