//! Modbus transport, TCP or RTU over a serial line.
//!
//! Unlike the byte-stream transports this one is register-level: drivers
//! built on it (e.g. the Omega temperature controllers) address typed
//! registers instead of command strings.

use byteorder::{BigEndian, ByteOrder};
use async_trait::async_trait;
use tokio_modbus::client::{rtu, tcp, Context, Reader, Writer};
use tokio_modbus::slave::Slave;
use tokio_serial::SerialPortBuilderExt;

use crate::address::ModbusLink;
use crate::iotask::{IoHandler, IoTask};
use crate::transport::serial;
use crate::Error;

pub enum Request {
    ReadHolding { addr: u16, cnt: u16 },
    ReadInput { addr: u16, cnt: u16 },
    ReadCoils { addr: u16, cnt: u16 },
    WriteRegisters { addr: u16, data: Vec<u16> },
    WriteCoils { addr: u16, values: Vec<bool> },
}

pub enum Response {
    Done,
    Registers(Vec<u16>),
    Bits(Vec<bool>),
}

struct Handler {
    link: ModbusLink,
    unit: u8,
    ctx: Option<Context>,
}

impl Handler {
    async fn connect(link: &ModbusLink, unit: u8) -> crate::Result<Context> {
        match link {
            ModbusLink::Tcp { addr } => tcp::connect_slave(*addr, Slave(unit))
                .await
                .map_err(Error::transport),
            ModbusLink::Rtu { path, params } => {
                let port = tokio_serial::new(path, params.baud)
                    .data_bits(params.data_bits.into())
                    .parity(params.parity.into())
                    .stop_bits(params.stop_bits.into())
                    .open_native_async()
                    .map_err(|x| Error::other(anyhow::anyhow!(x)))?;
                rtu::connect_slave(port, Slave(unit))
                    .await
                    .map_err(Error::transport)
            }
        }
    }

    async fn dispatch(ctx: &mut Context, req: &Request) -> crate::Result<Response> {
        match req {
            Request::ReadHolding { addr, cnt } => ctx
                .read_holding_registers(*addr, *cnt)
                .await
                .map(Response::Registers)
                .map_err(Error::transport),
            Request::ReadInput { addr, cnt } => ctx
                .read_input_registers(*addr, *cnt)
                .await
                .map(Response::Registers)
                .map_err(Error::transport),
            Request::ReadCoils { addr, cnt } => ctx
                .read_coils(*addr, *cnt)
                .await
                .map(Response::Bits)
                .map_err(Error::transport),
            Request::WriteRegisters { addr, data } => ctx
                .write_multiple_registers(*addr, data)
                .await
                .map(|_| Response::Done)
                .map_err(Error::transport),
            Request::WriteCoils { addr, values } => ctx
                .write_multiple_coils(*addr, values)
                .await
                .map(|_| Response::Done)
                .map_err(Error::transport),
        }
    }
}

#[async_trait]
impl IoHandler for Handler {
    type Request = Request;
    type Response = Response;

    async fn handle(&mut self, req: Self::Request) -> crate::Result<Self::Response> {
        let mut ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => Self::connect(&self.link, self.unit).await?,
        };
        let ret = Self::dispatch(&mut ctx, &req).await;
        if ret.is_ok() {
            self.ctx.replace(ctx);
        }
        ret
    }
}

/// Handle to one Modbus unit.
#[derive(Clone)]
pub struct ModbusClient {
    inner: IoTask<Handler>,
}

impl ModbusClient {
    pub fn new(link: ModbusLink, unit: u8) -> Self {
        let handler = Handler { link, unit, ctx: None };
        Self {
            inner: IoTask::spawn(handler),
        }
    }

    pub fn open(addr: &crate::Address) -> crate::Result<Self> {
        match addr {
            crate::Address::Modbus { link, unit } => Ok(Self::new(link.clone(), *unit)),
            _ => Err(Error::argument(format!("not a modbus address: {}", addr))),
        }
    }

    pub async fn read_holding(&mut self, addr: u16, cnt: u16) -> crate::Result<Vec<u16>> {
        match self.inner.request(Request::ReadHolding { addr, cnt }).await? {
            Response::Registers(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    pub async fn read_input(&mut self, addr: u16, cnt: u16) -> crate::Result<Vec<u16>> {
        match self.inner.request(Request::ReadInput { addr, cnt }).await? {
            Response::Registers(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    pub async fn read_coils(&mut self, addr: u16, cnt: u16) -> crate::Result<Vec<bool>> {
        match self.inner.request(Request::ReadCoils { addr, cnt }).await? {
            Response::Bits(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    pub async fn write_registers(&mut self, addr: u16, data: &[u16]) -> crate::Result<()> {
        self.inner
            .request(Request::WriteRegisters {
                addr,
                data: data.to_vec(),
            })
            .await
            .map(|_| ())
    }

    pub async fn write_coils(&mut self, addr: u16, values: &[bool]) -> crate::Result<()> {
        self.inner
            .request(Request::WriteCoils {
                addr,
                values: values.to_vec(),
            })
            .await
            .map(|_| ())
    }

    /// Read an IEEE 754 float stored big-endian in two consecutive registers.
    pub async fn read_f32(&mut self, addr: u16) -> crate::Result<f32> {
        let regs = self.read_holding(addr, 2).await?;
        Ok(BigEndian::read_f32(&regs_to_bytes(&regs)))
    }

    pub async fn write_f32(&mut self, addr: u16, value: f32) -> crate::Result<()> {
        let mut bytes = [0u8; 4];
        BigEndian::write_f32(&mut bytes, value);
        self.write_registers(addr, &bytes_to_regs(&bytes)).await
    }

    /// Read a 32-bit integer stored big-endian in two consecutive registers.
    pub async fn read_u32(&mut self, addr: u16) -> crate::Result<u32> {
        let regs = self.read_holding(addr, 2).await?;
        Ok(BigEndian::read_u32(&regs_to_bytes(&regs)))
    }

    pub async fn write_u32(&mut self, addr: u16, value: u32) -> crate::Result<()> {
        let mut bytes = [0u8; 4];
        BigEndian::write_u32(&mut bytes, value);
        self.write_registers(addr, &bytes_to_regs(&bytes)).await
    }
}

fn regs_to_bytes(regs: &[u16]) -> Vec<u8> {
    let mut bytes = vec![0u8; regs.len() * 2];
    BigEndian::write_u16_into(regs, &mut bytes);
    bytes
}

fn bytes_to_regs(bytes: &[u8]) -> Vec<u16> {
    let mut regs = vec![0u16; bytes.len() / 2];
    BigEndian::read_u16_into(bytes, &mut regs);
    regs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_register_packing() {
        let mut bytes = [0u8; 4];
        BigEndian::write_f32(&mut bytes, 21.5);
        let regs = bytes_to_regs(&bytes);
        assert_eq!(regs.len(), 2);
        let back = BigEndian::read_f32(&regs_to_bytes(&regs));
        assert_eq!(back, 21.5);
    }
}
