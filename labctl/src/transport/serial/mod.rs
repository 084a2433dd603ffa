//! Serial port transport, including GPIB devices behind a Prologix dongle.
//!
//! A [`SerialLink`] is a clonable handle to the I/O task owning the port.
//! Cloning it is how several GPIB instruments share one dongle: each
//! [`PrologixAdapter`] carries its own bus address but the port itself is
//! opened once.

use std::time::Duration;

use async_trait::async_trait;
use tokio::task;
use tokio_serial::{SerialPortBuilderExt, SerialStream};

use crate::instrument::Adapter;
use crate::iotask::{IoHandler, IoTask};
use crate::protocol::{bytestream, prologix};
use crate::Error;

pub use params::{DataBits, Parity, SerialParams, StopBits};

pub mod params;

#[cfg(target_os = "linux")]
mod linux_low_latency;

pub enum Request {
    Write(Vec<u8>),
    ReadUntil { term: u8, timeout: Duration },
    ReadExact { count: usize, timeout: Duration },
    Drain,
    PrologixSend { gpib_addr: u8, line: String },
    PrologixRead { gpib_addr: u8, timeout: Duration },
}

pub enum Response {
    Done,
    Data(Vec<u8>),
    Line(String),
}

struct Handler {
    path: String,
    params: SerialParams,
    port: Option<SerialStream>,
    prologix_initialized: bool,
}

async fn open_port(path: &str, params: &SerialParams) -> crate::Result<SerialStream> {
    log::debug!("opening {}", path);
    let port = tokio_serial::new(path, params.baud)
        .data_bits(params.data_bits.into())
        .parity(params.parity.into())
        .stop_bits(params.stop_bits.into())
        .open_native_async()
        .map_err(|x| Error::other(anyhow::anyhow!(x)))?;

    #[cfg(target_os = "linux")]
    {
        if let Err(x) = linux_low_latency::apply_low_latency(&port) {
            log::warn!("cannot set ASYNC_LOW_LATENCY on {}: {}", path, x);
        }
    }
    Ok(port)
}

impl Handler {
    async fn dispatch(&mut self, port: &mut SerialStream, req: Request) -> crate::Result<Response> {
        match req {
            Request::Write(data) => {
                self.prologix_initialized = false;
                bytestream::write_all(port, &data).await.map(|_| Response::Done)
            }
            Request::ReadUntil { term, timeout } => {
                self.prologix_initialized = false;
                bytestream::read_to_term(port, term, timeout).await.map(Response::Data)
            }
            Request::ReadExact { count, timeout } => {
                self.prologix_initialized = false;
                bytestream::read_exact_timeout(port, count, timeout)
                    .await
                    .map(Response::Data)
            }
            Request::Drain => bytestream::read_all(port)
                .await
                .map(Response::Data)
                .map_err(Error::transport),
            Request::PrologixSend { gpib_addr, line } => {
                if !self.prologix_initialized {
                    prologix::init(port).await?;
                    self.prologix_initialized = true;
                }
                prologix::send(port, gpib_addr, &line).await.map(|_| Response::Done)
            }
            Request::PrologixRead { gpib_addr, timeout } => {
                if !self.prologix_initialized {
                    prologix::init(port).await?;
                    self.prologix_initialized = true;
                }
                prologix::read(port, gpib_addr, timeout).await.map(Response::Line)
            }
        }
    }
}

#[async_trait]
impl IoHandler for Handler {
    type Request = Request;
    type Response = Response;

    async fn handle(&mut self, req: Self::Request) -> crate::Result<Self::Response> {
        let mut port = match self.port.take() {
            Some(port) => port,
            None => {
                self.prologix_initialized = false;
                open_port(&self.path, &self.params).await?
            }
        };
        let ret = self.dispatch(&mut port, req).await;
        match &ret {
            // protocol-level failures keep the port; transport errors drop
            // it so the next request reopens
            Ok(_) | Err(Error::Timeout) | Err(Error::UnexpectedResponse(_)) | Err(Error::Argument(_)) => {
                self.port.replace(port);
            }
            Err(_) => {
                self.prologix_initialized = false;
            }
        }
        ret
    }
}

/// Clonable handle to the task owning one serial port. The port is opened
/// lazily on the first request.
#[derive(Clone)]
pub struct SerialLink {
    inner: IoTask<Handler>,
}

impl SerialLink {
    pub fn open(path: &str, params: SerialParams) -> Self {
        let handler = Handler {
            path: path.to_string(),
            params,
            port: None,
            prologix_initialized: false,
        };
        SerialLink {
            inner: IoTask::spawn(handler),
        }
    }

    pub async fn request(&mut self, req: Request) -> crate::Result<Response> {
        self.inner.request(req).await
    }

    pub fn close(&mut self) {
        self.inner.disconnect();
    }
}

/// Plain byte-stream adapter over a serial port.
pub struct SerialAdapter {
    link: SerialLink,
}

impl SerialAdapter {
    pub fn new(path: &str, params: SerialParams) -> Self {
        Self {
            link: SerialLink::open(path, params),
        }
    }
}

#[async_trait]
impl Adapter for SerialAdapter {
    async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        self.link.request(Request::Write(data.to_vec())).await.map(|_| ())
    }

    async fn read_until(&mut self, term: u8, timeout: Duration) -> crate::Result<Vec<u8>> {
        match self.link.request(Request::ReadUntil { term, timeout }).await? {
            Response::Data(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    async fn read_exact(&mut self, count: usize, timeout: Duration) -> crate::Result<Vec<u8>> {
        match self.link.request(Request::ReadExact { count, timeout }).await? {
            Response::Data(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    async fn drain(&mut self) -> crate::Result<Vec<u8>> {
        match self.link.request(Request::Drain).await? {
            Response::Data(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }
}

/// Adapter for one GPIB device behind a Prologix dongle.
pub struct PrologixAdapter {
    link: SerialLink,
    gpib_addr: u8,
}

impl PrologixAdapter {
    /// Port settings the dongle enumerates with.
    pub fn default_params() -> SerialParams {
        SerialParams::new(9600, DataBits::Eight, Parity::None, StopBits::One)
    }

    pub fn new(path: &str, gpib_addr: u8) -> Self {
        Self {
            link: SerialLink::open(path, Self::default_params()),
            gpib_addr,
        }
    }

    /// Another device on the same bus, sharing the serial port.
    pub fn sibling(&self, gpib_addr: u8) -> Self {
        Self {
            link: self.link.clone(),
            gpib_addr,
        }
    }
}

#[async_trait]
impl Adapter for PrologixAdapter {
    async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        let line = String::from_utf8(data.to_vec())
            .map_err(|_| Error::argument("GPIB commands must be ASCII"))?;
        let req = Request::PrologixSend {
            gpib_addr: self.gpib_addr,
            line: line.trim_end_matches(&['\r', '\n'][..]).to_string(),
        };
        self.link.request(req).await.map(|_| ())
    }

    async fn read_until(&mut self, _term: u8, timeout: Duration) -> crate::Result<Vec<u8>> {
        let req = Request::PrologixRead {
            gpib_addr: self.gpib_addr,
            timeout,
        };
        match self.link.request(req).await? {
            Response::Line(x) => Ok(x.into_bytes()),
            _ => Err(Error::Disconnected),
        }
    }

    async fn read_exact(&mut self, _count: usize, _timeout: Duration) -> crate::Result<Vec<u8>> {
        Err(Error::NotSupported)
    }

    async fn drain(&mut self) -> crate::Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Enumerate the serial ports known to the system.
pub async fn list_ports() -> crate::Result<Vec<String>> {
    task::spawn_blocking(|| match tokio_serial::available_ports() {
        Ok(ports) => Ok(ports.into_iter().map(|x| x.port_name).collect()),
        Err(err) => Err(Error::other(anyhow::anyhow!(err.description))),
    })
    .await
    .map_err(|_| Error::Disconnected)?
}
