//! TCP socket transport for instruments with a raw SCPI-over-Ethernet port.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::instrument::Adapter;
use crate::iotask::{IoHandler, IoTask};
use crate::protocol::bytestream;
use crate::Error;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(500);
const MAX_CONNECT_ATTEMPTS: u32 = 3;

pub enum Request {
    Write(Vec<u8>),
    ReadUntil { term: u8, timeout: Duration },
    ReadExact { count: usize, timeout: Duration },
    Drain,
}

pub enum Response {
    Done,
    Data(Vec<u8>),
}

struct Handler {
    addr: SocketAddr,
    connection_timeout: Duration,
    stream: Option<TcpStream>,
}

async fn connect(addr: SocketAddr, deadline: Duration) -> crate::Result<TcpStream> {
    let fut = async move { TcpStream::connect(&addr).await.map_err(Error::transport) };
    match timeout(deadline, fut).await {
        Ok(x) => x,
        Err(_) => Err(Error::transport(io::Error::new(
            io::ErrorKind::TimedOut,
            "connection timed out",
        ))),
    }
}

impl Handler {
    async fn dispatch(stream: &mut TcpStream, req: &Request) -> crate::Result<Response> {
        match req {
            Request::Write(data) => bytestream::write_all(stream, data).await.map(|_| Response::Done),
            Request::ReadUntil { term, timeout } => bytestream::read_to_term(stream, *term, *timeout)
                .await
                .map(Response::Data),
            Request::ReadExact { count, timeout } => {
                bytestream::read_exact_timeout(stream, *count, *timeout)
                    .await
                    .map(Response::Data)
            }
            Request::Drain => bytestream::read_all(stream)
                .await
                .map(Response::Data)
                .map_err(Error::transport),
        }
    }
}

#[async_trait]
impl IoHandler for Handler {
    type Request = Request;
    type Response = Response;

    async fn handle(&mut self, req: Self::Request) -> crate::Result<Self::Response> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut stream = match self.stream.take() {
                Some(stream) => stream,
                None => match connect(self.addr, self.connection_timeout).await {
                    Ok(stream) => stream,
                    Err(x) => {
                        if !x.should_retry() || attempts >= MAX_CONNECT_ATTEMPTS {
                            return Err(x);
                        }
                        continue;
                    }
                },
            };
            match Self::dispatch(&mut stream, &req).await {
                Ok(ret) => {
                    self.stream.replace(stream);
                    return Ok(ret);
                }
                Err(x) => {
                    // a fresh connection might fix connection-shaped errors
                    if !x.should_retry() || attempts >= MAX_CONNECT_ATTEMPTS {
                        if matches!(x, Error::Timeout) {
                            self.stream.replace(stream);
                        }
                        return Err(x);
                    }
                }
            }
        }
    }
}

pub struct TcpAdapter {
    inner: IoTask<Handler>,
}

impl TcpAdapter {
    pub fn new(addr: SocketAddr) -> Self {
        Self::with_connection_timeout(addr, DEFAULT_CONNECTION_TIMEOUT)
    }

    pub fn with_connection_timeout(addr: SocketAddr, connection_timeout: Duration) -> Self {
        let handler = Handler {
            addr,
            connection_timeout,
            stream: None,
        };
        Self {
            inner: IoTask::spawn(handler),
        }
    }
}

#[async_trait]
impl Adapter for TcpAdapter {
    async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        self.inner.request(Request::Write(data.to_vec())).await.map(|_| ())
    }

    async fn read_until(&mut self, term: u8, timeout: Duration) -> crate::Result<Vec<u8>> {
        match self.inner.request(Request::ReadUntil { term, timeout }).await? {
            Response::Data(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    async fn read_exact(&mut self, count: usize, timeout: Duration) -> crate::Result<Vec<u8>> {
        match self.inner.request(Request::ReadExact { count, timeout }).await? {
            Response::Data(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }

    async fn drain(&mut self) -> crate::Result<Vec<u8>> {
        match self.inner.request(Request::Drain).await? {
            Response::Data(x) => Ok(x),
            _ => Err(Error::Disconnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn query_against_local_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 64];
            let n = sock.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"*IDN?\n");
            sock.write_all(b"ACME,4000,0,1.0\n").await.unwrap();
        });

        let mut adapter = TcpAdapter::new(addr);
        adapter.write(b"*IDN?\n").await.unwrap();
        let reply = adapter.read_until(b'\n', Duration::from_secs(1)).await.unwrap();
        assert_eq!(reply, b"ACME,4000,0,1.0");
    }
}
