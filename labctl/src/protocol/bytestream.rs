//! Operations on byte-stream instruments, i.e. TCP streams or serial ports.
//!
//! Everything here works on any `AsyncRead + AsyncWrite` stream, so the same
//! code drives a `TcpStream` and a `SerialStream`.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time;

use crate::Error;

struct ReadAll<'a, T: AsyncRead + Unpin> {
    inner: &'a mut T,
}

impl<'a, T: AsyncRead + Unpin> Future for ReadAll<'a, T> {
    type Output = io::Result<Vec<u8>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut ret = Vec::new();
        loop {
            let mut buf_data = [0_u8; 1024];
            let mut buf = ReadBuf::new(&mut buf_data);
            match Pin::new(&mut self.inner).poll_read(cx, &mut buf) {
                Poll::Ready(Ok(())) => {
                    if buf.filled().is_empty() {
                        return Poll::Ready(Ok(ret));
                    }
                    ret.extend_from_slice(buf.filled());
                }
                Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                Poll::Pending => return Poll::Ready(Ok(ret)),
            }
        }
    }
}

/// Drain whatever is currently buffered on the stream without blocking.
/// Used to discard stale input before a query.
pub async fn read_all<T: AsyncRead + Unpin>(stream: &mut T) -> io::Result<Vec<u8>> {
    ReadAll { inner: stream }.await
}

pub async fn write_all<T: AsyncWrite + Unpin>(stream: &mut T, data: &[u8]) -> crate::Result<()> {
    log::debug!("write: {:?}", data);
    stream.write_all(data).await.map_err(Error::transport)
}

/// Write a line, appending the terminator.
pub async fn write_line<T: AsyncWrite + Unpin>(stream: &mut T, line: &str, term: u8) -> crate::Result<()> {
    check_term(term)?;
    let mut data = line.as_bytes().to_vec();
    data.push(term);
    write_all(stream, &data).await
}

pub async fn read_exact_timeout<T: AsyncRead + Unpin>(
    stream: &mut T,
    count: usize,
    timeout: Duration,
) -> crate::Result<Vec<u8>> {
    log::debug!("read exactly {} bytes", count);
    let mut data = vec![0; count];
    let fut = stream.read_exact(data.as_mut_slice());
    match time::timeout(timeout, fut).await {
        Ok(x) => {
            x.map_err(Error::transport)?;
        }
        Err(_) => return Err(Error::Timeout),
    }
    Ok(data)
}

/// Read until the terminator shows up. The terminator is not part of the
/// returned data.
pub async fn read_to_term<T: AsyncRead + Unpin>(
    stream: &mut T,
    term: u8,
    timeout: Duration,
) -> crate::Result<Vec<u8>> {
    check_term(term)?;
    let fut = async {
        let mut ret = Vec::new();
        loop {
            let x = stream.read_u8().await.map_err(Error::transport)?;
            if x == term {
                break;
            }
            ret.push(x);
        }
        Ok(ret)
    };
    match time::timeout(timeout, fut).await {
        Ok(x) => x,
        Err(_) => Err(Error::Timeout),
    }
}

/// Read a line and decode it as UTF-8.
pub async fn read_line<T: AsyncRead + Unpin>(stream: &mut T, term: u8, timeout: Duration) -> crate::Result<String> {
    let data = read_to_term(stream, term, timeout).await?;
    String::from_utf8(data).map_err(|x| Error::unexpected(format!("not UTF-8: {:?}", x.as_bytes())))
}

/// Discard stale input, send a line and read the reply line.
pub async fn query_line<T: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut T,
    line: &str,
    term: u8,
    timeout: Duration,
) -> crate::Result<String> {
    read_all(stream).await.map_err(Error::transport)?;
    write_line(stream, line, term).await?;
    read_line(stream, term, timeout).await
}

fn check_term(term: u8) -> crate::Result<()> {
    if term == 0 || term > 127 {
        Err(Error::argument(format!("invalid terminator: {}", term)))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn line_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_line(&mut a, "*IDN?", b'\n').await.unwrap();
        let received = read_line(&mut b, b'\n', Duration::from_millis(100)).await.unwrap();
        assert_eq!(received, "*IDN?");
    }

    #[tokio::test]
    async fn read_to_term_strips_terminator() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_all(&mut a, b"+1.25E-3\r").await.unwrap();
        let data = read_to_term(&mut b, b'\r', Duration::from_millis(100)).await.unwrap();
        assert_eq!(data, b"+1.25E-3");
    }

    #[tokio::test]
    async fn read_times_out() {
        let (_a, mut b) = tokio::io::duplex(256);
        let err = read_to_term(&mut b, b'\n', Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn rejects_binary_terminator() {
        let (mut a, _b) = tokio::io::duplex(256);
        assert!(write_line(&mut a, "x", 0).await.is_err());
        assert!(write_line(&mut a, "x", 200).await.is_err());
    }
}
