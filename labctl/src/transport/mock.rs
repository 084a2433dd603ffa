//! Scripted adapter for driver tests.
//!
//! A [`MockAdapter`] is loaded with expected-write/reply pairs. Each write
//! is checked against the script in order; the paired reply becomes
//! available to the following reads. Reads with nothing queued fail with
//! `Error::Timeout`, like a silent instrument would.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;

use crate::instrument::Adapter;
use crate::Error;

struct Exchange {
    expect: Vec<u8>,
    reply: Vec<u8>,
}

#[derive(Default)]
pub struct MockAdapter {
    script: VecDeque<Exchange>,
    pending: Vec<u8>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expect `write` and queue `reply` for the next read.
    pub fn expect(mut self, write: impl AsRef<[u8]>, reply: impl AsRef<[u8]>) -> Self {
        self.script.push_back(Exchange {
            expect: write.as_ref().to_vec(),
            reply: reply.as_ref().to_vec(),
        });
        self
    }

    /// Expect `write` with no reply.
    pub fn expect_write(self, write: impl AsRef<[u8]>) -> Self {
        self.expect(write, [])
    }

    pub fn done(&self) -> bool {
        self.script.is_empty()
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn write(&mut self, data: &[u8]) -> crate::Result<()> {
        let exchange = self
            .script
            .pop_front()
            .ok_or_else(|| Error::unexpected(format!("unscripted write: {:?}", String::from_utf8_lossy(data))))?;
        if data != exchange.expect.as_slice() {
            return Err(Error::unexpected(format!(
                "wrote {:?}, script expected {:?}",
                String::from_utf8_lossy(data),
                String::from_utf8_lossy(&exchange.expect)
            )));
        }
        self.pending.extend_from_slice(&exchange.reply);
        Ok(())
    }

    async fn read_until(&mut self, term: u8, _timeout: Duration) -> crate::Result<Vec<u8>> {
        match self.pending.iter().position(|x| *x == term) {
            Some(pos) => {
                let ret = self.pending[..pos].to_vec();
                self.pending.drain(..=pos);
                Ok(ret)
            }
            None => Err(Error::Timeout),
        }
    }

    async fn read_exact(&mut self, count: usize, _timeout: Duration) -> crate::Result<Vec<u8>> {
        if self.pending.is_empty() {
            return Err(Error::Timeout);
        }
        let n = count.min(self.pending.len());
        Ok(self.pending.drain(..n).collect())
    }

    async fn drain(&mut self) -> crate::Result<Vec<u8>> {
        Ok(std::mem::take(&mut self.pending))
    }
}
