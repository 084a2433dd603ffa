//! Superlogics 8017 8-channel analog input module.
//!
//! Protocol-wise the 8017 is identical to the MCC modules; see
//! [`crate::mcc::DaqModule`] for the command set.

use std::ops::{Deref, DerefMut};

use labctl::{Address, Connection};

use crate::mcc::DaqModule;

pub struct SuperLogics8017 {
    inner: DaqModule,
}

impl SuperLogics8017 {
    pub fn new(conn: Connection, address: u8) -> Self {
        SuperLogics8017 {
            inner: DaqModule::new(conn, address),
        }
    }

    pub async fn open(addr: &Address, address: u8) -> labctl::Result<Self> {
        Ok(SuperLogics8017 {
            inner: DaqModule::open(addr, address).await?,
        })
    }
}

impl Deref for SuperLogics8017 {
    type Target = DaqModule;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl DerefMut for SuperLogics8017 {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    #[tokio::test]
    async fn delegates_to_the_module_protocol() {
        let mock = MockAdapter::new().expect("#02\r", ">+001.25+002.50\r");
        let conn = Connection::with_adapter(Box::new(mock)).terminators(b'\r', b'\r');
        let mut dev = SuperLogics8017::new(conn, 2);
        assert_eq!(dev.measure_all_channels().await.unwrap(), "+001.25+002.50");
    }
}
