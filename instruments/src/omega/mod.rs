//! Omega CS8DPT universal benchtop temperature controller.
//!
//! The controller is a Modbus device; properties live in typed registers
//! (see [`registers`]) rather than command strings.
//!
//! ```no_run
//! # async fn demo() -> labctl::Result<()> {
//! use labctl::Address;
//! use labctl_instruments::omega::Cs8Dpt;
//!
//! let mut ctl = Cs8Dpt::open(&Address::parse("modbus::rtu::/dev/ttyACM0::9600::8N1::1")?)?;
//! ctl.set_setpoint_1(42.0).await?;
//! ctl.run().await?;
//! println!("{} C", ctl.thermocouple().await?);
//! # Ok(()) }
//! ```

use labctl::transport::modbus::ModbusClient;
use labctl::{Address, Error};

use registers::{Kind, Register};

pub mod registers;

/// System running state reported by the `RUN_MODE` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Load,
    Idle,
    InputAdjust,
    ControlAdjust,
    Modify,
    Wait,
    Run,
    Standby,
    Stop,
    Pause,
    Fault,
    Shutdown,
    Autotune,
}

impl RunMode {
    pub fn code(&self) -> u16 {
        match self {
            RunMode::Load => 0,
            RunMode::Idle => 1,
            RunMode::InputAdjust => 2,
            RunMode::ControlAdjust => 3,
            RunMode::Modify => 4,
            RunMode::Wait => 5,
            RunMode::Run => 6,
            RunMode::Standby => 7,
            RunMode::Stop => 8,
            RunMode::Pause => 9,
            RunMode::Fault => 10,
            RunMode::Shutdown => 11,
            RunMode::Autotune => 12,
        }
    }

    pub fn from_code(code: u16) -> labctl::Result<Self> {
        let mode = match code {
            0 => RunMode::Load,
            1 => RunMode::Idle,
            2 => RunMode::InputAdjust,
            3 => RunMode::ControlAdjust,
            4 => RunMode::Modify,
            5 => RunMode::Wait,
            6 => RunMode::Run,
            7 => RunMode::Standby,
            8 => RunMode::Stop,
            9 => RunMode::Pause,
            10 => RunMode::Fault,
            11 => RunMode::Shutdown,
            12 => RunMode::Autotune,
            other => return Err(Error::UnexpectedResponse(format!("unknown run mode {}", other))),
        };
        Ok(mode)
    }
}

/// Value read from or written to a register, matching its [`Kind`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Float(f32),
    Long(u32),
    Word(u16),
}

pub struct Cs8Dpt {
    client: ModbusClient,
}

impl Cs8Dpt {
    pub fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Cs8Dpt {
            client: ModbusClient::open(addr)?,
        })
    }

    pub fn new(client: ModbusClient) -> Self {
        Cs8Dpt { client }
    }

    /// Read any mapped register.
    pub async fn read(&mut self, reg: &Register) -> labctl::Result<Value> {
        match reg.kind {
            Kind::Float => self.client.read_f32(reg.addr).await.map(Value::Float),
            Kind::Long => self.client.read_u32(reg.addr).await.map(Value::Long),
            Kind::Word => {
                let regs = self.client.read_holding(reg.addr, 1).await?;
                regs.first()
                    .copied()
                    .map(Value::Word)
                    .ok_or_else(|| Error::UnexpectedResponse("empty register read".to_string()))
            }
        }
    }

    /// Write any mapped register; rejects read-only registers and values
    /// whose type does not match the register kind.
    pub async fn write(&mut self, reg: &Register, value: Value) -> labctl::Result<()> {
        if !reg.writable() {
            return Err(Error::Argument(format!("register {} is read-only", reg.name)));
        }
        match (reg.kind, value) {
            (Kind::Float, Value::Float(x)) => self.client.write_f32(reg.addr, x).await,
            (Kind::Long, Value::Long(x)) => self.client.write_u32(reg.addr, x).await,
            (Kind::Word, Value::Word(x)) => self.client.write_registers(reg.addr, &[x]).await,
            (kind, value) => Err(Error::Argument(format!(
                "register {} holds {:?}, got {:?}",
                reg.name, kind, value
            ))),
        }
    }

    async fn read_float(&mut self, reg: &Register) -> labctl::Result<f32> {
        self.client.read_f32(reg.addr).await
    }

    /// Active value of setpoint 1.
    pub async fn setpoint_1(&mut self) -> labctl::Result<f32> {
        self.read_float(&registers::CURRENT_SETPOINT_1).await
    }

    pub async fn set_setpoint_1(&mut self, value: f32) -> labctl::Result<()> {
        self.client.write_f32(registers::CURRENT_SETPOINT_1.addr, value).await
    }

    /// Active value of setpoint 2.
    pub async fn setpoint_2(&mut self) -> labctl::Result<f32> {
        self.read_float(&registers::CURRENT_SETPOINT_2).await
    }

    pub async fn set_setpoint_2(&mut self, value: f32) -> labctl::Result<()> {
        self.client.write_f32(registers::CURRENT_SETPOINT_2.addr, value).await
    }

    /// Current process (thermocouple) value.
    pub async fn thermocouple(&mut self) -> labctl::Result<f32> {
        self.read_float(&registers::CURRENT_INPUT_VALUE).await
    }

    pub async fn run_mode(&mut self) -> labctl::Result<RunMode> {
        match self.read(&registers::RUN_MODE).await? {
            Value::Word(code) => RunMode::from_code(code),
            _ => Err(Error::UnexpectedResponse("bad run mode register".to_string())),
        }
    }

    pub async fn set_run_mode(&mut self, mode: RunMode) -> labctl::Result<()> {
        self.client
            .write_registers(registers::RUN_MODE.addr, &[mode.code()])
            .await
    }

    pub async fn idle(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Idle).await
    }

    pub async fn wait(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Wait).await
    }

    pub async fn run(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Run).await
    }

    pub async fn standby(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Standby).await
    }

    pub async fn stop(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Stop).await
    }

    pub async fn pause(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Pause).await
    }

    pub async fn shutdown(&mut self) -> labctl::Result<()> {
        self.set_run_mode(RunMode::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_mode_codes_roundtrip() {
        for code in 0..=12 {
            let mode = RunMode::from_code(code).unwrap();
            assert_eq!(mode.code(), code);
        }
        assert!(RunMode::from_code(13).is_err());
    }

    #[test]
    fn register_access_flags() {
        assert!(!registers::CURRENT_INPUT_VALUE.writable());
        assert!(registers::CURRENT_SETPOINT_1.writable());
        assert!(registers::ABSOLUTE_ALARM_1_HIGH.writable());
    }
}
