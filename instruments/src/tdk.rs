//! TDK-Lambda Genesys series DC power supplies.
//!
//! The supplies sit on an RS-485 daisy chain; a unit is picked with
//! `ADR <n>` before use. Every non-query command is acknowledged with a
//! literal `OK`, which [`Comm::write`] is overridden to consume and check.
//! Model-specific output limits are carried by the driver value, so use
//! [`TdkLambda::gen40_38`] / [`TdkLambda::gen80_65`] rather than building
//! the struct by hand.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use labctl::property::{strict_discrete_set, strict_range, strict_step_range};
use labctl::{control, measurement, scpi_codes, setting};
use labctl::{Address, Comm, Connection, Error, ScpiValue};

const PROGRAM_STEP: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remote {
    Local,
    Remote,
    Lockout,
}

scpi_codes!(Remote {
    Local => "LOC",
    Remote => "REM",
    Lockout => "LLO",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    ConstantVoltage,
    ConstantCurrent,
    Off,
}

scpi_codes!(OutputMode {
    ConstantVoltage => "CV",
    ConstantCurrent => "CC",
    Off => "OFF",
});

/// The six readings of the `DVC?` display query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayReadings {
    pub measured_voltage: f64,
    pub programmed_voltage: f64,
    pub measured_current: f64,
    pub programmed_current: f64,
    pub over_voltage: f64,
    pub under_voltage: f64,
}

pub struct TdkLambda {
    conn: Connection,
    name: &'static str,
    voltage_limits: (f64, f64),
    current_limits: (f64, f64),
    over_voltage_limits: (f64, f64),
    under_voltage_limits: (f64, f64),
}

#[async_trait]
impl Comm for TdkLambda {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }

    // every non-query command is answered with "OK"; consume it here so it
    // does not linger in the read buffer
    async fn write(&mut self, cmd: &str) -> labctl::Result<()> {
        let reply = self.conn.ask(cmd).await?;
        if reply.trim() == "OK" {
            Ok(())
        } else {
            Err(Error::UnexpectedResponse(format!(
                "expected OK for {:?}, got {:?}",
                cmd, reply
            )))
        }
    }
}

impl TdkLambda {
    /// Genesys 40-38: 0–40 V, 0–38 A.
    pub fn gen40_38(conn: Connection) -> Self {
        TdkLambda {
            conn,
            name: "TDK-Lambda Gen40-38",
            voltage_limits: (0.0, 40.0),
            current_limits: (0.0, 38.0),
            over_voltage_limits: (2.0, 44.0),
            under_voltage_limits: (0.0, 38.0),
        }
    }

    /// Genesys 80-65: 0–80 V, 0–65 A.
    pub fn gen80_65(conn: Connection) -> Self {
        TdkLambda {
            conn,
            name: "TDK-Lambda Gen80-65",
            voltage_limits: (0.0, 80.0),
            current_limits: (0.0, 65.0),
            over_voltage_limits: (5.0, 88.0),
            under_voltage_limits: (0.0, 76.0),
        }
    }

    /// Open a Gen40-38 at the given serial address and daisy-chain unit.
    pub async fn open_gen40_38(addr: &Address, unit: u8) -> labctl::Result<Self> {
        let conn = Connection::open(addr).await?.terminators(b'\r', b'\r');
        let mut psu = Self::gen40_38(conn);
        psu.select_address(unit).await?;
        Ok(psu)
    }

    /// Open a Gen80-65 at the given serial address and daisy-chain unit.
    pub async fn open_gen80_65(addr: &Address, unit: u8) -> labctl::Result<Self> {
        let conn = Connection::open(addr).await?.terminators(b'\r', b'\r');
        let mut psu = Self::gen80_65(conn);
        psu.select_address(unit).await?;
        Ok(psu)
    }

    /// Address the supply on the daisy chain. Valid units are 0–30.
    pub async fn select_address(&mut self, unit: u8) -> labctl::Result<()> {
        let unit = strict_range(unit, 0, 30)?;
        self.write(&format!("ADR {}", unit)).await
    }

    /// Programmed output voltage in volts.
    pub async fn voltage(&mut self) -> labctl::Result<f64> {
        let reply = self.ask("PV?").await?;
        f64::parse(&reply)
    }

    /// Program the output voltage. Limits depend on the model; the
    /// programming resolution is 10 mV.
    pub async fn set_voltage(&mut self, volts: f64) -> labctl::Result<()> {
        let (min, max) = self.voltage_limits;
        let volts = strict_step_range(volts, min, max, PROGRAM_STEP)?;
        self.write(&format!("PV {}", volts)).await
    }

    measurement! {
        /// Measured output voltage in volts.
        pub async fn actual_voltage(&mut self) -> f64, "MV?"
    }

    /// Programmed output current in amps.
    pub async fn current(&mut self) -> labctl::Result<f64> {
        let reply = self.ask("PC?").await?;
        f64::parse(&reply)
    }

    /// Program the output current. Limits depend on the model; the
    /// programming resolution is 10 mA.
    pub async fn set_current(&mut self, amps: f64) -> labctl::Result<()> {
        let (min, max) = self.current_limits;
        let amps = strict_step_range(amps, min, max, PROGRAM_STEP)?;
        self.write(&format!("PC {}", amps)).await
    }

    measurement! {
        /// Measured output current in amps.
        pub async fn actual_current(&mut self) -> f64, "MC?"
    }

    measurement! {
        /// Regulation mode; `Off` while the output is disabled.
        pub async fn mode(&mut self) -> OutputMode, "MODE?"
    }

    /// The six display readings: measured and programmed voltage and
    /// current plus the protection set points.
    pub async fn display(&mut self) -> labctl::Result<DisplayReadings> {
        let fields = self.values("DVC?").await?;
        if fields.len() != 6 {
            return Err(Error::UnexpectedResponse(format!("DVC? returned {:?}", fields)));
        }
        Ok(DisplayReadings {
            measured_voltage: f64::parse(&fields[0])?,
            programmed_voltage: f64::parse(&fields[1])?,
            measured_current: f64::parse(&fields[2])?,
            programmed_current: f64::parse(&fields[3])?,
            over_voltage: f64::parse(&fields[4])?,
            under_voltage: f64::parse(&fields[5])?,
        })
    }

    measurement! {
        /// Complete status readout (voltages, currents, status and fault
        /// registers) as reported by `STT?`.
        pub async fn status(&mut self) -> String, "STT?"
    }

    control! {
        /// Low pass filter frequency of the measurement ADC in hertz.
        pub async fn pass_filter(&mut self) -> u8, "FILTER?",
        /// Set the ADC low pass filter; 18, 23 or 46 Hz.
        pub async fn set_pass_filter(&mut self, hz: u8), "FILTER {}",
        validate = |v| strict_discrete_set(v, &[18, 23, 46]),
    }

    /// Whether the output is enabled.
    pub async fn output(&mut self) -> labctl::Result<bool> {
        let reply = self.ask("OUT?").await?;
        bool::parse(&reply)
    }

    pub async fn set_output(&mut self, on: bool) -> labctl::Result<()> {
        self.write(if on { "OUT ON" } else { "OUT OFF" }).await
    }

    /// Whether fold back protection is armed.
    pub async fn foldback(&mut self) -> labctl::Result<bool> {
        let reply = self.ask("FLD?").await?;
        bool::parse(&reply)
    }

    pub async fn set_foldback(&mut self, armed: bool) -> labctl::Result<()> {
        self.write(if armed { "FLD ON" } else { "FLD OFF" }).await
    }

    control! {
        /// Additional fold back delay in 0.1 s units on top of the standard
        /// 250 ms.
        pub async fn foldback_delay(&mut self) -> u8, "FBD?",
        /// Add fold back delay; each count is 0.1 s.
        pub async fn set_foldback_delay(&mut self, counts: u8), "FBD {}",
    }

    setting! {
        /// Restore the standard 250 ms fold back delay.
        pub async fn reset_foldback_delay(&mut self), "FDBRST"
    }

    /// Over voltage protection set point in volts.
    pub async fn over_voltage(&mut self) -> labctl::Result<f64> {
        let reply = self.ask("OVP?").await?;
        f64::parse(&reply)
    }

    pub async fn set_over_voltage(&mut self, volts: f64) -> labctl::Result<()> {
        let (min, max) = self.over_voltage_limits;
        let volts = strict_step_range(volts, min, max, PROGRAM_STEP)?;
        self.write(&format!("OVP {}", volts)).await
    }

    setting! {
        /// Set the over voltage protection to its maximum level.
        pub async fn set_over_voltage_max(&mut self), "OVM"
    }

    /// Under voltage limit in volts.
    pub async fn under_voltage(&mut self) -> labctl::Result<f64> {
        let reply = self.ask("UVL?").await?;
        f64::parse(&reply)
    }

    pub async fn set_under_voltage(&mut self, volts: f64) -> labctl::Result<()> {
        let (min, max) = self.under_voltage_limits;
        let volts = strict_step_range(volts, min, max, PROGRAM_STEP)?;
        self.write(&format!("UVL {}", volts)).await
    }

    /// Whether the supply restores its output after a power cycle.
    pub async fn auto_restart(&mut self) -> labctl::Result<bool> {
        let reply = self.ask("AST?").await?;
        bool::parse(&reply)
    }

    pub async fn set_auto_restart(&mut self, on: bool) -> labctl::Result<()> {
        self.write(if on { "AST ON" } else { "AST OFF" }).await
    }

    control! {
        /// Remote operation mode.
        pub async fn remote(&mut self) -> Remote, "RMT?",
        /// Switch between local, remote and local-lockout operation.
        pub async fn set_remote(&mut self, mode: Remote), "RMT {}",
    }

    measurement! {
        /// Whether the multi-drop option is installed.
        pub async fn multidrop_capability(&mut self) -> bool, "MDAV?"
    }

    measurement! {
        /// Master/slave configuration; masters report 1–4, slaves 0.
        pub async fn master_slave_setting(&mut self) -> u8, "MS?"
    }

    measurement! {
        /// Instrument model, e.g. `LAMBDA, GEN40-38`.
        pub async fn identity(&mut self) -> String, "IDN?"
    }

    measurement! {
        /// Firmware version string.
        pub async fn version(&mut self) -> String, "REV?"
    }

    measurement! {
        /// Unit serial number.
        pub async fn serial_number(&mut self) -> String, "SN?"
    }

    measurement! {
        /// Date of the last factory test, `yyyy/mm/dd`.
        pub async fn last_test_date(&mut self) -> String, "DATE?"
    }

    setting! {
        /// Zero the FEVE and SEVE event registers.
        pub async fn clear_events(&mut self), "CLS"
    }

    setting! {
        /// Restart the supply.
        pub async fn restart(&mut self), "RST"
    }

    setting! {
        /// Store the present settings.
        pub async fn save(&mut self), "SAV"
    }

    setting! {
        /// Recall the stored settings.
        pub async fn recall(&mut self), "RCL"
    }

    /// Ramp the programmed current to `target` over `steps` linear steps,
    /// pausing between them.
    pub async fn ramp_to_current(&mut self, target: f64, steps: u32, pause: Duration) -> labctl::Result<()> {
        let start = self.current().await?;
        let steps = steps.max(2);
        for i in 1..=steps {
            let fraction = i as f64 / steps as f64;
            let amps = start + (target - start) * fraction;
            let amps = (amps / PROGRAM_STEP).round() * PROGRAM_STEP;
            self.set_current(amps).await?;
            sleep(pause).await;
        }
        Ok(())
    }

    /// Safety shutdown: ramp the current to zero, then disable the output.
    pub async fn shutdown(&mut self) -> labctl::Result<()> {
        log::info!("shutting down {}", self.name);
        self.ramp_to_current(0.0, 20, Duration::from_millis(200)).await?;
        self.set_output(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn psu(mock: MockAdapter) -> TdkLambda {
        TdkLambda::gen40_38(Connection::with_adapter(Box::new(mock)).terminators(b'\r', b'\r'))
    }

    #[tokio::test]
    async fn commands_check_the_ok_handshake() {
        let mock = MockAdapter::new()
            .expect("ADR 6\r", "OK\r")
            .expect("PV 12.5\r", "OK\r");
        let mut dev = psu(mock);
        dev.select_address(6).await.unwrap();
        dev.set_voltage(12.5).await.unwrap();
    }

    #[tokio::test]
    async fn missing_ok_is_an_error() {
        let mock = MockAdapter::new().expect("OUT ON\r", "E01\r");
        let mut dev = psu(mock);
        let err = dev.set_output(true).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse(_)));
    }

    #[tokio::test]
    async fn model_limits_are_enforced() {
        let mut dev = psu(MockAdapter::new());
        assert!(dev.set_voltage(40.5).await.is_err());
        assert!(dev.set_current(38.5).await.is_err());
        assert!(dev.set_voltage(12.345).await.is_err());

        let mock = MockAdapter::new().expect("PV 60\r", "OK\r");
        let mut dev = TdkLambda::gen80_65(Connection::with_adapter(Box::new(mock)).terminators(b'\r', b'\r'));
        dev.set_voltage(60.0).await.unwrap();
    }

    #[tokio::test]
    async fn queries_parse_replies() {
        let mock = MockAdapter::new()
            .expect("MV?\r", "39.95\r")
            .expect("MODE?\r", "CV\r")
            .expect("DVC?\r", "12.0,12.5,1.0,1.1,44.0,0.0\r");
        let mut dev = psu(mock);
        assert_eq!(dev.actual_voltage().await.unwrap(), 39.95);
        assert_eq!(dev.mode().await.unwrap(), OutputMode::ConstantVoltage);
        let display = dev.display().await.unwrap();
        assert_eq!(display.programmed_voltage, 12.5);
        assert_eq!(display.under_voltage, 0.0);
    }

    #[tokio::test]
    async fn ramp_steps_toward_target() {
        let mock = MockAdapter::new()
            .expect("PC?\r", "0\r")
            .expect("PC 0.5\r", "OK\r")
            .expect("PC 1\r", "OK\r");
        let mut dev = psu(mock);
        dev.ramp_to_current(1.0, 2, Duration::ZERO).await.unwrap();
    }
}
