//! Hewlett-Packard 4192A LF impedance analyzer.
//!
//! The 4192A is write-only for nearly all of its state: settings are
//! programmed with letter-coded commands and cannot be queried back, so the
//! driver shadows everything it programs in a [`Settings`] struct and
//! answers readback from there. Measurements are fetched with `EX`, whose
//! reply carries a letter code prefix per value (`NZFN+02.817E+03,...`).

use labctl::property::{strict_discrete_set, strict_range};
use labctl::{Address, Comm, Connection, Error};

/// Primary display function, command `A1`–`A7`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayA {
    ImpedanceAdmittance = 1,
    ResistanceConductance = 2,
    Inductance = 3,
    Capacitance = 4,
    BMinusADb = 5,
    ALevel = 6,
    BLevel = 7,
}

/// Secondary display function, command `B1`–`B7`. Which codes are
/// meaningful depends on the selected display A function.
pub type DisplayB = u8;

/// Combined display A/B selections the front panel offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionMode {
    ZyThetaDegrees,
    ZyThetaRadians,
    RgXb,
    InductanceQ,
    InductanceD,
    InductanceRg,
    CapacitanceQ,
    CapacitanceD,
    CapacitanceRg,
    BaGroupDelay,
    BaThetaDegrees,
    BaThetaRadians,
    ALevel,
    BLevel,
}

impl FunctionMode {
    /// The (display A, display B) code pair of this mode.
    pub fn codes(&self) -> (DisplayA, DisplayB) {
        match self {
            FunctionMode::ZyThetaDegrees => (DisplayA::ImpedanceAdmittance, 1),
            FunctionMode::ZyThetaRadians => (DisplayA::ImpedanceAdmittance, 2),
            FunctionMode::RgXb => (DisplayA::ResistanceConductance, 1),
            FunctionMode::InductanceQ => (DisplayA::Inductance, 1),
            FunctionMode::InductanceD => (DisplayA::Inductance, 2),
            FunctionMode::InductanceRg => (DisplayA::Inductance, 3),
            FunctionMode::CapacitanceQ => (DisplayA::Capacitance, 1),
            FunctionMode::CapacitanceD => (DisplayA::Capacitance, 2),
            FunctionMode::CapacitanceRg => (DisplayA::Capacitance, 3),
            FunctionMode::BaGroupDelay => (DisplayA::BMinusADb, 1),
            FunctionMode::BaThetaDegrees => (DisplayA::BMinusADb, 2),
            FunctionMode::BaThetaRadians => (DisplayA::BMinusADb, 3),
            FunctionMode::ALevel => (DisplayA::ALevel, 1),
            FunctionMode::BLevel => (DisplayA::BLevel, 1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deviation {
    Off,
    Delta,
    DeltaPercent,
}

impl Deviation {
    fn code(&self) -> char {
        match self {
            Deviation::Off => 'N',
            Deviation::Delta => 'D',
            Deviation::DeltaPercent => 'P',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitMode {
    Auto = 1,
    Series = 2,
    Parallel = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Internal = 1,
    External = 2,
    HoldManual = 3,
}

/// Everything the driver has programmed since power-on; the instrument
/// itself cannot be asked.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub spot_frequency: f64,
    pub osc_level: f64,
    pub start_frequency: f64,
    pub end_frequency: f64,
    pub step_frequency: f64,
    pub spot_bias: f64,
    pub start_bias: f64,
    pub end_bias: f64,
    pub display_a: DisplayA,
    pub display_b: DisplayB,
    pub display_a_deviation: Deviation,
    pub display_b_deviation: Deviation,
    pub dc_bias: bool,
    pub zero_open: bool,
    pub zero_short: bool,
    pub average: bool,
    pub high_speed: bool,
    pub log_sweep: bool,
    pub auto_sweep: bool,
    pub circuit_mode: CircuitMode,
    pub zy_range: u8,
    pub trigger: Trigger,
    pub data_ready: bool,
    pub data_format_abc: bool,
}

impl Default for Settings {
    /// The power-on state of the instrument.
    fn default() -> Self {
        Settings {
            spot_frequency: 100.0,
            osc_level: 1.0,
            start_frequency: 0.005,
            end_frequency: 13000.0,
            step_frequency: 1.0,
            spot_bias: 0.0,
            start_bias: -35.0,
            end_bias: 35.0,
            display_a: DisplayA::ImpedanceAdmittance,
            display_b: 1,
            display_a_deviation: Deviation::Off,
            display_b_deviation: Deviation::Off,
            dc_bias: false,
            zero_open: false,
            zero_short: false,
            average: false,
            high_speed: false,
            log_sweep: false,
            auto_sweep: false,
            circuit_mode: CircuitMode::Auto,
            zy_range: 7,
            trigger: Trigger::Internal,
            data_ready: false,
            data_format_abc: false,
        }
    }
}

/// One value of an `EX` reply, with its letter code (e.g. `NZFN`).
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub code: String,
    pub value: f64,
}

/// Split a reply field like `NZFN+02.817E+03` into code and value.
fn interpret_output(field: &str) -> labctl::Result<Reading> {
    let field = field.trim();
    let split = field
        .find(|c: char| !c.is_ascii_uppercase())
        .ok_or_else(|| Error::UnexpectedResponse(format!("no value in {:?}", field)))?;
    let (code, number) = field.split_at(split);
    if code.is_empty() {
        return Err(Error::UnexpectedResponse(format!("no status code in {:?}", field)));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| Error::UnexpectedResponse(format!("bad value in {:?}", field)))?;
    Ok(Reading {
        code: code.to_string(),
        value,
    })
}

pub struct Hp4192a {
    conn: Connection,
    settings: Settings,
}

impl Comm for Hp4192a {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Hp4192a {
    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Self::new(Connection::open(addr).await?))
    }

    pub fn new(conn: Connection) -> Self {
        Hp4192a {
            conn,
            settings: Settings::default(),
        }
    }

    /// The programmed state, as tracked by the driver.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Range/zero/bias commands are rejected while display A shows one of
    /// the gain/level functions (A5–A7).
    fn check_display_allows_range(&self) -> labctl::Result<()> {
        if (self.settings.display_a as u8) < 5 {
            Ok(())
        } else {
            Err(Error::Argument(format!(
                "not available with display A function {:?}",
                self.settings.display_a
            )))
        }
    }

    pub async fn set_display_a(&mut self, function: DisplayA) -> labctl::Result<()> {
        self.write(&format!("A{}", function as u8)).await?;
        self.settings.display_a = function;
        Ok(())
    }

    /// Select the display B function; which codes apply depends on the
    /// display A function, see the operating manual.
    pub async fn set_display_b(&mut self, function: DisplayB) -> labctl::Result<()> {
        let function = strict_range(function, 1, 7)?;
        self.write(&format!("B{}", function)).await?;
        self.settings.display_b = function;
        Ok(())
    }

    /// Program both displays from a front panel function combination.
    pub async fn set_function_mode(&mut self, mode: FunctionMode) -> labctl::Result<()> {
        let (a, b) = mode.codes();
        self.set_display_a(a).await?;
        self.set_display_b(b).await
    }

    pub async fn set_display_a_deviation(&mut self, deviation: Deviation) -> labctl::Result<()> {
        self.write(&format!("A{}", deviation.code())).await?;
        self.settings.display_a_deviation = deviation;
        Ok(())
    }

    pub async fn set_display_b_deviation(&mut self, deviation: Deviation) -> labctl::Result<()> {
        self.write(&format!("B{}", deviation.code())).await?;
        self.settings.display_b_deviation = deviation;
        Ok(())
    }

    /// Select the ZY measurement range, 1–7, or 8 for autoranging.
    pub async fn set_zy_range(&mut self, range: u8) -> labctl::Result<()> {
        self.check_display_allows_range()?;
        let range = strict_range(range, 1, 8)?;
        self.write(&format!("R{}", range)).await?;
        self.settings.zy_range = range;
        Ok(())
    }

    /// Program the oscillator level, 5 mV to 1.1 V.
    pub async fn set_osc_level(&mut self, volts: f64) -> labctl::Result<()> {
        let volts = strict_range(volts, 0.005, 1.100)?;
        self.write(&format!("OL{}EN", volts)).await?;
        self.settings.osc_level = volts;
        Ok(())
    }

    /// Program the spot frequency in kilohertz, 0.0005–13000.
    pub async fn set_spot_frequency(&mut self, khz: f64) -> labctl::Result<()> {
        let khz = strict_range(khz, 0.0005, 13000.0)?;
        self.write(&format!("FR{}EN", khz)).await?;
        self.settings.spot_frequency = khz;
        Ok(())
    }

    /// Program the sweep start frequency in kilohertz.
    pub async fn set_start_frequency(&mut self, khz: f64) -> labctl::Result<()> {
        let khz = strict_range(khz, 0.0005, 13000.0)?;
        self.write(&format!("TF{}EN", khz)).await?;
        self.settings.start_frequency = khz;
        Ok(())
    }

    /// Program the sweep end frequency in kilohertz.
    pub async fn set_end_frequency(&mut self, khz: f64) -> labctl::Result<()> {
        let khz = strict_range(khz, 0.0005, 13000.0)?;
        self.write(&format!("PF{}EN", khz)).await?;
        self.settings.end_frequency = khz;
        Ok(())
    }

    /// Program the sweep step frequency in kilohertz.
    pub async fn set_step_frequency(&mut self, khz: f64) -> labctl::Result<()> {
        let khz = strict_range(khz, 0.0005, 13000.0)?;
        self.write(&format!("SF{}EN", khz)).await?;
        self.settings.step_frequency = khz;
        Ok(())
    }

    /// Program the spot bias voltage, ±35 V.
    pub async fn set_spot_bias(&mut self, volts: f64) -> labctl::Result<()> {
        let volts = strict_range(volts, -35.0, 35.0)?;
        self.write(&format!("BI{}EN", volts)).await?;
        self.settings.spot_bias = volts;
        Ok(())
    }

    /// Program the sweep start bias, ±35 V.
    pub async fn set_start_bias(&mut self, volts: f64) -> labctl::Result<()> {
        let volts = strict_range(volts, -35.0, 35.0)?;
        self.write(&format!("TB{}EN", volts)).await?;
        self.settings.start_bias = volts;
        Ok(())
    }

    /// Program the sweep end bias, ±35 V.
    pub async fn set_end_bias(&mut self, volts: f64) -> labctl::Result<()> {
        let volts = strict_range(volts, -35.0, 35.0)?;
        self.write(&format!("PB{}EN", volts)).await?;
        self.settings.end_bias = volts;
        Ok(())
    }

    /// Auto (`true`) or manual (`false`) sweep.
    pub async fn set_auto_sweep(&mut self, auto: bool) -> labctl::Result<()> {
        self.write(if auto { "W1" } else { "W0" }).await?;
        self.settings.auto_sweep = auto;
        Ok(())
    }

    /// Step a manual sweep up.
    pub async fn manual_sweep_up(&mut self) -> labctl::Result<()> {
        self.write("W2").await
    }

    /// Step a manual sweep down.
    pub async fn manual_sweep_down(&mut self) -> labctl::Result<()> {
        self.write("W4").await
    }

    pub async fn set_log_sweep(&mut self, log: bool) -> labctl::Result<()> {
        self.write(if log { "G1" } else { "G0" }).await?;
        self.settings.log_sweep = log;
        Ok(())
    }

    /// Turn the DC bias output off. There is no command to switch it on;
    /// it engages when a bias value is programmed.
    pub async fn dc_bias_off(&mut self) -> labctl::Result<()> {
        self.check_display_allows_range()?;
        self.write("I0").await?;
        self.settings.dc_bias = false;
        Ok(())
    }

    /// Open-circuit zero offset adjustment.
    pub async fn set_zero_open(&mut self, on: bool) -> labctl::Result<()> {
        self.check_display_allows_range()?;
        self.write(if on { "ZO1" } else { "ZO0" }).await?;
        self.settings.zero_open = on;
        Ok(())
    }

    /// Short-circuit zero offset adjustment.
    pub async fn set_zero_short(&mut self, on: bool) -> labctl::Result<()> {
        self.check_display_allows_range()?;
        self.write(if on { "ZS1" } else { "ZS0" }).await?;
        self.settings.zero_short = on;
        Ok(())
    }

    pub async fn set_average(&mut self, on: bool) -> labctl::Result<()> {
        self.write(if on { "V1" } else { "V0" }).await?;
        self.settings.average = on;
        Ok(())
    }

    pub async fn set_high_speed(&mut self, on: bool) -> labctl::Result<()> {
        self.write(if on { "H1" } else { "H0" }).await?;
        self.settings.high_speed = on;
        Ok(())
    }

    /// `false` transfers displays A/B, `true` additionally display C.
    pub async fn set_data_format_abc(&mut self, abc: bool) -> labctl::Result<()> {
        self.write(if abc { "F1" } else { "F0" }).await?;
        self.settings.data_format_abc = abc;
        Ok(())
    }

    pub async fn set_data_ready(&mut self, on: bool) -> labctl::Result<()> {
        self.write(if on { "D1" } else { "D0" }).await?;
        self.settings.data_ready = on;
        Ok(())
    }

    pub async fn set_circuit_mode(&mut self, mode: CircuitMode) -> labctl::Result<()> {
        self.write(&format!("C{}", mode as u8)).await?;
        self.settings.circuit_mode = mode;
        Ok(())
    }

    pub async fn set_trigger(&mut self, trigger: Trigger) -> labctl::Result<()> {
        self.write(&format!("T{}", trigger as u8)).await?;
        self.settings.trigger = trigger;
        Ok(())
    }

    /// Monitor the test level in volts (`'V'`) or milliamps (`'A'`).
    pub async fn set_test_level_monitor(&mut self, code: char) -> labctl::Result<()> {
        let code = strict_discrete_set(code, &['V', 'A'])?;
        self.check_display_allows_range()?;
        self.write(&format!("T{}", code)).await
    }

    /// Run the instrument self test.
    pub async fn self_test(&mut self) -> labctl::Result<()> {
        self.write("S1").await
    }

    /// Abort the current sweep.
    pub async fn sweep_abort(&mut self) -> labctl::Result<()> {
        self.write("AB").await
    }

    /// Trigger a measurement without reading the result.
    pub async fn execute(&mut self) -> labctl::Result<()> {
        self.write("EX").await
    }

    /// Trigger a measurement and decode the two or three returned values.
    pub async fn execute_read(&mut self) -> labctl::Result<Vec<Reading>> {
        let fields = self.values("EX").await?;
        if fields.len() < 2 || fields.len() > 3 {
            return Err(Error::UnexpectedResponse(format!(
                "expected 2 or 3 readings, got {:?}",
                fields
            )));
        }
        fields.iter().map(|x| interpret_output(x)).collect()
    }

    /// Abort any sweep before letting go of the connection.
    pub async fn shutdown(&mut self) -> labctl::Result<()> {
        self.sweep_abort().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn analyzer(mock: MockAdapter) -> Hp4192a {
        Hp4192a::new(Connection::with_adapter(Box::new(mock)))
    }

    #[test]
    fn output_interpretation() {
        let reading = interpret_output("NZFN+02.817E+03").unwrap();
        assert_eq!(reading.code, "NZFN");
        assert_eq!(reading.value, 2817.0);

        let reading = interpret_output("K+01.000000").unwrap();
        assert_eq!(reading.code, "K");
        assert_eq!(reading.value, 1.0);

        assert!(interpret_output("+1.0").is_err());
        assert!(interpret_output("NZFN").is_err());
    }

    #[tokio::test]
    async fn settings_are_shadowed() {
        let mock = MockAdapter::new()
            .expect_write("FR1000.5EN\n")
            .expect_write("OL0.05EN\n")
            .expect_write("C2\n");
        let mut dev = analyzer(mock);
        dev.set_spot_frequency(1000.5).await.unwrap();
        dev.set_osc_level(0.05).await.unwrap();
        dev.set_circuit_mode(CircuitMode::Series).await.unwrap();
        assert_eq!(dev.settings().spot_frequency, 1000.5);
        assert_eq!(dev.settings().osc_level, 0.05);
        assert_eq!(dev.settings().circuit_mode, CircuitMode::Series);
        assert!(dev.set_spot_frequency(13001.0).await.is_err());
    }

    #[tokio::test]
    async fn range_commands_respect_display_mode() {
        let mock = MockAdapter::new()
            .expect_write("A6\n")
            .expect_write("A2\n")
            .expect_write("R8\n");
        let mut dev = analyzer(mock);
        dev.set_display_a(DisplayA::ALevel).await.unwrap();
        assert!(dev.set_zy_range(8).await.is_err());
        dev.set_display_a(DisplayA::ResistanceConductance).await.unwrap();
        dev.set_zy_range(8).await.unwrap();
    }

    #[tokio::test]
    async fn execute_read_decodes_fields() {
        let mock = MockAdapter::new().expect("EX\n", "NZFN+02.817E+03,NTDN-000.03E+00\n");
        let mut dev = analyzer(mock);
        let readings = dev.execute_read().await.unwrap();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].code, "NZFN");
        assert_eq!(readings[1].value, -0.03);
    }

    #[tokio::test]
    async fn function_modes_program_both_displays() {
        let mock = MockAdapter::new().expect_write("A4\n").expect_write("B2\n");
        let mut dev = analyzer(mock);
        dev.set_function_mode(FunctionMode::CapacitanceD).await.unwrap();
        assert_eq!(dev.settings().display_a, DisplayA::Capacitance);
        assert_eq!(dev.settings().display_b, 2);
    }
}
