//! Keithley 224 programmable current source and 236 source measure unit.
//!
//! Both speak the pre-SCPI Keithley dialect over GPIB: single letter
//! commands with numeric fields, executed by a trailing `X`. The
//! instruments never echo; state is read back by addressing them to talk
//! (`status`) or with the `U` machine status words on the 236.

use labctl::property::{strict_discrete_set, strict_range, strict_step_range};
use labctl::{setting, scpi_codes};
use labctl::{Address, Comm, Connection};

/// Output range codes of the 224.
pub const CURRENT_RANGES_224: [u8; 6] = [0, 5, 6, 7, 8, 9];

/// Parsed talk data of the 224: source current, voltage limit and dwell
/// time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceStatus {
    pub current: f64,
    pub voltage_limit: f64,
    pub dwell_time: f64,
}

/// Strip the letter prefix (`NDCI`, `V`, `W`) off a talk data field.
fn parse_prefixed(field: &str) -> labctl::Result<f64> {
    let field = field.trim();
    let start = field
        .find(|c: char| c == '+' || c == '-' || c.is_ascii_digit())
        .ok_or_else(|| labctl::Error::UnexpectedResponse(format!("no value in {:?}", field)))?;
    field[start..]
        .parse()
        .map_err(|_| labctl::Error::UnexpectedResponse(format!("bad value in {:?}", field)))
}

pub struct Keithley224 {
    conn: Connection,
}

impl Comm for Keithley224 {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Keithley224 {
    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Self::new(Connection::open(addr).await?))
    }

    pub fn new(conn: Connection) -> Self {
        Keithley224 { conn }
    }

    /// Program the SRQ (service request) mask, 0–31.
    pub async fn set_srq_mode(&mut self, mode: u8) -> labctl::Result<()> {
        let mode = strict_range(mode, 0, 31)?;
        self.write(&format!("M{}X", mode)).await
    }

    /// Select the output range by code: 0 is autorange, 5–9 pick the
    /// 10 µA to 100 mA ranges.
    pub async fn set_current_range(&mut self, range: u8) -> labctl::Result<()> {
        let range = strict_discrete_set(range, &CURRENT_RANGES_224)?;
        self.write(&format!("R{}X", range)).await
    }

    /// Program the source current in amps; ±101 mA in 5 nA steps.
    pub async fn set_current(&mut self, amps: f64) -> labctl::Result<()> {
        let amps = strict_step_range(amps, -101e-3, 101e-3, 5e-9)?;
        self.write(&format!("I{}X", amps)).await
    }

    /// Program the compliance voltage limit in volts, 0–105.
    pub async fn set_voltage_limit(&mut self, volts: u8) -> labctl::Result<()> {
        let volts = strict_range(volts, 0, 105)?;
        self.write(&format!("V{}X", volts)).await
    }

    /// Program the dwell time in seconds, 50 ms to 999.9 s in 1 ms steps.
    pub async fn set_dwell_time(&mut self, seconds: f64) -> labctl::Result<()> {
        let seconds = strict_step_range(seconds, 50e-3, 999.9, 1e-3)?;
        self.write(&format!("W{}X", seconds)).await
    }

    /// Set the data string terminator character. Capital letters, digits
    /// and the characters used in readings are reserved.
    pub async fn set_data_terminator(&mut self, term: char) -> labctl::Result<()> {
        if term.is_ascii_uppercase() || term.is_ascii_digit() || "+-/.e ".contains(term) || !term.is_ascii() {
            return Err(labctl::Error::Argument(format!("reserved terminator {:?}", term)));
        }
        self.write(&format!("Y{}X", term)).await
    }

    setting! {
        /// Show the source current on the front panel.
        pub async fn display_current(&mut self), "D0X"
    }

    setting! {
        /// Show the voltage limit on the front panel.
        pub async fn display_voltage_limit(&mut self), "D1X"
    }

    setting! {
        /// Show the dwell time on the front panel.
        pub async fn display_dwell_time(&mut self), "D2X"
    }

    pub async fn output_on(&mut self) -> labctl::Result<()> {
        self.write("F1X").await
    }

    pub async fn output_off(&mut self) -> labctl::Result<()> {
        self.write("F0X").await
    }

    /// Include the I/V/W prefixes in talk data (the power-on default).
    pub async fn talk_prefix_on(&mut self) -> labctl::Result<()> {
        self.write("G0X").await
    }

    pub async fn talk_prefix_off(&mut self) -> labctl::Result<()> {
        self.write("G1X").await
    }

    /// Assert EOI after the last byte of a transfer (the default).
    pub async fn eoi_on(&mut self) -> labctl::Result<()> {
        self.write("K0X").await
    }

    pub async fn eoi_off(&mut self) -> labctl::Result<()> {
        self.write("K1X").await
    }

    /// Address the instrument to talk: current, voltage limit and dwell
    /// time, with prefixes unless disabled.
    pub async fn status(&mut self) -> labctl::Result<String> {
        self.read().await
    }

    /// Like [`status`](Self::status), but with the three prefixed fields
    /// parsed into numbers. Requires the talk prefixes to be on.
    pub async fn readings(&mut self) -> labctl::Result<SourceStatus> {
        let status = self.status().await?;
        let fields: Vec<&str> = status.split(',').collect();
        if fields.len() != 3 {
            return Err(labctl::Error::UnexpectedResponse(format!(
                "expected 3 talk fields, got {:?}",
                status
            )));
        }
        Ok(SourceStatus {
            current: parse_prefixed(fields[0])?,
            voltage_limit: parse_prefixed(fields[1])?,
            dwell_time: parse_prefixed(fields[2])?,
        })
    }
}

/// Source selection of the 236.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    VoltageDc,
    VoltageSweep,
    CurrentDc,
    CurrentSweep,
}

impl Source {
    fn fields(&self) -> (u8, u8) {
        match self {
            Source::VoltageDc => (0, 0),
            Source::VoltageSweep => (0, 1),
            Source::CurrentDc => (1, 0),
            Source::CurrentSweep => (1, 1),
        }
    }
}

/// A/D integration time of the 236.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integration {
    Fast4Digit,
    Medium5Digit,
    LineCycle60Hz,
    LineCycle50Hz,
}

scpi_codes!(Integration {
    Fast4Digit => "0",
    Medium5Digit => "1",
    LineCycle60Hz => "2",
    LineCycle50Hz => "3",
});

/// Measurement filter of the 236: readings averaged per point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Disabled,
    Readings2,
    Readings4,
    Readings8,
    Readings16,
    Readings32,
}

scpi_codes!(Filter {
    Disabled => "0",
    Readings2 => "1",
    Readings4 => "2",
    Readings8 => "3",
    Readings16 => "4",
    Readings32 => "5",
});

pub struct Keithley236 {
    conn: Connection,
}

impl Comm for Keithley236 {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Keithley236 {
    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Self::new(Connection::open(addr).await?))
    }

    pub fn new(conn: Connection) -> Self {
        Keithley236 { conn }
    }

    /// Select source and function.
    pub async fn set_source(&mut self, source: Source) -> labctl::Result<()> {
        let (src, func) = source.fields();
        self.write(&format!("F{},{}X", src, func)).await
    }

    /// Program the output level and range. In dc mode this is the source
    /// level, in sweep mode the sweep bias.
    pub async fn set_output_level(&mut self, level: f64, range: u8) -> labctl::Result<()> {
        self.write(&format!("B{},{},0X", level, range)).await
    }

    /// Program the compliance level and measurement range.
    pub async fn set_compliance(&mut self, level: f64, range: u8) -> labctl::Result<()> {
        self.write(&format!("L{},{}X", level, range)).await
    }

    /// Select the output data format word.
    pub async fn set_data_format(&mut self, format: u8) -> labctl::Result<()> {
        self.write(&format!("G{}X", format)).await
    }

    /// Set the measurement filter.
    pub async fn set_filter(&mut self, filter: Filter) -> labctl::Result<()> {
        self.write(&format!("P{}X", labctl::ScpiValue::format(&filter))).await
    }

    /// Set the A/D integration time.
    pub async fn set_integration(&mut self, integration: Integration) -> labctl::Result<()> {
        self.write(&format!("S{}X", labctl::ScpiValue::format(&integration)))
            .await
    }

    /// Enable or disable the external trigger lines.
    pub async fn set_trigger_control(&mut self, enabled: bool) -> labctl::Result<()> {
        self.write(if enabled { "R1X" } else { "R0X" }).await
    }

    /// Enable or disable the fixed settling delay for resistive loads.
    pub async fn set_default_delay(&mut self, enabled: bool) -> labctl::Result<()> {
        self.write(if enabled { "W1X" } else { "W0X" }).await
    }

    setting! {
        /// Trigger a measurement immediately.
        pub async fn immediate_trigger(&mut self), "H0X"
    }

    /// Operate (`true`) puts the programmed bias on the output; standby
    /// (`false`) disconnects it.
    pub async fn set_operate(&mut self, operate: bool) -> labctl::Result<()> {
        self.write(if operate { "N1X" } else { "N0X" }).await
    }

    setting! {
        /// Restore factory defaults.
        pub async fn factory_defaults(&mut self), "J0X"
    }

    setting! {
        /// Run the memory self test.
        pub async fn memory_test(&mut self), "J1X"
    }

    setting! {
        /// Run the display test.
        pub async fn display_test(&mut self), "J2X"
    }

    /// Machine status word `U<n>`; `0` reports the model and revision.
    pub async fn config(&mut self, word: u8) -> labctl::Result<String> {
        let word = strict_range(word, 0, 11)?;
        self.ask(&format!("U{}X", word)).await
    }

    /// Address the instrument to talk and return the pending reading.
    pub async fn status(&mut self) -> labctl::Result<String> {
        self.read().await
    }

    /// Safe standby: output off.
    pub async fn shutdown(&mut self) -> labctl::Result<()> {
        self.set_operate(false).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    #[tokio::test]
    async fn current_source_commands() {
        let mock = MockAdapter::new()
            .expect_write("R7X\n")
            .expect_write("I0.001X\n")
            .expect_write("V10X\n")
            .expect_write("F1X\n");
        let mut dev = Keithley224::new(Connection::with_adapter(Box::new(mock)));
        dev.set_current_range(7).await.unwrap();
        dev.set_current(1e-3).await.unwrap();
        dev.set_voltage_limit(10).await.unwrap();
        dev.output_on().await.unwrap();

        assert!(dev.set_current_range(3).await.is_err());
        assert!(dev.set_current(0.2).await.is_err());
        assert!(dev.set_data_terminator('A').await.is_err());
    }

    #[tokio::test]
    async fn talk_data_parses_into_readings() {
        let mock = MockAdapter::new().expect("G0X\n", "NDCI+1.234E-03,V+1.0E+01,W+5.0E-02\n");
        let mut dev = Keithley224::new(Connection::with_adapter(Box::new(mock)));
        dev.talk_prefix_on().await.unwrap();
        let readings = dev.readings().await.unwrap();
        assert_eq!(readings.current, 1.234e-3);
        assert_eq!(readings.voltage_limit, 10.0);
        assert_eq!(readings.dwell_time, 0.05);
    }

    #[test]
    fn prefix_stripping() {
        assert_eq!(parse_prefixed("NDCI+1.234E-03").unwrap(), 1.234e-3);
        assert_eq!(parse_prefixed("W+5.0E-02").unwrap(), 0.05);
        assert!(parse_prefixed("NDCI").is_err());
    }

    #[tokio::test]
    async fn smu_commands() {
        let mock = MockAdapter::new()
            .expect_write("F1,0X\n")
            .expect_write("B0.005,0,0X\n")
            .expect_write("P3X\n")
            .expect_write("N1X\n")
            .expect("U0X\n", "236A01\n");
        let mut dev = Keithley236::new(Connection::with_adapter(Box::new(mock)));
        dev.set_source(Source::CurrentDc).await.unwrap();
        dev.set_output_level(5e-3, 0).await.unwrap();
        dev.set_filter(Filter::Readings8).await.unwrap();
        dev.set_operate(true).await.unwrap();
        assert_eq!(dev.config(0).await.unwrap(), "236A01");
    }
}
