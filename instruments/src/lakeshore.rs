//! Lake Shore model 211 temperature monitor.
//!
//! The monitor talks 9600 baud, 7 data bits, odd parity. Readings are
//! available in kelvin, celsius, fahrenheit or raw sensor units.
//!
//! ```no_run
//! # async fn demo() -> labctl::Result<()> {
//! use labctl::Address;
//! use labctl_instruments::lakeshore::LakeShore211;
//!
//! let mut monitor = LakeShore211::open(&Address::parse("serial::/dev/ttyUSB0::9600::7O1")?).await?;
//! println!("{} K", monitor.temperature_kelvin().await?);
//! # Ok(()) }
//! ```

use labctl::property::strict_range;
use labctl::transport::serial::{DataBits, Parity, SerialParams, StopBits};
use labctl::{control, measurement, scpi_codes, setting};
use labctl::{Address, Comm, Connection, Error, Scpi, ScpiValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogMode {
    Voltage,
    Current,
}

scpi_codes!(AnalogMode {
    Voltage => "0",
    Current => "1",
});

/// Full-scale range of the analog output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalogRange {
    To20K,
    To100K,
    To200K,
    To325K,
    To475K,
    To1000K,
}

scpi_codes!(AnalogRange {
    To20K => "0",
    To100K => "1",
    To200K => "2",
    To325K => "3",
    To475K => "4",
    To1000K => "5",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayUnits {
    Kelvin,
    Celsius,
    Sensor,
    Fahrenheit,
}

scpi_codes!(DisplayUnits {
    Kelvin => "0",
    Celsius => "1",
    Sensor => "2",
    Fahrenheit => "3",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayMode {
    Off,
    On,
    Alarms,
}

scpi_codes!(RelayMode {
    Off => "0",
    On => "1",
    Alarms => "2",
});

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmConfig {
    pub on: bool,
    pub high_value: f64,
    pub low_value: f64,
    pub deadband: f64,
    pub latch: bool,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        AlarmConfig {
            on: true,
            high_value: 270.0,
            low_value: 0.0,
            deadband: 0.0,
            latch: false,
        }
    }
}

pub struct LakeShore211 {
    conn: Connection,
}

impl Comm for LakeShore211 {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Scpi for LakeShore211 {}

impl LakeShore211 {
    /// Port settings the monitor ships with.
    pub fn default_params() -> SerialParams {
        SerialParams::new(9600, DataBits::Seven, Parity::Odd, StopBits::One)
    }

    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Self::new(Connection::open(addr).await?))
    }

    pub fn new(conn: Connection) -> Self {
        LakeShore211 { conn }
    }

    control! {
        /// Analog output mode and range, as configured.
        pub async fn analog_configuration(&mut self) -> (AnalogMode, AnalogRange), "ANALOG?",
        /// Configure the analog output mode and range.
        pub async fn set_analog_configuration(&mut self, value: (AnalogMode, AnalogRange)), "ANALOG {}",
    }

    measurement! {
        /// Analog output level in percent of full scale.
        pub async fn analog_out(&mut self) -> f64, "AOUT?"
    }

    control! {
        /// Input data shown on the display.
        pub async fn display_units(&mut self) -> DisplayUnits, "DISPFLD?",
        /// Select the input data to display.
        pub async fn set_display_units(&mut self, value: DisplayUnits), "DISPFLD {}",
    }

    measurement! {
        /// Sensor temperature in celsius.
        pub async fn temperature_celsius(&mut self) -> f64, "CRDG?"
    }

    measurement! {
        /// Sensor temperature in fahrenheit.
        pub async fn temperature_fahrenheit(&mut self) -> f64, "FRDG?"
    }

    measurement! {
        /// Raw sensor reading in sensor units.
        pub async fn temperature_sensor(&mut self) -> f64, "SRDG?"
    }

    measurement! {
        /// Sensor temperature in kelvin.
        pub async fn temperature_kelvin(&mut self) -> f64, "KRDG?"
    }

    /// Relay mode of relay 1 (low alarm) or 2 (high alarm).
    pub async fn relay(&mut self, number: u8) -> labctl::Result<RelayMode> {
        let number = strict_range(number, 1, 2)?;
        let reply = self.ask(&format!("RELAY? {}", number)).await?;
        RelayMode::parse(reply.trim())
    }

    pub async fn set_relay(&mut self, number: u8, mode: RelayMode) -> labctl::Result<()> {
        let number = strict_range(number, 1, 2)?;
        self.write(&format!("RELAY {},{}", number, mode.format())).await
    }

    /// Configure the input alarm.
    pub async fn set_alarm(&mut self, config: AlarmConfig) -> labctl::Result<()> {
        let cmd = format!(
            "ALARM {},{},{},{},{}",
            config.on as u8, config.high_value, config.low_value, config.deadband, config.latch as u8
        );
        self.write(&cmd).await
    }

    /// Current alarm configuration and state.
    pub async fn alarm(&mut self) -> labctl::Result<AlarmConfig> {
        let fields = self.values("ALARM?").await?;
        if fields.len() != 5 {
            return Err(Error::UnexpectedResponse(format!("ALARM? returned {:?}", fields)));
        }
        Ok(AlarmConfig {
            on: bool::parse(&fields[0])?,
            high_value: f64::parse(&fields[1])?,
            low_value: f64::parse(&fields[2])?,
            deadband: f64::parse(&fields[3])?,
            latch: bool::parse(&fields[4])?,
        })
    }

    setting! {
        /// Clear a latched alarm.
        pub async fn reset_alarm(&mut self), "ALMRST"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn device(mock: MockAdapter) -> LakeShore211 {
        LakeShore211::new(Connection::with_adapter(Box::new(mock)))
    }

    #[tokio::test]
    async fn temperature_readings() {
        let mock = MockAdapter::new()
            .expect("KRDG?\n", "+077.35\n")
            .expect("CRDG?\n", "-195.80\n");
        let mut dev = device(mock);
        assert_eq!(dev.temperature_kelvin().await.unwrap(), 77.35);
        assert_eq!(dev.temperature_celsius().await.unwrap(), -195.8);
    }

    #[tokio::test]
    async fn analog_configuration_roundtrip() {
        let mock = MockAdapter::new()
            .expect("ANALOG?\n", "1,3\n")
            .expect_write("ANALOG 0,5\n");
        let mut dev = device(mock);
        let (mode, range) = dev.analog_configuration().await.unwrap();
        assert_eq!(mode, AnalogMode::Current);
        assert_eq!(range, AnalogRange::To325K);
        dev.set_analog_configuration((AnalogMode::Voltage, AnalogRange::To1000K))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn display_units_mapping() {
        let mock = MockAdapter::new()
            .expect("DISPFLD?\n", "2\n")
            .expect_write("DISPFLD 3\n");
        let mut dev = device(mock);
        assert_eq!(dev.display_units().await.unwrap(), DisplayUnits::Sensor);
        dev.set_display_units(DisplayUnits::Fahrenheit).await.unwrap();
    }

    #[tokio::test]
    async fn alarm_roundtrip() {
        let mock = MockAdapter::new()
            .expect_write("ALARM 1,270,0,0,0\n")
            .expect("ALARM?\n", "1,+270.0,+000.0,+000.0,0\n")
            .expect_write("ALMRST\n");
        let mut dev = device(mock);
        dev.set_alarm(AlarmConfig::default()).await.unwrap();
        let status = dev.alarm().await.unwrap();
        assert!(status.on);
        assert_eq!(status.high_value, 270.0);
        assert!(!status.latch);
        dev.reset_alarm().await.unwrap();
    }

    #[tokio::test]
    async fn relay_validates_number() {
        let mut dev = device(MockAdapter::new());
        assert!(dev.set_relay(3, RelayMode::On).await.is_err());
    }
}
