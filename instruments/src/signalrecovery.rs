//! Signal Recovery DSP 7265 lock-in amplifier.
//!
//! Commands suffixed with `.` select the instrument's floating point mode,
//! so readings come back as plain decimals instead of fixed point codes.
//! The auxiliary ADC 3 is an integrating input: its reading accumulates
//! 50000 counts per volt-second and must be scaled by the integration time.

use std::time::Duration;

use tokio::time::sleep;

use labctl::property::{strict_range, strict_step_range};
use labctl::{control, measurement};
use labctl::{Address, Comm, Connection, ScpiValue};

const DAC_VOLTS: f64 = 12.0;
const DAC_STEP: f64 = 0.001;
const ADC3_COUNTS_PER_VOLT_SECOND: f64 = 50000.0;

pub struct Dsp7265 {
    conn: Connection,
}

impl Comm for Dsp7265 {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Dsp7265 {
    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Self::new(Connection::open(addr).await?))
    }

    pub fn new(conn: Connection) -> Self {
        Dsp7265 { conn }
    }

    measurement! {
        /// In-phase signal in volts.
        pub async fn x(&mut self) -> f64, "X."
    }

    measurement! {
        /// Quadrature signal in volts.
        pub async fn y(&mut self) -> f64, "Y."
    }

    measurement! {
        /// Both demodulator outputs in one transfer.
        pub async fn xy(&mut self) -> (f64, f64), "XY."
    }

    measurement! {
        /// Signal magnitude in volts.
        pub async fn magnitude(&mut self) -> f64, "MAG."
    }

    measurement! {
        /// Signal phase in degrees.
        pub async fn phase(&mut self) -> f64, "PHA."
    }

    measurement! {
        /// Reference frequency in hertz.
        pub async fn frequency(&mut self) -> f64, "FRQ."
    }

    control! {
        /// Full-scale sensitivity code, 1 (2 nV) through 27 (1 V).
        pub async fn sensitivity(&mut self) -> u8, "SEN",
        /// Select the full-scale sensitivity by code.
        pub async fn set_sensitivity(&mut self, code: u8), "SEN {}",
        validate = |v| strict_range(v, 1, 27),
    }

    control! {
        /// Output filter time constant code, 0 (10 µs) through 29 (100 ks).
        pub async fn time_constant(&mut self) -> u8, "TC",
        /// Select the output filter time constant by code.
        pub async fn set_time_constant(&mut self, code: u8), "TC {}",
        validate = |v| strict_range(v, 0, 29),
    }

    control! {
        /// Internal oscillator amplitude in volts rms.
        pub async fn oscillator_amplitude(&mut self) -> f64, "OA.",
        /// Program the internal oscillator amplitude, 0–5 V rms.
        pub async fn set_oscillator_amplitude(&mut self, volts: f64), "OA. {}",
        validate = |v| strict_range(v, 0.0, 5.0),
    }

    control! {
        /// Internal oscillator frequency in hertz.
        pub async fn oscillator_frequency(&mut self) -> f64, "OF.",
        /// Program the internal oscillator frequency, up to 250 kHz.
        pub async fn set_oscillator_frequency(&mut self, hz: f64), "OF. {}",
        validate = |v| strict_range(v, 0.0, 250e3),
    }

    /// Voltage on one of the four auxiliary DAC outputs.
    pub async fn dac(&mut self, channel: u8) -> labctl::Result<f64> {
        let channel = strict_range(channel, 1, 4)?;
        let reply = self.ask(&format!("DAC. {}", channel)).await?;
        f64::parse(&reply)
    }

    /// Program an auxiliary DAC output; ±12 V in 1 mV steps.
    pub async fn set_dac(&mut self, channel: u8, volts: f64) -> labctl::Result<()> {
        let channel = strict_range(channel, 1, 4)?;
        let volts = strict_step_range(volts, -DAC_VOLTS, DAC_VOLTS, DAC_STEP)?;
        self.write(&format!("DAC. {} {}", channel, volts)).await
    }

    /// Voltage on auxiliary input 1 or 2.
    pub async fn adc(&mut self, channel: u8) -> labctl::Result<f64> {
        let channel = strict_range(channel, 1, 2)?;
        let reply = self.ask(&format!("ADC. {}", channel)).await?;
        f64::parse(&reply)
    }

    /// Averaged voltage on the integrating auxiliary input 3.
    pub async fn adc3(&mut self) -> labctl::Result<f64> {
        let reply = self.ask("ADC 3").await?;
        let counts = f64::parse(&reply)?;
        let time = self.adc3_time().await?;
        Ok(counts / (ADC3_COUNTS_PER_VOLT_SECOND * time))
    }

    /// Integration time of ADC 3 in seconds.
    pub async fn adc3_time(&mut self) -> labctl::Result<f64> {
        let reply = self.ask("ADC3TIME").await?;
        let millis = f64::parse(&reply)?;
        Ok(millis / 1000.0)
    }

    /// Program the ADC 3 integration time in seconds. The instrument is
    /// busy while a conversion completes, so this waits out 1.2x the new
    /// integration time before returning.
    pub async fn set_adc3_time(&mut self, seconds: f64) -> labctl::Result<()> {
        let seconds = strict_range(seconds, 0.01, 2000.0)?;
        self.write(&format!("ADC3TIME {}", (seconds * 1000.0).round() as u32))
            .await?;
        sleep(Duration::from_secs_f64(seconds * 1.2)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn lockin(mock: MockAdapter) -> Dsp7265 {
        Dsp7265::new(Connection::with_adapter(Box::new(mock)))
    }

    #[tokio::test]
    async fn demodulator_readings() {
        let mock = MockAdapter::new()
            .expect("X.\n", "1.25E-6\n")
            .expect("XY.\n", "1.25E-6,-0.5E-6\n")
            .expect("PHA.\n", "12.5\n");
        let mut dev = lockin(mock);
        assert_eq!(dev.x().await.unwrap(), 1.25e-6);
        assert_eq!(dev.xy().await.unwrap(), (1.25e-6, -0.5e-6));
        assert_eq!(dev.phase().await.unwrap(), 12.5);
    }

    #[tokio::test]
    async fn dac_steps_and_limits() {
        let mock = MockAdapter::new().expect_write("DAC. 3 -1.5\n");
        let mut dev = lockin(mock);
        dev.set_dac(3, -1.5).await.unwrap();
        assert!(dev.set_dac(3, 12.5).await.is_err());
        assert!(dev.set_dac(3, 0.0005).await.is_err());
        assert!(dev.set_dac(5, 1.0).await.is_err());
    }

    #[tokio::test]
    async fn adc3_scales_by_integration_time() {
        let mock = MockAdapter::new()
            .expect("ADC 3\n", "100000\n")
            .expect("ADC3TIME\n", "2000\n");
        let mut dev = lockin(mock);
        // 100000 counts over 2 s of a 1 V signal -> 1 V
        assert_eq!(dev.adc3().await.unwrap(), 1.0);
    }

    #[tokio::test]
    async fn sensitivity_code_is_validated() {
        let mock = MockAdapter::new().expect_write("SEN 18\n");
        let mut dev = lockin(mock);
        dev.set_sensitivity(18).await.unwrap();
        assert!(dev.set_sensitivity(28).await.is_err());
    }
}
