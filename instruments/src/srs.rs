//! Stanford Research Systems RGA100 residual gas analyzer.
//!
//! Ionizer and detector settings are plain query/set pairs; scan results
//! come back as raw little-endian 32-bit ion currents, one per scan point,
//! scaled by the stored partial pressure sensitivity.

use byteorder::{ByteOrder, LittleEndian};

use labctl::property::strict_range;
use labctl::transport::serial::{DataBits, Parity, SerialParams, StopBits};
use labctl::{control, measurement, scpi_codes, setting};
use labctl::{Address, Comm, Connection, ScpiValue};

/// Highest mass-to-charge ratio the quadrupole resolves, in amu.
pub const MASS_LIMIT: u8 = 100;

/// Ion energy of the ionizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IonEnergy {
    /// 8 eV
    Low,
    /// 12 eV
    High,
}

scpi_codes!(IonEnergy {
    Low => "0",
    High => "1",
});

/// One completed analog scan: ion currents in amps over the mass axis.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogScan {
    pub masses: Vec<f64>,
    pub currents: Vec<f64>,
}

pub struct Rga100 {
    conn: Connection,
}

impl Comm for Rga100 {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Rga100 {
    /// Port settings of the ECU's RS-232 interface.
    pub fn default_params() -> SerialParams {
        SerialParams::new(28800, DataBits::Eight, Parity::None, StopBits::One)
    }

    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        let conn = Connection::open(addr).await?.terminators(b'\r', b'\r');
        Ok(Self::new(conn))
    }

    pub fn new(conn: Connection) -> Self {
        Rga100 { conn }
    }

    measurement! {
        /// Instrument model, firmware version and serial number.
        pub async fn id(&mut self) -> String, "ID?"
    }

    measurement! {
        /// Whether an electron multiplier (CDEM) is installed.
        pub async fn cdem_available(&mut self) -> bool, "MO?"
    }

    measurement! {
        /// Number of ion currents an analog scan will transmit.
        pub async fn analog_points(&mut self) -> u32, "AP?"
    }

    measurement! {
        /// Number of ion currents a histogram scan will transmit.
        pub async fn histogram_points(&mut self) -> u32, "HP?"
    }

    setting! {
        /// Degas the ionizer for the given number of minutes, 0–20.
        pub async fn degas_ionizer(&mut self, minutes: u8), "DG{}",
        validate = |v| strict_range(v, 0, 20),
    }

    control! {
        /// Electron energy of the ionizer in eV.
        pub async fn electron_energy(&mut self) -> u8, "EE?",
        /// Program the electron energy, 25–105 eV in 1 eV steps.
        pub async fn set_electron_energy(&mut self, ev: u8), "EE{}",
        validate = |v| strict_range(v, 25, 105),
    }

    control! {
        /// Filament electron emission current in mA.
        pub async fn filament_emission(&mut self) -> f64, "FL?",
        /// Program the filament emission, 0.02–3.5 mA. This also activates
        /// the filament heater.
        pub async fn set_filament_emission(&mut self, ma: f64), "FL{}",
        validate = |v| strict_range(v, 0.02, 3.5),
    }

    control! {
        /// Ion energy of the ionizer.
        pub async fn ion_energy(&mut self) -> IonEnergy, "IE?",
        /// Select the ion energy, 8 or 12 eV.
        pub async fn set_ion_energy(&mut self, energy: IonEnergy), "IE{}",
    }

    control! {
        /// Focus plate voltage in volts.
        pub async fn focus_voltage(&mut self) -> u8, "VF?",
        /// Program the focus plate voltage, 0–155 V.
        pub async fn set_focus_voltage(&mut self, volts: u8), "VF{}",
        validate = |v| strict_range(v, 0, 155),
    }

    control! {
        /// Negative high voltage across the electron multiplier in volts.
        pub async fn electron_high_voltage(&mut self) -> u16, "HV?",
        /// Program the multiplier high voltage, 10–2490 V.
        pub async fn set_electron_high_voltage(&mut self, volts: u16), "HV{}",
        validate = |v| strict_range(v, 10, 2490),
    }

    setting! {
        /// Turn the electron multiplier off and fall back to Faraday cup
        /// detection.
        pub async fn disable_electron_multiplier(&mut self), "HV0"
    }

    setting! {
        /// Turn the filament off and ground the repeller grid and focus
        /// plate.
        pub async fn disable_filament(&mut self), "FL0.00"
    }

    control! {
        /// Electrometer noise floor code; lower codes average longer.
        pub async fn noise_floor(&mut self) -> u8, "NF?",
        /// Select the electrometer noise floor, 0–7.
        pub async fn set_noise_floor(&mut self, code: u8), "NF{}",
        validate = |v| strict_range(v, 0, 7),
    }

    control! {
        /// Initial mass of the spectra in amu.
        pub async fn initial_mass(&mut self) -> u8, "MI?",
        /// Set where analog and histogram spectra start.
        pub async fn set_initial_mass(&mut self, amu: u8), "MI{}",
        validate = |v| strict_range(v, 1, MASS_LIMIT),
    }

    control! {
        /// Final mass of the spectra in amu.
        pub async fn final_mass(&mut self) -> u8, "MF?",
        /// Set where analog and histogram spectra end.
        pub async fn set_final_mass(&mut self, amu: u8), "MF{}",
        validate = |v| strict_range(v, 1, MASS_LIMIT),
    }

    control! {
        /// Steps executed per amu during an analog scan.
        pub async fn analog_scan_steps(&mut self) -> u8, "SA?",
        /// Set the analog scan resolution, 10–25 steps per amu.
        pub async fn set_analog_scan_steps(&mut self, steps: u8), "SA{}",
        validate = |v| strict_range(v, 10, 25),
    }

    measurement! {
        /// Total pressure ion current.
        pub async fn ion_current(&mut self) -> f64, "TP?"
    }

    setting! {
        /// Arm or disarm total pressure measurements.
        pub async fn enable_total_pressure(&mut self, on: bool), "TP{}"
    }

    control! {
        /// Stored electron multiplier gain in thousands.
        pub async fn stored_multiplier_gain(&mut self) -> f64, "MG?",
        /// Store the multiplier gain calibration, 0–2000.
        pub async fn set_stored_multiplier_gain(&mut self, gain: f64), "MG{}",
        validate = |v| strict_range(v, 0.0, 2000.0),
    }

    control! {
        /// Stored electron multiplier bias voltage.
        pub async fn stored_multiplier_bias(&mut self) -> u16, "MV?",
        /// Store the multiplier bias calibration, 0–2490 V.
        pub async fn set_stored_multiplier_bias(&mut self, volts: u16), "MV{}",
        validate = |v| strict_range(v, 0, 2490),
    }

    control! {
        /// Stored partial pressure sensitivity in mA/Torr.
        pub async fn stored_partial_pressure(&mut self) -> f64, "SP?",
        /// Store the partial pressure sensitivity, 0–10 mA/Torr.
        pub async fn set_stored_partial_pressure(&mut self, ma_per_torr: f64), "SP{}",
        validate = |v| strict_range(v, 0.0, 10.0),
    }

    control! {
        /// Stored total pressure sensitivity in mA/Torr.
        pub async fn stored_total_pressure(&mut self) -> f64, "ST?",
        /// Store the total pressure sensitivity, 0–100 mA/Torr.
        pub async fn set_stored_total_pressure(&mut self, ma_per_torr: f64), "ST{}",
        validate = |v| strict_range(v, 0.0, 100.0),
    }

    /// Park the quadrupole pass-band at a mass without measuring.
    /// Increments are limited to 1/256 amu.
    pub async fn mass_filter_passband(&mut self, mass: f64) -> labctl::Result<()> {
        let mass = strict_range(mass, 1.0 / 256.0, MASS_LIMIT as f64)?;
        self.write(&format!("ML{:.4}", mass)).await
    }

    setting! {
        /// Shut the RF/DC down completely after single mass measurements.
        pub async fn disable_mass_filter(&mut self), "ML0"
    }

    /// Measure the ion current at a single integer mass.
    pub async fn single_mass_measurement(&mut self, mass: u8) -> labctl::Result<()> {
        let mass = strict_range(mass, 1, MASS_LIMIT)?;
        self.write(&format!("MR{}", mass)).await
    }

    setting! {
        /// Shut the RF/DC down after single mass measurements.
        pub async fn disable_mass_measurement(&mut self), "MR0"
    }

    /// Start `count` analog scans, 1–255.
    pub async fn trigger_analog_scan(&mut self, count: u8) -> labctl::Result<()> {
        let count = strict_range(count, 1, 255)?;
        self.write(&format!("SC{}", count)).await
    }

    setting! {
        /// Scan continuously until interrupted.
        pub async fn trigger_analog_continuous(&mut self), "SC"
    }

    /// Start `count` histogram scans, 1–255.
    pub async fn trigger_histogram_scan(&mut self, count: u8) -> labctl::Result<()> {
        let count = strict_range(count, 1, 255)?;
        self.write(&format!("HS{}", count)).await
    }

    setting! {
        /// Run histogram scans continuously until interrupted.
        pub async fn trigger_histogram_continuous(&mut self), "HS"
    }

    setting! {
        /// Interrupt a running histogram scan.
        pub async fn interrupt_histogram_scan(&mut self), "HS0"
    }

    /// Run one analog scan and collect the spectrum. Each scan point is a
    /// little-endian 32-bit ion current in 1e-16 A units, converted to
    /// partial pressure units via the stored sensitivity.
    pub async fn analog_scan(&mut self) -> labctl::Result<AnalogScan> {
        let sensitivity = self.stored_partial_pressure().await?;
        let scale = 1e-13 / sensitivity;
        let step = 1.0 / self.analog_scan_steps().await? as f64;
        let points = self.analog_points().await? as usize;
        let initial = self.initial_mass().await? as f64;
        let final_ = self.final_mass().await? as f64;

        self.trigger_analog_scan(1).await?;
        let mut currents = Vec::with_capacity(points);
        for _ in 0..points {
            let raw = self.read_bytes(4).await?;
            if raw.len() != 4 {
                return Err(labctl::Error::UnexpectedResponse("truncated scan point".to_string()));
            }
            currents.push(LittleEndian::read_i32(&raw) as f64 * scale);
        }

        let mut masses = Vec::with_capacity(points);
        let mut mass = initial;
        while mass <= final_ + step / 2.0 {
            masses.push(mass);
            mass += step;
        }
        Ok(AnalogScan { masses, currents })
    }

    /// Readjust the detector zero and the internal scan parameters.
    pub async fn calibrate_instrument(&mut self) -> labctl::Result<()> {
        self.write("CA").await
    }

    setting! {
        /// Recalibrate the electrometer's I-V response.
        pub async fn calibrate_electrometer(&mut self), "CL"
    }

    /// Clear the communication buffers, re-run the hardware tests and
    /// return the status byte.
    pub async fn clear_buffers(&mut self) -> labctl::Result<u8> {
        self.write("IN0").await?;
        let status = self.read_bytes(1).await?;
        status
            .first()
            .copied()
            .ok_or_else(|| labctl::Error::UnexpectedResponse("no status byte".to_string()))
    }

    setting! {
        /// Reset to factory defaults.
        pub async fn factory_reset(&mut self), "IN1"
    }

    setting! {
        /// Standby: filament and CDEM off.
        pub async fn standby(&mut self), "IN2"
    }

    /// Clamp a requested mass increment onto the 1/256 amu grid.
    pub fn quantize_mass(mass: f64) -> f64 {
        let grid = 256.0;
        ((mass * grid).round() / grid).max(1.0 / grid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::transport::mock::MockAdapter;

    fn rga(mock: MockAdapter) -> Rga100 {
        Rga100::new(Connection::with_adapter(Box::new(mock)).terminators(b'\r', b'\r'))
    }

    #[tokio::test]
    async fn ionizer_settings_are_validated() {
        let mock = MockAdapter::new()
            .expect_write("EE70\r")
            .expect_write("FL1\r");
        let mut dev = rga(mock);
        dev.set_electron_energy(70).await.unwrap();
        dev.set_filament_emission(1.0).await.unwrap();
        assert!(dev.set_electron_energy(24).await.is_err());
        assert!(dev.set_filament_emission(3.6).await.is_err());
        assert!(dev.set_final_mass(101).await.is_err());
    }

    #[tokio::test]
    async fn ion_energy_codes() {
        let mock = MockAdapter::new()
            .expect("IE?\r", "1\r")
            .expect_write("IE0\r");
        let mut dev = rga(mock);
        assert_eq!(dev.ion_energy().await.unwrap(), IonEnergy::High);
        dev.set_ion_energy(IonEnergy::Low).await.unwrap();
    }

    #[tokio::test]
    async fn analog_scan_decodes_points() {
        // 4 points per amu from mass 1 to 2 -> 5 points on the axis; the
        // instrument reports AP?=5
        let mut scan_bytes = Vec::new();
        for current in [100i32, 200, -50, 400, 0] {
            let mut buf = [0u8; 4];
            LittleEndian::write_i32(&mut buf, current);
            scan_bytes.extend_from_slice(&buf);
        }
        let mock = MockAdapter::new()
            .expect("SP?\r", "0.1\r")
            .expect("SA?\r", "10\r")
            .expect("AP?\r", "5\r")
            .expect("MI?\r", "1\r")
            .expect("MF?\r", "2\r")
            .expect("SC1\r", scan_bytes);
        let mut dev = rga(mock);
        let scan = dev.analog_scan().await.unwrap();
        assert_eq!(scan.currents.len(), 5);
        let scale = 1e-13 / 0.1;
        assert_eq!(scan.currents[1], 200.0 * scale);
        assert_eq!(scan.currents[2], -50.0 * scale);
        assert_eq!(scan.masses.len(), 11);
        assert_eq!(scan.masses[0], 1.0);
    }

    #[test]
    fn mass_grid_quantization() {
        assert_eq!(Rga100::quantize_mass(0.0), 1.0 / 256.0);
        assert_eq!(Rga100::quantize_mass(2.0), 2.0);
    }
}
