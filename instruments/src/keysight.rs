//! Keysight DSO1052B two channel oscilloscope.
//!
//! Vertical settings hang off a per-channel accessor
//! (`scope.channel(1).set_scale(..)`); trigger commands interpolate the
//! active trigger mode into the header, so the driver reads the mode back
//! before addressing mode-specific nodes. Waveform data arrives as an
//! IEEE 488.2 definite-length block.

use labctl::property::{strict_discrete_set, strict_range};
use labctl::{control, measurement, scpi_codes, setting};
use labctl::{Address, Comm, Connection, Error, Scpi, ScpiValue};

pub const PROBE_ATTENUATIONS: [f64; 7] = [0.001, 0.01, 0.1, 1.0, 10.0, 100.0, 1000.0];
pub const ACQUISITION_AVERAGES: [u16; 8] = [2, 4, 8, 16, 32, 64, 128, 256];

fn unknown_code<T>(s: &str) -> labctl::Result<T> {
    Err(Error::UnexpectedResponse(format!("unknown code {:?}", s)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Ac,
    Dc,
    Ground,
}

scpi_codes!(Coupling {
    Ac => "AC",
    Dc => "DC",
    Ground => "GND",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelUnits {
    Volts,
    Amps,
    Watts,
    Unknown,
}

impl ScpiValue for ChannelUnits {
    fn format(&self) -> String {
        match self {
            ChannelUnits::Volts => "VOLTs",
            ChannelUnits::Amps => "AMPeres",
            ChannelUnits::Watts => "WATTs",
            ChannelUnits::Unknown => "UNKNown",
        }
        .to_string()
    }

    fn parse(s: &str) -> labctl::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "VOLT" | "VOLTS" => Ok(ChannelUnits::Volts),
            "AMP" | "AMPERES" => Ok(ChannelUnits::Amps),
            "WATT" | "WATTS" => Ok(ChannelUnits::Watts),
            "UNKN" | "UNKNOWN" => Ok(ChannelUnits::Unknown),
            other => unknown_code(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimebaseMode {
    Main,
    Delayed,
}

impl ScpiValue for TimebaseMode {
    fn format(&self) -> String {
        match self {
            TimebaseMode::Main => "MAIN",
            TimebaseMode::Delayed => "DELayed",
        }
        .to_string()
    }

    fn parse(s: &str) -> labctl::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "MAIN" => Ok(TimebaseMode::Main),
            "DEL" | "DELAYED" => Ok(TimebaseMode::Delayed),
            other => unknown_code(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimebaseFormat {
    YT,
    XY,
    Roll,
}

scpi_codes!(TimebaseFormat {
    YT => "YT",
    XY => "XY",
    Roll => "ROLL",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionType {
    Normal,
    Average,
    PeakDetect,
}

impl ScpiValue for AcquisitionType {
    fn format(&self) -> String {
        match self {
            AcquisitionType::Normal => "NORMal",
            AcquisitionType::Average => "AVERage",
            AcquisitionType::PeakDetect => "PEAKdetect",
        }
        .to_string()
    }

    fn parse(s: &str) -> labctl::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORM" | "NORMAL" => Ok(AcquisitionType::Normal),
            "AVER" | "AVERAGE" => Ok(AcquisitionType::Average),
            "PEAK" | "PEAKDETECT" => Ok(AcquisitionType::PeakDetect),
            other => unknown_code(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Edge,
    Pulse,
    Video,
    Pattern,
    Alternation,
}

impl TriggerMode {
    fn header(&self) -> &'static str {
        match self {
            TriggerMode::Edge => "EDGE",
            TriggerMode::Pulse => "PULSE",
            TriggerMode::Video => "VIDEO",
            TriggerMode::Pattern => "PATTERN",
            TriggerMode::Alternation => "ALTERNATION",
        }
    }
}

impl ScpiValue for TriggerMode {
    fn format(&self) -> String {
        self.header().to_string()
    }

    fn parse(s: &str) -> labctl::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "EDGE" => Ok(TriggerMode::Edge),
            "PULS" | "PULSE" => Ok(TriggerMode::Pulse),
            "VID" | "VIDEO" => Ok(TriggerMode::Video),
            "PATT" | "PATTERN" => Ok(TriggerMode::Pattern),
            "ALT" | "ALTERNATION" => Ok(TriggerMode::Alternation),
            other => unknown_code(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCoupling {
    Ac,
    Dc,
    LowFrequencyReject,
}

scpi_codes!(TriggerCoupling {
    Ac => "AC",
    Dc => "DC",
    LowFrequencyReject => "LF",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSlope {
    Negative,
    Positive,
    Alternating,
}

impl ScpiValue for EdgeSlope {
    fn format(&self) -> String {
        match self {
            EdgeSlope::Negative => "NEGative",
            EdgeSlope::Positive => "POSitive",
            EdgeSlope::Alternating => "ALTernation",
        }
        .to_string()
    }

    fn parse(s: &str) -> labctl::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NEG" | "NEGATIVE" => Ok(EdgeSlope::Negative),
            "POS" | "POSITIVE" => Ok(EdgeSlope::Positive),
            "ALT" | "ALTERNATION" => Ok(EdgeSlope::Alternating),
            other => unknown_code(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointsMode {
    Normal,
    Maximum,
    Raw,
}

impl ScpiValue for PointsMode {
    fn format(&self) -> String {
        match self {
            PointsMode::Normal => "NORMal",
            PointsMode::Maximum => "MAXimum",
            PointsMode::Raw => "RAW",
        }
        .to_string()
    }

    fn parse(s: &str) -> labctl::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORM" | "NORMAL" => Ok(PointsMode::Normal),
            "MAX" | "MAXIMUM" => Ok(PointsMode::Maximum),
            "RAW" => Ok(PointsMode::Raw),
            other => unknown_code(other),
        }
    }
}

/// The ten fields of `:WAVeform:PREamble?`, needed to scale raw waveform
/// bytes into volts and seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveformPreamble {
    pub format: u8,
    pub acquisition_type: u8,
    pub points: u32,
    pub count: u32,
    pub x_increment: f64,
    pub x_origin: f64,
    pub x_reference: f64,
    pub y_increment: f64,
    pub y_origin: f64,
    pub y_reference: f64,
}

pub struct KeysightDso1052b {
    conn: Connection,
}

impl Comm for KeysightDso1052b {
    fn conn(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

impl Scpi for KeysightDso1052b {}

impl KeysightDso1052b {
    pub async fn open(addr: &Address) -> labctl::Result<Self> {
        Ok(Self::new(Connection::open(addr).await?))
    }

    pub fn new(conn: Connection) -> Self {
        KeysightDso1052b { conn }
    }

    /// Accessor for the vertical settings of channel 1 or 2.
    pub fn channel(&mut self, number: u8) -> ScopeChannel<'_> {
        ScopeChannel { scope: self, number }
    }

    setting! {
        /// Autoscale the visible channels, like the front panel key.
        pub async fn autoscale(&mut self), ":AUToscale"
    }

    setting! {
        /// Start repetitive acquisitions.
        pub async fn run(&mut self), ":run"
    }

    setting! {
        /// Stop acquiring.
        pub async fn stop(&mut self), ":stop"
    }

    setting! {
        /// Acquire a single trigger of data.
        pub async fn single(&mut self), ":single"
    }

    control! {
        /// Main timebase offset in seconds.
        pub async fn timebase_offset(&mut self) -> f64, ":TIMebase:OFFSet?",
        /// Move the main timebase window relative to the trigger.
        pub async fn set_timebase_offset(&mut self, seconds: f64), ":TIMebase:OFFSet {}",
    }

    control! {
        /// Main timebase scale in seconds per division.
        pub async fn timebase_scale(&mut self) -> f64, ":TIMebase:SCALe?",
        /// Set the horizontal scale.
        pub async fn set_timebase_scale(&mut self, seconds_per_div: f64), ":TIMebase:SCALe {}",
    }

    control! {
        /// Delayed-sweep window offset in seconds.
        pub async fn timebase_delay_offset(&mut self) -> f64, ":TIMebase:DELayed:OFFSet?",
        /// Move the delayed-sweep window.
        pub async fn set_timebase_delay_offset(&mut self, seconds: f64), ":TIMebase:DELayed:OFFSet {}",
    }

    control! {
        /// Delayed-sweep scale in seconds per division.
        pub async fn timebase_delay_scale(&mut self) -> f64, ":TIMebase:DELayed:SCALe?",
        /// Set the delayed-sweep scale.
        pub async fn set_timebase_delay_scale(&mut self, seconds_per_div: f64), ":TIMebase:DELayed:SCALe {}",
    }

    control! {
        /// Horizontal display format.
        pub async fn timebase_format(&mut self) -> TimebaseFormat, ":TIMebase:FORMat?",
        /// Select YT, XY or roll display.
        pub async fn set_timebase_format(&mut self, format: TimebaseFormat), ":TIMebase:FORMat {}",
    }

    control! {
        /// Whether the main or delayed timebase drives the display.
        pub async fn timebase_mode(&mut self) -> TimebaseMode, ":TIMebase:MODE?",
        /// Switch between main and delayed timebase.
        pub async fn set_timebase_mode(&mut self, mode: TimebaseMode), ":TIMebase:MODE {}",
    }

    control! {
        /// Active trigger mode.
        pub async fn trigger_mode(&mut self) -> TriggerMode, ":TRIGger:MODE?",
        /// Select the trigger mode.
        pub async fn set_trigger_mode(&mut self, mode: TriggerMode), ":TRIGger:MODE {}",
    }

    control! {
        /// Trigger input coupling.
        pub async fn trigger_coupling(&mut self) -> TriggerCoupling, ":TRIGger:COUPling?",
        /// Set the trigger input coupling.
        pub async fn set_trigger_coupling(&mut self, coupling: TriggerCoupling), ":TRIGger:COUPling {}",
    }

    control! {
        /// Whether high frequency reject is on.
        pub async fn trigger_hf_reject(&mut self) -> bool, ":TRIGger:HFREject?",
        /// Toggle high frequency reject.
        pub async fn set_trigger_hf_reject(&mut self, on: bool), ":TRIGger:HFREject {}",
    }

    control! {
        /// Trigger holdoff in seconds.
        pub async fn trigger_holdoff(&mut self) -> f64, ":TRIGger:HOLDoff?",
        /// Set the trigger holdoff, 500 ns to 1.5 s.
        pub async fn set_trigger_holdoff(&mut self, seconds: f64), ":TRIGger:HOLDoff {}",
        validate = |v| strict_range(v, 500e-9, 1.5),
    }

    control! {
        /// Trigger sensitivity in divisions.
        pub async fn trigger_sensitivity(&mut self) -> f64, ":TRIGger:SENSitivity?",
        /// Set the trigger sensitivity, 0.1–1 division.
        pub async fn set_trigger_sensitivity(&mut self, divisions: f64), ":TRIGger:SENSitivity {}",
        validate = |v| strict_range(v, 0.1, 1.0),
    }

    measurement! {
        /// Trigger subsystem status.
        pub async fn trigger_status(&mut self) -> String, ":TRIGger:STATus?"
    }

    control! {
        /// Edge trigger slope.
        pub async fn trigger_edge_slope(&mut self) -> EdgeSlope, ":TRIGger:EDGE:SLOPe?",
        /// Select which edge fires the trigger.
        pub async fn set_trigger_edge_slope(&mut self, slope: EdgeSlope), ":TRIGger:EDGE:SLOPe {}",
    }

    /// Trigger source of the active trigger mode.
    pub async fn trigger_source(&mut self) -> labctl::Result<String> {
        let mode = self.trigger_mode().await?;
        self.ask(&format!(":TRIGger:{}:SOURce?", mode.header())).await
    }

    /// Route a channel into the trigger of the active mode.
    pub async fn set_trigger_source(&mut self, channel: u8) -> labctl::Result<()> {
        let channel = strict_range(channel, 1, 2)?;
        let mode = self.trigger_mode().await?;
        self.write(&format!(":TRIGger:{}:SOURce CHANnel{}", mode.header(), channel))
            .await
    }

    /// Trigger level in volts, for the active trigger mode.
    pub async fn trigger_level(&mut self) -> labctl::Result<f64> {
        let mode = self.trigger_mode().await?;
        let reply = self.ask(&format!(":TRIGger:{}:LEVel?", mode.header())).await?;
        f64::parse(&reply)
    }

    pub async fn set_trigger_level(&mut self, volts: f64) -> labctl::Result<()> {
        let mode = self.trigger_mode().await?;
        self.write(&format!(":TRIGger:{}:LEVel {}", mode.header(), volts)).await
    }

    /// Trigger sweep (auto/normal) of the active mode; alternation mode
    /// has no sweep setting.
    pub async fn set_trigger_sweep(&mut self, sweep: &str) -> labctl::Result<()> {
        let mode = self.trigger_mode().await?;
        if mode == TriggerMode::Alternation {
            return Err(Error::Argument("no sweep setting in alternation mode".to_string()));
        }
        self.write(&format!(":TRIGger:{}:SWEep {}", mode.header(), sweep)).await
    }

    control! {
        /// How samples are combined into the record.
        pub async fn acquisition_type(&mut self) -> AcquisitionType, ":ACQuire:TYPE?",
        /// Select normal, averaging or peak-detect acquisition.
        pub async fn set_acquisition_type(&mut self, ty: AcquisitionType), ":ACQuire:TYPE {}",
    }

    measurement! {
        /// Acquisition mode, e.g. real time vs equivalent time.
        pub async fn acquisition_mode(&mut self) -> String, ":ACQuire:MODE?"
    }

    measurement! {
        /// Current sample rate in samples per second.
        pub async fn acquisition_rate(&mut self) -> f64, ":ACQuire:SRATe?"
    }

    control! {
        /// Number of acquisitions averaged per record.
        pub async fn acquisition_averages(&mut self) -> u16, ":ACQuire:AVERages?",
        /// Set the averaging depth; powers of two from 2 to 256.
        pub async fn set_acquisition_averages(&mut self, count: u16), ":ACQuire:AVERages {}",
        validate = |v| strict_discrete_set(v, &ACQUISITION_AVERAGES),
    }

    control! {
        /// Record selection for waveform transfers.
        pub async fn waveform_points_mode(&mut self) -> PointsMode, ":WAVeform:POINts:MODE?",
        /// Choose which record `waveform_data` transfers.
        pub async fn set_waveform_points_mode(&mut self, mode: PointsMode), ":WAVeform:POINts:MODE {}",
    }

    control! {
        /// Number of points transferred by `waveform_data`.
        pub async fn waveform_points(&mut self) -> u32, ":WAVeform:POINts?",
        /// Set the transfer length; up to 600 points in normal mode,
        /// 20480 in raw mode.
        pub async fn set_waveform_points(&mut self, points: u32), ":WAVeform:POINts {}",
        validate = |v| strict_range(v, 1, 20480),
    }

    /// Select which channel `waveform_data` reads.
    pub async fn set_waveform_source(&mut self, channel: u8) -> labctl::Result<()> {
        let channel = strict_range(channel, 1, 2)?;
        self.write(&format!(":WAVeform:SOURce CHANnel{}", channel)).await
    }

    /// Raw waveform record of the selected source.
    pub async fn waveform_data(&mut self) -> labctl::Result<Vec<u8>> {
        self.ask_binary(":WAVeform:DATA?").await
    }

    /// Scaling information for the current waveform record.
    pub async fn waveform_preamble(&mut self) -> labctl::Result<WaveformPreamble> {
        let fields = self.values(":WAVeform:PREamble?").await?;
        if fields.len() != 10 {
            return Err(Error::UnexpectedResponse(format!(
                "preamble has {} fields",
                fields.len()
            )));
        }
        Ok(WaveformPreamble {
            format: u8::parse(&fields[0])?,
            acquisition_type: u8::parse(&fields[1])?,
            points: u32::parse(&fields[2])?,
            count: u32::parse(&fields[3])?,
            x_increment: f64::parse(&fields[4])?,
            x_origin: f64::parse(&fields[5])?,
            x_reference: f64::parse(&fields[6])?,
            y_increment: f64::parse(&fields[7])?,
            y_origin: f64::parse(&fields[8])?,
            y_reference: f64::parse(&fields[9])?,
        })
    }
}

/// Vertical settings of one scope channel.
pub struct ScopeChannel<'a> {
    scope: &'a mut KeysightDso1052b,
    number: u8,
}

impl ScopeChannel<'_> {
    fn prefix(&self, suffix: &str) -> String {
        format!(":CHANnel{}:{}", self.number, suffix)
    }

    async fn get<T: ScpiValue>(&mut self, suffix: &str) -> labctl::Result<T> {
        let cmd = self.prefix(suffix);
        let reply = self.scope.ask(&cmd).await?;
        T::parse(reply.trim())
    }

    async fn set<T: ScpiValue>(&mut self, suffix: &str, value: T) -> labctl::Result<()> {
        let cmd = format!("{} {}", self.prefix(suffix), value.format());
        self.scope.write(&cmd).await
    }

    /// Whether the 25 MHz bandwidth limit is on.
    pub async fn bwlimit(&mut self) -> labctl::Result<bool> {
        self.get("BWLimit?").await
    }

    pub async fn set_bwlimit(&mut self, on: bool) -> labctl::Result<()> {
        self.set("BWLimit", on).await
    }

    pub async fn coupling(&mut self) -> labctl::Result<Coupling> {
        self.get("COUPling?").await
    }

    pub async fn set_coupling(&mut self, coupling: Coupling) -> labctl::Result<()> {
        self.set("COUPling", coupling).await
    }

    /// Whether the channel is shown.
    pub async fn display(&mut self) -> labctl::Result<bool> {
        self.get("DISPlay?").await
    }

    pub async fn set_display(&mut self, on: bool) -> labctl::Result<()> {
        self.set("DISPlay", on).await
    }

    pub async fn invert(&mut self) -> labctl::Result<bool> {
        self.get("INVert?").await
    }

    pub async fn set_invert(&mut self, on: bool) -> labctl::Result<()> {
        self.set("INVert", on).await
    }

    /// Vertical offset in the channel units.
    pub async fn offset(&mut self) -> labctl::Result<f64> {
        self.get("OFFSet?").await
    }

    pub async fn set_offset(&mut self, offset: f64) -> labctl::Result<()> {
        self.set("OFFSet", offset).await
    }

    /// Probe attenuation factor.
    pub async fn probe_attenuation(&mut self) -> labctl::Result<f64> {
        self.get("PROBe?").await
    }

    pub async fn set_probe_attenuation(&mut self, factor: f64) -> labctl::Result<()> {
        let factor = strict_discrete_set(factor, &PROBE_ATTENUATIONS)?;
        self.set("PROBe", factor).await
    }

    /// Vertical scale in units per division.
    pub async fn scale(&mut self) -> labctl::Result<f64> {
        self.get("SCALe?").await
    }

    pub async fn set_scale(&mut self, units_per_div: f64) -> labctl::Result<()> {
        self.set("SCALe", units_per_div).await
    }

    pub async fn units(&mut self) -> labctl::Result<ChannelUnits> {
        self.get("UNITs?").await
    }

    pub async fn set_units(&mut self, units: ChannelUnits) -> labctl::Result<()> {
        self.set("UNITs", units).await
    }

    /// Whether fine (vernier) vertical adjustment is on.
    pub async fn vernier(&mut self) -> labctl::Result<bool> {
        self.get("VERNier?").await
    }

    pub async fn set_vernier(&mut self, on: bool) -> labctl::Result<()> {
        self.set("VERNier", on).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labctl::protocol::scpi::format_block;
    use labctl::transport::mock::MockAdapter;

    fn scope(mock: MockAdapter) -> KeysightDso1052b {
        KeysightDso1052b::new(Connection::with_adapter(Box::new(mock)))
    }

    #[tokio::test]
    async fn channel_commands_carry_the_number() {
        let mock = MockAdapter::new()
            .expect(":CHANnel1:COUPling?\n", "GND\n")
            .expect_write(":CHANnel2:PROBe 10\n")
            .expect_write(":CHANnel2:SCALe 0.5\n");
        let mut dso = scope(mock);
        assert_eq!(dso.channel(1).coupling().await.unwrap(), Coupling::Ground);
        dso.channel(2).set_probe_attenuation(10.0).await.unwrap();
        dso.channel(2).set_scale(0.5).await.unwrap();
        assert!(dso.channel(2).set_probe_attenuation(2.0).await.is_err());
    }

    #[tokio::test]
    async fn trigger_commands_use_the_active_mode() {
        let mock = MockAdapter::new()
            .expect(":TRIGger:MODE?\n", "EDGE\n")
            .expect_write(":TRIGger:EDGE:SOURce CHANnel1\n")
            .expect(":TRIGger:MODE?\n", "PULS\n")
            .expect(":TRIGger:PULSE:LEVel?\n", "0.25\n");
        let mut dso = scope(mock);
        dso.set_trigger_source(1).await.unwrap();
        assert_eq!(dso.trigger_level().await.unwrap(), 0.25);
    }

    #[tokio::test]
    async fn waveform_transfer() {
        let samples = [128u8, 130, 127, 125, 128];
        let mut block = format_block(&samples);
        block.push(b'\n');
        let mock = MockAdapter::new()
            .expect_write(":WAVeform:SOURce CHANnel1\n")
            .expect(":WAVeform:DATA?\n", block)
            .expect(
                ":WAVeform:PREamble?\n",
                "0,0,600,1,2.0E-6,-6.0E-4,0,0.02,0,128\n",
            );
        let mut dso = scope(mock);
        dso.set_waveform_source(1).await.unwrap();
        assert_eq!(dso.waveform_data().await.unwrap(), samples);
        let preamble = dso.waveform_preamble().await.unwrap();
        assert_eq!(preamble.points, 600);
        assert_eq!(preamble.x_increment, 2.0e-6);
        assert_eq!(preamble.y_reference, 128.0);
    }

    #[tokio::test]
    async fn averaging_depth_is_validated() {
        let mock = MockAdapter::new().expect_write(":ACQuire:AVERages 64\n");
        let mut dso = scope(mock);
        dso.set_acquisition_averages(64).await.unwrap();
        assert!(dso.set_acquisition_averages(3).await.is_err());
    }
}
