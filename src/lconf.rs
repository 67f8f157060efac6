use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::config::{
    ConfigBuilder, ConfigError, Configuration, DeviceConfig, MetaMap, MetaValue, ParsedConfig,
};
use crate::data::{
    slice_window, DataError, DataLoader, DigitalStream, SampleSet, Window, DIGITAL_STREAM_BITS,
};
use crate::events::{differentiate, EventDetector, EventOptions};
use crate::schema::{ChannelKind, EntityKind, ParamValue, Record};
use crate::tokenizer::Tokenizer;

const TIME_COLUMN_NAME: &str = "time";
const DISTREAM_COLUMN_NAME: &str = "distream";

#[derive(Debug, thiserror::Error)]
pub enum LConfError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("No {kind} channel is labeled {label:?}")]
    LabelNotFound { kind: ChannelKind, label: String },

    #[error("No data were loaded with this configuration")]
    NoDataLoaded,

    #[error("{what} {index} is out of range")]
    IndexOutOfRange { what: &'static str, index: usize },

    #[error("Device {device} has no meta parameter {name:?}")]
    MetaNotFound { device: usize, name: String },

    #[error("Unrecognized {kind} parameter: {param}")]
    UnrecognizedParameter { param: String, kind: EntityKind },

    #[error("The data do not include a digital input stream")]
    NoDigitalStream,

    #[error("A digital input bit is required when the stream was loaded bit-wise")]
    DigitalBitRequired,

    #[error("DataFrame error: {0}")]
    DataFrame(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// What to read besides the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    /// Load the data block after the `##` separator
    pub data: bool,
    /// Expand the digital input stream into one column per bit
    pub dibits: bool,
    /// Apply the analog input calibration
    pub cal: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            data: false,
            dibits: false,
            cal: true,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(mut self, data: bool) -> Self {
        self.data = data;
        self
    }

    pub fn with_dibits(mut self, dibits: bool) -> Self {
        self.dibits = dibits;
        self
    }

    pub fn with_calibration(mut self, cal: bool) -> Self {
        self.cal = cal;
        self
    }
}

/// A channel picked by position or by its label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelRef {
    Index(usize),
    Label(String),
}

impl From<usize> for ChannelRef {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for ChannelRef {
    fn from(label: &str) -> Self {
        Self::Label(label.to_string())
    }
}

impl From<String> for ChannelRef {
    fn from(label: String) -> Self {
        Self::Label(label)
    }
}

/// The record a parameter query reads from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    Device,
    AnalogInput(ChannelRef),
    AnalogOutput(ChannelRef),
    ExtendedFeature(ChannelRef),
    Communication(ChannelRef),
}

impl Scope {
    pub fn aich(channel: impl Into<ChannelRef>) -> Self {
        Self::AnalogInput(channel.into())
    }

    pub fn aoch(channel: impl Into<ChannelRef>) -> Self {
        Self::AnalogOutput(channel.into())
    }

    pub fn efch(channel: impl Into<ChannelRef>) -> Self {
        Self::ExtendedFeature(channel.into())
    }

    pub fn comch(channel: impl Into<ChannelRef>) -> Self {
        Self::Communication(channel.into())
    }

    fn channel(&self) -> Option<(ChannelKind, &ChannelRef)> {
        match self {
            Self::Device => None,
            Self::AnalogInput(channel) => Some((ChannelKind::AnalogInput, channel)),
            Self::AnalogOutput(channel) => Some((ChannelKind::AnalogOutput, channel)),
            Self::ExtendedFeature(channel) => Some((ChannelKind::ExtendedFeature, channel)),
            Self::Communication(channel) => Some((ChannelKind::Communication, channel)),
        }
    }
}

/// Samples of the digital input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigitalTrace {
    Packed(Vec<i64>),
    Bit(Vec<bool>),
}

impl DigitalTrace {
    pub fn len(&self) -> usize {
        match self {
            Self::Packed(values) => values.len(),
            Self::Bit(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A loaded LCONF file: the device configuration and, optionally, its data.
///
/// Channel data always come from the first device, which is the one that
/// wrote the data block.
#[derive(Debug, Clone)]
pub struct LConf {
    config: Configuration,
    samples: Option<SampleSet>,
    calibrated: bool,
    filename: Option<PathBuf>,
}

impl LConf {
    /// Load a file from disk.
    #[tracing::instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, options: LoadOptions) -> Result<Self, LConfError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let mut lconf = Self::from_reader(BufReader::new(file), options)?;
        lconf.filename = Some(std::fs::canonicalize(path)?);
        Ok(lconf)
    }

    /// Load from any buffered reader.
    #[tracing::instrument(skip(reader))]
    pub fn from_reader<R: BufRead>(reader: R, options: LoadOptions) -> Result<Self, LConfError> {
        let mut tokenizer = Tokenizer::new(reader);
        let ParsedConfig { config, separator } = ConfigBuilder::parse(&mut tokenizer)?;
        log::debug!("Parsed {} device configurations", config.devices.len());

        let samples = if options.data {
            if !separator {
                return Err(DataError::MissingSeparator.into());
            }
            let loader = DataLoader::new(&config, options.dibits, options.cal)?;
            Some(loader.load(tokenizer.into_inner())?)
        } else {
            None
        };

        Ok(Self {
            config,
            samples,
            calibrated: options.data && options.cal,
            filename: None,
        })
    }

    pub fn parse_str(text: &str, options: LoadOptions) -> Result<Self, LConfError> {
        Self::from_reader(text.as_bytes(), options)
    }

    pub fn configuration(&self) -> &Configuration {
        &self.config
    }

    /// Absolute path of the file, when loaded with [`LConf::open`]
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Whether the loaded samples had their calibration applied
    pub fn calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn has_data(&self) -> bool {
        self.samples.is_some()
    }

    pub fn device(&self, dev: usize) -> Result<&DeviceConfig, LConfError> {
        self.config
            .devices
            .get(dev)
            .ok_or(LConfError::IndexOutOfRange {
                what: "device",
                index: dev,
            })
    }

    pub fn ndev(&self) -> usize {
        self.config.devices.len()
    }

    pub fn naich(&self, dev: usize) -> Result<usize, LConfError> {
        Ok(self.device(dev)?.aich.len())
    }

    pub fn naoch(&self, dev: usize) -> Result<usize, LConfError> {
        Ok(self.device(dev)?.aoch.len())
    }

    pub fn nefch(&self, dev: usize) -> Result<usize, LConfError> {
        Ok(self.device(dev)?.efch.len())
    }

    pub fn ncomch(&self, dev: usize) -> Result<usize, LConfError> {
        Ok(self.device(dev)?.comch.len())
    }

    /// Number of streamed input columns: the analog inputs plus one for the
    /// digital input stream when it is enabled.
    pub fn nistream(&self, dev: usize) -> Result<usize, LConfError> {
        let device = self.device(dev)?;
        Ok(device.aich.len() + usize::from(device.params.distream() != 0))
    }

    pub fn domask(&self, dev: usize) -> Result<u32, LConfError> {
        Ok(self.device(dev)?.domask)
    }

    pub fn dovalue(&self, dev: usize) -> Result<u32, LConfError> {
        Ok(self.device(dev)?.dovalue)
    }

    /// Channel labels in declaration order. Unlabeled channels appear as "".
    pub fn get_labels(&self, dev: usize, kind: ChannelKind) -> Result<Vec<String>, LConfError> {
        let device = self.device(dev)?;
        Ok(match kind {
            ChannelKind::AnalogInput => labels(&device.aich, kind),
            ChannelKind::AnalogOutput => labels(&device.aoch, kind),
            ChannelKind::ExtendedFeature => labels(&device.efch, kind),
            ChannelKind::Communication => labels(&device.comch, kind),
        })
    }

    /// Index of a channel. A label matches the first channel that carries
    /// it; an empty label never matches.
    pub fn resolve_channel(
        &self,
        dev: usize,
        kind: ChannelKind,
        channel: &ChannelRef,
    ) -> Result<usize, LConfError> {
        match channel {
            ChannelRef::Index(index) => {
                if *index < self.device(dev)?.channel_count(kind) {
                    Ok(*index)
                } else {
                    Err(LConfError::IndexOutOfRange {
                        what: kind.as_str(),
                        index: *index,
                    })
                }
            }
            ChannelRef::Label(label) => {
                let not_found = || LConfError::LabelNotFound {
                    kind,
                    label: label.clone(),
                };
                if label.is_empty() {
                    return Err(not_found());
                }
                self.get_labels(dev, kind)?
                    .iter()
                    .position(|candidate| candidate == label)
                    .ok_or_else(not_found)
            }
        }
    }

    /// A configuration parameter: the value written in the file, else the
    /// schema default for the addressed device or channel.
    pub fn get(&self, dev: usize, param: &str, scope: &Scope) -> Result<ParamValue, LConfError> {
        let device = self.device(dev)?;
        let Some((kind, channel)) = scope.channel() else {
            return effective(&device.params, param);
        };
        let index = self.resolve_channel(dev, kind, channel)?;
        match kind {
            ChannelKind::AnalogInput => effective(&device.aich[index], param),
            ChannelKind::AnalogOutput => effective(&device.aoch[index], param),
            ChannelKind::ExtendedFeature => effective(&device.efch[index], param),
            ChannelKind::Communication => effective(&device.comch[index], param),
        }
    }

    /// Several parameters of the same device or channel, in order.
    pub fn get_many(
        &self,
        dev: usize,
        params: &[&str],
        scope: &Scope,
    ) -> Result<Vec<ParamValue>, LConfError> {
        params
            .iter()
            .map(|param| self.get(dev, param, scope))
            .collect()
    }

    pub fn is_meta(&self, dev: usize, name: &str) -> Result<bool, LConfError> {
        Ok(self.device(dev)?.meta.contains(name))
    }

    pub fn get_meta(&self, dev: usize, name: &str) -> Result<&MetaValue, LConfError> {
        self.device(dev)?
            .meta
            .get(name)
            .ok_or_else(|| LConfError::MetaNotFound {
                device: dev,
                name: name.to_string(),
            })
    }

    pub fn get_metas(&self, dev: usize, names: &[&str]) -> Result<Vec<&MetaValue>, LConfError> {
        names.iter().map(|name| self.get_meta(dev, name)).collect()
    }

    /// Every meta parameter of a device, in declaration order
    pub fn meta(&self, dev: usize) -> Result<&MetaMap, LConfError> {
        Ok(&self.device(dev)?.meta)
    }

    pub fn samples(&self) -> Result<&SampleSet, LConfError> {
        self.samples.as_ref().ok_or(LConfError::NoDataLoaded)
    }

    pub fn ndata(&self) -> Result<usize, LConfError> {
        Ok(self.samples()?.nrows())
    }

    /// The timestamp line that follows the data separator, verbatim
    pub fn timestamp(&self) -> Result<&str, LConfError> {
        Ok(self.samples()?.timestamp())
    }

    pub fn get_time(&self, window: &Window) -> Result<Vec<f64>, LConfError> {
        let samples = self.samples()?;
        Ok(slice_window(samples.time(), samples.window_bounds(window)))
    }

    /// Samples of an analog input of the first device.
    pub fn get_channel(
        &self,
        channel: impl Into<ChannelRef>,
        window: &Window,
    ) -> Result<Vec<f64>, LConfError> {
        let samples = self.samples()?;
        let index = self.resolve_channel(0, ChannelKind::AnalogInput, &channel.into())?;
        let column = samples.column(index).unwrap_or_default();
        Ok(slice_window(column, samples.window_bounds(window)))
    }

    /// Samples of the digital input stream.
    ///
    /// Without a bit, the packed stream is returned; that requires the data
    /// to have been loaded without bit-wise expansion. With a bit, the state
    /// of that line is returned in either mode.
    pub fn get_dichannel(
        &self,
        bit: Option<usize>,
        window: &Window,
    ) -> Result<DigitalTrace, LConfError> {
        let samples = self.samples()?;
        let stream = samples.digital().ok_or(LConfError::NoDigitalStream)?;
        let bounds = samples.window_bounds(window);

        if let Some(bit) = bit.filter(|bit| *bit >= DIGITAL_STREAM_BITS) {
            return Err(LConfError::IndexOutOfRange {
                what: "digital input bit",
                index: bit,
            });
        }

        Ok(match (stream, bit) {
            (DigitalStream::Packed(values), None) => {
                DigitalTrace::Packed(slice_window(values, bounds))
            }
            (DigitalStream::Packed(values), Some(bit)) => DigitalTrace::Bit(
                slice_window(values, bounds)
                    .into_iter()
                    .map(|value| (value >> bit) & 1 == 1)
                    .collect(),
            ),
            (DigitalStream::Bits(_), None) => return Err(LConfError::DigitalBitRequired),
            (DigitalStream::Bits(bits), Some(bit)) => {
                DigitalTrace::Bit(slice_window(&bits[bit], bounds))
            }
        })
    }

    /// Indices of the level crossings on an analog input of the first device.
    pub fn get_events(
        &self,
        channel: impl Into<ChannelRef>,
        options: &EventOptions,
    ) -> Result<Vec<usize>, LConfError> {
        let samples = self.samples()?;
        let y = self.get_channel(channel, &Window::all())?;
        let y = if options.diff > 0 {
            differentiate(&y, options.diff, samples.samplehz())
        } else {
            y
        };

        let Some((first, last)) = scan_bounds(samples, options, y.len()) else {
            return Ok(Vec::new());
        };
        let tests = y[first..=last].iter().map(|value| *value > options.level);
        let events = EventDetector::from(options).scan(tests, first);
        log::debug!("Found {} events between samples {first} and {last}", events.len());
        Ok(events.into_iter().map(|index| index + options.diff).collect())
    }

    /// Edges on the digital input stream. A packed stream is high where
    /// `value >= level`; a single bit is its own test and `level` is unused.
    pub fn get_dievents(
        &self,
        bit: Option<usize>,
        options: &EventOptions,
    ) -> Result<Vec<usize>, LConfError> {
        let samples = self.samples()?;
        let tests: Vec<bool> = match self.get_dichannel(bit, &Window::all())? {
            DigitalTrace::Packed(values) => values
                .into_iter()
                .map(|value| value as f64 >= options.level)
                .collect(),
            DigitalTrace::Bit(values) => values,
        };

        let Some((first, last)) = scan_bounds(samples, options, tests.len()) else {
            return Ok(Vec::new());
        };
        Ok(EventDetector::from(options).scan(tests[first..=last].iter().copied(), first))
    }

    /// Column name of an analog input: its label, else its physical
    /// channel number, else its position.
    fn column_name(&self, index: usize) -> String {
        let channel = self
            .config
            .devices
            .first()
            .and_then(|device| device.aich.get(index));
        let Some(channel) = channel else {
            return format!("ai{index}");
        };
        let label = channel.ailabel();
        if !label.is_empty() {
            label
        } else if channel.aichannel() >= 0 {
            format!("ai{}", channel.aichannel())
        } else {
            format!("ai{index}")
        }
    }

    /// The loaded samples as a DataFrame with a `time` column, one column
    /// per analog input, and the digital input stream.
    pub fn to_dataframe(&self, window: &Window) -> Result<DataFrame, LConfError> {
        let samples = self.samples()?;
        let bounds = samples.window_bounds(window);

        let mut columns: Vec<Column> = Vec::with_capacity(samples.ncols() + 1);
        let time = slice_window(samples.time(), bounds.clone());
        columns.push(Series::new(TIME_COLUMN_NAME.into(), time).into());
        for index in 0..samples.ncols() {
            let values = slice_window(samples.column(index).unwrap_or_default(), bounds.clone());
            columns.push(Series::new(self.column_name(index).into(), values).into());
        }

        match samples.digital() {
            Some(DigitalStream::Packed(values)) => {
                let values = slice_window(values, bounds);
                columns.push(Series::new(DISTREAM_COLUMN_NAME.into(), values).into());
            }
            Some(DigitalStream::Bits(bits)) => {
                for (bit, values) in bits.iter().enumerate() {
                    let values = slice_window(values, bounds.clone());
                    let column: Column = Series::new(format!("bit_{bit}").into(), values).into();
                    columns.push(column);
                }
            }
            None => {}
        }

        Ok(DataFrame::new(columns)?)
    }

    pub fn lazy_frame(&self, window: &Window) -> Result<LazyFrame, LConfError> {
        Ok(self.to_dataframe(window)?.lazy())
    }
}

/// Inclusive sample range scanned for events, limited to `len` samples.
fn scan_bounds(samples: &SampleSet, options: &EventOptions, len: usize) -> Option<(usize, usize)> {
    let last = len.checked_sub(1)?;
    let first = options.start.map_or(0, |time| samples.index_at(time));
    let stop = options
        .stop
        .map_or(samples.nrows().saturating_sub(1), |time| samples.index_at(time))
        .min(last);
    (first <= stop).then_some((first, stop))
}

fn effective<R: Record>(record: &R, param: &str) -> Result<ParamValue, LConfError> {
    record
        .effective(param)
        .ok_or_else(|| LConfError::UnrecognizedParameter {
            param: param.to_string(),
            kind: R::KIND,
        })
}

fn labels<R: Record>(records: &[R], kind: ChannelKind) -> Vec<String> {
    records
        .iter()
        .map(|record| {
            record
                .effective(kind.label_field())
                .and_then(|label| label.as_text().map(str::to_string))
                .unwrap_or_default()
        })
        .collect()
}

fn write_record<R: Record>(f: &mut fmt::Formatter<'_>, record: &R, indent: &str) -> fmt::Result {
    for field in R::table().iter() {
        writeln!(f, "{indent}{:>14} : {}", field.name, field.effective(record).repr())?;
    }
    Ok(())
}

impl fmt::Display for LConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (dev, device) in self.config.devices.iter().enumerate() {
            writeln!(f, "*** Device {dev} ***")?;
            write_record(f, &device.params, "  ")?;
            if device.domask != 0 {
                writeln!(f, "  {:>14} : {:#010x}", "domask", device.domask)?;
                writeln!(f, "  {:>14} : {:#010x}", "dovalue", device.dovalue)?;
            }

            writeln!(f, "  * Analog Inputs")?;
            for (index, channel) in device.aich.iter().enumerate() {
                writeln!(f, "    * AICH {index}")?;
                write_record(f, channel, "    ")?;
            }
            writeln!(f, "  * Analog Outputs")?;
            for (index, channel) in device.aoch.iter().enumerate() {
                writeln!(f, "    * AOCH {index}")?;
                write_record(f, channel, "    ")?;
            }
            writeln!(f, "  * Extended Features")?;
            for (index, channel) in device.efch.iter().enumerate() {
                writeln!(f, "    * EFCH {index}")?;
                write_record(f, channel, "    ")?;
            }
            writeln!(f, "  * Communication")?;
            for (index, channel) in device.comch.iter().enumerate() {
                writeln!(f, "    * COMCH {index}")?;
                write_record(f, channel, "    ")?;
            }

            writeln!(f, "  * Meta Parameters")?;
            for (name, value) in device.meta.iter() {
                writeln!(f, "    {name:>14} : {value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const CONFIG: &str = "\
# Two analog inputs and a digital stream
connection usb
samplehz 10
distream 1
aichannel 0 ailabel \"Ambient\" aicalzero 1.0
aichannel 1
aochannel 0 aolabel \"Drive\" aosignal square
efchannel 2 eflabel \"Counter\"
comsignal uart comlabel \"Bus\"
do1 1
meta int
    runs 4
meta end
str:operator \"Ada\"
##
Mon Jan  1 00:00:00 2024
";

    fn with_data(rows: &str, options: LoadOptions) -> LConf {
        LConf::parse_str(&format!("{CONFIG}{rows}"), options.with_data(true)).unwrap()
    }

    fn sample_data() -> LConf {
        let rows: String = (0..10)
            .map(|i| format!("{}.0 {}.5 {}\n", i + 1, i, i % 4))
            .collect();
        with_data(&rows, LoadOptions::default())
    }

    #[test]
    fn test_configuration_only_load() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        assert!(!lconf.has_data());
        assert!(!lconf.calibrated());
        assert!(matches!(lconf.ndata(), Err(LConfError::NoDataLoaded)));
        assert!(matches!(
            lconf.get_time(&Window::all()),
            Err(LConfError::NoDataLoaded)
        ));
        assert!(matches!(
            lconf.get_channel(0, &Window::all()),
            Err(LConfError::NoDataLoaded)
        ));
    }

    #[test]
    fn test_counts() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        assert_eq!(lconf.ndev(), 1);
        assert_eq!(lconf.naich(0).unwrap(), 2);
        assert_eq!(lconf.naoch(0).unwrap(), 1);
        assert_eq!(lconf.nefch(0).unwrap(), 1);
        assert_eq!(lconf.ncomch(0).unwrap(), 1);
        assert_eq!(lconf.nistream(0).unwrap(), 3);
        assert_eq!(lconf.domask(0).unwrap(), 0b10);
        assert_eq!(lconf.dovalue(0).unwrap(), 0b10);
        assert!(matches!(
            lconf.naich(1),
            Err(LConfError::IndexOutOfRange {
                what: "device",
                index: 1
            })
        ));
    }

    #[test]
    fn test_labels() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        assert_eq!(
            lconf.get_labels(0, ChannelKind::AnalogInput).unwrap(),
            vec!["Ambient".to_string(), String::new()]
        );
        assert_eq!(lconf.get_labels(0, ChannelKind::AnalogOutput).unwrap(), vec!["Drive"]);
        assert_eq!(lconf.get_labels(0, ChannelKind::ExtendedFeature).unwrap(), vec!["Counter"]);
        assert_eq!(lconf.get_labels(0, ChannelKind::Communication).unwrap(), vec!["Bus"]);
    }

    #[test]
    fn test_resolve_channel() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        let kind = ChannelKind::AnalogInput;
        assert_eq!(lconf.resolve_channel(0, kind, &"Ambient".into()).unwrap(), 0);
        assert_eq!(lconf.resolve_channel(0, kind, &1.into()).unwrap(), 1);
        assert!(matches!(
            lconf.resolve_channel(0, kind, &"ambient".into()),
            Err(LConfError::LabelNotFound { .. })
        ));
        // The second channel is unlabeled, but an empty label never matches
        assert!(matches!(
            lconf.resolve_channel(0, kind, &"".into()),
            Err(LConfError::LabelNotFound { .. })
        ));
        assert!(matches!(
            lconf.resolve_channel(0, kind, &2.into()),
            Err(LConfError::IndexOutOfRange { what: "aich", index: 2 })
        ));
    }

    #[test]
    fn test_get_parameters() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        assert_eq!(lconf.get(0, "samplehz", &Scope::Device).unwrap(), ParamValue::Float(10.0));
        // Not in the file, so the schema default
        assert_eq!(lconf.get(0, "nsample", &Scope::Device).unwrap(), ParamValue::Int(64));
        assert_eq!(
            lconf.get(0, "aicalzero", &Scope::aich("Ambient")).unwrap(),
            ParamValue::Float(1.0)
        );
        assert_eq!(lconf.get(0, "airange", &Scope::aich(1)).unwrap(), ParamValue::Float(10.0));
        assert_eq!(
            lconf.get(0, "aosignal", &Scope::aoch("Drive")).unwrap().to_string(),
            "square"
        );
        assert_eq!(lconf.get(0, "efchannel", &Scope::efch(0)).unwrap(), ParamValue::Int(2));
        assert_eq!(
            lconf.get(0, "comchannel", &Scope::comch("Bus")).unwrap().to_string(),
            "uart"
        );

        assert!(matches!(
            lconf.get(0, "airange", &Scope::Device),
            Err(LConfError::UnrecognizedParameter {
                kind: EntityKind::Device,
                ..
            })
        ));
        assert!(matches!(
            lconf.get(0, "samplehz", &Scope::comch(0)),
            Err(LConfError::UnrecognizedParameter {
                kind: EntityKind::Channel(ChannelKind::Communication),
                ..
            })
        ));
    }

    #[test]
    fn test_get_many_matches_single_gets() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        for scope in [Scope::Device, Scope::aich(0)] {
            let params: &[&str] = match scope {
                Scope::Device => &["samplehz", "connection", "distream"],
                _ => &["ailabel", "aicalslope", "aichannel"],
            };
            let many = lconf.get_many(0, params, &scope).unwrap();
            let single: Vec<_> = params.iter().map(|p| lconf.get(0, p, &scope).unwrap()).collect();
            assert_eq!(many, single);
        }
        assert!(lconf.get_many(0, &["samplehz", "bogus"], &Scope::Device).is_err());
    }

    #[test]
    fn test_meta_queries() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        assert!(lconf.is_meta(0, "runs").unwrap());
        assert!(!lconf.is_meta(0, "samplehz").unwrap());
        assert_eq!(lconf.get_meta(0, "runs").unwrap(), &MetaValue::Int(4));
        assert_eq!(
            lconf.get_metas(0, &["operator", "runs"]).unwrap(),
            vec![&MetaValue::Text("Ada".into()), &MetaValue::Int(4)]
        );
        assert_eq!(lconf.meta(0).unwrap().len(), 2);
        assert!(matches!(
            lconf.get_meta(0, "missing"),
            Err(LConfError::MetaNotFound { device: 0, .. })
        ));
    }

    #[test]
    fn test_channel_data_and_calibration() {
        let lconf = sample_data();
        assert!(lconf.calibrated());
        assert_eq!(lconf.ndata().unwrap(), 10);
        assert_eq!(lconf.timestamp().unwrap(), "Mon Jan  1 00:00:00 2024\n");

        // aicalzero 1.0 on the first channel
        let ambient = lconf.get_channel("Ambient", &Window::all()).unwrap();
        assert_relative_eq!(ambient[0], 0.0);
        assert_relative_eq!(ambient[9], 9.0);
        assert_eq!(ambient, lconf.get_channel(0, &Window::all()).unwrap());

        let second = lconf.get_channel(1, &Window::between(0.2, 0.5)).unwrap();
        assert_eq!(second, vec![2.5, 3.5, 4.5]);

        let time = lconf.get_time(&Window::all().downsampled(4)).unwrap();
        assert_eq!(time.len(), 2);
        assert_relative_eq!(time[1], 0.5);

        let raw = with_data("3.0 0.0 0\n", LoadOptions::default().with_calibration(false));
        assert!(!raw.calibrated());
        assert_eq!(raw.get_channel(0, &Window::all()).unwrap(), vec![3.0]);
    }

    #[test]
    fn test_digital_channel() {
        let lconf = sample_data();
        assert_eq!(
            lconf.get_dichannel(None, &Window::between(0.0, 0.5)).unwrap(),
            DigitalTrace::Packed(vec![0, 1, 2, 3, 0])
        );
        assert_eq!(
            lconf.get_dichannel(Some(1), &Window::between(0.0, 0.5)).unwrap(),
            DigitalTrace::Bit(vec![false, false, true, true, false])
        );
        assert!(matches!(
            lconf.get_dichannel(Some(16), &Window::all()),
            Err(LConfError::IndexOutOfRange { .. })
        ));

        let bitwise = with_data("0 0 5\n0 0 4\n", LoadOptions::default().with_dibits(true));
        assert!(matches!(
            bitwise.get_dichannel(None, &Window::all()),
            Err(LConfError::DigitalBitRequired)
        ));
        assert_eq!(
            bitwise.get_dichannel(Some(0), &Window::all()).unwrap(),
            DigitalTrace::Bit(vec![true, false])
        );
    }

    #[test]
    fn test_no_digital_stream() {
        let lconf = LConf::parse_str(
            "connection usb samplehz 1 aichannel 0\n##\nstamp\n1\n2\n",
            LoadOptions::default().with_data(true),
        )
        .unwrap();
        assert!(matches!(
            lconf.get_dichannel(None, &Window::all()),
            Err(LConfError::NoDigitalStream)
        ));
    }

    #[test]
    fn test_events() {
        let levels = [0.0, 0.0, 0.0, 5.0, 5.0, 5.0, 0.0, 0.0, 0.0, 0.0];
        let rows: String = levels.iter().map(|v| format!("{} 0 0\n", v + 1.0)).collect();
        let lconf = with_data(&rows, LoadOptions::default());

        let options = EventOptions::crossing(2.5).debounce(3);
        assert_eq!(lconf.get_events("Ambient", &options).unwrap(), vec![3, 6]);
        assert_eq!(lconf.get_events(0, &options.clone().rising()).unwrap(), vec![3]);
        assert_eq!(lconf.get_events(0, &options.clone().limit(1)).unwrap(), vec![3]);
        assert_eq!(
            lconf.get_events(0, &options.clone().starting_at(0.4)).unwrap(),
            Vec::<usize>::new()
        );
        assert_eq!(
            lconf.get_events(0, &options.clone().stopping_at(0.7)).unwrap(),
            vec![3]
        );

        // First derivative: +50/s at sample 3, -50/s at sample 6
        let slope = EventOptions::crossing(10.0).derivative(1).rising();
        assert_eq!(lconf.get_events(0, &slope).unwrap(), vec![3]);
        let falling = EventOptions::crossing(-10.0).derivative(1).falling();
        assert_eq!(lconf.get_events(0, &falling).unwrap(), vec![6]);
    }

    #[test]
    fn test_dievents() {
        let lconf = sample_data();
        // Packed stream 0 1 2 3 0 1 2 3 0 1
        let options = EventOptions::crossing(2.0).rising();
        assert_eq!(lconf.get_dievents(None, &options).unwrap(), vec![2, 6]);
        let options = EventOptions::default().falling();
        assert_eq!(lconf.get_dievents(Some(0), &options).unwrap(), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_dataframe() {
        let lconf = sample_data();
        let df = lconf.to_dataframe(&Window::all()).unwrap();
        assert_eq!(df.height(), 10);
        let names: Vec<String> = df.get_column_names().iter().map(|n| n.to_string()).collect();
        assert_eq!(names, ["time", "Ambient", "ai1", "distream"]);

        let windowed = lconf
            .lazy_frame(&Window::between(0.2, 0.5))
            .unwrap()
            .select([col("time"), col("Ambient")])
            .collect()
            .unwrap();
        assert_eq!(windowed.height(), 3);
        assert_eq!(windowed.width(), 2);

        let bitwise = with_data("0 0 5\n", LoadOptions::default().with_dibits(true));
        let df = bitwise.to_dataframe(&Window::all()).unwrap();
        assert_eq!(df.width(), 3 + DIGITAL_STREAM_BITS);
        assert!(df.column("bit_15").is_ok());
    }

    #[test]
    fn test_missing_separator() {
        let err = LConf::parse_str("connection usb aichannel 0", LoadOptions::new().with_data(true))
            .unwrap_err();
        assert!(matches!(err, LConfError::Data(DataError::MissingSeparator)));
    }

    #[test]
    fn test_report() {
        let lconf = LConf::parse_str(CONFIG, LoadOptions::default()).unwrap();
        let report = lconf.to_string();
        assert!(report.starts_with("*** Device 0 ***\n"));
        assert!(report.contains("      samplehz : 10"));
        assert!(report.contains("    * AICH 1\n"));
        assert!(report.contains("ailabel : \"Ambient\""));
        assert!(report.contains("* COMCH 0"));
        assert!(report.contains("          runs : 4"));
        assert!(report.contains("0x00000002"));
    }
}
