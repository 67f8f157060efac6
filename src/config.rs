use std::collections::HashMap;
use std::fmt;
use std::io::{self, BufRead};

use crate::schema::{
    AnalogInputChannel, AnalogOutputChannel, ChannelKind, CommunicationChannel, DeviceParams,
    EntityKind, ExtendedFeatureChannel, Record, ValueError,
};
use crate::tokenizer::{Token, Tokenizer};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid value {value:?} for parameter {param}: {source}")]
    InvalidValue {
        param: String,
        value: String,
        source: ValueError,
    },

    #[error("Unrecognized parameter: {param} (device {device:?})")]
    UnrecognizedParameter {
        param: String,
        device: Option<usize>,
    },

    #[error("Unrecognized meta flag: {value}")]
    UnrecognizedMetaType { value: String },

    #[error("Parameter {param} appeared before any {kind} was declared")]
    MissingEntity { param: String, kind: EntityKind },

    #[error("Digital output {param} is beyond the 32-bit output mask")]
    DigitalOutputBit { param: String },
}

/// Type applied to parameters that match no schema while a `meta` block is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetaType {
    #[default]
    None,
    Int,
    Float,
    Text,
}

impl MetaType {
    /// Interpret the value of a `meta` keyword.
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "int" | "integer" => Some(Self::Int),
            "flt" | "float" => Some(Self::Float),
            "str" | "string" => Some(Self::Text),
            "none" | "end" | "stop" => Some(Self::None),
            _ => None,
        }
    }

    /// Explicit type prefix of a meta parameter name (`int:`, `flt:`, `str:`)
    fn split_prefix(param: &str) -> Option<(Self, &str)> {
        let (prefix, name) = param.split_once(':')?;
        let meta_type = match prefix {
            "int" => Self::Int,
            "flt" => Self::Float,
            "str" => Self::Text,
            _ => return None,
        };
        Some((meta_type, name))
    }

    fn coerce(self, text: &str) -> Result<Option<MetaValue>, ValueError> {
        Ok(match self {
            Self::None => None,
            Self::Int => Some(MetaValue::Int(
                text.trim().parse().map_err(|_| ValueError::NotInteger)?,
            )),
            Self::Float => Some(MetaValue::Float(
                text.trim().parse().map_err(|_| ValueError::NotFloat)?,
            )),
            Self::Text => Some(MetaValue::Text(text.to_string())),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Meta parameters of a device, in the order they were first declared.
///
/// Lookups go through a name index into the ordered entries.
#[derive(Debug, Clone, Default)]
pub struct MetaMap {
    entries: Vec<(String, MetaValue)>,
    index: HashMap<String, usize>,
}

impl PartialEq for MetaMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl MetaMap {
    /// Insert or replace. A replaced entry keeps its position.
    pub fn insert(&mut self, name: String, value: MetaValue) {
        match self.index.get(&name) {
            Some(&position) => self.entries[position].1 = value,
            None => {
                self.index.insert(name.clone(), self.entries.len());
                self.entries.push((name, value));
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&MetaValue> {
        let &position = self.index.get(name)?;
        self.entries.get(position).map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a configuration file declared about one device.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceConfig {
    pub params: DeviceParams,
    pub aich: Vec<AnalogInputChannel>,
    pub aoch: Vec<AnalogOutputChannel>,
    pub efch: Vec<ExtendedFeatureChannel>,
    pub comch: Vec<CommunicationChannel>,
    /// Digital outputs named by `doNN` parameters
    pub domask: u32,
    /// Requested level of each digital output in `domask`
    pub dovalue: u32,
    pub meta: MetaMap,
}

impl DeviceConfig {
    pub fn channel_count(&self, kind: ChannelKind) -> usize {
        match kind {
            ChannelKind::AnalogInput => self.aich.len(),
            ChannelKind::AnalogOutput => self.aoch.len(),
            ChannelKind::ExtendedFeature => self.efch.len(),
            ChannelKind::Communication => self.comch.len(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Configuration {
    pub devices: Vec<DeviceConfig>,
}

/// Result of parsing the configuration section of a stream.
#[derive(Debug)]
pub struct ParsedConfig {
    pub config: Configuration,
    /// Whether parsing stopped on the `##` data separator
    pub separator: bool,
}

/// Builds a [`Configuration`] from `(parameter, value)` word pairs.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    devices: Vec<DeviceConfig>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume word pairs until the data separator or the end of the stream.
    pub fn parse<R: BufRead>(tokenizer: &mut Tokenizer<R>) -> Result<ParsedConfig, ConfigError> {
        let mut builder = Self::new();
        let mut meta_type = MetaType::None;

        let separator = loop {
            let param = match tokenizer.next_word()? {
                Token::Word(word) => word,
                Token::EndOfConfig => break true,
                Token::Empty => break false,
            };
            let value = match tokenizer.next_word()? {
                Token::Word(word) => word,
                Token::EndOfConfig => break true,
                Token::Empty => {
                    log::warn!("Parameter {param} has no value at the end of the configuration");
                    break false;
                }
            };
            meta_type = builder.apply(&param, &value, meta_type)?;
        };

        if separator {
            log::debug!("Found the data separator");
        }
        Ok(ParsedConfig {
            config: builder.finish(),
            separator,
        })
    }

    pub fn finish(self) -> Configuration {
        Configuration {
            devices: self.devices,
        }
    }

    /// Apply one `(parameter, value)` pair under the current meta type and
    /// return the meta type in effect for the next pair.
    pub fn apply(
        &mut self,
        param: &str,
        value: &str,
        meta_type: MetaType,
    ) -> Result<MetaType, ConfigError> {
        let param = self.introduce(param)?;

        if write_field(self.devices.last_mut().map(|d| &mut d.params), param, value)?
            || write_field(self.last_channel(|d| d.aich.last_mut()), param, value)?
            || write_field(self.last_channel(|d| d.aoch.last_mut()), param, value)?
            || write_field(self.last_channel(|d| d.efch.last_mut()), param, value)?
            || write_field(self.last_channel(|d| d.comch.last_mut()), param, value)?
        {
            return Ok(meta_type);
        }

        if let Some(bit) = param.strip_prefix("do").filter(|bit| is_decimal(bit)) {
            self.set_digital_output(param, bit, value)?;
            return Ok(meta_type);
        }

        if param == "meta" {
            let next = MetaType::from_keyword(value).ok_or_else(|| {
                ConfigError::UnrecognizedMetaType {
                    value: value.to_string(),
                }
            })?;
            log::debug!("Meta type {meta_type:?} -> {next:?}");
            return Ok(next);
        }

        let (explicit, name) = match MetaType::split_prefix(param) {
            Some((explicit, name)) => (explicit, name),
            None => (meta_type, param),
        };
        let meta = explicit
            .coerce(value)
            .map_err(|source| invalid_value(param, value, source))?;
        let Some(meta) = meta else {
            return Err(ConfigError::UnrecognizedParameter {
                param: param.to_string(),
                device: self.devices.len().checked_sub(1),
            });
        };
        self.last_device(param)?.meta.insert(name.to_string(), meta);
        Ok(meta_type)
    }

    /// Append a new device or channel when `param` introduces one, and
    /// return the schema field that carries the value.
    fn introduce<'p>(&mut self, param: &'p str) -> Result<&'p str, ConfigError> {
        match param {
            "connection" => {
                self.devices.push(DeviceConfig::default());
                log::debug!("New device {}", self.devices.len() - 1);
            }
            "aichannel" => {
                let device = self.last_device(param)?;
                device.aich.push(AnalogInputChannel::default());
                log::debug!("New analog input {}", device.aich.len() - 1);
            }
            "aochannel" => {
                let device = self.last_device(param)?;
                device.aoch.push(AnalogOutputChannel::default());
                log::debug!("New analog output {}", device.aoch.len() - 1);
            }
            "efchannel" => {
                let device = self.last_device(param)?;
                device.efch.push(ExtendedFeatureChannel::default());
                log::debug!("New extended feature channel {}", device.efch.len() - 1);
            }
            "comsignal" => {
                let device = self.last_device(param)?;
                device.comch.push(CommunicationChannel::default());
                log::debug!("New communication channel {}", device.comch.len() - 1);
                return Ok("comchannel");
            }
            _ => {}
        }
        Ok(param)
    }

    fn last_device(&mut self, param: &str) -> Result<&mut DeviceConfig, ConfigError> {
        self.devices
            .last_mut()
            .ok_or_else(|| ConfigError::MissingEntity {
                param: param.to_string(),
                kind: EntityKind::Device,
            })
    }

    fn last_channel<'a, R>(
        &'a mut self,
        select: impl FnOnce(&'a mut DeviceConfig) -> Option<&'a mut R>,
    ) -> Option<&'a mut R> {
        self.devices.last_mut().and_then(select)
    }

    fn set_digital_output(&mut self, param: &str, bit: &str, value: &str) -> Result<(), ConfigError> {
        let bit: u32 = bit
            .parse()
            .ok()
            .filter(|bit| *bit < u32::BITS)
            .ok_or_else(|| ConfigError::DigitalOutputBit {
                param: param.to_string(),
            })?;
        let level: i64 = value
            .trim()
            .parse()
            .map_err(|_| invalid_value(param, value, ValueError::NotInteger))?;

        let device = self.last_device(param)?;
        device.domask |= 1 << bit;
        if level == 0 {
            device.dovalue &= !(1 << bit);
        } else {
            device.dovalue |= 1 << bit;
        }
        Ok(())
    }
}

/// Write `value` into `record` when `param` belongs to the schema of `R`.
/// Returns `Ok(false)` when it does not.
fn write_field<R: Record>(
    record: Option<&mut R>,
    param: &str,
    value: &str,
) -> Result<bool, ConfigError> {
    let Some(field) = R::table().find(param) else {
        return Ok(false);
    };
    let record = record.ok_or_else(|| ConfigError::MissingEntity {
        param: param.to_string(),
        kind: R::KIND,
    })?;
    field
        .apply(record, value)
        .map_err(|source| invalid_value(param, value, source))?;
    Ok(true)
}

fn invalid_value(param: &str, value: &str, source: ValueError) -> ConfigError {
    ConfigError::InvalidValue {
        param: param.to_string(),
        value: value.to_string(),
        source,
    }
}

fn is_decimal(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}
