//! Parameter schemas for devices and their channels.
//!
//! Every entity kind is a record with one optional field per parameter. A
//! field is `None` until the configuration file sets it, and the accessor
//! falls back to the schema default. Parameter names are resolved through a
//! static lookup table built once per entity kind.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;

use crate::enum_value::{EnumError, EnumValue};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error("expected an integer")]
    NotInteger,

    #[error("expected a floating point number")]
    NotFloat,

    #[error(transparent)]
    Enum(#[from] EnumError),
}

/// A typed parameter value, either read from the file or taken from the schema default.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
    Enum(EnumValue),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Enum(value) => Some(value.get_value()),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Enum(value) => Some(value.get()),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Self::Enum(value) => Some(value),
            _ => None,
        }
    }

    /// Rendering used by configuration reports: text is quoted and enums
    /// list every state.
    pub fn repr(&self) -> String {
        match self {
            Self::Int(value) => value.to_string(),
            Self::Float(value) => format!("{value:?}"),
            Self::Text(value) => format!("{value:?}"),
            Self::Enum(value) => format!("{value:?}"),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
            Self::Enum(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<EnumValue> for ParamValue {
    fn from(value: EnumValue) -> Self {
        Self::Enum(value)
    }
}

/// Coercion of configuration text into the type of a schema field. The
/// type of the default decides the rule.
pub trait FieldType: Clone + Into<ParamValue> {
    fn coerce(text: &str, default: &Self) -> Result<Self, ValueError>;
}

impl FieldType for i64 {
    fn coerce(text: &str, _default: &Self) -> Result<Self, ValueError> {
        text.trim().parse().map_err(|_| ValueError::NotInteger)
    }
}

impl FieldType for f64 {
    fn coerce(text: &str, _default: &Self) -> Result<Self, ValueError> {
        text.trim().parse().map_err(|_| ValueError::NotFloat)
    }
}

impl FieldType for String {
    fn coerce(text: &str, _default: &Self) -> Result<Self, ValueError> {
        Ok(text.to_string())
    }
}

impl FieldType for EnumValue {
    fn coerce(text: &str, default: &Self) -> Result<Self, ValueError> {
        Ok(default.parse(text)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    AnalogInput,
    AnalogOutput,
    ExtendedFeature,
    Communication,
}

impl ChannelKind {
    pub const ALL: [Self; 4] = [
        Self::AnalogInput,
        Self::AnalogOutput,
        Self::ExtendedFeature,
        Self::Communication,
    ];

    /// Name of the text field that labels channels of this kind
    pub fn label_field(self) -> &'static str {
        match self {
            Self::AnalogInput => "ailabel",
            Self::AnalogOutput => "aolabel",
            Self::ExtendedFeature => "eflabel",
            Self::Communication => "comlabel",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalogInput => "aich",
            Self::AnalogOutput => "aoch",
            Self::ExtendedFeature => "efch",
            Self::Communication => "comch",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Device,
    Channel(ChannelKind),
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => f.write_str("device"),
            Self::Channel(kind) => write!(f, "{kind}"),
        }
    }
}

/// One schema parameter: its name, default, and how to read and write it on a record.
pub struct FieldDef<R> {
    pub name: &'static str,
    default: fn() -> ParamValue,
    set: fn(&mut R, &str) -> Result<(), ValueError>,
    get: fn(&R) -> Option<ParamValue>,
}

impl<R> FieldDef<R> {
    pub fn default_value(&self) -> ParamValue {
        (self.default)()
    }

    /// Coerce `text` and store it in `record`.
    pub fn apply(&self, record: &mut R, text: &str) -> Result<(), ValueError> {
        (self.set)(record, text)
    }

    /// The value set on `record`, if the file set one
    pub fn explicit(&self, record: &R) -> Option<ParamValue> {
        (self.get)(record)
    }

    pub fn effective(&self, record: &R) -> ParamValue {
        self.explicit(record)
            .unwrap_or_else(|| self.default_value())
    }
}

pub struct FieldTable<R> {
    fields: Vec<FieldDef<R>>,
    index: HashMap<&'static str, usize>,
}

impl<R> FieldTable<R> {
    fn new(fields: Vec<FieldDef<R>>) -> Self {
        let index = fields
            .iter()
            .enumerate()
            .map(|(position, field)| (field.name, position))
            .collect();
        Self { fields, index }
    }

    pub fn find(&self, name: &str) -> Option<&FieldDef<R>> {
        self.index.get(name).map(|position| &self.fields[*position])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Fields in declaration order
    pub fn iter(&self) -> impl Iterator<Item = &FieldDef<R>> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.name)
    }
}

pub trait Record: Default + Clone + fmt::Debug + Sized + 'static {
    const KIND: EntityKind;

    fn table() -> &'static FieldTable<Self>;

    /// The file's value for `name`, else its schema default. `None` when
    /// `name` is not a parameter of this entity kind.
    fn effective(&self, name: &str) -> Option<ParamValue> {
        Self::table().find(name).map(|field| field.effective(self))
    }

    fn is_set(&self, name: &str) -> bool {
        Self::table()
            .find(name)
            .is_some_and(|field| field.explicit(self).is_some())
    }
}

macro_rules! schema_record {
    (
        $(#[$attr:meta])*
        $name:ident ($kind:expr) {
            $( $field:ident : $ty:ty = $default:expr ),+ $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( pub $field: Option<$ty>, )+
        }

        impl $name {
            $(
                pub fn $field(&self) -> $ty {
                    self.$field.clone().unwrap_or_else(|| $default)
                }
            )+
        }

        impl Record for $name {
            const KIND: EntityKind = $kind;

            fn table() -> &'static FieldTable<Self> {
                static TABLE: Lazy<FieldTable<$name>> = Lazy::new(|| {
                    FieldTable::new(vec![
                        $(
                            FieldDef {
                                name: stringify!($field),
                                default: || {
                                    let value: $ty = $default;
                                    ParamValue::from(value)
                                },
                                set: |record: &mut $name, text: &str| {
                                    let default: $ty = $default;
                                    record.$field = Some(<$ty as FieldType>::coerce(text, &default)?);
                                    Ok(())
                                },
                                get: |record: &$name| record.$field.clone().map(ParamValue::from),
                            },
                        )+
                    ])
                });
                &TABLE
            }
        }
    };
}

static CONNECTION: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(&["any", "usb", "eth", "ethernet"], Some(&[0, 1, 3, 3]), 0)
});
static DEVICE: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(
        &["any", "t4", "t7", "tx", "digit"],
        Some(&[0, 4, 7, 84, 200]),
        0,
    )
});
static TRIGEDGE: Lazy<EnumValue> =
    Lazy::new(|| EnumValue::builtin(&["rising", "falling", "all"], None, 0));
static AINEGATIVE: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(
        &[
            "differential",
            "differential",
            "differential",
            "differential",
            "differential",
            "differential",
            "differential",
            "ground",
        ],
        Some(&[1, 3, 5, 7, 9, 11, 13, 199]),
        7,
    )
});
static AOSIGNAL: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(
        &["constant", "sine", "square", "triangle", "noise"],
        None,
        0,
    )
});
static EFSIGNAL: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(
        &["trigger", "pwm", "count", "frequency", "phase", "quadrature"],
        None,
        0,
    )
});
static EFEDGE: Lazy<EnumValue> =
    Lazy::new(|| EnumValue::builtin(&["rising", "falling", "all"], None, 0));
static EFDEBOUNCE: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(&["none", "fixed", "reset", "minimum"], None, 0)
});
static EFDIRECTION: Lazy<EnumValue> =
    Lazy::new(|| EnumValue::builtin(&["input", "output"], None, 0));
static COMCHANNEL: Lazy<EnumValue> = Lazy::new(|| {
    EnumValue::builtin(&["none", "uart", "1wire", "spi", "i2c", "sbus"], None, 0)
});

schema_record! {
    /// Device-level parameters
    DeviceParams (EntityKind::Device) {
        connection: EnumValue = CONNECTION.clone(),
        serial: String = String::new(),
        device: EnumValue = DEVICE.clone(),
        name: String = String::new(),
        ip: String = String::new(),
        gateway: String = String::new(),
        subnet: String = String::new(),
        samplehz: f64 = -1.0,
        settleus: f64 = 1.0,
        nsample: i64 = 64,
        distream: i64 = 0,
        trigchannel: i64 = -1,
        triglevel: f64 = 0.0,
        trigpre: i64 = 0,
        trigedge: EnumValue = TRIGEDGE.clone(),
        effrequency: f64 = 0.0,
    }
}

schema_record! {
    AnalogInputChannel (EntityKind::Channel(ChannelKind::AnalogInput)) {
        aichannel: i64 = -1,
        ainegative: EnumValue = AINEGATIVE.clone(),
        airange: f64 = 10.0,
        airesolution: i64 = 0,
        aicalslope: f64 = 1.0,
        aicalzero: f64 = 0.0,
        ailabel: String = String::new(),
        aicalunits: String = String::new(),
    }
}

schema_record! {
    AnalogOutputChannel (EntityKind::Channel(ChannelKind::AnalogOutput)) {
        aochannel: i64 = -1,
        aosignal: EnumValue = AOSIGNAL.clone(),
        aofrequency: f64 = -1.0,
        aoamplitude: f64 = 1.0,
        aooffset: f64 = 2.5,
        aoduty: f64 = 0.5,
        aolabel: String = String::new(),
    }
}

schema_record! {
    /// Extended feature (flexible digital IO) channel
    ExtendedFeatureChannel (EntityKind::Channel(ChannelKind::ExtendedFeature)) {
        efchannel: i64 = -1,
        efsignal: EnumValue = EFSIGNAL.clone(),
        efedge: EnumValue = EFEDGE.clone(),
        efdebounce: EnumValue = EFDEBOUNCE.clone(),
        efdirection: EnumValue = EFDIRECTION.clone(),
        efusec: f64 = 0.0,
        efdegrees: f64 = 0.0,
        efduty: f64 = 0.5,
        efcount: i64 = 0,
        eflabel: String = String::new(),
    }
}

schema_record! {
    /// Digital communication channel
    CommunicationChannel (EntityKind::Channel(ChannelKind::Communication)) {
        comchannel: EnumValue = COMCHANNEL.clone(),
        comrate: i64 = -1,
        comin: i64 = -1,
        comout: i64 = -1,
        comclock: i64 = -1,
        comoptions: String = String::new(),
        comlabel: String = String::new(),
    }
}
