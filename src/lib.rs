//! # LCONF RS
//!
//! A Rust library for reading LCONF data-acquisition configuration and data files.
//!
//! An LCONF file starts with whitespace separated `parameter value` pairs that
//! configure one or more acquisition devices and their channels. A `##` line
//! ends the configuration; it is followed by a timestamp line and one row of
//! whitespace separated samples per line.
//!
//! ## Features
//!
//! - **Configuration parsing**: devices, analog input/output, extended feature and
//!   communication channels, digital outputs and typed meta parameters
//! - **Schema defaults**: every parameter not written in the file falls back to its default
//! - **Data loading**: sample matrix, digital input stream and calibration
//! - **Event detection**: debounced edge crossings, optionally on derivatives
//! - **DataFrame output**: Uses `polars` for handing samples to plotting and reporting code
//!
//! ## Examples
//!
//! ### Reading a configuration
//!
//! ```rust
//! use lconf_rs::{LConf, LoadOptions, Scope};
//!
//! let text = r#"
//! connection usb
//! samplehz 500
//! aichannel 0 ailabel "Ambient"
//! aichannel 1
//! meta flt
//!     gain 2.5
//! "#;
//!
//! let lconf = LConf::parse_str(text, LoadOptions::default())?;
//! assert_eq!(lconf.naich(0)?, 2);
//! assert_eq!(lconf.get(0, "samplehz", &Scope::Device)?.as_float(), Some(500.0));
//! // Not written in the file, so the default
//! assert_eq!(lconf.get(0, "airange", &Scope::aich("Ambient"))?.as_float(), Some(10.0));
//! assert_eq!(lconf.get_meta(0, "gain")?.as_float(), Some(2.5));
//! # Ok::<(), lconf_rs::LConfError>(())
//! ```
//!
//! ### Reading data
//!
//! ```rust
//! use lconf_rs::{EventOptions, LConf, LoadOptions, Window};
//!
//! let text = concat!(
//!     "connection usb samplehz 10\n",
//!     "aichannel 0 ailabel \"Ambient\" aicalzero 1.0\n",
//!     "##\n",
//!     "Mon Jan  1 00:00:00 2024\n",
//!     "1.0\n1.0\n1.0\n4.0\n4.0\n4.0\n",
//! );
//!
//! let lconf = LConf::parse_str(text, LoadOptions::default().with_data(true))?;
//! assert_eq!(lconf.ndata()?, 6);
//! assert_eq!(lconf.get_channel("Ambient", &Window::all())?, vec![0.0, 0.0, 0.0, 3.0, 3.0, 3.0]);
//! assert_eq!(lconf.get_time(&Window::between(0.1, 0.3))?, vec![0.1, 0.2]);
//!
//! let events = lconf.get_events("Ambient", &EventOptions::crossing(1.5).rising().debounce(3))?;
//! assert_eq!(events, vec![3]);
//! # Ok::<(), lconf_rs::LConfError>(())
//! ```
//!
//! ### Loading a file
//!
//! ```rust,no_run
//! use lconf_rs::{LConf, LoadOptions, Window};
//!
//! let lconf = LConf::open("run.dat", LoadOptions::default().with_data(true).with_dibits(true))?;
//! println!("{lconf}");
//!
//! let df = lconf.to_dataframe(&Window::all().downsampled(9))?;
//! println!("{df}");
//! # Ok::<(), lconf_rs::LConfError>(())
//! ```

pub mod config;
pub mod data;
pub mod enum_value;
pub mod events;
pub mod lconf;
pub mod schema;
pub mod tokenizer;

// Re-export the main types for convenience
pub use enum_value::{EnumError, EnumTable, EnumValue};

pub use tokenizer::{Token, Tokenizer};

pub use schema::{
    AnalogInputChannel, AnalogOutputChannel, ChannelKind, CommunicationChannel, DeviceParams,
    EntityKind, ExtendedFeatureChannel, ParamValue, Record, ValueError,
};

pub use config::{ConfigBuilder, ConfigError, Configuration, DeviceConfig, MetaMap, MetaType, MetaValue};

pub use data::{DataError, DataLoader, DigitalStream, SampleSet, Window, DIGITAL_STREAM_BITS};

pub use events::{differentiate, Edge, EventDetector, EventOptions, UnknownEdge};

pub use lconf::{ChannelRef, DigitalTrace, LConf, LConfError, LoadOptions, Scope};
