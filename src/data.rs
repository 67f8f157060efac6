use std::io::{self, BufRead};
use std::ops::Range;

use crate::config::{Configuration, DeviceConfig};

/// Number of lines in the digital input stream
pub const DIGITAL_STREAM_BITS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("LCONF expected ## before data")]
    MissingSeparator,

    #[error("No device is configured, so the data block cannot be interpreted")]
    NoDevice,

    #[error("Data line {line} has {found} columns, expected {expected}")]
    RaggedDataRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Data line {line}: {text:?} is not a number")]
    InvalidSample { line: usize, text: String },

    #[error("{channels} analog inputs are configured but the data has {columns} columns")]
    ChannelCountMismatch { channels: usize, columns: usize },
}

/// The digital input stream captured alongside the analog samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigitalStream {
    /// One packed integer per sample
    Packed(Vec<i64>),
    /// One boolean column per bit, bit 0 first
    Bits(Vec<Vec<bool>>),
}

impl DigitalStream {
    /// Number of columns: 1 when packed, 16 when loaded bit-wise
    pub fn width(&self) -> usize {
        match self {
            Self::Packed(_) => 1,
            Self::Bits(bits) => bits.len(),
        }
    }

    fn unpack(packed: Vec<i64>, bitwise: bool) -> Self {
        if !bitwise {
            return Self::Packed(packed);
        }
        let bits = (0..DIGITAL_STREAM_BITS)
            .map(|bit| packed.iter().map(|value| (value >> bit) & 1 == 1).collect())
            .collect();
        Self::Bits(bits)
    }
}

/// Sample window given in seconds, with an optional downsample factor.
///
/// Start and stop times are rounded to the nearest sample index. The window
/// includes the start sample and excludes the stop sample.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Window {
    pub start: Option<f64>,
    pub stop: Option<f64>,
    /// Samples to skip between returned samples
    pub downsample: Option<usize>,
}

impl Window {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn between(start: f64, stop: f64) -> Self {
        Self {
            start: Some(start),
            stop: Some(stop),
            downsample: None,
        }
    }

    pub fn starting_at(mut self, start: f64) -> Self {
        self.start = Some(start);
        self
    }

    pub fn stopping_at(mut self, stop: f64) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn downsampled(mut self, downsample: usize) -> Self {
        self.downsample = Some(downsample);
        self
    }
}

/// Analog samples, digital stream and time base loaded from a data file.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    columns: Vec<Vec<f64>>,
    rows: usize,
    digital: Option<DigitalStream>,
    time: Vec<f64>,
    samplehz: f64,
    timestamp: String,
}

impl SampleSet {
    pub fn nrows(&self) -> usize {
        self.rows
    }

    pub fn ncols(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> Option<&[f64]> {
        self.columns.get(index).map(Vec::as_slice)
    }

    pub fn value(&self, row: usize, column: usize) -> Option<f64> {
        self.columns.get(column)?.get(row).copied()
    }

    pub fn row(&self, row: usize) -> Option<Vec<f64>> {
        (row < self.rows).then(|| self.columns.iter().map(|column| column[row]).collect())
    }

    pub fn digital(&self) -> Option<&DigitalStream> {
        self.digital.as_ref()
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn samplehz(&self) -> f64 {
        self.samplehz
    }

    /// The timestamp line written after the `##` separator, exactly as
    /// read, line terminator included
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Sample index nearest to `time`, clamped to the loaded data.
    pub fn index_at(&self, time: f64) -> usize {
        if self.rows == 0 {
            return 0;
        }
        let index = (time * self.samplehz).round_ties_even();
        if index.is_nan() || index <= 0.0 {
            0
        } else {
            (index as usize).min(self.rows - 1)
        }
    }

    /// Index range and stride selected by `window`.
    pub fn window_bounds(&self, window: &Window) -> (Range<usize>, usize) {
        let start = window.start.map_or(0, |time| self.index_at(time));
        let stop = window.stop.map_or(self.rows, |time| self.index_at(time));
        let step = window.downsample.map_or(1, |skip| skip + 1);
        (start..stop.max(start), step)
    }
}

/// Copy the samples of `values` selected by a window.
pub(crate) fn slice_window<T: Copy>(values: &[T], (range, step): (Range<usize>, usize)) -> Vec<T> {
    values[range].iter().step_by(step).copied().collect()
}

/// Reads the data block that follows the `##` separator.
///
/// Channel layout, sample rate, digital stream flag and calibration are
/// taken from the first device of the configuration.
pub struct DataLoader<'a> {
    device: &'a DeviceConfig,
    bitwise: bool,
    calibrate: bool,
}

impl<'a> DataLoader<'a> {
    pub fn new(config: &'a Configuration, bitwise: bool, calibrate: bool) -> Result<Self, DataError> {
        let device = config.devices.first().ok_or(DataError::NoDevice)?;
        Ok(Self {
            device,
            bitwise,
            calibrate,
        })
    }

    /// Read the data block. `reader` must be positioned right after the `##` marker.
    pub fn load<R: BufRead>(&self, mut reader: R) -> Result<SampleSet, DataError> {
        // Whatever remains on the separator line is not data
        let mut line = String::new();
        reader.read_line(&mut line)?;

        let mut timestamp = String::new();
        reader.read_line(&mut timestamp)?;

        // Line numbers count from the first data line
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut rows = 0;
        for (number, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let fields = line
                .split_whitespace()
                .map(|text| {
                    text.parse::<f64>().map_err(|_| DataError::InvalidSample {
                        line: number + 1,
                        text: text.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            if rows == 0 {
                columns = vec![Vec::new(); fields.len()];
            } else if fields.len() != columns.len() {
                return Err(DataError::RaggedDataRow {
                    line: number + 1,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }
            for (column, value) in columns.iter_mut().zip(fields) {
                column.push(value);
            }
            rows += 1;
        }
        log::debug!("Loaded {} samples of {} columns", rows, columns.len());

        let digital = if self.device.params.distream() == 0 {
            None
        } else {
            // Samples are written as floats; the stream is an integer column
            let packed = columns
                .pop()
                .map(|column| column.into_iter().map(|value| value as i64).collect())
                .unwrap_or_default();
            Some(DigitalStream::unpack(packed, self.bitwise))
        };

        if rows > 0 && columns.len() < self.device.aich.len() {
            return Err(DataError::ChannelCountMismatch {
                channels: self.device.aich.len(),
                columns: columns.len(),
            });
        }

        if self.calibrate {
            self.apply_calibration(&mut columns);
        }

        let samplehz = self.device.params.samplehz();
        let time = (0..rows).map(|index| index as f64 / samplehz).collect();

        Ok(SampleSet {
            columns,
            rows,
            digital,
            time,
            samplehz,
            timestamp,
        })
    }

    /// Remove the zero offset, then scale by the slope, for every analog
    /// input whose calibration differs from the identity.
    #[allow(clippy::float_cmp)]
    fn apply_calibration(&self, columns: &mut [Vec<f64>]) {
        for (index, (channel, column)) in self.device.aich.iter().zip(columns.iter_mut()).enumerate() {
            let zero = channel.aicalzero();
            let slope = channel.aicalslope();
            if zero != 0.0 {
                column.iter_mut().for_each(|value| *value -= zero);
            }
            if slope != 1.0 {
                column.iter_mut().for_each(|value| *value *= slope);
            }
            if zero != 0.0 || slope != 1.0 {
                log::debug!("Calibrated analog input {index}: zero={zero}, slope={slope}");
            }
        }
    }
}
