//! Recording Loader: one PSG file in, the configured EEG channels out.

use std::path::Path;

use chrono::NaiveDateTime;
use log::debug;

use crate::config::ChannelSpec;
use crate::error::{Error, Result};
use crate::identity::RecordingIdentity;
use crate::reader::EdfReader;

/// One selected channel of a recording, in physical units.
#[derive(Debug, Clone)]
pub struct Channel {
    pub label: String,
    /// Column group name in the feature table (e.g. `anterior`).
    pub prefix: String,
    pub samples: Vec<f64>,
}

/// A loaded recording restricted to the channels of interest. All channels
/// share `sampling_rate` and start at `start`.
#[derive(Debug, Clone)]
pub struct Recording {
    pub identity: RecordingIdentity,
    pub sampling_rate: f64,
    pub start: NaiveDateTime,
    pub channels: Vec<Channel>,
}

impl Recording {
    /// Number of samples common to every channel.
    pub fn len(&self) -> usize {
        self.channels.iter().map(|c| c.samples.len()).min().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        self.len() as f64 / self.sampling_rate
    }

    /// Seconds since recording start of every sample.
    pub fn timestamps(&self) -> Vec<f64> {
        (0..self.len())
            .map(|i| i as f64 / self.sampling_rate)
            .collect()
    }
}

/// Loads `path`, keeping only the channels named in `channels` (in that
/// order). The recording identity comes from the file name.
///
/// # Errors
///
/// * `Error::InvalidFormat` - file name is not a recognised identifier
/// * `Error::MissingChannel` - a requested channel label is absent
/// * `Error::SamplingRateMismatch` - requested channels differ in rate
/// * any decode error from [`EdfReader::open`]
pub fn load_recording(path: &Path, channels: &[ChannelSpec]) -> Result<Recording> {
    // 先校验文件名，避免无谓的读取
    let identity = RecordingIdentity::from_path(path)?;
    let mut reader = EdfReader::open(path)?;

    let file = path.display().to_string();
    let mut indexes = Vec::with_capacity(channels.len());
    let mut rates = Vec::with_capacity(channels.len());
    for spec in channels {
        let index = reader.header().signal_index(&spec.label).ok_or_else(|| Error::MissingChannel {
            file: file.clone(),
            label: spec.label.clone(),
        })?;
        let rate = reader.header().sampling_rate(index).ok_or_else(|| {
            Error::InvalidFormat(format!("{}: channel '{}' has no sampling rate", file, spec.label))
        })?;
        indexes.push(index);
        rates.push(rate);
    }

    let sampling_rate = match rates.first() {
        Some(&first) if rates.iter().all(|&r| (r - first).abs() < 1e-9) => first,
        Some(_) => return Err(Error::SamplingRateMismatch { file, rates }),
        None => return Err(Error::InvalidFormat(format!("{}: no channels selected", file))),
    };

    let mut loaded = Vec::with_capacity(channels.len());
    for (spec, index) in channels.iter().zip(indexes) {
        let samples = reader.read_all_physical_samples(index)?;
        debug!("{}: read {} samples of '{}'", file, samples.len(), spec.label);
        loaded.push(Channel {
            label: spec.label.clone(),
            prefix: spec.prefix.clone(),
            samples,
        });
    }

    Ok(Recording {
        identity,
        sampling_rate,
        start: reader.header().start_datetime(),
        channels: loaded,
    })
}
