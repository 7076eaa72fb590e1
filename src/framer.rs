//! Signal Framer: partitions a time series into fixed-length epochs.

use std::ops::Range;

use crate::identity::{EpochId, RecordingIdentity};
use crate::loader::Recording;

/// Nominal epoch length used by sleep scoring.
pub const EPOCH_SECONDS: f64 = 30.0;

/// A contiguous run of samples sharing one epoch index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochSpan {
    pub index: usize,
    pub samples: Range<usize>,
}

/// `floor((t - t0) / epoch_seconds)` for every timestamp, `t0` being the
/// first timestamp.
pub fn epoch_indices(timestamps: &[f64], epoch_seconds: f64) -> Vec<usize> {
    let Some(&t0) = timestamps.first() else {
        return Vec::new();
    };
    timestamps
        .iter()
        .map(|&t| ((t - t0) / epoch_seconds).floor().max(0.0) as usize)
        .collect()
}

/// Groups consecutive samples by epoch index. Timestamps must be
/// monotonic; every sample lands in exactly one span. A trailing epoch
/// shorter than `epoch_seconds` is kept as-is.
pub fn frame(timestamps: &[f64], epoch_seconds: f64) -> Vec<EpochSpan> {
    let mut spans: Vec<EpochSpan> = Vec::new();

    for (sample, index) in epoch_indices(timestamps, epoch_seconds).into_iter().enumerate() {
        match spans.last_mut() {
            Some(span) if span.index == index => span.samples.end = sample + 1,
            _ => spans.push(EpochSpan {
                index,
                samples: sample..sample + 1,
            }),
        }
    }

    spans
}

/// One epoch of a recording: its identifier and per-channel sample slices.
#[derive(Debug)]
pub struct Epoch<'a> {
    pub id: EpochId,
    pub span: EpochSpan,
    pub channels: Vec<&'a [f64]>,
}

/// Frames every channel of `recording` on a common epoch grid.
pub fn frame_recording(recording: &Recording, epoch_seconds: f64) -> Vec<Epoch<'_>> {
    let identity: RecordingIdentity = recording.identity;
    frame(&recording.timestamps(), epoch_seconds)
        .into_iter()
        .map(|span| Epoch {
            id: identity.epoch_id(span.index),
            channels: recording
                .channels
                .iter()
                .map(|c| &c.samples[span.samples.clone()])
                .collect(),
            span,
        })
        .collect()
}
