//! Synthetic Sleep-EDF style corpus.
//!
//! Writes recording/hypnogram pairs named like the PhysioNet files. Each
//! 30 s epoch of a recording is a sine wave whose frequency depends on the
//! scored stage of that epoch, so the dominant band of an epoch follows
//! its label. Output is fully deterministic.

use std::f64::consts::PI;
use std::fs;
use std::path::Path;

use log::info;

use crate::error::{Error, Result};
use crate::identity::{RecordingIdentity, RecordingKind};
use crate::pipeline::{CorpusEntry, CorpusManifest};
use crate::types::{SignalParam, SleepStage};
use crate::writer::EdfWriter;

const SYNTH_SAMPLING_RATE: usize = 100;
const SYNTH_EPOCH_SECONDS: usize = 30;

/// Stage cycle used to score synthetic nights.
const STAGE_CYCLE: [&str; 12] = ["W", "W", "1", "2", "2", "3", "4", "3", "2", "R", "R", "1"];

#[derive(Debug, Clone)]
pub struct SynthSpec {
    pub kind: RecordingKind,
    pub subjects: u8,
    pub nights: u8,
    /// Scored epochs per recording.
    pub epochs: usize,
    /// Unscored seconds appended after the last scored epoch.
    pub trailing_seconds: usize,
}

impl Default for SynthSpec {
    fn default() -> Self {
        Self {
            kind: RecordingKind::Cassette,
            subjects: 2,
            nights: 1,
            epochs: 24,
            trailing_seconds: 0,
        }
    }
}

pub fn recording_file_name(identity: &RecordingIdentity) -> String {
    match identity.kind {
        RecordingKind::Cassette => format!("SC4{:02}{}E0-PSG.edf", identity.subject, identity.night),
        RecordingKind::Telemetry => format!("ST7{:02}{}J0-PSG.edf", identity.subject, identity.night),
    }
}

pub fn hypnogram_file_name(identity: &RecordingIdentity) -> String {
    match identity.kind {
        RecordingKind::Cassette => format!("SC4{:02}{}EC-Hypnogram.edf", identity.subject, identity.night),
        RecordingKind::Telemetry => format!("ST7{:02}{}JP-Hypnogram.edf", identity.subject, identity.night),
    }
}

/// Stage of every scored epoch, offset per subject so recordings differ.
pub fn stage_schedule(subject: u8, epochs: usize) -> Vec<SleepStage> {
    (0..epochs)
        .map(|epoch| SleepStage::from_code(STAGE_CYCLE[(epoch + subject as usize) % STAGE_CYCLE.len()]))
        .collect()
}

/// Sine frequency written for an epoch scored `stage`.
pub fn stage_frequency(stage: &SleepStage) -> f64 {
    match stage {
        SleepStage::Wake => 10.0,
        SleepStage::Stage1 => 6.0,
        SleepStage::Stage2 => 14.0,
        SleepStage::Stage3 => 2.0,
        SleepStage::Stage4 => 1.0,
        SleepStage::Rem => 20.0,
        SleepStage::Movement => 40.0,
        _ => 0.25,
    }
}

fn stage_description(stage: &SleepStage) -> String {
    match stage {
        SleepStage::Movement => "Movement time".to_string(),
        other => format!("Sleep stage {}", other.code()),
    }
}

fn eeg_signal(label: &str) -> SignalParam {
    SignalParam {
        label: label.to_string(),
        samples_in_file: 0,
        physical_max: 200.0,
        physical_min: -200.0,
        digital_max: 32767,
        digital_min: -32768,
        samples_per_record: SYNTH_SAMPLING_RATE as i32,
        physical_dimension: "uV".to_string(),
        prefilter: "HP:0.5Hz LP:100Hz".to_string(),
        transducer: "Ag-AgCl electrodes".to_string(),
    }
}

/// Writes the plain EDF recording: one 1 s data record at a time,
/// `EEG Fpz-Cz` and `EEG Pz-Oz` at 100 Hz. The recording lasts
/// `stages.len() * 30 + trailing_seconds` seconds.
pub fn write_recording(path: &Path, subject: u8, stages: &[SleepStage], trailing_seconds: usize) -> Result<()> {
    let mut writer = EdfWriter::create(path)?;
    writer.set_edf_plus(false)?;
    writer.set_patient_info("X", "X", "X", &format!("Subject {:02}", subject))?;
    writer.set_equipment("synthetic")?;
    writer.set_datarecord_duration(1.0)?;
    writer.add_signal(eeg_signal("EEG Fpz-Cz"))?;
    writer.add_signal(eeg_signal("EEG Pz-Oz"))?;

    let seconds = stages.len() * SYNTH_EPOCH_SECONDS + trailing_seconds;
    let amplitude = 40.0 + subject as f64;

    for second in 0..seconds {
        let frequency = stages
            .get(second / SYNTH_EPOCH_SECONDS)
            .map(stage_frequency)
            .unwrap_or(0.25);
        let wave = |scale: f64| -> Vec<f64> {
            (0..SYNTH_SAMPLING_RATE)
                .map(|i| {
                    let t = (second * SYNTH_SAMPLING_RATE + i) as f64 / SYNTH_SAMPLING_RATE as f64;
                    scale * amplitude * (2.0 * PI * frequency * t).sin()
                })
                .collect()
        };
        writer.write_samples(&[wave(1.0), wave(0.5)])?;
    }

    writer.finalize()
}

/// Writes the annotation-only EDF+ hypnogram; runs of equal stages become
/// one interval.
pub fn write_hypnogram(path: &Path, stages: &[SleepStage]) -> Result<()> {
    let mut writer = EdfWriter::create(path)?;
    writer.set_datarecord_duration(SYNTH_EPOCH_SECONDS as f64)?;

    let epoch = SYNTH_EPOCH_SECONDS as f64;
    let mut start = 0;
    while start < stages.len() {
        let run = stages[start..].iter().take_while(|s| **s == stages[start]).count();
        writer.add_annotation(start as f64 * epoch, Some(run as f64 * epoch), &stage_description(&stages[start]))?;
        start += run;
    }

    for _ in 0..stages.len() {
        writer.write_samples(&[])?;
    }
    writer.finalize()
}

/// Writes `spec.subjects × spec.nights` recording/hypnogram pairs into
/// `dir` and returns their manifest.
pub fn write_corpus(dir: &Path, spec: &SynthSpec) -> Result<CorpusManifest> {
    if spec.epochs == 0 {
        return Err(Error::Config("synthetic recordings need at least one epoch".to_string()));
    }
    fs::create_dir_all(dir)?;

    let mut entries = Vec::new();
    for subject in 0..spec.subjects {
        for night in 1..=spec.nights {
            let identity = RecordingIdentity::new(spec.kind, subject, night);
            let stages = stage_schedule(subject, spec.epochs);

            let recording = dir.join(recording_file_name(&identity));
            let hypnogram = dir.join(hypnogram_file_name(&identity));
            write_recording(&recording, subject, &stages, spec.trailing_seconds)?;
            write_hypnogram(&hypnogram, &stages)?;

            entries.push(CorpusEntry::new(recording, Some(hypnogram)));
        }
    }

    info!("Wrote {} synthetic recordings to {}", entries.len(), dir.display());
    Ok(CorpusManifest::new(entries))
}
