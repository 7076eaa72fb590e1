//! Pipeline Orchestrator
//!
//! Runs two independent passes over a [`CorpusManifest`]:
//!
//! 1. every recording file: load → frame → spectral features, accumulated
//!    into a [`FeatureTable`];
//! 2. every hypnogram file: annotations → epoch labels, accumulated into a
//!    [`LabelSet`].
//!
//! The labels are then left-joined onto the features. Recordings are
//! processed one at a time and released before the next one is read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::annotations::{extract_annotations, Hypnogram};
use crate::config::{ChannelSpec, PipelineConfig};
use crate::error::{Error, Result};
use crate::framer::frame_recording;
use crate::identity::RecordingIdentity;
use crate::labels::label_hypnogram;
use crate::loader::{load_recording, Recording};
use crate::spectral::SpectralAnalyzer;
use crate::table::{label_set, FeatureTable, LabelSet, LabelledFeatureTable};

/// Marker that distinguishes annotation sidecars from recordings.
pub const HYPNOGRAM_MARKER: &str = "Hypnogram";

/// One recording file and its optional annotation sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusEntry {
    pub recording: PathBuf,
    pub hypnogram: Option<PathBuf>,
}

impl CorpusEntry {
    pub fn new<P: Into<PathBuf>>(recording: P, hypnogram: Option<P>) -> Self {
        Self {
            recording: recording.into(),
            hypnogram: hypnogram.map(Into::into),
        }
    }
}

/// Explicit list of files to process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorpusManifest {
    entries: Vec<CorpusEntry>,
}

impl CorpusManifest {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn recordings(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.recording.as_path())
    }

    pub fn hypnograms(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().filter_map(|e| e.hypnogram.as_deref())
    }

    /// Builds a manifest from the `*.edf` files of `dirs`.
    ///
    /// Files whose name contains `Hypnogram` are annotation sidecars; they
    /// are paired with the recording sharing the first six characters of
    /// the file name in the same directory. Unpaired files are logged;
    /// unpaired hypnograms are left out.
    pub fn scan<P: AsRef<Path>>(dirs: &[P]) -> Result<Self> {
        let mut recordings = Vec::new();
        let mut hypnograms: BTreeMap<(PathBuf, String), PathBuf> = BTreeMap::new();

        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                return Err(Error::FileNotFound(dir.display().to_string()));
            }

            let pattern = format!("{}/*.edf", glob::Pattern::escape(&dir.to_string_lossy()));
            let paths = glob::glob(&pattern)
                .map_err(|e| Error::InvalidFormat(format!("Invalid glob pattern '{}': {}", pattern, e)))?;

            for entry in paths {
                let path = match entry {
                    Ok(path) if path.is_file() => path,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!("glob error: {}", e);
                        continue;
                    }
                };

                let name = file_name(&path);
                if name.contains(HYPNOGRAM_MARKER) {
                    let key = (dir.to_path_buf(), pairing_key(&name));
                    if let Some(first) = hypnograms.get(&key) {
                        warn!("{}: duplicate of {} ignored", path.display(), first.display());
                    } else {
                        hypnograms.insert(key, path);
                    }
                } else {
                    recordings.push((dir.to_path_buf(), path));
                }
            }
        }

        recordings.sort();
        let mut entries = Vec::with_capacity(recordings.len());
        for (dir, recording) in recordings {
            let hypnogram = hypnograms.remove(&(dir, pairing_key(&file_name(&recording))));
            if hypnogram.is_none() {
                warn!("{}: no hypnogram found", recording.display());
            }
            entries.push(CorpusEntry { recording, hypnogram });
        }

        for orphan in hypnograms.values() {
            warn!("{}: no matching recording, ignored", orphan.display());
        }

        info!("Manifest: {} recordings, {} with hypnograms",
            entries.len(),
            entries.iter().filter(|e| e.hypnogram.is_some()).count()
        );
        Ok(Self { entries })
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn pairing_key(name: &str) -> String {
    name.chars().take(6).collect()
}

/// 同一身份只能由一个文件提供行，否则后读的文件会覆盖先读的
fn unclaimed(claimed: &BTreeMap<RecordingIdentity, PathBuf>, path: &Path) -> Result<RecordingIdentity> {
    let identity = RecordingIdentity::from_path(path)?;
    match claimed.get(&identity) {
        Some(first) => Err(Error::DuplicateIdentity {
            identity: identity.to_string(),
            first: first.clone(),
        }),
        None => Ok(identity),
    }
}

/// Where the orchestrator reads recordings and hypnograms from.
pub trait CorpusSource {
    fn load_recording(&self, path: &Path, channels: &[ChannelSpec]) -> Result<Recording>;
    fn load_hypnogram(&self, path: &Path) -> Result<Hypnogram>;
}

/// Reads EDF/EDF+ files from disk.
#[derive(Debug, Clone, Copy, Default)]
pub struct EdfCorpus;

impl CorpusSource for EdfCorpus {
    fn load_recording(&self, path: &Path, channels: &[ChannelSpec]) -> Result<Recording> {
        load_recording(path, channels)
    }

    fn load_hypnogram(&self, path: &Path) -> Result<Hypnogram> {
        extract_annotations(path)
    }
}

/// A file that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub features: FeatureTable,
    pub labelled: LabelledFeatureTable,
    pub dropped: Vec<DroppedFile>,
}

pub struct Pipeline<S: CorpusSource = EdfCorpus> {
    config: PipelineConfig,
    source: S,
}

impl Pipeline<EdfCorpus> {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        Self::with_source(config, EdfCorpus)
    }
}

impl<S: CorpusSource> Pipeline<S> {
    pub fn with_source(config: PipelineConfig, source: S) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, source })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn prefixes(&self) -> Vec<String> {
        self.config.channels.iter().map(|c| c.prefix.clone()).collect()
    }

    /// Features of one recording. Either every epoch gets a complete row
    /// or the whole recording fails.
    pub fn recording_features(&self, path: &Path) -> Result<FeatureTable> {
        let recording = self.source.load_recording(path, &self.config.channels)?;
        let mut analyzer = SpectralAnalyzer::new(recording.sampling_rate);
        let mut table = FeatureTable::new(self.prefixes());

        for epoch in frame_recording(&recording, self.config.epoch_seconds) {
            let features = analyzer.epoch_features(&epoch, &recording, self.config.degenerate_policy)?;
            table.insert(epoch.id, features)?;
        }

        info!("{}: {} epochs from {}", recording.identity, table.len(), path.display());
        Ok(table)
    }

    /// Labels of one hypnogram file.
    pub fn hypnogram_labels(&self, path: &Path) -> Result<LabelSet> {
        let hypnogram = self.source.load_hypnogram(path)?;
        let labels = label_hypnogram(&hypnogram, self.config.epoch_seconds)?;
        info!("{}: {} labelled epochs from {}", hypnogram.identity, labels.len(), path.display());
        Ok(label_set(labels))
    }

    /// Feature pass over every recording of `manifest`.
    pub fn extract_features(&self, manifest: &CorpusManifest) -> Result<(FeatureTable, Vec<DroppedFile>)> {
        let mut table = FeatureTable::new(self.prefixes());
        let mut dropped = Vec::new();

        let mut claimed = BTreeMap::new();

        for path in manifest.recordings() {
            let result = unclaimed(&claimed, path)
                .and_then(|identity| Ok((identity, self.recording_features(path)?)));
            if let Some((identity, rows)) = self.isolate(path, result, &mut dropped)? {
                claimed.insert(identity, path.to_path_buf());
                table.append(rows)?;
            }
        }

        Ok((table, dropped))
    }

    /// Label pass over every hypnogram of `manifest`.
    pub fn extract_labels(&self, manifest: &CorpusManifest) -> Result<(LabelSet, Vec<DroppedFile>)> {
        let mut labels = LabelSet::new();
        let mut dropped = Vec::new();

        let mut claimed = BTreeMap::new();

        for path in manifest.hypnograms() {
            let result = unclaimed(&claimed, path)
                .and_then(|identity| Ok((identity, self.hypnogram_labels(path)?)));
            if let Some((identity, rows)) = self.isolate(path, result, &mut dropped)? {
                claimed.insert(identity, path.to_path_buf());
                labels.extend(rows);
            }
        }

        Ok((labels, dropped))
    }

    /// Both passes plus the join, honouring the cache toggles of the
    /// configuration.
    ///
    /// # Errors
    ///
    /// * `Error::MissingData` - a load toggle is set but its file is absent
    /// * any per-file error when `skip_invalid` is off
    pub fn run(&self, manifest: &CorpusManifest) -> Result<PipelineOutput> {
        let cache = &self.config.cache;
        let mut dropped = Vec::new();

        // 已标注表自带特征列，加载它时不必再读取语料
        let cached_labelled = if cache.load_labelled {
            let table = LabelledFeatureTable::read_csv(&cache.labelled_path)?;
            info!("Loaded {} labelled rows from {}", table.len(), cache.labelled_path.display());
            Some(table)
        } else {
            None
        };

        let features = if cache.load_features {
            let table = FeatureTable::read_csv(&cache.features_path)?;
            info!("Loaded {} feature rows from {}", table.len(), cache.features_path.display());
            table
        } else if let Some(labelled) = &cached_labelled {
            labelled.features().clone()
        } else {
            let (table, skipped) = self.extract_features(manifest)?;
            dropped.extend(skipped);
            if cache.persist_features {
                table.write_csv(&cache.features_path)?;
                info!("Wrote {} feature rows to {}", table.len(), cache.features_path.display());
            }
            table
        };

        let labelled = if let Some(table) = cached_labelled {
            table
        } else {
            let (labels, skipped) = self.extract_labels(manifest)?;
            dropped.extend(skipped);
            let table = features.clone().join(&labels);
            if cache.persist_labelled {
                table.write_csv(&cache.labelled_path)?;
                info!("Wrote {} labelled rows to {}", table.len(), cache.labelled_path.display());
            }
            table
        };

        Ok(PipelineOutput { features, labelled, dropped })
    }

    /// 按配置决定单个文件的错误是跳过还是中止
    fn isolate<T>(&self, path: &Path, result: Result<T>, dropped: &mut Vec<DroppedFile>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.config.skip_invalid => {
                warn!("Skipping {}: {}", path.display(), e);
                dropped.push(DroppedFile {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::AnnotationInterval;
    use crate::loader::Channel;
    use crate::types::{Band, SleepStage};
    use chrono::NaiveDate;
    use std::f64::consts::PI;

    /// 内存中的语料：文件名决定身份，信号为固定频率正弦
    struct MemoryCorpus {
        seconds: usize,
        silent: bool,
    }

    impl CorpusSource for MemoryCorpus {
        fn load_recording(&self, path: &Path, channels: &[ChannelSpec]) -> Result<Recording> {
            let identity = RecordingIdentity::from_path(path)?;
            let rate = 100.0;
            let n = self.seconds * rate as usize;
            let amplitude = if self.silent { 0.0 } else { 20.0 };
            Ok(Recording {
                identity,
                sampling_rate: rate,
                start: NaiveDate::from_ymd_opt(1989, 4, 24)
                    .unwrap()
                    .and_hms_opt(16, 13, 0)
                    .unwrap(),
                channels: channels
                    .iter()
                    .map(|c| Channel {
                        label: c.label.clone(),
                        prefix: c.prefix.clone(),
                        samples: (0..n)
                            .map(|i| amplitude * (2.0 * PI * 10.0 * i as f64 / rate).sin())
                            .collect(),
                    })
                    .collect(),
            })
        }

        fn load_hypnogram(&self, path: &Path) -> Result<Hypnogram> {
            Ok(Hypnogram {
                identity: RecordingIdentity::from_path(path)?,
                intervals: vec![
                    AnnotationInterval::new(0.0, 30.0, SleepStage::Wake),
                    AnnotationInterval::new(30.0, 30.0, SleepStage::Stage1),
                ],
            })
        }
    }

    fn manifest() -> CorpusManifest {
        CorpusManifest::new(vec![
            CorpusEntry::new("SC4001E0-PSG.edf", Some("SC4001EC-Hypnogram.edf")),
            CorpusEntry::new("ST7011J0-PSG.edf", None),
        ])
    }

    #[test]
    fn test_run_joins_labels() {
        let pipeline = Pipeline::with_source(PipelineConfig::default(), MemoryCorpus { seconds: 95, silent: false }).unwrap();
        let output = pipeline.run(&manifest()).unwrap();

        assert_eq!(output.features.len(), 8);
        assert_eq!(output.labelled.len(), 8);
        assert!(output.dropped.is_empty());

        let cassette = RecordingIdentity::parse("SC4001E0-PSG.edf").unwrap();
        assert_eq!(output.labelled.stage(&cassette.epoch_id(0)), Some(&SleepStage::Wake));
        assert_eq!(output.labelled.stage(&cassette.epoch_id(1)), Some(&SleepStage::Stage1));
        // 超出注释范围的尾部epoch
        assert_eq!(output.labelled.stage(&cassette.epoch_id(3)), Some(&SleepStage::NoLabel));

        let row = output.features.get(&cassette.epoch_id(0)).unwrap();
        assert_eq!(row.len(), 2);
        assert_eq!(row[0].dominant_band(), Band::Alpha);
    }

    #[test]
    fn test_invalid_name_is_skipped() {
        let pipeline = Pipeline::with_source(PipelineConfig::default(), MemoryCorpus { seconds: 60, silent: false }).unwrap();
        let manifest = CorpusManifest::new(vec![
            CorpusEntry::new("SX4001E0-PSG.edf", Some("SX4001EC-Hypnogram.edf")),
            CorpusEntry::new("SC4011E0-PSG.edf", None),
        ]);

        let output = pipeline.run(&manifest).unwrap();
        assert_eq!(output.features.len(), 2);
        assert_eq!(output.dropped.len(), 2);
        assert!(output.features.ids().all(|id| id.subject() == 1));
    }

    #[test]
    fn test_strict_mode_aborts() {
        let config = PipelineConfig {
            skip_invalid: false,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::with_source(config, MemoryCorpus { seconds: 60, silent: false }).unwrap();
        let manifest = CorpusManifest::new(vec![CorpusEntry::new("SX4001E0-PSG.edf", None)]);
        assert!(matches!(pipeline.run(&manifest), Err(Error::InvalidFormat(_))));
    }

    #[test]
    fn test_degenerate_policy() {
        let silent = || MemoryCorpus { seconds: 30, silent: true };
        let zero = Pipeline::with_source(PipelineConfig::default(), silent()).unwrap();
        let (table, _) = zero.extract_features(&manifest()).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|(_, row)| row.iter().all(|f| f.ratios().iter().all(|&r| r == 0.0))));

        let config = PipelineConfig {
            degenerate_policy: crate::config::DegeneratePolicy::Reject,
            skip_invalid: false,
            ..PipelineConfig::default()
        };
        let reject = Pipeline::with_source(config, silent()).unwrap();
        assert!(matches!(reject.extract_features(&manifest()), Err(Error::DegenerateSignal { .. })));
    }

    #[test]
    fn test_run_is_idempotent() {
        let pipeline = Pipeline::with_source(PipelineConfig::default(), MemoryCorpus { seconds: 75, silent: false }).unwrap();
        let first = pipeline.run(&manifest()).unwrap();
        let second = pipeline.run(&manifest()).unwrap();
        assert_eq!(first.features, second.features);
        assert_eq!(first.labelled, second.labelled);
    }

    #[test]
    fn test_load_without_cache_is_missing_data() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.cache.load_features = true;
        config.cache.features_path = dir.path().join("features.csv");

        let pipeline = Pipeline::with_source(config, MemoryCorpus { seconds: 30, silent: false }).unwrap();
        assert!(matches!(pipeline.run(&manifest()), Err(Error::MissingData(_))));
    }

    #[test]
    fn test_second_file_with_same_identity_is_dropped() {
        let pipeline = Pipeline::with_source(PipelineConfig::default(), MemoryCorpus { seconds: 95, silent: false }).unwrap();
        let manifest = CorpusManifest::new(vec![
            CorpusEntry::new("night_a/SC4001E0-PSG.edf", Some("night_a/SC4001EC-Hypnogram.edf")),
            CorpusEntry::new("night_b/SC4001E0-PSG.edf", Some("night_b/SC4001EC-Hypnogram.edf")),
        ]);

        let output = pipeline.run(&manifest).unwrap();
        assert_eq!(output.features.len(), 4);
        assert_eq!(output.dropped.len(), 2);
        for dropped in &output.dropped {
            assert!(dropped.path.starts_with("night_b"));
            assert!(dropped.reason.contains("C-00-1"));
            assert!(dropped.reason.contains("night_a"));
        }

        let strict = PipelineConfig {
            skip_invalid: false,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::with_source(strict, MemoryCorpus { seconds: 95, silent: false }).unwrap();
        assert!(matches!(pipeline.run(&manifest), Err(Error::DuplicateIdentity { .. })));
    }

    #[test]
    fn test_load_labelled_skips_feature_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.cache.labelled_path = dir.path().join("labelled.csv");
        config.cache.persist_labelled = true;
        let computed = Pipeline::with_source(config.clone(), MemoryCorpus { seconds: 95, silent: false })
            .unwrap()
            .run(&manifest())
            .unwrap();

        // 磁盘上不存在这些文件，若执行特征提取则严格模式下会失败
        config.cache.persist_labelled = false;
        config.cache.load_labelled = true;
        config.skip_invalid = false;
        let cached = Pipeline::new(config).unwrap().run(&manifest()).unwrap();

        assert!(cached.dropped.is_empty());
        assert_eq!(cached.features, computed.features);
        assert_eq!(cached.labelled, computed.labelled);
    }

    #[test]
    fn test_pairing_key() {
        assert_eq!(pairing_key("SC4001E0-PSG.edf"), pairing_key("SC4001EC-Hypnogram.edf"));
        assert_eq!(pairing_key("SC4"), "SC4");
    }
}
