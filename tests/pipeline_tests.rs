use edfsleep::synth::{write_corpus, write_hypnogram, write_recording, SynthSpec};
use edfsleep::{
    Band, CorpusEntry, CorpusManifest, Error, FeatureTable, LabelledFeatureTable, Pipeline,
    PipelineConfig, RecordingIdentity, SleepStage, TargetSpec, TrainingSet,
};
use std::fs;

fn small_spec() -> SynthSpec {
    SynthSpec {
        subjects: 2,
        epochs: 12,
        trailing_seconds: 45,
        ..SynthSpec::default()
    }
}

#[test]
fn test_end_to_end_over_synthetic_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_corpus(dir.path(), &small_spec()).unwrap();
    assert_eq!(manifest.len(), 2);

    let output = Pipeline::new(PipelineConfig::default()).unwrap().run(&manifest).unwrap();
    assert!(output.dropped.is_empty());

    // 12个已评分epoch + 45秒尾部（一个完整epoch加15秒） = 14 epochs
    assert_eq!(output.features.len(), 28);
    assert_eq!(output.labelled.len(), 28);
    assert_eq!(output.features.prefixes(), ["anterior".to_string(), "posterior".to_string()]);

    let identity = RecordingIdentity::parse("SC4001E0-PSG.edf").unwrap();
    // 尾部的未评分epoch没有标签
    assert_eq!(output.labelled.stage(&identity.epoch_id(12)), Some(&SleepStage::NoLabel));
    assert_eq!(output.labelled.stage(&identity.epoch_id(13)), Some(&SleepStage::NoLabel));

    // 主频随睡眠阶段变化
    for (id, features, stage) in output.labelled.iter() {
        let expected = match stage {
            SleepStage::Wake => Band::Alpha,
            SleepStage::Stage1 => Band::Theta,
            SleepStage::Stage2 | SleepStage::Rem => Band::Beta,
            SleepStage::Stage3 | SleepStage::Stage4 => Band::Delta,
            _ => continue,
        };
        assert_eq!(features[0].dominant_band(), expected, "{} ({})", id, stage);
        assert_eq!(features[1].dominant_band(), expected, "{} ({})", id, stage);

        let sum: f64 = features[0].ratios().iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }
}

#[test]
fn test_scan_pairs_files() {
    let dir = tempfile::tempdir().unwrap();
    let written = write_corpus(dir.path(), &small_spec()).unwrap();

    // 没有配对催眠图的记录，以及没有记录的催眠图
    let stages = vec![SleepStage::Wake; 2];
    write_recording(&dir.path().join("SC4101E0-PSG.edf"), 10, &stages, 0).unwrap();
    write_hypnogram(&dir.path().join("SC4111EC-Hypnogram.edf"), &stages).unwrap();
    fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let scanned = CorpusManifest::scan(&[dir.path()]).unwrap();
    assert_eq!(scanned.len(), 3);
    assert_eq!(scanned.hypnograms().count(), 2);
    for entry in written.entries() {
        assert!(scanned.entries().contains(entry));
    }
    let lonely = scanned
        .entries()
        .iter()
        .find(|e| e.recording.ends_with("SC4101E0-PSG.edf"))
        .unwrap();
    assert!(lonely.hypnogram.is_none());

    assert!(matches!(
        CorpusManifest::scan(&[dir.path().join("absent")]),
        Err(Error::FileNotFound(_))
    ));
}

#[test]
fn test_invalid_file_name_contributes_no_rows() {
    let dir = tempfile::tempdir().unwrap();
    let mut entries = write_corpus(dir.path(), &small_spec()).unwrap().entries().to_vec();

    let stages = vec![SleepStage::Stage2; 3];
    let bad_recording = dir.path().join("SX4051E0-PSG.edf");
    let bad_hypnogram = dir.path().join("SX4051EC-Hypnogram.edf");
    write_recording(&bad_recording, 5, &stages, 0).unwrap();
    write_hypnogram(&bad_hypnogram, &stages).unwrap();
    entries.push(CorpusEntry::new(bad_recording.clone(), Some(bad_hypnogram)));

    let manifest = CorpusManifest::new(entries);
    let output = Pipeline::new(PipelineConfig::default()).unwrap().run(&manifest).unwrap();

    assert_eq!(output.features.len(), 28);
    assert!(output.features.ids().all(|id| id.subject() < 2));
    assert_eq!(output.dropped.len(), 2);
    assert_eq!(output.dropped[0].path, bad_recording);
    assert!(output.dropped[0].reason.contains("category marker"));

    let strict = PipelineConfig {
        skip_invalid: false,
        ..PipelineConfig::default()
    };
    assert!(matches!(
        Pipeline::new(strict).unwrap().run(&manifest),
        Err(Error::InvalidFormat(_))
    ));
}

#[test]
fn test_missing_channel_drops_recording() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_corpus(dir.path(), &small_spec()).unwrap();

    let mut config = PipelineConfig::default();
    config.channels[1].label = "EEG O1".to_string();
    let output = Pipeline::new(config).unwrap().run(&manifest).unwrap();

    assert!(output.features.is_empty());
    assert!(output.labelled.is_empty());
    assert_eq!(output.dropped.len(), 2);
    assert!(output.dropped.iter().all(|d| d.reason.contains("EEG O1")));
}

#[test]
fn test_same_recording_in_two_directories_is_read_once() {
    let dir = tempfile::tempdir().unwrap();
    let first = write_corpus(&dir.path().join("a"), &small_spec()).unwrap();
    let shorter = SynthSpec {
        epochs: 6,
        ..small_spec()
    };
    write_corpus(&dir.path().join("b"), &shorter).unwrap();

    let scanned = CorpusManifest::scan(&[dir.path().join("a"), dir.path().join("b")]).unwrap();
    assert_eq!(scanned.len(), 4);
    assert_eq!(scanned.hypnograms().count(), 4);

    let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
    let output = pipeline.run(&scanned).unwrap();
    let alone = pipeline.run(&first).unwrap();

    // b目录中的同名记录和催眠图全部被丢弃，不与a目录的行混合
    assert_eq!(output.dropped.len(), 4);
    assert!(output.dropped.iter().all(|d| d.path.starts_with(dir.path().join("b"))));
    assert_eq!(output.features, alone.features);
    assert_eq!(output.labelled, alone.labelled);
}

#[test]
fn test_persist_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_corpus(&dir.path().join("corpus"), &small_spec()).unwrap();

    let mut config = PipelineConfig::default();
    config.cache.features_path = dir.path().join("all_epochs_power_bands.csv");
    config.cache.labelled_path = dir.path().join("labelled_epochs_power_bands.csv");
    config.cache.persist_features = true;
    config.cache.persist_labelled = true;
    let computed = Pipeline::new(config.clone()).unwrap().run(&manifest).unwrap();

    let header = fs::read_to_string(&config.cache.labelled_path).unwrap();
    let first_line = header.lines().next().unwrap();
    assert!(first_line.starts_with("epochId,anterior_subdelta,anterior_delta,"));
    assert!(first_line.ends_with(",posterior_gamma_ratio,sleep_stage"));

    assert_eq!(FeatureTable::read_csv(&config.cache.features_path).unwrap(), computed.features);
    assert_eq!(LabelledFeatureTable::read_csv(&config.cache.labelled_path).unwrap(), computed.labelled);

    // 从缓存加载，不再读取语料
    config.cache.persist_features = false;
    config.cache.persist_labelled = false;
    config.cache.load_features = true;
    config.cache.load_labelled = true;
    let cached = Pipeline::new(config).unwrap().run(&CorpusManifest::default()).unwrap();
    assert_eq!(cached.features, computed.features);
    assert_eq!(cached.labelled, computed.labelled);
}

#[test]
fn test_cache_load_without_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.cache.load_labelled = true;
    config.cache.labelled_path = dir.path().join("never_written.csv");

    match Pipeline::new(config).unwrap().run(&CorpusManifest::default()) {
        Err(Error::MissingData(path)) => assert!(path.ends_with("never_written.csv")),
        other => panic!("unexpected {:?}", other.map(|o| o.features.len())),
    }
}

#[test]
fn test_two_runs_write_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_corpus(&dir.path().join("corpus"), &small_spec()).unwrap();

    let run_to = |name: &str| -> String {
        let mut config = PipelineConfig::default();
        config.cache.labelled_path = dir.path().join(name);
        config.cache.persist_labelled = true;
        Pipeline::new(config).unwrap().run(&manifest).unwrap();
        fs::read_to_string(dir.path().join(name)).unwrap()
    };

    assert_eq!(run_to("first.csv"), run_to("second.csv"));
}

#[test]
fn test_training_set_from_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_corpus(dir.path(), &small_spec()).unwrap();
    let output = Pipeline::new(PipelineConfig::default()).unwrap().run(&manifest).unwrap();

    let set = TrainingSet::from_labelled(&output.labelled, &TargetSpec::default()).unwrap();
    // 尾部的N被排除
    assert_eq!(set.len(), 24);
    assert_eq!(set.subjects().len(), 2);

    let stage_one = output.labelled.stage_counts()[&SleepStage::Stage1];
    assert_eq!(set.positives(), stage_one);
}
