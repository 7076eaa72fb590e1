use edfsleep::annotations::extract_annotations;
use edfsleep::labels::label_hypnogram;
use edfsleep::{EdfWriter, Error, SleepStage};
use std::path::Path;

/// 写入只含注释的EDF+催眠图文件
fn write_hypnogram(path: &Path, intervals: &[(f64, f64, &str)], records: usize) {
    let mut writer = EdfWriter::create(path).unwrap();
    writer.set_datarecord_duration(30.0).unwrap();
    for &(onset, duration, description) in intervals {
        writer.add_annotation(onset, Some(duration), description).unwrap();
    }
    for _ in 0..records {
        writer.write_samples(&[]).unwrap();
    }
    writer.finalize().unwrap();
}

#[test]
fn test_hypnogram_to_intervals() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SC4012EC-Hypnogram.edf");
    write_hypnogram(
        &path,
        &[
            (0.0, 90.0, "Sleep stage W"),
            (90.0, 30.0, "Movement time"),
            (120.0, 60.0, "Sleep stage 2"),
            (180.0, 30.0, "Sleep stage ?"),
        ],
        7,
    );

    let hypnogram = extract_annotations(&path).unwrap();
    assert_eq!(hypnogram.identity.to_string(), "C-01-2");

    let stages: Vec<&SleepStage> = hypnogram.intervals.iter().map(|i| &i.sleep_stage).collect();
    assert_eq!(
        stages,
        vec![&SleepStage::Wake, &SleepStage::Movement, &SleepStage::Stage2, &SleepStage::Unscored]
    );
    assert_eq!(hypnogram.intervals[2].onset, 120.0);
    assert_eq!(hypnogram.intervals[2].end(), 180.0);

    let labels = label_hypnogram(&hypnogram, 30.0).unwrap();
    let codes: Vec<&str> = labels.iter().map(|l| l.sleep_stage.code()).collect();
    assert_eq!(codes, vec!["W", "W", "W", "M", "2", "2", "?"]);
    assert_eq!(labels[6].id.to_string(), "C-01-2-0006");
}

#[test]
fn test_overlapping_intervals_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ST7031JP-Hypnogram.edf");
    write_hypnogram(
        &path,
        &[
            (0.0, 30.0, "Sleep stage 1"),
            (25.0, 10.0, "Sleep stage 3"),
            (30.0, 30.0, "Sleep stage 2"),
        ],
        2,
    );

    let hypnogram = extract_annotations(&path).unwrap();
    assert_eq!(hypnogram.identity.to_string(), "T-03-1");

    let labels = label_hypnogram(&hypnogram, 30.0).unwrap();
    assert_eq!(labels.len(), 2);
    assert!(labels.iter().all(|l| l.sleep_stage == SleepStage::Transition));
}

#[test]
fn test_unrecognised_category_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SX4001EC-Hypnogram.edf");
    write_hypnogram(&path, &[(0.0, 30.0, "Sleep stage W")], 1);

    match extract_annotations(&path) {
        Err(Error::InvalidFormat(msg)) => assert!(msg.contains("SX4001EC")),
        other => panic!("unexpected {:?}", other.map(|h| h.intervals)),
    }
}

#[test]
fn test_empty_hypnogram_has_no_labels() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SC4021EC-Hypnogram.edf");
    write_hypnogram(&path, &[], 3);

    let hypnogram = extract_annotations(&path).unwrap();
    assert!(hypnogram.intervals.is_empty());
    assert!(label_hypnogram(&hypnogram, 30.0).unwrap().is_empty());
}

#[test]
fn test_hypnogram_scoring_past_a_week_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("SC4031EC-Hypnogram.edf");
    write_hypnogram(&path, &[(0.0, 30.0, "Sleep stage W"), (30.0, 2_000_000.0, "Sleep stage ?")], 2);

    let hypnogram = extract_annotations(&path).unwrap();
    assert_eq!(hypnogram.intervals.len(), 2);
    assert!(matches!(label_hypnogram(&hypnogram, 30.0), Err(Error::InvalidFormat(_))));
}
