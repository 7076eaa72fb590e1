use edfsleep::synth::{write_corpus, SynthSpec};
use edfsleep::{CorpusManifest, EdfReader, Pipeline, PipelineConfig, RecordingKind, Result};

use crate::cli::{InspectArgs, RunArgs, SynthArgs};

pub fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_toml_file(path)?,
        None => PipelineConfig::default(),
    };

    if let Some(path) = args.features_out {
        config.cache.features_path = path;
        config.cache.persist_features = true;
    }
    if let Some(path) = args.labelled_out {
        config.cache.labelled_path = path;
        config.cache.persist_labelled = true;
    }
    config.cache.load_features |= args.load_features;
    config.cache.load_labelled |= args.load_labelled;
    if args.strict {
        config.skip_invalid = false;
    }

    let manifest = CorpusManifest::scan(args.data_dirs.as_slice())?;
    let output = Pipeline::new(config)?.run(&manifest)?;

    println!("Recordings: {}", manifest.len());
    println!("Feature rows: {}", output.features.len());
    println!("Labelled rows: {}", output.labelled.len());
    for (stage, count) in output.labelled.stage_counts() {
        println!("  {:>2}: {}", stage.code(), count);
    }
    if !output.dropped.is_empty() {
        println!("Dropped files: {}", output.dropped.len());
        for dropped in &output.dropped {
            println!("  {}: {}", dropped.path.display(), dropped.reason);
        }
    }
    Ok(())
}

pub fn inspect(args: InspectArgs) -> Result<()> {
    let reader = EdfReader::open(&args.file)?;
    let header = reader.header();

    println!("File: {}", args.file.display());
    println!(
        "Type: {:?}{}",
        header.file_type,
        if header.file_type.is_edfplus() { "" } else { " (no annotation channel)" }
    );
    println!("Start: {}", header.start_datetime());
    println!("Duration: {:.1} s ({} records)", header.duration_seconds(), header.datarecords_in_file);
    println!("Patient: {}", header.patient);
    println!("Recording: {}", header.recording);

    println!("Signals: {}", header.signals.len());
    for (i, signal) in header.signals.iter().enumerate() {
        let rate = header
            .sampling_rate(i)
            .map(|r| format!("{} Hz", r))
            .unwrap_or_else(|| "-".to_string());
        println!("  [{}] {:<16} {:>8} {}", i, signal.label, rate, signal.physical_dimension);
    }

    println!("Annotations: {}", reader.annotations().len());
    for annotation in reader.annotations() {
        println!(
            "  {:>10.1}s {:>8.1}s  {}",
            annotation.onset_seconds(),
            annotation.duration_seconds(),
            annotation.description
        );
    }
    Ok(())
}

pub fn synth(args: SynthArgs) -> Result<()> {
    let spec = SynthSpec {
        kind: if args.telemetry { RecordingKind::Telemetry } else { RecordingKind::Cassette },
        subjects: args.subjects,
        epochs: args.epochs,
        ..SynthSpec::default()
    };
    let manifest = write_corpus(&args.out, &spec)?;
    println!("Wrote {} recordings to {}", manifest.len(), args.out.display());
    Ok(())
}
