// Comparison pipeline
// Loads two recordings, aligns them, builds the correspondence and estimates velocity

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use super::config::{ConfigError, PipelineConfig};
use super::report::{write_report, Report};
use super::trace::{Stage, TraceError, Tracer};
use crate::align::{align_timelines, warp, AlignError, Side};
use crate::audio::{chroma_events, extract_chroma, read_wav, AudioError, ChromaConfig, SpectralFeatures};
use crate::correspondence::{
    from_alignment, from_warp_path, Correspondence, CorrespondenceError, MatchSummary,
};
use crate::events::{normalize, Alphabet, NormalizeError, Timeline};
use crate::midi::{read_timeline_file, MidiError, MidiTimingOptions};
use crate::state::{
    cache_key, create_artifact, create_run, get_run_dir, hash_file, update_run_status,
    ArtifactCache, ArtifactKind, CacheError, DbError, NewRun, Run, RunStatus, StorageError,
};
use crate::velocity::{estimate, VelocityError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Unsupported input {0}: expected a .mid, .midi or .wav file")]
    UnsupportedInput(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Timeline error: {0}")]
    Normalize(#[from] NormalizeError),

    #[error("Alignment error: {0}")]
    Align(#[from] AlignError),

    #[error("Correspondence error: {0}")]
    Correspondence(#[from] CorrespondenceError),

    #[error("Velocity error: {0}")]
    Velocity(#[from] VelocityError),

    #[error("MIDI error: {0}")]
    Midi(#[from] MidiError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a recording file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Midi,
    Audio,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Result<Self, PipelineError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("mid") | Some("midi") => Ok(InputKind::Midi),
            Some("wav") => Ok(InputKind::Audio),
            _ => Err(PipelineError::UnsupportedInput(path.display().to_string())),
        }
    }
}

/// Which aligner a pair of inputs goes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Two MIDI files, aligned over note numbers
    Symbolic,

    /// MIDI against audio, aligned over pitch classes
    Mixed,

    /// Two recordings, aligned by time warping their chroma
    Audio,
}

impl Modality {
    pub fn of(reference: InputKind, target: InputKind) -> Self {
        match (reference, target) {
            (InputKind::Midi, InputKind::Midi) => Modality::Symbolic,
            (InputKind::Audio, InputKind::Audio) => Modality::Audio,
            _ => Modality::Mixed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Symbolic => "symbolic",
            Modality::Mixed => "mixed",
            Modality::Audio => "audio",
        }
    }

    /// Reference ticks between velocity samples unless configured
    pub fn default_sample_interval(&self) -> u64 {
        match self {
            Modality::Symbolic | Modality::Audio => 3600,
            Modality::Mixed => 1,
        }
    }
}

/// Files taking part in one run
#[derive(Debug, Clone)]
pub struct Inputs {
    pub reference: PathBuf,
    pub target: PathBuf,

    /// Report destination; the run directory when absent
    pub output: Option<PathBuf>,
}

/// Where a run keeps its state
pub struct PipelineContext {
    /// Data root holding run directories and the cache
    pub root: PathBuf,
    pub cache: ArtifactCache,
    pub tracer: Tracer,
}

#[derive(Debug)]
pub struct PipelineOutcome {
    pub run: Run,
    pub modality: Modality,
    pub report: Report,
    pub report_path: PathBuf,

    /// Artifacts served from the cache instead of recomputed
    pub cache_hits: Vec<ArtifactKind>,
}

/// Configuration that shapes cached artifacts
#[derive(Serialize)]
struct ArtifactKeyConfig<'a> {
    modality: Modality,
    tempo_override: Option<u32>,
    ticks_per_beat_override: Option<u16>,
    reference_ticks_per_second: f64,
    chroma: &'a ChromaConfig,
}

/// Run label derived from a file name: the part before the first `-` or `_`
pub fn default_label(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    stem.split(['-', '_']).next().unwrap_or_default().to_string()
}

/// Compare `inputs.target` against `inputs.reference`
///
/// The run is registered before any work starts and marked complete or
/// failed when it ends. Too few velocity samples is not a failure: the
/// report is still written, without a velocity section.
pub fn run_pipeline(
    inputs: &Inputs,
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> Result<PipelineOutcome, PipelineError> {
    config.validate()?;

    let reference_kind = InputKind::from_path(&inputs.reference)?;
    let target_kind = InputKind::from_path(&inputs.target)?;
    let modality = Modality::of(reference_kind, target_kind);

    let reference_sha256 = hash_file(&inputs.reference)?;
    let target_sha256 = hash_file(&inputs.target)?;
    let label = config
        .run_id
        .clone()
        .unwrap_or_else(|| default_label(&inputs.reference));

    let db = ctx.cache.db();
    let mut run = create_run(
        db,
        NewRun {
            label,
            modality: modality.as_str().to_string(),
            reference_path: inputs.reference.display().to_string(),
            reference_sha256,
            target_path: inputs.target.display().to_string(),
            target_sha256,
        },
    )?;
    update_run_status(db, &run.id, RunStatus::Processing)?;
    run.status = RunStatus::Processing;

    log::info!(
        "Run {} ({}): {} vs {} as {} comparison",
        run.label,
        run.id,
        inputs.reference.display(),
        inputs.target.display(),
        modality.as_str()
    );

    let kinds = (reference_kind, target_kind);
    match execute(&run, modality, kinds, inputs, config, ctx) {
        Ok((report, report_path, cache_hits)) => {
            update_run_status(db, &run.id, RunStatus::Complete)?;
            run.status = RunStatus::Complete;
            log::info!("{}", report.headline());
            Ok(PipelineOutcome {
                run,
                modality,
                report,
                report_path,
                cache_hits,
            })
        }
        Err(e) => {
            log::error!("Run {} failed: {}", run.id, e);
            if let Err(status_error) = update_run_status(db, &run.id, RunStatus::Failed) {
                log::warn!("Could not mark run {} as failed: {}", run.id, status_error);
            }
            Err(e)
        }
    }
}

fn execute(
    run: &Run,
    modality: Modality,
    kinds: (InputKind, InputKind),
    inputs: &Inputs,
    config: &PipelineConfig,
    ctx: &PipelineContext,
) -> Result<(Report, PathBuf, Vec<ArtifactKind>), PipelineError> {
    let key_config = ArtifactKeyConfig {
        modality,
        tempo_override: config.tempo_override,
        ticks_per_beat_override: config.ticks_per_beat_override,
        reference_ticks_per_second: config.reference_ticks_per_second,
        chroma: &config.chroma,
    };
    let identities = [run.reference_sha256.as_str(), run.target_sha256.as_str()];
    let mut cache_hits = Vec::new();

    let (correspondence, summary) = match modality {
        Modality::Audio => warp_stages(run, inputs, config, ctx, &key_config, &identities, &mut cache_hits)?,
        Modality::Symbolic | Modality::Mixed => {
            discrete_stages(run, kinds, inputs, config, ctx, &key_config, &identities, &mut cache_hits)?
        }
    };

    let mut velocity_config = config.velocity.clone();
    let sample_interval = *velocity_config
        .sample_interval
        .get_or_insert(modality.default_sample_interval());

    ctx.tracer.started(Stage::Velocity, format!("Sampling every {} ticks", sample_interval))?;
    let (velocity, velocity_skipped) = match estimate(&correspondence, &velocity_config, &config.filter) {
        Ok(profile) => {
            ctx.tracer.completed(
                Stage::Velocity,
                false,
                "Velocity estimated",
                json!({
                    "samples": profile.samples.len(),
                    "slope": profile.smoothed_fit.slope,
                    "median": profile.stats.median,
                }),
            )?;
            (Some(profile), None)
        }
        Err(e @ VelocityError::InsufficientData { .. }) => {
            log::warn!("Skipping velocity estimate for run {}: {}", run.id, e);
            ctx.tracer.failed(Stage::Velocity, e.to_string())?;
            (None, Some(e.to_string()))
        }
        Err(e) => {
            ctx.tracer.failed(Stage::Velocity, e.to_string())?;
            return Err(e.into());
        }
    };

    ctx.tracer.started(Stage::Report, "Writing report")?;
    let report = Report {
        run_id: run.id,
        label: run.label.clone(),
        generated_at: chrono::Utc::now(),
        modality: modality.as_str().to_string(),
        reference: run.reference_path.clone(),
        target: run.target_path.clone(),
        sample_interval,
        summary,
        correspondence,
        velocity,
        velocity_skipped,
    };

    let destination = match &inputs.output {
        Some(path) => path.clone(),
        None => get_run_dir(&ctx.root, &run.id)?.join("report.json"),
    };
    let (report_path, sha256) = write_report(&report, &destination)?;
    let bytes = std::fs::metadata(&report_path)?.len() as i64;
    create_artifact(
        ctx.cache.db(),
        run.id,
        ArtifactKind::Report,
        run.id.to_string(),
        report_path.display().to_string(),
        sha256,
        bytes,
    )?;
    ctx.tracer.completed(
        Stage::Report,
        false,
        "Report written",
        json!({ "path": report_path.display().to_string() }),
    )?;

    Ok((report, report_path, cache_hits))
}

#[allow(clippy::too_many_arguments)]
fn discrete_stages(
    run: &Run,
    kinds: (InputKind, InputKind),
    inputs: &Inputs,
    config: &PipelineConfig,
    ctx: &PipelineContext,
    key_config: &ArtifactKeyConfig<'_>,
    identities: &[&str],
    cache_hits: &mut Vec<ArtifactKind>,
) -> Result<(Correspondence, MatchSummary), PipelineError> {
    let pitch_classes = kinds.0 != kinds.1;

    ctx.tracer.started(Stage::Load, "Reading note events")?;
    let reference = load_timeline(&inputs.reference, kinds.0, Side::Reference, pitch_classes, config)?;
    let target = load_timeline(&inputs.target, kinds.1, Side::Target, pitch_classes, config)?;
    ctx.tracer.completed(
        Stage::Load,
        false,
        "Timelines loaded",
        json!({ "reference_events": reference.len(), "target_events": target.len() }),
    )?;

    ctx.tracer.started(Stage::Align, "Aligning note sequences")?;
    let key = cache_key(ArtifactKind::Alignment, identities, key_config)?;
    let (alignment, cached) = ctx
        .cache
        .load_or_compute(run.id, ArtifactKind::Alignment, &key, || {
            align_timelines(&reference, &target).map_err(PipelineError::from)
        })?;
    if cached {
        cache_hits.push(ArtifactKind::Alignment);
    }
    ctx.tracer.completed(
        Stage::Align,
        cached,
        "Sequences aligned",
        json!({ "length": alignment.len(), "matched": alignment.matched() }),
    )?;

    ctx.tracer.started(Stage::Correspondence, "Matching event times")?;
    let key = cache_key(ArtifactKind::Correspondence, identities, key_config)?;
    let ((correspondence, summary), cached) =
        ctx.cache
            .load_or_compute(run.id, ArtifactKind::Correspondence, &key, || {
                from_alignment(&alignment, &reference, &target).map_err(PipelineError::from)
            })?;
    if cached {
        cache_hits.push(ArtifactKind::Correspondence);
    }
    ctx.tracer.completed(
        Stage::Correspondence,
        cached,
        "Correspondence built",
        json!({ "ticks": correspondence.len(), "matched": summary.matched }),
    )?;

    Ok((correspondence, summary))
}

fn warp_stages(
    run: &Run,
    inputs: &Inputs,
    config: &PipelineConfig,
    ctx: &PipelineContext,
    key_config: &ArtifactKeyConfig<'_>,
    identities: &[&str],
    cache_hits: &mut Vec<ArtifactKind>,
) -> Result<(Correspondence, MatchSummary), PipelineError> {
    ctx.tracer.started(Stage::Load, "Computing chroma features")?;
    let reference = load_chroma(&inputs.reference, config)?;
    let target = load_chroma(&inputs.target, config)?;
    ctx.tracer.completed(
        Stage::Load,
        false,
        "Chroma computed",
        json!({
            "reference_bins": reference.matrix.total_bins(),
            "target_bins": target.matrix.total_bins(),
        }),
    )?;

    ctx.tracer.started(Stage::Warp, "Running dynamic time warping")?;
    let key = cache_key(ArtifactKind::WarpPath, identities, key_config)?;
    let (path, cached) = ctx.cache.load_or_compute(run.id, ArtifactKind::WarpPath, &key, || {
        warp(&reference.matrix, &target.matrix).map_err(PipelineError::from)
    })?;
    if cached {
        cache_hits.push(ArtifactKind::WarpPath);
    }
    ctx.tracer.completed(
        Stage::Warp,
        cached,
        "Warp path found",
        json!({ "steps": path.len(), "cost": path.cost }),
    )?;

    ctx.tracer.started(Stage::Correspondence, "Matching warp steps")?;
    let key = cache_key(ArtifactKind::Correspondence, identities, key_config)?;
    let ((correspondence, summary), cached) =
        ctx.cache
            .load_or_compute(run.id, ArtifactKind::Correspondence, &key, || {
                from_warp_path(
                    &path,
                    reference.matrix.bin_duration(),
                    target.matrix.bin_duration(),
                    config.reference_ticks_per_second,
                )
                .map_err(PipelineError::from)
            })?;
    if cached {
        cache_hits.push(ArtifactKind::Correspondence);
    }
    ctx.tracer.completed(
        Stage::Correspondence,
        cached,
        "Correspondence built",
        json!({ "ticks": correspondence.len(), "skipped_steps": summary.skipped_steps }),
    )?;

    Ok((correspondence, summary))
}

fn load_chroma(path: &Path, config: &PipelineConfig) -> Result<SpectralFeatures, PipelineError> {
    let audio = read_wav(path)?;
    let features = extract_chroma(&audio, &config.chroma)?;
    log::info!(
        "{}: {:.2}s at {} Hz, {} chroma bins of {:.4}s",
        path.display(),
        features.duration,
        features.sampling_rate,
        features.matrix.total_bins(),
        features.matrix.bin_duration()
    );
    Ok(features)
}

/// Note events of one input as a timeline
///
/// Audio becomes pitch-class onsets picked from its chroma; an audio
/// reference gets ticks at the configured reference tick rate.
fn load_timeline(
    path: &Path,
    kind: InputKind,
    side: Side,
    pitch_classes: bool,
    config: &PipelineConfig,
) -> Result<Timeline, PipelineError> {
    match kind {
        InputKind::Midi => {
            let options = MidiTimingOptions {
                tempo_override: config.tempo_override,
                ticks_per_beat_override: config.ticks_per_beat_override,
                pitch_classes,
            };
            Ok(read_timeline_file(path, &options)?)
        }
        InputKind::Audio => {
            let features = load_chroma(path, config)?;
            let ticks_per_second = match side {
                Side::Reference => Some(config.reference_ticks_per_second),
                Side::Target => None,
            };
            let raw = chroma_events(&features.matrix, ticks_per_second);
            Ok(normalize(raw, Alphabet::PITCH_CLASS, path.display().to_string())?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::trace::read_trace_file;
    use crate::state::{get_artifacts_for_run, get_run, open_in_memory};
    use hound::{SampleFormat, WavSpec, WavWriter};
    use midly::{
        Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind,
    };

    /// Single-track MIDI file with one note per entry of `ticks`
    fn midi_file(tempo: u32, ticks: &[u32]) -> Vec<u8> {
        let notes: Vec<(u32, u8)> = ticks
            .iter()
            .enumerate()
            .map(|(i, &tick)| (tick, 48 + (i % 24) as u8))
            .collect();
        midi_notes(tempo, &notes)
    }

    /// Single-track MIDI file from (tick, key) notes at 480 ticks per beat
    fn midi_notes(tempo: u32, notes: &[(u32, u8)]) -> Vec<u8> {
        let mut track = Track::new();
        track.push(TrackEvent {
            delta: 0u32.into(),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(tempo.into())),
        });
        let mut last = 0;
        for &(tick, key) in notes {
            track.push(TrackEvent {
                delta: (tick - last).into(),
                kind: TrackEventKind::Midi {
                    channel: 0u8.into(),
                    message: MidiMessage::NoteOn {
                        key: key.into(),
                        vel: 64u8.into(),
                    },
                },
            });
            last = tick;
        }
        track.push(TrackEvent {
            delta: 0u32.into(),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });

        let smf = Smf {
            header: Header {
                format: Format::SingleTrack,
                timing: Timing::Metrical(480u16.into()),
            },
            tracks: vec![track],
        };
        let mut bytes = Vec::new();
        smf.write(&mut bytes).unwrap();
        bytes
    }

    /// Mono 8 kHz WAV of consecutive sine tones
    fn tone_file(path: &Path, tones: &[(f64, f64)]) {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &(freq, seconds) in tones {
            let n = (8000.0 * seconds) as usize;
            for i in 0..n {
                let v = (2.0 * std::f64::consts::PI * freq * i as f64 / 8000.0).sin() * 0.5;
                writer.write_sample((v * 32767.0) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    fn context(root: &Path, trace: Option<PathBuf>) -> PipelineContext {
        let db = open_in_memory().unwrap();
        PipelineContext {
            root: root.to_path_buf(),
            cache: ArtifactCache::new(db, root).unwrap(),
            tracer: Tracer::new(trace),
        }
    }

    fn every_half_foot() -> Vec<u32> {
        (0..=40).map(|k| k * 1800).collect()
    }

    #[test]
    fn test_modality_detection() {
        let midi = InputKind::from_path(Path::new("roll.MID")).unwrap();
        let wav = InputKind::from_path(Path::new("take.wav")).unwrap();

        assert_eq!(Modality::of(midi, midi), Modality::Symbolic);
        assert_eq!(Modality::of(midi, wav), Modality::Mixed);
        assert_eq!(Modality::of(wav, midi), Modality::Mixed);
        assert_eq!(Modality::of(wav, wav), Modality::Audio);
        assert!(matches!(
            InputKind::from_path(Path::new("take.mp3")),
            Err(PipelineError::UnsupportedInput(_))
        ));
    }

    #[test]
    fn test_default_label() {
        assert_eq!(default_label(Path::new("green/11373080_no_accel-note.mid")), "11373080");
        assert_eq!(default_label(Path::new("11381959-exp-tempo72.wav")), "11381959");
    }

    #[test]
    fn test_symbolic_run_measures_constant_speed() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("11373080-ref.mid");
        let target = dir.path().join("11373080-fast.mid");
        std::fs::write(&reference, midi_file(500_000, &every_half_foot())).unwrap();
        std::fs::write(&target, midi_file(400_000, &every_half_foot())).unwrap();

        let trace = dir.path().join("trace.jsonl");
        let ctx = context(dir.path(), Some(trace.clone()));
        let inputs = Inputs {
            reference,
            target,
            output: None,
        };

        let outcome = run_pipeline(&inputs, &PipelineConfig::default(), &ctx).unwrap();

        assert_eq!(outcome.modality, Modality::Symbolic);
        assert_eq!(outcome.run.label, "11373080");
        assert_eq!(outcome.report.summary.matched, 41);
        assert_eq!(outcome.report.sample_interval, 3600);
        assert!(outcome.cache_hits.is_empty());

        // One foot every 3600 ticks at 400000 us per 480-tick beat: 20 ft/min
        let velocity = outcome.report.velocity.as_ref().unwrap();
        assert_eq!(velocity.samples.len(), 20);
        assert!((velocity.stats.median - 20.0).abs() < 1e-9);
        assert!(velocity.raw_fit.slope.abs() < 1e-9);

        let stored = get_run(ctx.cache.db(), &outcome.run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Complete);
        assert!(outcome.report_path.exists());

        let kinds: Vec<ArtifactKind> = get_artifacts_for_run(ctx.cache.db(), &outcome.run.id)
            .unwrap()
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![ArtifactKind::Alignment, ArtifactKind::Correspondence, ArtifactKind::Report]
        );

        let entries = read_trace_file(&trace).unwrap();
        assert!(entries.iter().any(|e| e.stage == Stage::Velocity));
    }

    #[test]
    fn test_second_run_reuses_cached_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.mid");
        let target = dir.path().join("tgt.mid");
        std::fs::write(&reference, midi_file(500_000, &every_half_foot())).unwrap();
        std::fs::write(&target, midi_file(450_000, &every_half_foot())).unwrap();

        let ctx = context(dir.path(), None);
        let inputs = Inputs {
            reference,
            target,
            output: Some(dir.path().join("out").join("report.json")),
        };

        let first = run_pipeline(&inputs, &PipelineConfig::default(), &ctx).unwrap();
        let second = run_pipeline(&inputs, &PipelineConfig::default(), &ctx).unwrap();

        assert_ne!(first.run.id, second.run.id);
        assert_eq!(
            second.cache_hits,
            vec![ArtifactKind::Alignment, ArtifactKind::Correspondence]
        );
        assert_eq!(first.report.correspondence, second.report.correspondence);
        assert_eq!(
            serde_json::to_vec(&first.report.velocity).unwrap(),
            serde_json::to_vec(&second.report.velocity).unwrap()
        );
    }

    #[test]
    fn test_too_few_samples_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.mid");
        let target = dir.path().join("tgt.mid");
        std::fs::write(&reference, midi_file(500_000, &[0, 3600])).unwrap();
        std::fs::write(&target, midi_file(500_000, &[0, 3600])).unwrap();

        let ctx = context(dir.path(), None);
        let inputs = Inputs {
            reference,
            target,
            output: None,
        };

        let outcome = run_pipeline(&inputs, &PipelineConfig::default(), &ctx).unwrap();

        assert!(outcome.report.velocity.is_none());
        assert!(outcome.report.velocity_skipped.is_some());
        assert_eq!(outcome.report.correspondence.len(), 2);
        assert_eq!(outcome.run.status, RunStatus::Complete);
    }

    #[test]
    fn test_failed_run_is_marked_failed() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.mid");
        let target = dir.path().join("tgt.mid");
        std::fs::write(&reference, midi_file(500_000, &[0, 480])).unwrap();
        std::fs::write(&target, b"not a midi file").unwrap();

        let ctx = context(dir.path(), None);
        let inputs = Inputs {
            reference,
            target,
            output: None,
        };

        let result = run_pipeline(&inputs, &PipelineConfig::default(), &ctx);
        assert!(matches!(result, Err(PipelineError::Midi(_))));

        let runs = crate::state::list_runs(ctx.cache.db(), None).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, RunStatus::Failed);
    }

    #[test]
    fn test_audio_pair_runs_through_time_warp() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.wav");
        let target = dir.path().join("tgt.wav");
        tone_file(&reference, &[(261.63, 0.5), (329.63, 0.5), (392.0, 0.5), (523.25, 0.5)]);
        tone_file(&target, &[(261.63, 0.4), (329.63, 0.4), (392.0, 0.4), (523.25, 0.4)]);

        let ctx = context(dir.path(), None);
        let inputs = Inputs {
            reference,
            target,
            output: None,
        };

        let outcome = run_pipeline(&inputs, &PipelineConfig::default(), &ctx).unwrap();

        assert_eq!(outcome.modality, Modality::Audio);
        assert_eq!(outcome.report.sample_interval, 3600);
        // Two seconds at 433 ticks per second never reach a 3600-tick sample
        assert!(outcome.report.velocity.is_none());

        let ticks: Vec<u64> = outcome.report.correspondence.ticks().collect();
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
        assert!(ticks.iter().all(|&t| t <= 2 * 433));
    }

    #[test]
    fn test_midi_against_audio_matches_pitch_classes() {
        let dir = tempfile::tempdir().unwrap();
        let reference = dir.path().join("ref.mid");
        let target = dir.path().join("take.wav");
        // C4 E4 G4 C5, one every half second
        std::fs::write(&reference, midi_notes(500_000, &[(0, 60), (480, 64), (960, 67), (1440, 72)])).unwrap();
        tone_file(&target, &[(261.63, 0.5), (329.63, 0.5), (392.0, 0.5), (523.25, 0.5)]);

        let ctx = context(dir.path(), None);
        let inputs = Inputs {
            reference,
            target,
            output: None,
        };

        let outcome = run_pipeline(&inputs, &PipelineConfig::default(), &ctx).unwrap();

        assert_eq!(outcome.modality, Modality::Mixed);
        assert_eq!(outcome.report.sample_interval, 1);

        // Both Cs fold to class 0 and pair up in order with the audio onsets
        let report = &outcome.report;
        assert_eq!(report.summary.matched, 4);
        assert_eq!(report.summary.unmatched_reference, 0);
        assert_eq!(report.summary.unmatched_target, 0);
        assert_eq!(report.correspondence.ticks().collect::<Vec<_>>(), vec![0, 480, 960, 1440]);

        let pairs: Vec<_> = report.correspondence.first_pairs().map(|(_, pair)| pair).collect();
        assert_eq!(pairs[0].target_time, 0.0);
        for pair in &pairs {
            assert!(
                (pair.target_time - pair.reference_time).abs() < 0.2,
                "{:?}",
                pair
            );
        }

        let velocity = report.velocity.as_ref().unwrap();
        assert_eq!(velocity.samples.len(), 3);
    }
}
