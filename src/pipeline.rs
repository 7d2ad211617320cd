//! Render jobs, single and batched.
//!
//! One job turns one photo into one stamped file:
//!
//! ```text
//! read → extract metadata → resolve preset → decode → layout + render
//!      → encode → metadata passthrough → atomic write
//! ```
//!
//! ## Batches
//!
//! [`Pipeline::run_batch`] spreads jobs over a rayon pool sized by
//! `processing.max_processes` and returns one result per job, in submission
//! order, whatever happened to its siblings. Progress is reported through an
//! optional channel so a front end can print while work continues.
//!
//! Cancellation is cooperative: jobs that have not started yet finish as
//! [`PipelineError::Cancelled`], running jobs stop at their next stage
//! boundary. The per-job time limit is checked at the same boundaries.
//!
//! ## Outputs
//!
//! Files are written to a temp file in the destination directory and renamed
//! into place, so a failed or interrupted job never leaves a partial output.
//! Without `overwrite`, an existing destination fails the job with
//! [`IoError::AlreadyExists`].
//!
//! Within a batch no two jobs share a destination. Names are planned in
//! submission order before any job starts, so when two sources render to the
//! same name the earlier job keeps it and the later one gets a `_2` suffix.
//! Patterns using `{date}` or `{time}` can only be named once the capture
//! time is known; those jobs reserve their name when they reach it.

use crate::config::{ConfigError, EngineConfig, effective_threads};
use crate::date_format::Locale;
use crate::imaging::passthrough::{self, MetadataBlocks};
use crate::imaging::{
    CodecError, MetadataPolicy, Orientation, OutputFormat, Quality, decode, encode,
};
use crate::metadata::{
    FallbackMode, MetadataError, MetadataExtractor, PrimarySource, TimeOrigin, TimestampSource,
    read_embedded,
};
use crate::naming::{self, FilenamePattern, NameContext, OutputReservations};
use crate::preset::PresetError;
use crate::registry::{BUILTIN_PRESETS, LoadReport, PresetRegistry, PresetSources};
use crate::render::{RenderAssets, RenderError, stamp};
use chrono::NaiveDateTime;
use image::RgbaImage;
use rayon::prelude::*;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug)]
pub enum IoError {
    #[error("cannot read {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    WriteFailed {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("cannot decode {path}: {reason}")]
    DecodeFailed { path: PathBuf, reason: String },
    #[error("{0} already exists")]
    AlreadyExists(PathBuf),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Preset(#[from] PresetError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("cancelled")]
    Cancelled,
    #[error("exceeded the {0:?} time limit")]
    TimedOut(Duration),
}

fn encoding_failed(format: OutputFormat, e: CodecError) -> PipelineError {
    RenderError::EncodingFailed {
        format,
        reason: e.to_string(),
    }
    .into()
}

// ============================================================================
// Jobs
// ============================================================================

/// Per-job switches, on top of the pipeline config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOptions {
    /// Stamp this time instead of the photo's own.
    pub override_timestamp: Option<NaiveDateTime>,
    /// Drop the source's metadata, keeping only its orientation.
    pub strip_other_metadata: bool,
    /// Write this format instead of the configured or source format.
    pub output_format: Option<OutputFormat>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub input: PathBuf,
    pub preset_id: String,
    /// Destination. `None` names the output from the configured pattern.
    pub output: Option<PathBuf>,
    pub options: JobOptions,
}

impl RenderJob {
    pub fn new(input: impl Into<PathBuf>, preset_id: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            preset_id: preset_id.into(),
            output: None,
            options: JobOptions::default(),
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_options(mut self, options: JobOptions) -> Self {
        self.options = options;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutput {
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub timestamp: TimestampSource,
    pub preset_id: String,
    pub bytes_written: u64,
}

/// Shared stop flag for a batch.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How one job of a batch ended, for progress reporting.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Written {
        output: PathBuf,
        timestamp: TimestampSource,
    },
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    Started {
        total: usize,
    },
    JobFinished {
        /// 0-based submission index.
        index: usize,
        input: PathBuf,
        outcome: JobOutcome,
    },
    Finished {
        succeeded: usize,
        failed: usize,
        cancelled: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresetSummary {
    pub id: String,
    pub display_name: String,
}

// ============================================================================
// Config
// ============================================================================

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub locale: Locale,
    pub primary: PrimarySource,
    pub fallback: FallbackMode,
    pub preset_sources: PresetSources,
    /// Output directory; `None` writes next to each source.
    pub output_dir: Option<PathBuf>,
    pub filename_pattern: FilenamePattern,
    pub quality: Quality,
    pub preserve_metadata: bool,
    pub overwrite: bool,
    pub output_format: Option<OutputFormat>,
    pub threads: usize,
    pub job_timeout: Option<Duration>,
}

impl PipelineConfig {
    pub fn from_engine_config(config: &EngineConfig) -> Result<Self, ConfigError> {
        let filename_pattern = FilenamePattern::parse(&config.output.filename_pattern)
            .map_err(|e| ConfigError::Validation(format!("output.filename_pattern: {e}")))?;
        Ok(Self {
            locale: config.general.locale,
            primary: config.primary_source()?,
            fallback: config.fallback_mode()?,
            preset_sources: config.preset_sources(),
            output_dir: config.output.directory.clone(),
            filename_pattern,
            quality: config.quality(),
            preserve_metadata: config.output.preserve_metadata,
            overwrite: config.output.overwrite,
            output_format: config.output.format,
            threads: effective_threads(&config.processing),
            job_timeout: config.job_timeout(),
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            locale: engine.general.locale,
            primary: PrimarySource::Exif,
            fallback: FallbackMode::Disabled,
            preset_sources: PresetSources::default(),
            output_dir: None,
            filename_pattern: FilenamePattern::default(),
            quality: Quality::default(),
            preserve_metadata: true,
            overwrite: false,
            output_format: None,
            threads: effective_threads(&engine.processing),
            job_timeout: None,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Deadline and stop flag checked between stages of one job.
struct Checkpoint<'a> {
    deadline: Option<(Instant, Duration)>,
    cancel: Option<&'a CancellationToken>,
}

impl Checkpoint<'_> {
    fn check(&self, stage: &str, input: &Path) -> Result<(), PipelineError> {
        if self.cancel.is_some_and(CancellationToken::is_cancelled) {
            log::debug!("{}: cancelled before {stage}", input.display());
            return Err(PipelineError::Cancelled);
        }
        if let Some((deadline, limit)) = self.deadline
            && Instant::now() >= deadline
        {
            log::warn!("{}: timed out before {stage}", input.display());
            return Err(PipelineError::TimedOut(limit));
        }
        log::debug!("{}: {stage}", input.display());
        Ok(())
    }
}

pub struct Pipeline {
    registry: Arc<PresetRegistry>,
    config: PipelineConfig,
    extractor: MetadataExtractor,
}

impl Pipeline {
    pub fn new(registry: Arc<PresetRegistry>, config: PipelineConfig) -> Self {
        let extractor = MetadataExtractor::new(config.fallback).with_primary(config.primary);
        Self {
            registry,
            config,
            extractor,
        }
    }

    pub fn registry(&self) -> &Arc<PresetRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Every loaded preset, named in the configured locale.
    pub fn list_presets(&self) -> Vec<PresetSummary> {
        self.registry
            .list()
            .map(|p| PresetSummary {
                id: p.id.clone(),
                display_name: p.name(self.config.locale).to_string(),
            })
            .collect()
    }

    /// Reload presets from the configured sources into a fresh snapshot.
    ///
    /// Callers still holding the previous `Arc` keep their view.
    pub fn reload_presets(&mut self) -> LoadReport {
        let (next, report) = self
            .registry
            .reload(BUILTIN_PRESETS, &self.config.preset_sources);
        self.registry = Arc::new(next);
        report
    }

    /// Run one job; `{index}` in output names is 1.
    pub fn run(&self, job: &RenderJob) -> Result<JobOutput, PipelineError> {
        self.run_job(job, 1, None, None)
    }

    /// Stamp an in-memory image without writing anything.
    pub fn render_to_buffer(
        &self,
        bytes: &[u8],
        preset_id: &str,
        timestamp: Option<NaiveDateTime>,
    ) -> Result<RgbaImage, PipelineError> {
        let embedded = read_embedded(bytes)?;
        let ts = self.extractor.resolve_timestamp(timestamp, &embedded, None)?;
        let preset = self.registry.resolve(preset_id)?;
        let decoded = decode(bytes).map_err(|e| IoError::DecodeFailed {
            path: PathBuf::from("<memory>"),
            reason: e.to_string(),
        })?;
        let assets = RenderAssets::load(preset, self.config.locale)?;
        let (out, _) = stamp(&decoded.pixels, embedded.orientation, preset, &ts, &assets)?;
        Ok(out)
    }

    /// Run every job, in parallel, returning results in submission order.
    pub fn run_batch(
        &self,
        jobs: Vec<RenderJob>,
        cancel: &CancellationToken,
        progress: Option<Sender<BatchEvent>>,
    ) -> Vec<(RenderJob, Result<JobOutput, PipelineError>)> {
        let send = |event: BatchEvent| {
            if let Some(tx) = &progress {
                // A dropped receiver only means nobody is watching.
                let _ = tx.send(event);
            }
        };
        send(BatchEvent::Started { total: jobs.len() });
        log::info!(
            "stamping {} images on {} threads",
            jobs.len(),
            self.config.threads
        );

        let names = self.plan_names(&jobs);
        let work = || -> Vec<(RenderJob, Result<JobOutput, PipelineError>)> {
            jobs.into_par_iter()
                .enumerate()
                .map(|(index, job)| {
                    let result = if cancel.is_cancelled() {
                        Err(PipelineError::Cancelled)
                    } else {
                        self.run_job(&job, index + 1, Some(cancel), Some(&names))
                    };
                    send(BatchEvent::JobFinished {
                        index,
                        input: job.input.clone(),
                        outcome: outcome_of(&result),
                    });
                    (job, result)
                })
                .collect()
        };

        let results = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
        {
            Ok(pool) => pool.install(work),
            Err(e) => {
                log::warn!(
                    "cannot build a {}-thread pool ({e}), using the global pool",
                    self.config.threads
                );
                work()
            }
        };

        let mut succeeded = 0;
        let mut failed = 0;
        let mut cancelled = 0;
        for (_, result) in &results {
            match result {
                Ok(_) => succeeded += 1,
                Err(PipelineError::Cancelled) => cancelled += 1,
                Err(_) => failed += 1,
            }
        }
        send(BatchEvent::Finished {
            succeeded,
            failed,
            cancelled,
        });
        results
    }

    /// Reserve destinations, in submission order, for every job whose name
    /// is known up front.
    fn plan_names(&self, jobs: &[RenderJob]) -> BatchNames {
        let reservations = OutputReservations::default();
        for path in jobs.iter().filter_map(|j| j.output.as_deref()) {
            reservations.claim(path);
        }
        let timestamped = self.config.filename_pattern.uses_timestamp();
        let planned = jobs
            .iter()
            .enumerate()
            .map(|(slot, job)| {
                if job.output.is_some() || timestamped {
                    return None;
                }
                // Same-as-source output is predicted from the extension and
                // re-checked once the source is decoded.
                let format = job
                    .options
                    .output_format
                    .or(self.config.output_format)
                    .or_else(|| OutputFormat::from_path(&job.input))?;
                let natural =
                    self.natural_output_path(&job.input, NaiveDateTime::default(), slot + 1, format);
                let reserved = reservations.reserve(natural.clone());
                Some(PlannedName { natural, reserved })
            })
            .collect();
        BatchNames {
            planned,
            reservations,
        }
    }

    /// The pattern-derived destination, before batch de-duplication.
    fn natural_output_path(
        &self,
        input: &Path,
        captured_at: NaiveDateTime,
        index: usize,
        format: OutputFormat,
    ) -> PathBuf {
        naming::output_path(
            input,
            self.config.output_dir.as_deref(),
            &self.config.filename_pattern,
            &NameContext {
                original: naming::source_stem(input),
                captured_at,
                index,
            },
            format,
        )
    }

    fn run_job(
        &self,
        job: &RenderJob,
        index: usize,
        cancel: Option<&CancellationToken>,
        names: Option<&BatchNames>,
    ) -> Result<JobOutput, PipelineError> {
        let checkpoint = Checkpoint {
            deadline: self.config.job_timeout.map(|t| (Instant::now() + t, t)),
            cancel,
        };
        let input = job.input.as_path();

        checkpoint.check("read", input)?;
        let bytes = std::fs::read(input).map_err(|source| IoError::ReadFailed {
            path: input.to_path_buf(),
            source,
        })?;

        checkpoint.check("extract metadata", input)?;
        let embedded = read_embedded(&bytes)?;
        let timestamp = self.extractor.resolve_timestamp(
            job.options.override_timestamp,
            &embedded,
            Some(input),
        )?;
        let preset = self.registry.resolve(&job.preset_id)?;

        checkpoint.check("decode", input)?;
        let decoded = decode(&bytes).map_err(|e| IoError::DecodeFailed {
            path: input.to_path_buf(),
            reason: e.to_string(),
        })?;
        let (width, height) = decoded.pixels.dimensions();

        checkpoint.check("render", input)?;
        let assets = RenderAssets::load(preset, self.config.locale)?;
        let (stamped, _) = stamp(&decoded.pixels, embedded.orientation, preset, &timestamp, &assets)?;
        drop(decoded.pixels);

        let format = job
            .options
            .output_format
            .or(self.config.output_format)
            .or_else(|| job.output.as_deref().and_then(OutputFormat::from_path))
            .unwrap_or(decoded.format);

        checkpoint.check("encode", input)?;
        let encoded = encode(&stamped, format, self.config.quality, decoded.has_alpha)
            .map_err(|e| encoding_failed(format, e))?;
        let encoded = self.passthrough(&bytes, encoded, format, embedded.orientation, &job.options)?;

        let output_path = match &job.output {
            Some(path) => path.clone(),
            None => {
                let natural = self.natural_output_path(input, timestamp.captured_at, index, format);
                match names {
                    Some(names) => names.destination(index - 1, natural),
                    None => natural,
                }
            }
        };

        checkpoint.check("write", input)?;
        write_atomic(&output_path, &encoded, self.config.overwrite)?;
        log::info!(
            "{} → {} ({}, {} time)",
            input.display(),
            output_path.display(),
            preset.id,
            match timestamp.source {
                TimeOrigin::Exif => "EXIF",
                TimeOrigin::Filesystem => "file",
                TimeOrigin::Override => "override",
            }
        );

        Ok(JobOutput {
            output_path,
            width,
            height,
            timestamp,
            preset_id: preset.id.clone(),
            bytes_written: encoded.len() as u64,
        })
    }

    fn passthrough(
        &self,
        source: &[u8],
        encoded: Vec<u8>,
        format: OutputFormat,
        orientation: Orientation,
        options: &JobOptions,
    ) -> Result<Vec<u8>, PipelineError> {
        if format == OutputFormat::Tiff {
            log::debug!("TIFF output, skipping metadata passthrough");
            return Ok(encoded);
        }
        let preserve = self.config.preserve_metadata && !options.strip_other_metadata;
        let (blocks, policy) = if preserve {
            let mut blocks = passthrough::read_blocks(source).map_err(|e| encoding_failed(format, e))?;
            // Sources whose EXIF can't be carried over still need their
            // orientation, since the pixels stay in raw order.
            if blocks.exif.is_none() && orientation != Orientation::Normal {
                blocks.exif = Some(
                    passthrough::orientation_only_exif(orientation)
                        .map_err(|e| encoding_failed(format, e))?,
                );
            }
            (blocks, MetadataPolicy::Preserve)
        } else {
            (MetadataBlocks::default(), MetadataPolicy::OrientationOnly)
        };
        passthrough::apply(encoded, &blocks, policy, orientation).map_err(|e| encoding_failed(format, e))
    }
}

/// Output names for one batch.
struct BatchNames {
    /// Per submission slot; `None` for jobs named at run time.
    planned: Vec<Option<PlannedName>>,
    reservations: OutputReservations,
}

struct PlannedName {
    natural: PathBuf,
    reserved: PathBuf,
}

impl BatchNames {
    /// The planned name for `slot` if the job ended up where it was predicted
    /// to, else a fresh reservation.
    fn destination(&self, slot: usize, natural: PathBuf) -> PathBuf {
        match self.planned.get(slot) {
            Some(Some(plan)) if plan.natural == natural => plan.reserved.clone(),
            _ => self.reservations.reserve(natural),
        }
    }
}

fn outcome_of(result: &Result<JobOutput, PipelineError>) -> JobOutcome {
    match result {
        Ok(out) => JobOutcome::Written {
            output: out.output_path.clone(),
            timestamp: out.timestamp,
        },
        Err(PipelineError::Cancelled) => JobOutcome::Cancelled,
        Err(e) => JobOutcome::Failed(e.to_string()),
    }
}

/// Write `bytes` to `path` through a temp file in the same directory.
fn write_atomic(path: &Path, bytes: &[u8], overwrite: bool) -> Result<(), IoError> {
    let write_err = |source: std::io::Error| IoError::WriteFailed {
        path: path.to_path_buf(),
        source,
    };
    if !overwrite && path.exists() {
        return Err(IoError::AlreadyExists(path.to_path_buf()));
    }
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;

    let persisted = if overwrite {
        tmp.persist(path)
    } else {
        tmp.persist_noclobber(path)
    };
    persisted.map(|_| ()).map_err(|e| {
        if e.error.kind() == std::io::ErrorKind::AlreadyExists {
            IoError::AlreadyExists(path.to_path_buf())
        } else {
            write_err(e.error)
        }
    })
}
