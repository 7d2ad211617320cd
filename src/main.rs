use clap::{Parser, Subcommand};
use oem_stamp::config::{self, CONFIG_FILE_NAME, EngineConfig};
use oem_stamp::imaging::OutputFormat;
use oem_stamp::pipeline::{CancellationToken, JobOptions, Pipeline, PipelineConfig, RenderJob};
use oem_stamp::registry::{BUILTIN_PRESETS, LoadReport, PresetRegistry};
use oem_stamp::{output, scan};
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "oem-stamp")]
#[command(about = "Camera-style timestamp watermarks for photos")]
#[command(long_about = "\
Camera-style timestamp watermarks for photos

Each photo gets its capture time drawn in a corner, styled after a camera
maker's in-body date imprint. The look comes from a preset: built-ins ship
for canon, nikon, fujifilm, pentax, sony, panasonic and xiaomi, and any TOML
file in the configured preset directory adds or replaces one.

Capture time resolution (first available wins):
  --time override → EXIF DateTimeOriginal → DateTimeDigitized → DateTime
  → time_source.fallback (file modified/created time, or a fixed time)
Set time_source.primary to file_modified, file_created or custom to skip
EXIF and always stamp that time instead.

Directory inputs skip files that look like earlier outputs (the configured
filename pattern, e.g. *_stamped.jpg).

Run 'oem-stamp gen-config' to generate a documented oem-stamp.toml, and
'oem-stamp gen-preset canon' for a preset to start your own from.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (default: ./oem-stamp.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct StampArgs {
    /// Image files or directories
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Preset id
    #[arg(short, long)]
    preset: String,

    /// Write outputs here instead of next to each source
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format: jpeg, png, webp or tiff (default: same as source)
    #[arg(long, value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// Stamp this time instead of the photo's own ("2024-03-15 14:32:07")
    #[arg(long, value_parser = parse_time)]
    time: Option<chrono::NaiveDateTime>,

    /// Keep only the orientation tag from the source's metadata
    #[arg(long)]
    strip_metadata: bool,

    /// Replace existing output files
    #[arg(long)]
    overwrite: bool,

    /// Descend into subdirectories of directory inputs
    #[arg(short, long)]
    recursive: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List available presets
    Presets {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Load presets and report rejected or overridden definitions
    CheckPresets,
    /// Stamp photos
    Stamp(StampArgs),
    /// Print a stock oem-stamp.toml with all options documented
    GenConfig,
    /// Print a preset's definition as TOML
    GenPreset {
        /// Preset id
        id: String,
    },
}

fn parse_format(s: &str) -> Result<OutputFormat, String> {
    OutputFormat::from_extension(s).ok_or_else(|| format!("unknown format '{s}'"))
}

fn parse_time(s: &str) -> Result<chrono::NaiveDateTime, String> {
    config::parse_time_value(s).ok_or_else(|| format!("cannot parse time '{s}'"))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
        Command::Presets { json } => {
            let engine = load_engine_config(cli.config.as_deref())?;
            let (registry, _) = load_registry(&engine);
            if json {
                let config = PipelineConfig::from_engine_config(&engine)?;
                let pipeline = Pipeline::new(Arc::new(registry), config);
                println!("{}", serde_json::to_string_pretty(&pipeline.list_presets())?);
            } else {
                output::print_preset_list(&registry, engine.general.locale);
            }
        }
        Command::CheckPresets => {
            let engine = load_engine_config(cli.config.as_deref())?;
            let (_, report) = load_registry(&engine);
            output::print_load_report(&report);
            if report.has_rejections() {
                let rejected = report.rejected_count();
                return Err(format!("{rejected} preset definitions rejected").into());
            }
        }
        Command::GenPreset { id } => {
            let engine = load_engine_config(cli.config.as_deref())?;
            let (registry, _) = load_registry(&engine);
            print!("{}", registry.resolve(&id)?.to_toml_string()?);
        }
        Command::Stamp(args) => {
            let mut engine = load_engine_config(cli.config.as_deref())?;
            stamp(&mut engine, args)?;
        }
    }

    Ok(())
}

fn stamp(engine: &mut EngineConfig, args: StampArgs) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(dir) = args.output_dir {
        engine.output.directory = Some(dir);
    }
    if args.overwrite {
        engine.output.overwrite = true;
    }
    let config = PipelineConfig::from_engine_config(engine)?;

    let (registry, report) = load_registry(engine);
    for warning in &report.warnings {
        eprintln!("Warning: {warning}");
    }
    // Fail before scanning when the preset is unknown.
    registry.resolve(&args.preset)?;

    let inputs = scan::collect_inputs(&args.inputs, args.recursive, Some(&config.filename_pattern))?;
    if inputs.is_empty() {
        println!("No images found");
        return Ok(());
    }
    let options = JobOptions {
        override_timestamp: args.time,
        strip_other_metadata: args.strip_metadata,
        output_format: args.format,
    };
    let jobs: Vec<RenderJob> = inputs
        .into_iter()
        .map(|input| RenderJob::new(input, args.preset.as_str()).with_options(options.clone()))
        .collect();

    let pipeline = Pipeline::new(Arc::new(registry), config);
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_batch_event(&event) {
                println!("{}", line);
            }
        }
    });
    let results = pipeline.run_batch(jobs, &CancellationToken::new(), Some(tx));
    printer.join().map_err(|_| "progress printer panicked")?;

    let failures: Vec<_> = results
        .iter()
        .filter_map(|(job, r)| r.as_ref().err().map(|e| (&job.input, e)))
        .collect();
    if failures.is_empty() {
        return Ok(());
    }
    eprintln!();
    eprintln!("Errors:");
    for (input, error) in &failures {
        eprintln!("    {}: {error}", input.display());
    }
    Err(format!("{} of {} images failed", failures.len(), results.len()).into())
}

/// Install env_logger: warnings by default, `-v` info, `-vv` debug.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Explicit `--config` paths must exist; the default one is optional.
fn load_engine_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let path = match path {
        Some(p) if !p.exists() => {
            return Err(format!("config file {} not found", p.display()).into());
        }
        Some(p) => p.to_path_buf(),
        None => PathBuf::from(CONFIG_FILE_NAME),
    };
    Ok(config::load_config(&path)?)
}

fn load_registry(engine: &EngineConfig) -> (PresetRegistry, LoadReport) {
    PresetRegistry::load(BUILTIN_PRESETS, &engine.preset_sources())
}
