//! Mesh Overlay
//!
//! Entry point for the mesh-overlay command line tool.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use mesh_overlay::compositor::TieBreak;
use mesh_overlay::config::{load_config, OverlayConfig, SubjectFailurePolicy};
use mesh_overlay::{OverlayPipeline, SoftwareRasterizer};

const USAGE: &str = "\
Usage: mesh-overlay -d <data> -i <images> -o <output> [options]

Options:
  -d, --data <dir>           Fitting output folder with meshes/ and results/
  -i, --images <dir>         Folder with the input images
  -o, --output <dir>         Folder for the composited images
  -c, --config <file>        JSON run configuration; flags override it
      --focal-length <px>    Camera focal length (default 5000)
      --copy-empty           Copy images without subjects to the output folder
      --no-save              Do not write any results
      --save-per-subject     Also write one composite per subject
      --no-depth             Ignore depth; overlapping subjects are added
      --tie-break <mode>     Exact depth ties: blend (default) or first
      --skip-failed-subjects Leave out subjects that fail instead of the whole image
  -v, --verbosity <n>        0 warn, 1 info, 2 debug, 3 trace
  -h, --help                 Show this message";

/// Parsed command line.
#[derive(Debug)]
struct Cli {
    config: OverlayConfig,
    verbosity: u8,
}

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{}", USAGE);
        return;
    }

    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {:#}\n\n{}", e, USAGE);
            std::process::exit(2);
        }
    };

    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_filter(cli.verbosity)))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run(cli.config) {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(config: OverlayConfig) -> anyhow::Result<()> {
    log::info!("Mesh overlay starting...");
    log::debug!("{:?}", config);

    let pipeline = OverlayPipeline::new(config, Box::new(SoftwareRasterizer::new()));
    let report = pipeline.run().context("Batch failed")?;

    if !report.failed.is_empty() {
        for (image, error) in &report.failed {
            log::error!("{}: {}", image, error);
        }
        bail!("{} image(s) failed", report.failed.len());
    }

    log::info!("Mesh overlay finished");
    Ok(())
}

fn log_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

fn parse_args(args: &[String]) -> anyhow::Result<Cli> {
    // The config file is the base that every other flag overrides.
    let mut config = match args.iter().position(|a| a == "-c" || a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or_else(|| anyhow!("--config needs a value"))?;
            load_config(&PathBuf::from(path)).with_context(|| format!("Failed to load config {}", path))?
        }
        None => OverlayConfig::default(),
    };
    let mut verbosity = 0u8;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = || {
            iter.next()
                .ok_or_else(|| anyhow!("{} needs a value", arg))
        };
        match arg.as_str() {
            "-c" | "--config" => {
                value()?;
            }
            "-d" | "--data" => config.data_dir = PathBuf::from(value()?),
            "-i" | "--images" => config.images_dir = PathBuf::from(value()?),
            "-o" | "--output" => config.output_dir = PathBuf::from(value()?),
            "--focal-length" => {
                let raw = value()?;
                config.focal_length = raw
                    .parse()
                    .with_context(|| format!("Invalid focal length '{}'", raw))?;
            }
            "--tie-break" => {
                config.tie_break = match value()?.as_str() {
                    "blend" => TieBreak::Blend,
                    "first" => TieBreak::FirstLayer,
                    other => bail!("Unknown tie-break mode '{}'", other),
                };
            }
            "-v" | "--verbosity" => {
                let raw = value()?;
                verbosity = raw
                    .parse()
                    .with_context(|| format!("Invalid verbosity '{}'", raw))?;
            }
            "--copy-empty" => config.copy_empty = true,
            "--no-save" => config.save = false,
            "--save-per-subject" => config.save_per_subject = true,
            "--no-depth" => config.use_depth = false,
            "--skip-failed-subjects" => config.on_subject_error = SubjectFailurePolicy::SkipSubject,
            other => bail!("Unknown argument '{}'", other),
        }
    }

    Ok(Cli { config, verbosity })
}
