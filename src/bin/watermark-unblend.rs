use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use watermark_unblend::{
    default_output_path, CalibrationStore, Config, ProcessResult, RemoverOptions,
    WatermarkRemover, WatermarkSize,
};

#[derive(Parser)]
#[command(
    name = "watermark-unblend",
    about = "Remove a known logo overlay from images via reverse alpha blending",
    version,
    after_help = "Simple usage: watermark-unblend <image>  (writes <name>_cleaned.png)\n\n\
                  The watermark box is placed by image size, not detected. Images\n\
                  without the overlay are still modified."
)]
struct Cli {
    /// Input image file or directory
    input: PathBuf,

    /// Output file or directory (default: {name}_cleaned.png)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Configuration file (default: ./watermark-unblend.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Force 48x48 watermark size
    #[arg(long, conflicts_with = "force_large")]
    force_small: bool,

    /// Force 96x96 watermark size
    #[arg(long)]
    force_large: bool,

    /// Enable debug logging
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(cli: &Cli) {
    let default = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = match Config::discover(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            process::exit(1);
        }
    };

    let force_size = if cli.force_small {
        Some(WatermarkSize::Small)
    } else if cli.force_large {
        Some(WatermarkSize::Large)
    } else {
        None
    };

    // Relative asset paths resolve against the config file's directory.
    let base = cli
        .config
        .as_deref()
        .and_then(Path::parent)
        .unwrap_or(Path::new("."));
    let store = Arc::new(CalibrationStore::new());
    if let Err(e) = store.get_or_load(&config.calibration.source(base)) {
        error!("Fatal: failed to calibrate: {e}");
        process::exit(1);
    }

    let remover = WatermarkRemover::new(
        store,
        RemoverOptions {
            force_size,
            ..RemoverOptions::from(&config)
        },
    );

    if !cli.input.exists() {
        error!("Input path does not exist: {}", cli.input.display());
        process::exit(1);
    }

    let results = if cli.input.is_dir() {
        let Some(output_dir) = &cli.output else {
            error!("Output directory is required for batch processing");
            eprintln!("Usage: watermark-unblend <input_dir> -o <output_dir>");
            process::exit(1);
        };
        remover.process_directory(&cli.input, output_dir)
    } else {
        let output_path = cli
            .output
            .clone()
            .unwrap_or_else(|| default_output_path(&cli.input));
        vec![remover.process_file(&cli.input, &output_path)]
    };

    let mut success_count = 0u32;
    let mut fail_count = 0u32;
    for r in &results {
        report(r);
        if r.success {
            success_count += 1;
        } else {
            fail_count += 1;
        }
    }

    if results.len() > 1 {
        info!(
            processed = success_count,
            failed = fail_count,
            total = results.len(),
            "summary"
        );
    }

    if fail_count > 0 {
        process::exit(1);
    }
}

fn report(result: &ProcessResult) {
    let filename = result.path.file_name().map_or_else(
        || result.path.display().to_string(),
        |f| f.to_string_lossy().to_string(),
    );

    match &result.output {
        Some(out) if result.success => {
            info!("[OK] {filename} -> {}: {}", out.display(), result.message);
        }
        _ => error!("[FAIL] {filename}: {}", result.message),
    }
}
