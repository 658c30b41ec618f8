use crate::cli::{Cli, Commands, EncodeArgs};
use anyhow::{Context, Result, bail};
use ffbatch::config::Config;
use ffbatch::engine::{
    self, BatchCoordinator, BitratePreset, CancelFlag, CancellationSource, EncodeEngine,
    EncodingMethod, HardwareChoice, HwAccel, KeyCancelListener, QualityPreset,
    ResolutionPreset, SourceProber, hardware,
};
use ffbatch::report::ConsoleSink;
use ffbatch::stats::{SessionStats, format_mb};
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

pub fn run(cli: Cli) {
    let config_path = cli.config.clone();

    let result = match cli.command {
        Some(Commands::CheckFfmpeg) => handle_check_ffmpeg(config_path.as_deref()),
        Some(Commands::Detect) => handle_detect(config_path.as_deref()),
        Some(Commands::Probe { file }) => handle_probe(config_path.as_deref(), &file),
        Some(Commands::Scan {
            directory,
            no_recursive,
        }) => handle_scan(config_path.as_deref(), directory, no_recursive),
        Some(Commands::DryRun { directory, encode }) => {
            handle_dry_run(config_path.as_deref(), directory, &encode)
        }
        Some(Commands::Presets) => {
            handle_presets();
            Ok(())
        }
        Some(Commands::InitConfig { force }) => handle_init_config(config_path.as_deref(), force),
        None => handle_encode(config_path.as_deref(), cli.directory, &cli.encode),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::load_from(p),
        None => Config::load(),
    }
}

/// Layer command-line flags over the loaded config
fn apply_overrides(config: &mut Config, args: &EncodeArgs) -> Result<()> {
    let d = &mut config.defaults;

    if let Some(codec) = args.codec {
        d.codec = codec.into();
    }
    if let Some(crf) = args.crf {
        d.method = EncodingMethod::Quality;
        d.quality = crf;
    }
    if let Some(name) = &args.quality_preset {
        let preset = QualityPreset::from_name(name)
            .with_context(|| format!("Unknown quality preset '{}' (see `ffbatch presets`)", name))?;
        d.method = EncodingMethod::Quality;
        d.quality = preset.value();
    }
    if let Some(multiplier) = args.vbr {
        d.method = EncodingMethod::Bitrate;
        d.bitrate_multiplier = multiplier;
    }
    if let Some(name) = &args.bitrate_preset {
        let preset = BitratePreset::from_name(name)
            .with_context(|| format!("Unknown bitrate preset '{}' (see `ffbatch presets`)", name))?;
        d.method = EncodingMethod::Bitrate;
        d.bitrate_multiplier = preset.multiplier();
    }
    if let Some(max_res) = args.max_res {
        d.max_resolution = max_res;
    }
    if let Some(preset) = &args.preset {
        d.preset = preset.clone();
    }
    if let Some(hw) = args.hwaccel {
        d.hardware_accel = hw;
    }
    if args.no_recursive {
        d.recursive = false;
    }
    if args.delete_originals {
        d.delete_originals = true;
    }
    Ok(())
}

fn resolve_directory(directory: Option<PathBuf>) -> Result<PathBuf> {
    let dir = match directory {
        Some(d) => d,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    Ok(dir)
}

/// Resolve the configured hardware choice, printing a warning on fallback
fn resolve_hardware(config: &Config) -> Option<HwAccel> {
    let choice = config.defaults.hardware_accel;
    if choice == HardwareChoice::None {
        return None;
    }
    let report = hardware::detect(&config.engine.ffmpeg_path);
    let resolution = report.resolve(choice);
    if let Some(warning) = &resolution.warning {
        eprintln!("Warning: {}", warning);
    }
    resolution.hw_accel
}

fn build_engine(
    config: &Config,
    hw: Option<HwAccel>,
    prober: Arc<dyn SourceProber>,
) -> Result<EncodeEngine> {
    Ok(EncodeEngine::new(
        config.to_policy(hw),
        config.resolution_policy(),
        prober,
        config.engine_options()?,
    ))
}

/// Ask a yes/no question on stdin. Empty input takes the default.
fn confirm(question: &str, default_yes: bool) -> Result<bool> {
    let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
    print!("{} {} ", question, hint);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read answer")?;

    Ok(match answer.trim().to_lowercase().as_str() {
        "" => default_yes,
        "y" | "yes" => true,
        _ => false,
    })
}

fn handle_encode(config_path: Option<&Path>, directory: Option<PathBuf>, args: &EncodeArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args)?;
    let dir = resolve_directory(directory)?;

    engine::ffmpeg_version(&config.engine.ffmpeg_path)?;

    let hw = resolve_hardware(&config);
    let prober: Arc<dyn SourceProber> = Arc::new(config.prober());
    let engine = build_engine(&config, hw, Arc::clone(&prober))?;

    println!("Scanning {}...", dir.display());
    let discovery = engine::discover(&dir, prober.as_ref(), &config.discovery_options()?)?;
    for skipped in &discovery.skipped {
        let reason = skipped.probe_error.as_deref().unwrap_or("unreadable");
        println!("  Skipping {}: {}", skipped.path.display(), reason);
    }

    if discovery.jobs.is_empty() {
        println!("No video files to encode.");
        return Ok(());
    }

    println!(
        "Found {} file(s), {} total",
        discovery.jobs.len(),
        format_mb(discovery.total_size_mb())
    );
    println!("Encoding: {}", engine.policy().describe());
    println!(
        "Max resolution: {}",
        engine.resolution().preset().description()
    );
    if config.defaults.delete_originals {
        println!("Source files will be DELETED after each successful encode.");
    }

    let interactive = io::stdin().is_terminal();
    if !args.yes && interactive && !confirm("Start encoding?", true)? {
        println!("Cancelled.");
        return Ok(());
    }

    let cancel = CancelFlag::new();
    let source: Arc<dyn CancellationSource> = Arc::new(cancel.clone());
    let listener = if interactive {
        match KeyCancelListener::spawn(Arc::clone(&source)) {
            Ok(listener) => {
                println!("Press 'q' to stop after the current file.");
                Some(listener)
            }
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "key listener unavailable, 'q' will not cancel");
                None
            }
        }
    } else {
        None
    };

    let coordinator =
        BatchCoordinator::new(engine, source).delete_source_on_success(config.defaults.delete_originals);
    let mut sink = ConsoleSink::stdout();
    let stats = coordinator.run(&discovery.jobs, &mut sink);
    drop(listener);

    offer_cleanup(&stats, &discovery.jobs, &config, args, interactive)?;

    if let Some(reason) = &stats.aborted {
        bail!("Batch aborted: {}", reason);
    }
    if stats.failed > 0 {
        process::exit(1);
    }
    Ok(())
}

fn offer_cleanup(
    stats: &SessionStats,
    jobs: &[engine::JobDescriptor],
    config: &Config,
    args: &EncodeArgs,
    interactive: bool,
) -> Result<()> {
    if stats.failed == 0 && !stats.cancelled && stats.aborted.is_none() {
        return Ok(());
    }

    let run_cleanup = if args.cleanup {
        true
    } else if interactive && !args.yes {
        confirm("Remove failed and partial outputs?", false)?
    } else {
        false
    };
    if !run_cleanup {
        return Ok(());
    }

    let report = engine::cleanup(stats, jobs, config.output_suffix()?);
    if report.is_empty() {
        println!("Nothing to clean up.");
    }
    for path in &report.removed {
        println!("  Removed {}", path.display());
    }
    for (path, err) in &report.errors {
        eprintln!("  Could not remove {}: {}", path.display(), err);
    }
    Ok(())
}

fn handle_check_ffmpeg(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let version = engine::ffmpeg_version(&config.engine.ffmpeg_path)?;
    println!("ffmpeg found: {}", version);
    let probe_version = engine::ffprobe_version(&config.engine.ffprobe_path)?;
    println!("ffprobe found: {}", probe_version);
    Ok(())
}

fn handle_detect(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let report = hardware::detect(&config.engine.ffmpeg_path);

    println!("=== Hardware Encoders ===\n");
    match &report.cpu {
        Some(cpu) => println!("CPU: {}", cpu),
        None => println!("CPU: unknown"),
    }
    if report.gpus.is_empty() {
        println!("GPUs: none detected");
    } else {
        for gpu in &report.gpus {
            println!("GPU: {}", gpu);
        }
    }
    println!();

    for entry in &report.entries {
        println!(
            "  {:<12} {:<8} {}",
            entry.encoder_id,
            entry.vendor.to_string(),
            if entry.usable { "available" } else { "unavailable" }
        );
    }
    println!();
    println!(
        "Recommended: {} ({})",
        report.recommended.encoder_id, report.recommended.description
    );
    Ok(())
}

fn handle_probe(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let prober = config.prober();
    let info = prober
        .probe(file)
        .with_context(|| format!("Failed to probe {}", file.display()))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn handle_scan(config_path: Option<&Path>, directory: Option<PathBuf>, no_recursive: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let dir = resolve_directory(directory)?;
    let recursive = config.defaults.recursive && !no_recursive;
    let suffix = config.output_suffix()?;
    let files = engine::scan(&dir, recursive, suffix)?;

    println!("Found {} video file(s) in {}", files.len(), dir.display());
    let mut total_bytes = 0;
    for path in &files {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        total_bytes += size;
        println!(
            "  {} -> {} ({})",
            path.display(),
            engine::output_path_for(path, suffix).display(),
            ffbatch::stats::format_bytes(size)
        );
    }
    println!("Total: {}", ffbatch::stats::format_bytes(total_bytes));
    Ok(())
}

fn handle_dry_run(config_path: Option<&Path>, directory: Option<PathBuf>, args: &EncodeArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, args)?;
    let dir = resolve_directory(directory)?;

    let hw = resolve_hardware(&config);
    let prober: Arc<dyn SourceProber> = Arc::new(config.prober());
    let engine = build_engine(&config, hw, Arc::clone(&prober))?;
    let discovery = engine::discover(&dir, prober.as_ref(), &config.discovery_options()?)?;

    println!("Encoding: {}", engine.policy().describe());
    for job in &discovery.jobs {
        println!("\n# {}", job.path.display());
        match engine.plan_params(job) {
            Ok(params) => println!(
                "{}",
                engine::format_ffmpeg_cmd(
                    &config.engine.ffmpeg_path,
                    &job.path,
                    &engine.output_path(job),
                    &params
                )
            ),
            Err(e) => println!("# cannot encode: {}", e),
        }
    }
    for skipped in &discovery.skipped {
        let reason = skipped.probe_error.as_deref().unwrap_or("unreadable");
        println!("\n# skipped {}: {}", skipped.path.display(), reason);
    }
    Ok(())
}

fn handle_presets() {
    println!("Quality presets (--quality-preset):");
    for preset in QualityPreset::ALL {
        println!("  {:<12} {:>4}", preset.name(), preset.value());
    }
    println!("\nBitrate presets (--bitrate-preset, multiple of source bitrate):");
    for preset in BitratePreset::ALL {
        println!("  {:<12} {:>5.2}x", preset.name(), preset.multiplier());
    }
    println!("\nResolution ceilings (--max-res):");
    for preset in ResolutionPreset::ALL {
        println!("  {}", preset.description());
    }
}

fn handle_init_config(config_path: Option<&Path>, force: bool) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => Config::config_path()?,
    };

    if path.exists() && !force {
        println!("Config file: {}", path.display());
        println!("Status: exists (use --force to reset to defaults)");
        return Ok(());
    }

    Config::default().save_to(&path)?;
    println!("Created default config at: {}", path.display());
    Ok(())
}
