//! Takeout Reconcile - merge split photo takeout bundles
//!
//! A CLI tool that reconciles takeout bundles into one album tree with
//! matched sidecars and linked live photos.

use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use takeout_reconcile::{Cli, Config, LogSink, Reconciler, Severity, TracingProgress};
use tracing::{Level, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// CLI Output Module
mod cli_output {
    //! Colored terminal output for the run summary

    use crossterm::{
        ExecutableCommand,
        style::{Color, Print, Stylize, style},
    };
    use std::io::stdout;

    /// CLI theme colors
    pub struct CliTheme;

    impl CliTheme {
        pub const SUCCESS: Color = Color::Green;
        pub const WARNING: Color = Color::Yellow;
        pub const ERROR: Color = Color::Red;
        pub const HINT: Color = Color::DarkGrey;
        pub const ACCENT: Color = Color::Cyan;
    }

    pub fn print_separator() {
        let _ = stdout().execute(Print(&format!("{}\n", "─".repeat(60))));
    }

    /// Print a centered title
    pub fn print_title(title: &str) {
        let width: usize = 60;
        let padding = width.saturating_sub(title.len()) / 2;
        let left_pad = " ".repeat(padding.saturating_sub(1));

        let _ = stdout().execute(Print(&format!(
            "{}{} {}{}\n",
            left_pad,
            "╔".bold().stylize(),
            title.bold().stylize(),
            "╗".bold().stylize(),
        )));
        let _ = stdout().execute(Print("\n"));
    }

    pub fn print_warning(msg: &str) {
        let _ = stdout().execute(Print(style("⚠ ").with(CliTheme::WARNING).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_error(msg: &str) {
        let _ = stdout().execute(Print(style("✗ ").with(CliTheme::ERROR).bold()));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    pub fn print_hint(msg: &str) {
        let _ = stdout().execute(Print(style("→ ").with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", msg)));
    }

    /// Print a statistic line
    pub fn print_stat(key: &str, value: &str, color: Color) {
        let key_styled = style(key).with(CliTheme::HINT);
        let value_styled = style(value).with(color).bold();
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(key_styled));
        let _ = stdout().execute(Print(": "));
        let _ = stdout().execute(Print(value_styled));
        let _ = stdout().execute(Print("\n"));
    }

    /// Print a list item
    pub fn print_item(icon: &str, color: Color, text: &str) {
        let _ = stdout().execute(Print("  "));
        let _ = stdout().execute(Print(style(icon).with(color).bold()));
        let _ = stdout().execute(Print(format!(" {}\n", text)));
    }

    /// Print a log file path
    pub fn print_log_path(label: &str, path: &str) {
        let _ = stdout().execute(Print(style("  📁 ").with(CliTheme::ACCENT)));
        let _ = stdout().execute(Print(style(format!("{}: ", label)).with(CliTheme::HINT)));
        let _ = stdout().execute(Print(format!("{}\n", path)));
    }

    pub fn print_blank() {
        let _ = stdout().execute(Print("\n"));
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.sample_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    // Get the executable directory for Config and Log directories
    let exe_dir = get_executable_dir()?;
    let config_path = cli
        .config
        .as_ref()
        .map(|path| resolve_config_path(&exe_dir, path));
    let config = load_config(&cli, config_path.as_deref())?;

    let log_path = get_log_path(&exe_dir, &cli);
    let _guard = setup_logging(&cli, config.verbose, &log_path)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Takeout Reconcile starting"
    );
    if let Some(path) = &config_path {
        info!(config_file = %path.display(), "Configuration loaded from file");
    }
    if config.verbose {
        info!(?config, "Configuration loaded");
    }
    info!(log_file = %log_path.display(), "Log file location");

    if let Some(ref path) = cli.save_config {
        config.save_to_file(path)?;
        cli_output::print_hint(&format!("Configuration saved to {}", path.display()));
        return Ok(());
    }

    validate_config(&config)?;

    let sink = Arc::new(LogSink::open(&config.log_path())?);
    let reconciler = Reconciler::new(config, Arc::clone(&sink))?
        .with_progress(Arc::new(TracingProgress));

    if cli.list_albums {
        return list_albums(&reconciler);
    }

    let outcome = reconciler.run();
    print_summary(&reconciler, &log_path);

    if let Err(e) = outcome {
        error!(error = %e, "Reconciliation failed");
        cli_output::print_error(&format!("Error: {}", e));
        std::process::exit(1);
    }

    Ok(())
}

/// Print the discovered bundles and logical albums
fn list_albums(reconciler: &Reconciler) -> Result<()> {
    use cli_output::*;

    let discovery = match reconciler.discover() {
        Ok(discovery) => discovery,
        Err(e) => {
            reconciler.log().error(e.to_string());
            reconciler.log().flush()?;
            return Err(e.into());
        }
    };

    print_separator();
    print_title("Takeout bundles");
    for bundle in &discovery.bundles {
        print_item("▸", CliTheme::ACCENT, &format!("{} ({} album folders)", bundle.name, bundle.albums.len()));
    }
    print_blank();
    print_title("Albums");
    for name in discovery.sorted_album_names() {
        print_item("•", CliTheme::SUCCESS, name);
    }
    print_separator();
    print_stat("Album folders", &discovery.folder_count().to_string(), CliTheme::ACCENT);
    print_stat("Albums", &discovery.albums.len().to_string(), CliTheme::SUCCESS);

    Ok(())
}

/// Print statistics and the most recent log sink entries
fn print_summary(reconciler: &Reconciler, log_path: &Path) {
    use cli_output::*;

    let stats = reconciler.stats();
    let load = |counter: &std::sync::atomic::AtomicUsize| counter.load(Ordering::Relaxed).to_string();

    print_separator();
    print_title("Reconciliation finished");
    print_separator();
    print_blank();
    print_stat("Albums", &load(&stats.albums), CliTheme::ACCENT);
    print_stat("Media files", &load(&stats.media_files), CliTheme::ACCENT);
    print_stat("Sidecars matched", &load(&stats.sidecars_matched), CliTheme::SUCCESS);
    print_stat("Live photos", &load(&stats.live_pairs), CliTheme::SUCCESS);
    print_stat("Files written", &load(&stats.files_written), CliTheme::SUCCESS);
    print_stat("Unused metadata files", &load(&stats.unused_metadata), CliTheme::WARNING);
    print_stat("Name collisions", &load(&stats.collisions), CliTheme::WARNING);
    print_blank();

    let recent = reconciler.log().recent();
    if !recent.is_empty() {
        print_separator();
        print_hint("Most recent warnings and errors (newest first):");
        print_blank();
        for entry in recent {
            match entry.severity {
                Severity::Warning => print_warning(&entry.message),
                Severity::Error => print_error(&entry.message),
            }
        }
    }

    print_separator();
    print_log_path("Run log", &log_path.display().to_string());
    print_log_path(
        "Warnings log",
        &reconciler.config().log_path().display().to_string(),
    );
}

/// Get the directory where the executable is located
fn get_executable_dir() -> Result<PathBuf> {
    let exe_path = std::env::current_exe()?;
    Ok(exe_path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Determine the log file path based on config file or timestamp
fn get_log_path(exe_dir: &Path, cli: &Cli) -> PathBuf {
    let log_dir = exe_dir.join("Log");
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");

    if let Some(config_name) = cli.config_name() {
        let config_log_dir = log_dir.join(&config_name);
        let log_filename = format!("{}_{}.log", config_name, timestamp);
        config_log_dir.join(log_filename)
    } else {
        let log_filename = format!("Run_{}.log", timestamp);
        log_dir.join(log_filename)
    }
}

/// Resolve config path - supports shorthand syntax
///
/// `family` finds `family.toml` in the working directory or in the
/// `Config` folder next to the executable.
fn resolve_config_path(exe_dir: &Path, config_path: &Path) -> PathBuf {
    if config_path.exists() {
        return config_path.to_path_buf();
    }

    let with_extension = if config_path.extension().is_none() {
        config_path.with_extension("toml")
    } else {
        config_path.to_path_buf()
    };

    if with_extension.exists() {
        return with_extension;
    }

    let config_dir = exe_dir.join("Config");
    let filename = config_path.file_name().unwrap_or(config_path.as_os_str());

    let mut in_config_dir = config_dir.join(filename);
    if in_config_dir.extension().is_none() {
        in_config_dir = in_config_dir.with_extension("toml");
    }

    if in_config_dir.exists() {
        return in_config_dir;
    }

    config_path.to_path_buf()
}

/// Load configuration from file or CLI arguments
///
/// Runs before logging is set up, since the file may turn on verbose output.
fn load_config(cli: &Cli, config_path: Option<&Path>) -> Result<Config> {
    let config = match config_path {
        Some(path) => cli.merge_with_config(Config::load_from_file(path)?),
        None => cli.to_config(),
    };

    Ok(config)
}

/// Setup logging (file + console)
fn setup_logging(cli: &Cli, verbose: bool, log_path: &Path) -> Result<Option<WorkerGuard>> {
    let level = if verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(log_path)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if cli.json_log {
        subscriber
            .with(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_ansi(false).with_writer(non_blocking))
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(Some(guard))
}

/// Validate configuration before processing
fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    if !config.root_dir.is_dir() {
        anyhow::bail!(
            "Takeout folder does not exist: {}",
            config.root_dir.display()
        );
    }

    Ok(())
}
