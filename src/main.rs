//! Genesis - Friday Night Funkin' engine launcher (command line)

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use genesis::catalog::Catalog;
use genesis::installer::manage::{installed_versions, open_install_path};
use genesis::installer::{
    LaunchOutcome, LaunchRequest, Installer, LauncherConfig, Signal, SignalCallback,
};
use genesis::launcher::HeadlessWindow;
use genesis::mods::{self, materialize_links};
use genesis::paths::{is_safe_component, LauncherPaths};
use genesis::platform::Platform;
use genesis::settings::SettingsStore;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "genesis")]
#[command(version)]
#[command(about = "Friday Night Funkin' engine launcher - install engines, manage mods, play")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Launcher data directory (versions, mods, settings)
    #[arg(long, global = true, env = "GENESIS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Local catalog file (default: <data-dir>/versions.json)
    #[arg(long, global = true, env = "GENESIS_CATALOG")]
    catalog: Option<PathBuf>,

    /// Remote catalog URL, tried before the local file
    #[arg(long, global = true, env = "GENESIS_CATALOG_URL")]
    catalog_url: Option<String>,

    /// Command used to run Windows builds on Linux
    #[arg(long, global = true, env = "GENESIS_COMPAT_RUNNER", default_value = "wine")]
    compat_runner: String,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog engines and the versions available on this platform
    Engines,

    /// Install an engine version if needed, then play it
    Launch {
        /// Engine id from the catalog
        engine: String,

        /// Version to play (default: newest available)
        version: Option<String>,

        /// Only install, don't start the game after a fresh install
        #[arg(long)]
        no_launch: bool,
    },

    /// Check whether an engine version is installed
    Status { engine: String, version: String },

    /// List installed engine versions
    Installed,

    /// Delete an installed engine version
    Delete { engine: String, version: String },

    /// Open an install folder in the file manager
    Open { engine: String, version: String },

    /// Manage the shared mod library
    Mods {
        #[command(subcommand)]
        command: ModsCommand,
    },
}

#[derive(Subcommand)]
enum ModsCommand {
    /// List mods in the library
    List,

    /// Copy a mod folder into the library
    Add {
        /// Folder containing the mod
        path: PathBuf,

        /// Library folder name (default: the source folder's name)
        #[arg(long)]
        name: Option<String>,
    },

    /// Delete a mod from the library
    Remove { folder: String },

    /// Link a mod into installs again
    Show { folder: String },

    /// Stop linking a mod into installs
    Hide { folder: String },

    /// Rebuild the mods folder of an install
    Link { engine: String, version: String },
}

fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;

    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.0} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Turn pipeline signals into a progress bar, or JSON lines with `--json`
fn signal_printer(json: bool) -> SignalCallback {
    if json {
        return Arc::new(|signal: Signal| {
            if let Ok(line) = serde_json::to_string(&signal) {
                println!("{}", line);
            }
        });
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {percent}% | {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    Arc::new(move |signal: Signal| match signal {
        Signal::DownloadProgress {
            received_bytes,
            total_bytes,
            url,
            ..
        } => {
            match total_bytes {
                Some(total) => {
                    pb.set_length(total);
                    pb.set_position(received_bytes);
                    pb.set_message(format!("{} / {}", format_bytes(received_bytes), format_bytes(total)));
                }
                None if received_bytes == 0 => pb.set_message(url),
                None => pb.set_message(format!("{} downloaded", format_bytes(received_bytes))),
            }
        }
        Signal::UnzipStarted => pb.set_message("Extracting..."),
        Signal::DownloadComplete { name, path } => {
            pb.finish_and_clear();
            println!("Installed {} in {}", name, path.display());
        }
        Signal::GameReady { name, .. } => {
            pb.finish_and_clear();
            println!("Starting {}...", name);
        }
        Signal::DownloadError { error } => pb.println(format!("Error: {}", error)),
        Signal::DeleteSuccess { .. } => pb.finish_and_clear(),
    })
}

fn quiet() -> SignalCallback {
    Arc::new(|_: Signal| {})
}

fn build_config(cli: &Cli) -> Result<LauncherConfig> {
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => LauncherPaths::default_root()
            .context("Could not determine a data directory; pass --data-dir")?,
    };

    let mut config = LauncherConfig::new(data_dir);
    if let Some(catalog) = &cli.catalog {
        config.catalog_path = catalog.clone();
    }
    config.catalog_url = cli.catalog_url.clone();
    config.compat_runner = cli.compat_runner.clone();
    Ok(config)
}

async fn load_catalog(config: &LauncherConfig) -> Result<Catalog> {
    config.validate()?;
    match &config.catalog_url {
        Some(url) => {
            let client = config.http_client()?;
            Catalog::fetch_or_load(&client, url, &config.catalog_path).await
        }
        None => Catalog::load_file(&config.catalog_path),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let paths = config.paths();

    let _log_guard = genesis::logging::init(&paths.logs_dir(), cli.verbose)?;

    let platform = Platform::current();
    let settings = Arc::new(SettingsStore::load(paths.settings_file()));

    match &cli.command {
        Commands::Engines => {
            let catalog = load_catalog(&config).await?;
            if cli.json {
                return print_json(&catalog);
            }
            for engine in &catalog.engines {
                let versions: Vec<&str> = engine
                    .available_versions(platform)
                    .iter()
                    .map(|v| v.version.as_str())
                    .collect();
                println!("{:<12} {:<24} {}", engine.id, engine.name, versions.join(", "));
            }
        }

        Commands::Launch {
            engine,
            version,
            no_launch,
        } => {
            let catalog = load_catalog(&config).await?;
            let entry = catalog
                .engine(engine)
                .with_context(|| format!("Unknown engine: {}", engine))?;
            let version_entry = match version {
                Some(v) => entry
                    .version(v)
                    .with_context(|| format!("{} has no version {}", entry.name, v))?,
                None => entry
                    .latest_version(platform)
                    .with_context(|| format!("{} has no build for {}", entry.name, platform))?,
            };

            let auto_launch = settings.snapshot().auto_launch && !no_launch;
            let request = LaunchRequest::from_catalog(entry, version_entry, auto_launch);

            let installer = Installer::new(
                &config,
                settings.clone(),
                Arc::new(HeadlessWindow),
                signal_printer(cli.json),
            )?;

            match installer.launch(&request).await? {
                LaunchOutcome::Played { status, .. } if !status.success() => {
                    eprintln!("Game exited with {}", status);
                }
                LaunchOutcome::Played { .. } => {}
                LaunchOutcome::Installed { install_dir } => {
                    if !cli.json {
                        println!("Ready to play: {}", install_dir.display());
                    }
                }
            }
        }

        Commands::Status { engine, version } => {
            let catalog = load_catalog(&config).await?;
            let entry = catalog
                .engine(engine)
                .with_context(|| format!("Unknown engine: {}", engine))?;
            let installer =
                Installer::new(&config, settings.clone(), Arc::new(HeadlessWindow), quiet())?;
            let installed = installer
                .check_install_status(engine, version, &entry.executable_name)
                .await;
            if cli.json {
                print_json(&installed)?;
            } else if installed {
                println!("{} {} is installed", entry.name, version);
            } else {
                println!("{} {} is not installed", entry.name, version);
            }
        }

        Commands::Installed => {
            let catalog = load_catalog(&config).await?;
            let installed = installed_versions(&paths, &catalog, platform)?;
            if cli.json {
                return print_json(&installed);
            }
            if installed.is_empty() {
                println!("Nothing installed yet");
            }
            for engine in installed {
                println!("{:<24} {}", engine.name, engine.versions.join(", "));
            }
        }

        Commands::Delete { engine, version } => {
            let signals = if cli.json { signal_printer(true) } else { quiet() };
            let installer =
                Installer::new(&config, settings.clone(), Arc::new(HeadlessWindow), signals)?;
            installer.delete_install(engine, version).await?;
            if !cli.json {
                println!("Deleted {} {}", engine, version);
            }
        }

        Commands::Open { engine, version } => {
            let dir = open_install_path(&paths, engine, version).await?;
            println!("Opened {}", dir.display());
        }

        Commands::Mods { command } => run_mods_command(command, &paths, &settings, cli.json).await?,
    }

    Ok(())
}

async fn run_mods_command(
    command: &ModsCommand,
    paths: &LauncherPaths,
    settings: &SettingsStore,
    json: bool,
) -> Result<()> {
    let mods_root = paths.mods_dir();

    match command {
        ModsCommand::List => {
            let library = mods::scan_library(&mods_root).await;
            let visibility = settings.mod_visibility();

            if json {
                let summaries: Vec<_> = library.iter().map(|m| m.summary()).collect();
                return print_json(&summaries);
            }
            if library.is_empty() {
                println!("No mods in {}", mods_root.display());
            }
            for info in &library {
                let shown = if visibility.is_visible(&info.folder_name) { " " } else { "-" };
                let version = info.version().map(|v| format!(" v{}", v)).unwrap_or_default();
                println!(
                    "{} {:<24} [{}] {}{}",
                    shown,
                    info.folder_name,
                    info.engine_tag(),
                    info.title(),
                    version
                );
            }
        }

        ModsCommand::Add { path, name } => {
            let candidate = mods::validate_mod(path, name.as_deref(), &mods_root)?;
            let target =
                mods::install_mod(&candidate.source, &candidate.info.folder_name, &mods_root)?;
            if json {
                return print_json(&candidate.info.summary());
            }
            println!(
                "Added {} ({}) to {}",
                candidate.info.title(),
                candidate.info.engine_tag(),
                target.display()
            );
        }

        ModsCommand::Remove { folder } => {
            mods::delete_mod(folder, &mods_root)?;
            settings.forget_mod(folder)?;
            println!("Removed {}", folder);
        }

        ModsCommand::Show { folder } | ModsCommand::Hide { folder } => {
            if !is_safe_component(folder) {
                bail!("Invalid mod folder name: {:?}", folder);
            }
            let visible = matches!(command, ModsCommand::Show { .. });
            settings.set_mod_visible(folder, visible)?;
            println!("{} is now {}", folder, if visible { "shown" } else { "hidden" });
        }

        ModsCommand::Link { engine, version } => {
            if !is_safe_component(engine) || !is_safe_component(version) {
                bail!("Invalid engine id or version: {}/{}", engine, version);
            }
            let install_dir = paths.install_dir(engine, version);
            if !install_dir.is_dir() {
                bail!("{} {} is not installed", engine, version);
            }

            let visibility = settings.mod_visibility();
            let report = tokio::task::spawn_blocking(move || {
                materialize_links(&install_dir, &mods_root, &visibility)
            })
            .await??;
            println!("Linked {}/{} mods", report.linked.len(), report.total);
            for failed in &report.failed {
                eprintln!("  failed: {}", failed);
            }
        }
    }

    Ok(())
}
