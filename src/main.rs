mod cli;
mod logging;

use std::process;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use colored::*;
use dotenv::dotenv;
use minidrive::browse;
use minidrive::db::NEW_FILE_CHANNEL;
use minidrive::store::{self, MirrorStore, PgNotifications, PgStore};
use minidrive::{AppConfig, CancelToken, Daemon, Importer, Restorer, SyncSettings};
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match minidrive::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let result = match args.command {
        Some(Commands::Run) => run_daemon(&config),
        Some(Commands::Import) => run_import(&config),
        Some(Commands::Restore) => run_restore(&config),
        Some(Commands::Provision) => run_provision(&config),
        Some(Commands::Tree) => print_tree(&config),
        Some(Commands::Ls { path }) => print_files(&config, path.as_deref().unwrap_or("")),
        Some(Commands::PrintConfig) => {
            println!("Configuration: {:?}", config);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    };

    if let Err(err) = result {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn connect(config: &AppConfig) -> anyhow::Result<PgStore> {
    let mut store = PgStore::connect(&config.database_url())?;
    let applied = store.run_migrations()?;
    if applied > 0 {
        info!("Applied {} pending migrations", applied);
    }
    Ok(store)
}

fn run_daemon(config: &AppConfig) -> anyhow::Result<()> {
    let root = config.mirror_root()?;
    let database_url = config.database_url();
    let store = store::shared(connect(config)?);
    let notifications = PgNotifications::listen(&database_url, NEW_FILE_CHANNEL)?;

    let daemon = Daemon::new(store, &root, SyncSettings::from(config))?;
    let handle = daemon.start(notifications, CancelToken::new())?;
    info!(
        "Mirroring {}, press {} to stop",
        root.display().to_string().cyan(),
        "Ctrl-C".yellow()
    );

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let signal = runtime.block_on(tokio::signal::ctrl_c());
    if let Err(err) = &signal {
        error!("Cannot wait for Ctrl-C: {}", err);
    }

    handle.shutdown();
    Ok(signal?)
}

fn run_import(config: &AppConfig) -> anyhow::Result<()> {
    let root = config.mirror_root()?;
    let store = store::shared(connect(config)?);
    let result = Importer::new(store)
        .with_ignore_patterns(&config.app.ignore_patterns)
        .import_tree(&root)?;

    info!(
        "{} directories and {} files ({} bytes) imported in {}",
        format!("{}", result.directories_added).green(),
        format!("{}", result.files_added).green(),
        format!("{}", result.bytes_added).green(),
        format!("{:.2}s", result.duration.as_secs_f64()).green(),
    );
    if !result.persisted {
        anyhow::bail!("import of {} was rolled back", root.display());
    }
    Ok(())
}

fn run_restore(config: &AppConfig) -> anyhow::Result<()> {
    let root = config.mirror_root()?;
    let store = store::shared(connect(config)?);
    let report = Restorer::new(store).restore_tree(&root)?;

    info!(
        "{} directories created, {} files restored, {} already present, {} failures",
        format!("{}", report.directories_created).green(),
        format!("{}", report.files_restored).green(),
        format!("{}", report.files_present).cyan(),
        format!("{}", report.failures).red(),
    );
    Ok(())
}

fn run_provision(config: &AppConfig) -> anyhow::Result<()> {
    let mut store = PgStore::connect(&config.database_url())?;
    let applied = store.run_migrations()?;
    println!("{} migrations applied", format!("{}", applied).green());
    Ok(())
}

fn print_tree(config: &AppConfig) -> anyhow::Result<()> {
    let tree = connect(config)?.load_tree()?;
    println!("{}", config.app.directory.bold());
    for entry in browse::outline(&tree) {
        println!(
            "{}{} {}",
            "  ".repeat(entry.depth),
            entry.name.blue().bold(),
            format!("({})", entry.children).dimmed()
        );
    }
    Ok(())
}

fn print_files(config: &AppConfig, relative_dir: &str) -> anyhow::Result<()> {
    let tree = connect(config)?.load_tree()?;
    let Some(rows) = browse::file_table(&tree, relative_dir) else {
        anyhow::bail!("no stored directory '{}'", relative_dir);
    };

    let width = rows.iter().map(|row| row.name.len()).max().unwrap_or(0);
    for row in &rows {
        println!("{:<width$}  {:>12}", row.name, row.size.to_string().green(), width = width);
    }
    println!("{} files", format!("{}", rows.len()).cyan());
    Ok(())
}
