mod cli;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use autocrack_manager::api::ApiClient;
use autocrack_manager::config::{get_config_path, load_config, AppConfig, Theme};
use autocrack_manager::game_path::GamePathFinder;
use autocrack_manager::probe::ProtectionStatus;
use autocrack_manager::workflow::Settlement;
use autocrack_manager::{
    Backend, CatalogId, CrackManager, DesktopBackend, Error, EventHub, Result, Timings,
};
use cli::{Cli, Commands};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn parse_app_id(raw: &str) -> Result<CatalogId> {
    CatalogId::parse_numeric(raw).ok_or_else(|| Error::Other(format!("'{raw}' is not a numeric app id")))
}

fn locate(config: &AppConfig, catalog_id: &CatalogId, steam: Option<PathBuf>) -> Option<PathBuf> {
    let steam = steam.or_else(|| {
        (!config.steam_path.is_empty()).then(|| PathBuf::from(&config.steam_path))
    })?;
    GamePathFinder::find_game_path(&steam, catalog_id)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.unwrap_or_else(get_config_path);
    let config = load_config(&config_path);
    let events = EventHub::new();
    let backend: Arc<dyn Backend> = Arc::new(DesktopBackend::new(
        config_path,
        config.clone(),
        ApiClient::new()?,
        events.clone(),
    ));
    let mut manager = CrackManager::new(backend, &events, Timings::from(&config));

    match cli.command {
        Commands::Search { title, json } => {
            let query = title.join(" ");
            if query.trim().is_empty() {
                return Err(Error::Other("search text is empty".into()));
            }

            let mut changes = manager.search().changes();
            manager.set_search_query(&query);
            let snapshot = changes
                .wait_for(|s| s.direct.is_some() || s.completed_lookups > 0)
                .await
                .map_err(|e| Error::Other(e.to_string()))?
                .clone();

            if let Some(id) = snapshot.direct {
                println!("{id}\t(use this ID)");
            } else if json {
                println!("{}", serde_json::to_string_pretty(&snapshot.results)?);
            } else if snapshot.results.is_empty() {
                eprintln!("no results for '{query}'");
            } else {
                for entry in &snapshot.results {
                    println!("{}\t{}", entry.catalog_id, entry.display_name);
                }
            }
        }
        Commands::Check { app_id } => {
            let id = parse_app_id(&app_id)?;
            let mut changes = manager.probe().changes();
            manager.set_catalog_id(id);
            let state = changes
                .wait_for(|s| s.status.is_terminal())
                .await
                .map_err(|e| Error::Other(e.to_string()))?
                .clone();

            println!("{}", state.message);
            if state.status == ProtectionStatus::Exhausted {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Locate { app_id, steam } => {
            let id = parse_app_id(&app_id)?;
            match locate(&config, &id, steam) {
                Some(path) => println!("{}", path.display()),
                None => {
                    eprintln!("app {id} is not installed in any Steam library");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Apply { app_id, path, language } => {
            let id = parse_app_id(&app_id)?;
            manager.load_settings().await;
            manager.set_catalog_id(id.clone());
            manager.set_language(language.or_else(|| config.language.clone()));

            if let Some(path) = path.or_else(|| locate(&config, &id, None)) {
                manager.set_install_path(path.to_string_lossy());
            } else if manager.browse_install_directory().await?.is_none() {
                eprintln!("no game folder selected");
                return Ok(ExitCode::FAILURE);
            }

            let mut probe_changes = manager.probe().changes();
            let probe = probe_changes
                .wait_for(|s| s.status.is_terminal())
                .await
                .map_err(|e| Error::Other(e.to_string()))?
                .clone();
            if probe.status != ProtectionStatus::Clear {
                eprintln!("warning: {}", probe.message);
            }

            let ticket = match manager.start_crack() {
                Ok(ticket) => ticket,
                Err(blocked) => {
                    eprintln!("cannot start: {blocked}");
                    return Ok(ExitCode::FAILURE);
                }
            };

            let mut progress = manager.progress().changes();
            let printer = tokio::spawn(async move {
                while progress.changed().await.is_ok() {
                    let snapshot = progress.borrow_and_update().clone();
                    eprintln!("[{:>3}%] {}", snapshot.clamped_percent(), snapshot.message);
                }
            });

            let settlement = ticket.settled().await;
            printer.abort();

            match settlement {
                Settlement::Succeeded(text) => {
                    println!("{text}");
                    println!("{}", manager.notification().message());
                }
                Settlement::Failed(_) => {
                    eprintln!("{}", manager.workflow().status_message());
                    return Ok(ExitCode::FAILURE);
                }
            }
        }
        Commands::Theme { theme } => match theme {
            Some(raw) => {
                let theme: Theme = raw.parse()?;
                manager.set_theme(theme).await?;
                println!("{theme}");
            }
            None => println!("{}", manager.load_settings().await.theme),
        },
    }

    Ok(ExitCode::SUCCESS)
}
