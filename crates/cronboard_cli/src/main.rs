use chrono::{DateTime, Local};
use clap::Parser;
use cronboard_cli::cli::{Cli, Command, collect_config_overrides};
use cronboard_cli::render;
use cronboard_core::classify::build_snapshot;
use cronboard_core::config::{Config, load_config_with_fallback, merge_overrides};
use cronboard_core::dashboard::{Dashboard, RECLASSIFY_INTERVAL, spawn_refresher};
use cronboard_core::error::AppError;
use cronboard_core::fetch::{FileSource, HttpSource, ScheduleSource};
use cronboard_core::notify::{Notifier, notifier_from_env};
use cronboard_core::occurrence::compute_occurrences;
use cronboard_core::poller::spawn_poller;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::invalid_input(message)
}

fn parse_now(raw: Option<&str>) -> Result<DateTime<Local>, AppError> {
    match raw {
        Some(value) => DateTime::parse_from_rfc3339(value.trim())
            .map(|parsed| parsed.with_timezone(&Local))
            .map_err(|err| AppError::invalid_input(format!("invalid --now '{value}': {err}"))),
        None => Ok(Local::now()),
    }
}

fn resolve_config(cli: &Cli) -> Result<Config, AppError> {
    let loaded = load_config_with_fallback();
    if let Some(err) = loaded.error {
        warn!(error = %err, "using default configuration");
    }
    let overrides =
        collect_config_overrides(&cli.config_override).map_err(AppError::invalid_input)?;
    Ok(merge_overrides(&loaded.config, &overrides))
}

async fn run_show(
    cli: &Cli,
    config: &Config,
    file: Option<&PathBuf>,
    now: Option<&str>,
) -> Result<(), AppError> {
    let now = parse_now(now)?;
    let records = match file {
        Some(path) => FileSource::new(path).fetch().await?,
        None => {
            HttpSource::new(&config.endpoint, config.cors_relay.as_deref())?
                .fetch()
                .await?
        }
    };

    let snapshot = build_snapshot(&records, now, config.bucket_policy);
    if cli.json {
        println!("{}", render::render_json(&snapshot));
    } else {
        print!("{}", render::render_plain(&snapshot, &config.palette()));
    }
    Ok(())
}

async fn run_watch<S: ScheduleSource + 'static>(
    cli: &Cli,
    config: &Config,
    source: S,
) -> Result<(), AppError> {
    let dashboard = Arc::new(Dashboard::new(config.bucket_policy));
    let mut snapshots = dashboard.subscribe();
    let notifier: Arc<dyn Notifier> = Arc::from(notifier_from_env()?);

    let refresher = spawn_refresher(
        dashboard.clone(),
        source,
        config.refresh_interval(),
        RECLASSIFY_INTERVAL,
    );
    let poller = spawn_poller(dashboard.subscribe(), notifier, config.poll_interval());
    let palette = config.palette();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(err) = signal {
                    warn!(error = %err, "failed to listen for ctrl-c");
                }
                info!("shutting down");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                if cli.json {
                    println!("{}", render::render_json(&snapshot));
                } else {
                    print!("{}", render::render_plain(&snapshot, &palette));
                }
            }
        }
    }

    poller.shutdown().await;
    refresher.shutdown().await;
    Ok(())
}

fn run_occurrences(cli: &Cli, expression: &str, now: Option<&str>) -> Result<(), AppError> {
    let reference = parse_now(now)?;
    let pair = compute_occurrences(expression, reference)?;
    if cli.json {
        println!(
            "{}",
            render::render_occurrences_json(expression, reference, &pair)
        );
    } else {
        println!(
            "{}",
            render::render_occurrences_plain(expression, reference, &pair)
        );
    }
    Ok(())
}

async fn run_command(cli: Cli) -> Result<(), AppError> {
    let config = resolve_config(&cli)?;

    match &cli.command {
        Command::Show { file, now } => {
            run_show(&cli, &config, file.as_ref(), now.as_deref()).await?;
        }
        Command::Watch { file } => match file {
            Some(path) => run_watch(&cli, &config, FileSource::new(path)).await?,
            None => {
                let source = HttpSource::new(&config.endpoint, config.cors_relay.as_deref())?;
                run_watch(&cli, &config, source).await?;
            }
        },
        Command::Occurrences { expression, now } => {
            run_occurrences(&cli, expression, now.as_deref())?;
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cronboard_cli=info,cronboard_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if !err.use_stderr() {
                let _ = err.print();
                return;
            }
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    if let Err(err) = run_command(cli).await {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}
