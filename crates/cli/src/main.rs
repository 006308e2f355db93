use crate::{
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use chrono::Local;
use clap::Parser;
use commands::Commands;
use engine_config::{env::EnvManager, settings::EngineSettings};
use engine_core::{progress::StatusService, state::ReportStore};
use engine_runtime::execution::{
    executor::{BatchOrchestrator, RunOptions},
    factory,
};
use model::period::{PeriodKind, ReportPeriod};
use std::{path::PathBuf, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "farmrep", version, about = "Weekly farm report batch")]
struct Cli {
    #[arg(long, global = true, help = "Settings file (JSON)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "KEY=VALUE file applied over the environment")]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let shutdown = ShutdownCoordinator::new(CancellationToken::new());

    let code = match execute(cli, &shutdown).await {
        Ok(()) if shutdown.is_shutdown_requested() => ExitCode::ShutdownRequested,
        Ok(()) => ExitCode::Success,
        Err(err) => {
            error!(error = %err, "farmrep failed");
            eprintln!("Error: {err}");
            ExitCode::GeneralError
        }
    };
    std::process::exit(code.as_i32());
}

fn load_settings(cli: &Cli) -> Result<EngineSettings, CliError> {
    let mut env = EnvManager::from_process();
    if let Some(path) = &cli.env_file {
        env.load_from_file(path)?;
    }
    Ok(EngineSettings::load(cli.config.as_deref(), &env)?)
}

async fn execute(cli: Cli, shutdown: &ShutdownCoordinator) -> Result<(), CliError> {
    let settings = load_settings(&cli)?;

    match cli.command {
        Commands::Run {
            reference,
            farms,
            test,
            skip_collectors,
            dry_run,
            output,
        } => {
            let reference = reference.unwrap_or_else(|| Local::now().date_naive());
            let explicit = (!farms.is_empty()).then_some(farms.as_slice());
            let options = RunOptions {
                test_mode: test,
                skip_collectors,
            };

            let store = factory::create_store(&settings.store).await?;
            let source = factory::create_source(&settings).await?;
            shutdown.register_handlers();
            let orchestrator =
                BatchOrchestrator::new(settings, store, source, shutdown.cancel_token())
                    .with_options(options);

            if dry_run {
                let report = orchestrator
                    .dry_run(PeriodKind::Week, reference, explicit)
                    .await?;
                info!(farms = report.target_count(), "Dry run complete");
                return match output {
                    Some(path) => output::write_json(&report, &path).await,
                    None => output::print_json(&report),
                };
            }

            let summary = orchestrator
                .run(PeriodKind::Week, reference, explicit)
                .await?;
            match output {
                Some(path) => output::write_json(&summary, &path).await?,
                None => output::print_summary(&summary),
            }
        }
        Commands::RunFarm { farm, from, to } => {
            let period = match (from, to) {
                (Some(from), Some(to)) => ReportPeriod::from_bounds(from, to)?,
                (None, None) => ReportPeriod::previous_week(Local::now().date_naive()),
                _ => {
                    return Err(CliError::InvalidArgument(
                        "--from and --to must be given together".to_string(),
                    ));
                }
            };

            let store = factory::create_store(&settings.store).await?;
            let source = factory::create_source(&settings).await?;
            shutdown.register_handlers();
            let summary = BatchOrchestrator::new(settings, store, source, shutdown.cancel_token())
                .run_single(farm, period)
                .await?;
            output::print_summary(&summary);
        }
        Commands::Status { run, json } => {
            let view = status_service(&settings).await?.run_status(run).await?;
            if json {
                output::print_json(&view)?;
            } else {
                output::print_run_status(&view);
            }
        }
        Commands::Report {
            farm,
            from,
            to,
            details,
        } => {
            let period = ReportPeriod::from_bounds(from, to)?;
            let view = status_service(&settings)
                .await?
                .entity_report(farm, &period)
                .await?;
            output::print_report(&view, details)?;
        }
        Commands::Runs { limit, json } => {
            let runs = status_service(&settings).await?.recent_runs(limit).await?;
            if json {
                output::print_json(&runs)?;
            } else {
                output::print_runs(&runs);
            }
        }
    }

    Ok(())
}

async fn status_service(settings: &EngineSettings) -> Result<StatusService, CliError> {
    let store: Arc<dyn ReportStore> = factory::create_store(&settings.store).await?;
    Ok(StatusService::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::core::identifiers::{FarmId, RunId};

    #[test]
    fn run_accepts_a_farm_list() {
        let cli = Cli::try_parse_from([
            "farmrep",
            "run",
            "--reference",
            "2025-06-18",
            "--farms",
            "1387,2807",
            "--test",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                reference,
                farms,
                test,
                dry_run,
                ..
            } => {
                assert_eq!(reference, NaiveDate::from_ymd_opt(2025, 6, 18));
                assert_eq!(farms, vec![FarmId(1387), FarmId(2807)]);
                assert!(test);
                assert!(!dry_run);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn run_farm_needs_both_bounds() {
        assert!(
            Cli::try_parse_from(["farmrep", "run-farm", "--farm", "7", "--from", "2025-06-09"])
                .is_err()
        );
        assert!(
            Cli::try_parse_from([
                "farmrep",
                "run-farm",
                "--farm",
                "7",
                "--from",
                "2025-06-09",
                "--to",
                "2025-06-15",
            ])
            .is_ok()
        );
    }

    #[test]
    fn status_takes_prefixed_run_ids() {
        let cli = Cli::try_parse_from(["farmrep", "status", "--run", "run-42", "--config", "x.json"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("x.json")));
        match cli.command {
            Commands::Status { run, json } => {
                assert_eq!(run, RunId(42));
                assert!(!json);
            }
            _ => panic!("expected status"),
        }
    }
}
