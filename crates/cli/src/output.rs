use crate::error::CliError;
use engine_config::report::summary::RunSummary;
use engine_core::progress::{ReportView, RunStatusView};
use model::records::run::RunRecord;
use serde::Serialize;
use std::path::Path;

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(value)?)
}

pub async fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<(), CliError> {
    tokio::fs::write(path, to_json(value)?).await?;
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", to_json(value)?);
    Ok(())
}

fn or_na<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

pub fn print_summary(summary: &RunSummary) {
    let run = &summary.run;
    println!("Run {} finished:", run.id);
    println!("-----------------------------");
    println!("{:<16} {}", "Period", run.period);
    println!("{:<16} {}", "Status", run.status);
    println!("{:<16} {}", "Target", run.target_count);
    println!("{:<16} {}", "Complete", run.complete_count);
    println!("{:<16} {}", "Error", run.error_count);
    println!("{:<16} {}", "Stages run", summary.stages_run);
    println!("{:<16} {}", "Rows loaded", summary.rows_loaded);
    println!("{:<16} {}", "Elapsed (s)", or_na(summary.elapsed_secs));
}

pub fn print_run_status(view: &RunStatusView) {
    let run = &view.run;
    println!("Status of {}:", run.id);
    println!("-----------------------------");
    println!("{:<16} {}", "Period", run.period);
    println!("{:<16} {}", "Reference", run.reference_date);
    println!("{:<16} {}", "Status", run.status);
    println!(
        "{:<16} {}/{} ({} errors)",
        "Finished",
        run.finished_count(),
        run.target_count,
        run.error_count
    );
    println!("{:<16} {}", "Started", or_na(run.started_at.map(|t| t.to_rfc3339())));
    println!("{:<16} {}", "Ended", or_na(run.ended_at.map(|t| t.to_rfc3339())));
    println!(
        "{:<16} {} ({} ok, {} failed, {} running)",
        "Job entries",
        view.jobs.entries,
        view.jobs.succeeded,
        view.jobs.failed,
        view.jobs.running
    );

    if !view.failures.is_empty() {
        println!();
        println!("{:<10} {:<18} Message", "Farm", "Code");
        for failure in &view.failures {
            println!(
                "{:<10} {:<18} {}",
                or_na(failure.farm_id),
                failure.error_code.as_deref().unwrap_or("-"),
                failure.error_message.as_deref().unwrap_or("")
            );
        }
    }
}

pub fn print_runs(runs: &[RunRecord]) {
    println!(
        "{:<10} {:<12} {:<24} {:<10} {:>7} {:>9} {:>6}",
        "Run", "Reference", "Period", "Status", "Target", "Complete", "Error"
    );
    for run in runs {
        println!(
            "{:<10} {:<12} {:<24} {:<10} {:>7} {:>9} {:>6}",
            run.id.to_string(),
            run.reference_date.to_string(),
            format!("{} ~ {}", run.period.from, run.period.to),
            run.status.as_str(),
            run.target_count,
            run.complete_count,
            run.error_count
        );
    }
}

pub fn print_report(view: &ReportView, with_details: bool) -> Result<(), CliError> {
    if with_details {
        print_json(view)
    } else {
        print_json(&view.report)
    }
}
