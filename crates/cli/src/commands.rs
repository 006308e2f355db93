use chrono::NaiveDate;
use clap::Subcommand;
use model::core::identifiers::{FarmId, RunId};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Weekly batch over every eligible farm
    Run {
        #[arg(long, help = "Reference date (YYYY-MM-DD); defaults to today")]
        reference: Option<NaiveDate>,

        #[arg(
            long,
            value_delimiter = ',',
            help = "Only these farms, comma separated; still subject to eligibility"
        )]
        farms: Vec<FarmId>,

        #[arg(long, help = "Report the current week up to the reference date")]
        test: bool,

        #[arg(long, help = "Do not run upstream collectors before selecting farms")]
        skip_collectors: bool,

        #[arg(long, help = "Only print what would be processed")]
        dry_run: bool,

        #[arg(
            long,
            help = "If specified, writes the JSON summary to this file instead of stdout"
        )]
        output: Option<PathBuf>,
    },
    /// Manual run of a single farm
    RunFarm {
        #[arg(long)]
        farm: FarmId,

        #[arg(long, requires = "to", help = "Period start; defaults to last week")]
        from: Option<NaiveDate>,

        #[arg(long, requires = "from")]
        to: Option<NaiveDate>,
    },
    Status {
        #[arg(long, help = "Run ID to inspect, e.g. 42 or run-42")]
        run: RunId,

        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
    /// Current report of a farm for a period
    Report {
        #[arg(long)]
        farm: FarmId,

        #[arg(long)]
        from: NaiveDate,

        #[arg(long)]
        to: NaiveDate,

        #[arg(long, help = "Include stage details")]
        details: bool,
    },
    Runs {
        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
}
