use engine_core::metrics::CountersSnapshot;
use model::records::run::{RunRecord, RunStatus};
use serde::Serialize;

/// Final, printable outcome of one run.
#[derive(Serialize, Debug, Clone)]
pub struct RunSummary {
    pub run: RunRecord,
    pub elapsed_secs: Option<i64>,
    pub stages_run: u64,
    pub rows_loaded: u64,
}

impl RunSummary {
    pub fn new(run: RunRecord, counters: CountersSnapshot) -> Self {
        RunSummary {
            elapsed_secs: run.elapsed_secs(),
            stages_run: counters.stages_run,
            rows_loaded: counters.rows_loaded,
            run,
        }
    }

    /// Success means no run-fatal error; farm-level errors are only counted.
    pub fn is_clean(&self) -> bool {
        self.run.status == RunStatus::Complete
    }
}
