use crate::core::identifiers::FarmId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One service registration row of a farm. A farm may have several
/// (history keyed by `registered_on`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceWindow {
    pub farm_id: FarmId,
    pub registered_on: Option<NaiveDate>,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub stop: Option<NaiveDate>,
    pub service_enabled: bool,
    pub record_active: bool,
}

impl ServiceWindow {
    /// `min(end, stop)`; a missing stop date never shortens the window.
    pub fn effective_end(&self) -> Option<NaiveDate> {
        let end = self.end?;
        Some(match self.stop {
            Some(stop) => end.min(stop),
            None => end,
        })
    }

    /// Both flags set, both mandatory dates present, and
    /// `start <= reference <= effective end`.
    pub fn is_eligible(&self, reference: NaiveDate) -> bool {
        if !(self.service_enabled && self.record_active) {
            return false;
        }
        let (Some(start), Some(effective_end)) = (self.start, self.effective_end()) else {
            return false;
        };
        start <= reference && reference <= effective_end
    }
}
