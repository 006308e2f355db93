use crate::{error::SelectionError, retry::classify_db_error, source::FarmSource};
use chrono::NaiveDate;
use engine_core::retry::RetryPolicy;
use model::{core::identifiers::FarmId, records::service::ServiceWindow};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, info, warn};

/// Farms resolved for one reference date, ascending by id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub farms: Vec<FarmId>,
    /// Requested explicitly, or eligible but excluded, and therefore not selected.
    pub skipped: Vec<FarmId>,
    /// The most recently registered eligible window of every selected farm.
    pub windows: BTreeMap<FarmId, ServiceWindow>,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.farms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.farms.is_empty()
    }
}

/// Resolves the eligible farms. Pure given `windows`.
///
/// With an explicit list the result is the intersection of that list with
/// the eligible farms; farms outside their window are dropped silently.
/// `exclude` is applied last. A row whose start lies after its end never
/// matches; it is logged and skipped like any other ineligible row.
pub fn select(
    reference: NaiveDate,
    explicit: Option<&[FarmId]>,
    exclude: &[FarmId],
    windows: &[ServiceWindow],
) -> Selection {
    let mut eligible: BTreeMap<FarmId, &ServiceWindow> = BTreeMap::new();

    for window in windows {
        if window.service_enabled
            && window.record_active
            && let (Some(start), Some(end)) = (window.start, window.end)
            && start > end
        {
            warn!(farm = %window.farm_id, %start, %end, "Service window ends before it starts, skipped");
            continue;
        }

        if !window.is_eligible(reference) {
            continue;
        }

        eligible
            .entry(window.farm_id)
            .and_modify(|current| {
                if window.registered_on > current.registered_on {
                    *current = window;
                }
            })
            .or_insert(window);
    }

    let excluded: BTreeSet<FarmId> = exclude.iter().copied().collect();
    let requested: Vec<FarmId> = match explicit {
        Some(list) => list
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        None => eligible.keys().copied().collect(),
    };

    let mut selection = Selection::default();
    for farm in requested {
        match eligible.get(&farm) {
            Some(window) if !excluded.contains(&farm) => {
                selection.farms.push(farm);
                selection.windows.insert(farm, (*window).clone());
            }
            _ => selection.skipped.push(farm),
        }
    }

    selection
}

/// Reads the service windows and applies [`select`].
pub struct EntitySelector {
    source: Arc<dyn FarmSource>,
    retry: RetryPolicy,
}

impl EntitySelector {
    pub fn new(source: Arc<dyn FarmSource>, retry: RetryPolicy) -> Self {
        EntitySelector { source, retry }
    }

    pub async fn resolve(
        &self,
        reference: NaiveDate,
        explicit: Option<&[FarmId]>,
        exclude: &[FarmId],
    ) -> Result<Selection, SelectionError> {
        let windows = self
            .retry
            .run(
                "service_windows",
                || self.source.service_windows(),
                classify_db_error,
            )
            .await
            .map_err(|e| SelectionError::Source(e.to_string()))?;

        debug!(rows = windows.len(), %reference, "Service windows loaded");
        let selection = select(reference, explicit, exclude, &windows);
        info!(
            selected = selection.len(),
            skipped = selection.skipped.len(),
            %reference,
            "Farms resolved"
        );
        Ok(selection)
    }
}
