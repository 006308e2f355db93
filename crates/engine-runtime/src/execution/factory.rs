use crate::error::BatchError;
use connectors::sql::{base::adapter::SqlAdapter, postgres::adapter::PgAdapter};
use engine_config::settings::{EngineSettings, StoreSettings};
use engine_core::state::{ReportStore, sled_store::SledReportStore, sql_store::SqlReportStore};
use engine_processing::source::{FarmSource, SqlFarmSource};
use std::sync::Arc;
use tracing::info;

pub async fn create_store(settings: &StoreSettings) -> Result<Arc<dyn ReportStore>, BatchError> {
    match settings {
        StoreSettings::Sled { path } => {
            info!(path = %path.display(), "Opening local report store");
            Ok(Arc::new(SledReportStore::open(path)?))
        }
        StoreSettings::Postgres { url } => {
            info!("Connecting report store to PostgreSQL");
            let adapter = PgAdapter::connect(url).await?;
            let store = SqlReportStore::new(Arc::new(adapter));
            store.init().await?;
            Ok(Arc::new(store))
        }
    }
}

pub async fn create_source(settings: &EngineSettings) -> Result<Arc<dyn FarmSource>, BatchError> {
    let url = settings.source_url.as_deref().ok_or_else(|| {
        BatchError::Initialization(
            "source_url is not configured (set FARMREP_SOURCE_URL)".to_string(),
        )
    })?;
    info!("Connecting to farm database");
    let adapter = PgAdapter::connect(url).await?;
    Ok(Arc::new(SqlFarmSource::new(Arc::new(adapter))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn sled_store_is_created_on_disk() {
        let dir = tempdir().unwrap();
        let settings = StoreSettings::Sled {
            path: dir.path().join("state"),
        };
        let store = create_store(&settings).await.unwrap();
        assert!(store.recent_runs(5).await.unwrap().is_empty());
        assert!(dir.path().join("state").exists());
    }

    #[tokio::test]
    async fn source_requires_a_url() {
        let settings = EngineSettings::default();
        assert!(matches!(
            create_source(&settings).await,
            Err(BatchError::Initialization(_))
        ));
    }
}
