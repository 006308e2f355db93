use crate::aggregate::ReferencePrice;
use async_trait::async_trait;
use chrono::NaiveDate;
use connectors::{error::DbError, sql::base::adapter::SqlAdapter};
use model::{
    core::identifiers::FarmId,
    records::{row::RowData, service::ServiceWindow},
    snapshot::{
        ConfigEntry, EventKind, FarmInfo, OutKind, ShipmentRecord, SowRecord, SowState, WorkEvent,
    },
};
use std::sync::Arc;

/// Read side of the farm operational database. Every read needed by the
/// selector, the snapshot loader and the orchestrator goes through here.
#[async_trait]
pub trait FarmSource: Send + Sync {
    async fn service_windows(&self) -> Result<Vec<ServiceWindow>, DbError>;

    /// `None` when the farm no longer exists.
    async fn farm_info(&self, farm: FarmId) -> Result<Option<FarmInfo>, DbError>;

    async fn config(&self, farm: FarmId) -> Result<Vec<ConfigEntry>, DbError>;

    async fn sows(&self, farm: FarmId) -> Result<Vec<SowRecord>, DbError>;

    async fn events(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkEvent>, DbError>;

    async fn shipments(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ShipmentRecord>, DbError>;

    async fn reference_prices(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReferencePrice>, DbError>;
}

const SERVICE_WINDOWS_SQL: &str = "\
SELECT s.farm_no, s.reg_dt, s.start_dt, s.end_dt, s.stop_dt,
       s.service_yn, (s.use_yn = 'Y' AND f.use_yn = 'Y') AS active
  FROM farm_service s
  JOIN farm f ON f.farm_no = s.farm_no
 ORDER BY s.farm_no, s.reg_dt";

const FARM_SQL: &str = "\
SELECT farm_no, farm_nm, owner_nm, region_cd, locale
  FROM farm
 WHERE farm_no = $1";

const CONFIG_SQL: &str = "\
SELECT code, value
  FROM farm_config
 WHERE farm_no = $1
 ORDER BY code";

const SOWS_SQL: &str = "\
SELECT pig_no, parity, status_cd, status_dt, out_dt, out_gubun_cd, out_reason_cd
  FROM sow
 WHERE farm_no = $1
 ORDER BY pig_no";

const EVENTS_SQL: &str = "\
SELECT pig_no, wk_gubun, wk_dt, parity, live_cnt, dead_cnt, mummy_cnt, weaned_cnt, reason_cd
  FROM sow_work
 WHERE farm_no = $1 AND wk_dt BETWEEN $2 AND $3 AND use_yn = 'Y'
 ORDER BY wk_dt, pig_no";

const SHIPMENTS_SQL: &str = "\
SELECT ship_dt, carcass_kg, backfat_mm, grade, price_per_kg
  FROM shipment
 WHERE farm_no = $1 AND ship_dt BETWEEN $2 AND $3
 ORDER BY ship_dt";

const REFERENCE_PRICES_SQL: &str = "\
SELECT head_count, price_per_kg
  FROM auction_price
 WHERE auction_dt BETWEEN $1 AND $2";

/// `FarmSource` over the relational farm database.
pub struct SqlFarmSource {
    adapter: Arc<dyn SqlAdapter>,
}

impl SqlFarmSource {
    pub fn new(adapter: Arc<dyn SqlAdapter>) -> Self {
        SqlFarmSource { adapter }
    }
}

#[async_trait]
impl FarmSource for SqlFarmSource {
    async fn service_windows(&self) -> Result<Vec<ServiceWindow>, DbError> {
        let rows = self.adapter.query(SERVICE_WINDOWS_SQL, vec![]).await?;
        rows.iter().map(decode_window).collect()
    }

    async fn farm_info(&self, farm: FarmId) -> Result<Option<FarmInfo>, DbError> {
        let rows = self.adapter.query(FARM_SQL, vec![farm.get().into()]).await?;
        rows.first().map(decode_farm).transpose()
    }

    async fn config(&self, farm: FarmId) -> Result<Vec<ConfigEntry>, DbError> {
        let rows = self.adapter.query(CONFIG_SQL, vec![farm.get().into()]).await?;
        rows.iter()
            .map(|row| {
                Ok(ConfigEntry {
                    code: required_string(row, "code")?,
                    value: row.get_string("value").unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn sows(&self, farm: FarmId) -> Result<Vec<SowRecord>, DbError> {
        let rows = self.adapter.query(SOWS_SQL, vec![farm.get().into()]).await?;
        rows.iter().map(decode_sow).collect()
    }

    async fn events(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WorkEvent>, DbError> {
        let rows = self
            .adapter
            .query(EVENTS_SQL, vec![farm.get().into(), from.into(), to.into()])
            .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in &rows {
            // Work codes outside the four tracked kinds (moves, vaccinations) are skipped.
            if let Some(event) = decode_event(row)? {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn shipments(
        &self,
        farm: FarmId,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ShipmentRecord>, DbError> {
        let rows = self
            .adapter
            .query(SHIPMENTS_SQL, vec![farm.get().into(), from.into(), to.into()])
            .await?;
        rows.iter()
            .map(|row| {
                Ok(ShipmentRecord {
                    date: required_date(row, "ship_dt")?,
                    carcass_kg: row.get_f64("carcass_kg").unwrap_or(0.0),
                    backfat_mm: row.get_f64("backfat_mm"),
                    grade: row.get_string("grade"),
                    price_per_kg: row.get_f64("price_per_kg"),
                })
            })
            .collect()
    }

    async fn reference_prices(
        &self,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReferencePrice>, DbError> {
        let rows = self
            .adapter
            .query(REFERENCE_PRICES_SQL, vec![from.into(), to.into()])
            .await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ReferencePrice {
                    head_count: row.get_i64("head_count")?,
                    price_per_kg: row.get_f64("price_per_kg")?,
                })
            })
            .collect())
    }
}

fn decode_window(row: &RowData) -> Result<ServiceWindow, DbError> {
    Ok(ServiceWindow {
        farm_id: FarmId(required_i64(row, "farm_no")?),
        registered_on: row.get_date("reg_dt"),
        start: row.get_date("start_dt"),
        end: row.get_date("end_dt"),
        stop: row.get_date("stop_dt"),
        service_enabled: row.get_bool("service_yn").unwrap_or(false),
        record_active: row.get_bool("active").unwrap_or(false),
    })
}

fn decode_farm(row: &RowData) -> Result<FarmInfo, DbError> {
    Ok(FarmInfo {
        farm_id: FarmId(required_i64(row, "farm_no")?),
        name: row.get_string("farm_nm").unwrap_or_default(),
        owner: row.get_string("owner_nm"),
        region_code: row.get_string("region_cd"),
        locale: row.get_string("locale").unwrap_or_else(|| "ko".to_string()),
    })
}

fn decode_sow(row: &RowData) -> Result<SowRecord, DbError> {
    let raw_state = required_string(row, "status_cd")?;
    let state = SowState::parse(&raw_state).ok_or_else(|| DbError::Decode {
        column: "status_cd".to_string(),
        message: format!("unknown sow state '{raw_state}'"),
    })?;

    Ok(SowRecord {
        pig_no: required_string(row, "pig_no")?,
        parity: row.get_i64("parity").unwrap_or(0).max(0) as u32,
        state,
        state_since: row.get_date("status_dt"),
        out_on: row.get_date("out_dt"),
        out_kind: row
            .get_string("out_gubun_cd")
            .as_deref()
            .and_then(OutKind::parse),
        out_reason: row.get_string("out_reason_cd"),
    })
}

fn decode_event(row: &RowData) -> Result<Option<WorkEvent>, DbError> {
    let Some(kind) = row.get_string("wk_gubun").as_deref().and_then(EventKind::parse) else {
        return Ok(None);
    };

    Ok(Some(WorkEvent {
        pig_no: required_string(row, "pig_no")?,
        kind,
        date: required_date(row, "wk_dt")?,
        parity: count(row, "parity"),
        live: count(row, "live_cnt"),
        dead: count(row, "dead_cnt"),
        mummy: count(row, "mummy_cnt"),
        weaned: count(row, "weaned_cnt"),
        reason: row.get_string("reason_cd"),
    }))
}

fn count(row: &RowData, column: &str) -> u32 {
    row.get_i64(column).unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32
}

fn missing(column: &str) -> DbError {
    DbError::Decode {
        column: column.to_string(),
        message: "missing value".to_string(),
    }
}

fn required_i64(row: &RowData, column: &str) -> Result<i64, DbError> {
    row.get_i64(column).ok_or_else(|| missing(column))
}

fn required_string(row: &RowData, column: &str) -> Result<String, DbError> {
    row.get_string(column).ok_or_else(|| missing(column))
}

fn required_date(row: &RowData, column: &str) -> Result<NaiveDate, DbError> {
    row.get_date(column).ok_or_else(|| missing(column))
}

#[cfg(test)]
mod tests {
    use super::*;
    use connectors::sql::base::{
        adapter::DatabaseKind,
        error::ConnectorError,
        statement::Statement,
    };
    use model::core::value::Value;
    use std::sync::Mutex;

    /// Returns canned rows and remembers the parameters it was called with.
    struct CannedAdapter {
        rows: Vec<RowData>,
        calls: Mutex<Vec<Vec<Value>>>,
    }

    #[async_trait]
    impl SqlAdapter for CannedAdapter {
        async fn connect(_url: &str) -> Result<Self, ConnectorError> {
            Ok(CannedAdapter {
                rows: vec![],
                calls: Mutex::new(vec![]),
            })
        }

        async fn query(&self, _sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
            self.calls.lock().unwrap().push(params);
            Ok(self.rows.clone())
        }

        async fn execute(&self, _sql: &str, _params: Vec<Value>) -> Result<u64, DbError> {
            Ok(0)
        }

        async fn execute_script(&self, _sql: &str) -> Result<(), DbError> {
            Ok(())
        }

        async fn execute_in_transaction(&self, _statements: Vec<Statement>) -> Result<u64, DbError> {
            Ok(0)
        }

        fn kind(&self) -> DatabaseKind {
            DatabaseKind::Other("canned".into())
        }
    }

    fn source(rows: Vec<RowData>) -> (SqlFarmSource, Arc<CannedAdapter>) {
        let adapter = Arc::new(CannedAdapter {
            rows,
            calls: Mutex::new(vec![]),
        });
        (SqlFarmSource::new(adapter.clone()), adapter)
    }

    #[tokio::test]
    async fn decodes_legacy_work_codes_and_skips_others() {
        let rows = vec![
            RowData::from_pairs([
                ("pig_no", Value::from("P1")),
                ("wk_gubun", Value::from("G")),
                ("wk_dt", Value::from("20250610")),
                ("parity", Value::from(2i64)),
            ]),
            RowData::from_pairs([
                ("pig_no", Value::from("P1")),
                ("wk_gubun", Value::from("Z")),
                ("wk_dt", Value::from("20250611")),
            ]),
        ];
        let (source, adapter) = source(rows);
        let from = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        let to = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();

        let events = source.events(FarmId(7), from, to).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Mating);
        assert_eq!(events[0].parity, 2);
        assert_eq!(
            adapter.calls.lock().unwrap()[0],
            vec![Value::Int(7), Value::Date(from), Value::Date(to)]
        );
    }

    #[tokio::test]
    async fn unknown_farm_is_none() {
        let (source, _) = source(vec![]);
        assert!(source.farm_info(FarmId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn windows_read_yes_no_flags() {
        let rows = vec![RowData::from_pairs([
            ("farm_no", Value::from(12i64)),
            ("start_dt", Value::from("2025-01-01")),
            ("end_dt", Value::from("2025-12-31")),
            ("stop_dt", Value::Null),
            ("service_yn", Value::from("Y")),
            ("active", Value::from(true)),
        ])];
        let (source, _) = source(rows);
        let windows = source.service_windows().await.unwrap();
        assert_eq!(windows[0].farm_id, FarmId(12));
        assert!(windows[0].service_enabled && windows[0].record_active);
        assert_eq!(windows[0].stop, None);
    }

    #[tokio::test]
    async fn sow_with_unknown_state_is_a_decode_error() {
        let rows = vec![RowData::from_pairs([
            ("pig_no", Value::from("P9")),
            ("status_cd", Value::from("flying")),
        ])];
        let (source, _) = source(rows);
        let err = source.sows(FarmId(1)).await.unwrap_err();
        assert!(matches!(err, DbError::Decode { ref column, .. } if column == "status_cd"));
    }
}
