use crate::sql::{
    base::{
        adapter::{DatabaseKind, SqlAdapter},
        error::{ConnectorError, DbError},
        statement::Statement,
    },
    postgres::{params::PgParamStore, row::to_row_data, utils::connect_client},
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::Client;
use tracing::debug;

#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
}

#[async_trait]
impl SqlAdapter for PgAdapter {
    async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let client = Arc::new(RwLock::new(connect_client(url).await?));
        Ok(PgAdapter { client })
    }

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError> {
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        let rows = client.query(sql, &bindings.as_refs()).await?;
        Ok(rows.iter().map(to_row_data).collect())
    }

    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, DbError> {
        let bindings = PgParamStore::from_values(params);
        let client = self.client.read().await;
        Ok(client.execute(sql, &bindings.as_refs()).await?)
    }

    async fn execute_script(&self, sql: &str) -> Result<(), DbError> {
        let client = self.client.read().await;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn execute_in_transaction(&self, statements: Vec<Statement>) -> Result<u64, DbError> {
        // A transaction needs exclusive use of the connection.
        let mut client = self.client.write().await;
        let tx = client.transaction().await?;

        let mut affected = 0;
        for statement in statements {
            debug!(sql = %statement.sql, "Executing statement in transaction");
            let bindings = PgParamStore::from_values(statement.params);
            let rows = tx.execute(statement.sql.as_str(), &bindings.as_refs()).await?;
            if let Some(expected) = statement.expected_rows
                && rows != expected
            {
                // Dropping `tx` rolls the whole transaction back.
                return Err(DbError::Write(format!(
                    "statement affected {rows} rows, expected {expected}: {}",
                    statement.sql
                )));
            }
            affected += rows;
        }

        tx.commit().await?;
        Ok(affected)
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }
}
