use crate::sql::base::{
    error::{ConnectorError, DbError},
    statement::Statement,
};
use async_trait::async_trait;
use model::{core::value::Value, records::row::RowData};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseKind {
    Postgres,
    Other(String),
}

/// Data-access interface used by the snapshot loader, the farm source and
/// the SQL report store.
#[async_trait]
pub trait SqlAdapter: Send + Sync {
    async fn connect(url: &str) -> Result<Self, ConnectorError>
    where
        Self: Sized;

    async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Vec<RowData>, DbError>;

    /// Returns the number of affected rows.
    async fn execute(&self, sql: &str, params: Vec<Value>) -> Result<u64, DbError>;

    /// Runs a parameterless script (schema setup).
    async fn execute_script(&self, sql: &str) -> Result<(), DbError>;

    /// Runs every statement in one transaction; nothing is applied unless all succeed.
    async fn execute_in_transaction(&self, statements: Vec<Statement>) -> Result<u64, DbError>;

    fn kind(&self) -> DatabaseKind;
}
