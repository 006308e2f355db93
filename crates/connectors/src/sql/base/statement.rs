use model::core::value::Value;

/// A parameterised statement, executed as part of a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
    /// When set, the transaction is rolled back unless exactly this many rows are affected.
    pub expected_rows: Option<u64>,
}

impl Statement {
    pub fn new(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Statement {
            sql: sql.into(),
            params,
            expected_rows: None,
        }
    }

    pub fn expecting(mut self, rows: u64) -> Self {
        self.expected_rows = Some(rows);
        self
    }
}
