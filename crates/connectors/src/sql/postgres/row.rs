use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::{
    core::value::Value,
    records::row::{FieldValue, RowData},
};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tokio_postgres::{Row as PgRow, types::Type};
use tracing::warn;

pub(crate) fn to_row_data(row: &PgRow) -> RowData {
    let field_values = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| FieldValue {
            name: column.name().to_string(),
            value: column_value(row, idx, column.type_()),
        })
        .collect();

    RowData::new(field_values)
}

fn column_value(row: &PgRow, idx: usize, ty: &Type) -> Value {
    let value = match *ty {
        Type::INT2 => get::<i16>(row, idx).map(|v| Value::Int(i64::from(v))),
        Type::INT4 => get::<i32>(row, idx).map(|v| Value::Int(i64::from(v))),
        Type::INT8 => get::<i64>(row, idx).map(Value::Int),
        Type::FLOAT4 => get::<f32>(row, idx).map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => get::<f64>(row, idx).map(Value::Float),
        Type::NUMERIC => get::<Decimal>(row, idx).and_then(|v| v.to_f64()).map(Value::Float),
        Type::BOOL => get::<bool>(row, idx).map(Value::Boolean),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            get::<String>(row, idx).map(Value::String)
        }
        Type::DATE => get::<NaiveDate>(row, idx).map(Value::Date),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx).map(Value::Timestamp),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx).map(|v| Value::Timestamp(v.and_utc())),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx).map(Value::Json),
        _ => {
            warn!(column = idx, ty = %ty, "Unsupported column type, reading as text");
            get::<String>(row, idx).map(Value::String)
        }
    };

    value.unwrap_or(Value::Null)
}

fn get<'a, T>(row: &'a PgRow, idx: usize) -> Option<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<T>>(idx).ok().flatten()
}
