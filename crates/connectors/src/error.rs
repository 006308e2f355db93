pub use crate::sql::base::error::{ConnectorError, DbError};
