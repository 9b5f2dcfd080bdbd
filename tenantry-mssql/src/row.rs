//! Microsoft SQL Server row access.

use tiberius::Row;

use crate::error::{MssqlError, MssqlResult};

/// Extension trait for SQL Server rows.
pub trait MssqlRow {
    /// Get a non-null column value by name.
    fn get_value<'a, T>(&'a self, column: &str) -> MssqlResult<T>
    where
        T: tiberius::FromSql<'a>;

    /// Get an optional column value by name.
    fn get_opt<'a, T>(&'a self, column: &str) -> MssqlResult<Option<T>>
    where
        T: tiberius::FromSql<'a>;
}

impl MssqlRow for Row {
    fn get_value<'a, T>(&'a self, column: &str) -> MssqlResult<T>
    where
        T: tiberius::FromSql<'a>,
    {
        self.get_opt(column)?
            .ok_or_else(|| MssqlError::deserialization(format!("column '{}' is null", column)))
    }

    fn get_opt<'a, T>(&'a self, column: &str) -> MssqlResult<Option<T>>
    where
        T: tiberius::FromSql<'a>,
    {
        self.try_get(column).map_err(|e| {
            MssqlError::deserialization(format!("failed to get column '{}': {}", column, e))
        })
    }
}

/// Trait for deserializing a SQL Server row into a type.
pub trait FromMssqlRow: Sized {
    /// Deserialize from a SQL Server row.
    fn from_row(row: &Row) -> MssqlResult<Self>;
}
