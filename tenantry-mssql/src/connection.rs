//! Microsoft SQL Server connection wrapper.

use bb8::PooledConnection;
use bb8_tiberius::ConnectionManager;
use tiberius::{Row, ToSql};
use tracing::debug;

use crate::error::{MssqlError, MssqlResult};

/// A pooled SQL Server connection, returned to its pool on drop.
pub struct MssqlConnection {
    client: PooledConnection<'static, ConnectionManager>,
}

impl MssqlConnection {
    pub(crate) fn new(client: PooledConnection<'static, ConnectionManager>) -> Self {
        Self { client }
    }

    /// Execute a query and return all rows.
    pub async fn query(&mut self, sql: &str, params: &[&dyn ToSql]) -> MssqlResult<Vec<Row>> {
        debug!(sql = %sql, "Executing query");

        let stream = self.client.query(sql, params).await?;
        let rows = stream.into_first_result().await?;
        Ok(rows)
    }

    /// Execute a query and return exactly one row.
    pub async fn query_one(&mut self, sql: &str, params: &[&dyn ToSql]) -> MssqlResult<Row> {
        self.query_opt(sql, params)
            .await?
            .ok_or_else(|| MssqlError::query("query returned no rows"))
    }

    /// Execute a query and return zero or one row.
    pub async fn query_opt(
        &mut self,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> MssqlResult<Option<Row>> {
        let stream = self.client.query(sql, params).await?;
        Ok(stream.into_row().await?)
    }

    /// Execute a statement and return the number of affected rows.
    pub async fn execute(&mut self, sql: &str, params: &[&dyn ToSql]) -> MssqlResult<u64> {
        debug!(sql = %sql, "Executing statement");

        let result = self.client.execute(sql, params).await?;
        Ok(result.total())
    }

    /// Execute a batch of statements without parameters.
    pub async fn batch_execute(&mut self, sql: &str) -> MssqlResult<()> {
        debug!("Executing batch");
        self.client.simple_query(sql).await?.into_results().await?;
        Ok(())
    }

    /// Round-trip `SELECT 1`.
    pub async fn ping(&mut self) -> MssqlResult<()> {
        self.client.simple_query("SELECT 1").await?.into_results().await?;
        Ok(())
    }
}
