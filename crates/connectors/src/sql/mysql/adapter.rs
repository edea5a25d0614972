use crate::sql::{
    base::{
        adapter::{DatabaseKind, SqlAdapter},
        error::{BatchError, ConnectorError, DbError},
        metadata::TableStats,
        requests::FetchRowsRequest,
    },
    mysql::row::to_row_data,
};
use async_trait::async_trait;
use model::{core::utils::quote_ident, records::row::RowData};
use mysql_async::{Pool, Row, Value as MyValue, prelude::*};
use tracing::{debug, info};

const QUERY_LIST_TABLES_SQL: &str = "SHOW FULL TABLES WHERE Table_type = 'BASE TABLE'";
const QUERY_AVG_ROW_LENGTH_SQL: &str = "SELECT AVG_ROW_LENGTH FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?";
const QUERY_PRIMARY_KEY_SQL: &str = "SELECT COLUMN_NAME FROM information_schema.KEY_COLUMN_USAGE \
     WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY' \
     ORDER BY ORDINAL_POSITION";

#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
}

impl MySqlAdapter {
    pub async fn connect(url: &str) -> Result<Self, ConnectorError> {
        let pool = Pool::from_url(url)?;
        // fail fast on bad credentials instead of on the first tick
        let conn = pool.get_conn().await?;
        drop(conn);
        info!("Connected to MySQL");
        Ok(MySqlAdapter { pool })
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(QUERY_PRIMARY_KEY_SQL, (table,)).await?;
        rows.iter()
            .map(|row| string_at(row, 0))
            .collect::<Result<Vec<_>, _>>()
    }
}

fn string_at(row: &Row, idx: usize) -> Result<String, DbError> {
    match row.as_ref(idx) {
        Some(MyValue::Bytes(bytes)) => Ok(String::from_utf8_lossy(bytes).into_owned()),
        Some(other) => Err(DbError::UnexpectedResult(format!(
            "expected text at column {idx}, got {other:?}"
        ))),
        None => Err(DbError::UnexpectedResult(format!("missing column {idx}"))),
    }
}

fn u64_at(row: &Row, idx: usize) -> Option<u64> {
    match row.as_ref(idx)? {
        MyValue::Int(v) => u64::try_from(*v).ok(),
        MyValue::UInt(v) => Some(*v),
        MyValue::Bytes(bytes) => std::str::from_utf8(bytes).ok()?.parse().ok(),
        _ => None,
    }
}

#[async_trait]
impl SqlAdapter for MySqlAdapter {
    async fn exec(&self, query: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get_conn().await?;
        conn.query_drop(query).await?;
        Ok(())
    }

    async fn exec_batch(&self, statements: &[String]) -> Result<(), BatchError> {
        // pooled connections are reset on return, so the whole batch shares one
        let mut conn = self.pool.get_conn().await.map_err(|e| BatchError {
            executed: 0,
            source: e.into(),
        })?;
        for (executed, statement) in statements.iter().enumerate() {
            conn.query_drop(statement.as_str())
                .await
                .map_err(|e| BatchError {
                    executed,
                    source: e.into(),
                })?;
        }
        Ok(())
    }

    async fn fetch_rows(&self, request: FetchRowsRequest) -> Result<Vec<RowData>, DbError> {
        let order_by = self
            .primary_key(&request.table)
            .await?
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut sql = format!("SELECT * FROM {}", quote_ident(&request.table));
        if !order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {order_by}"));
        }
        sql.push_str(&format!(" LIMIT {} OFFSET {}", request.limit, request.offset));
        debug!(sql = %sql, "Fetching rows");

        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.query(sql).await?;
        Ok(rows
            .iter()
            .map(|row| to_row_data(&request.table, row))
            .collect())
    }

    async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.query(QUERY_LIST_TABLES_SQL).await?;
        let mut tables = rows
            .iter()
            .map(|row| string_at(row, 0))
            .collect::<Result<Vec<_>, _>>()?;
        tables.sort();
        Ok(tables)
    }

    async fn table_stats(&self, table: &str) -> Result<TableStats, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let count: Option<Row> = conn
            .query_first(format!("SELECT COUNT(*) FROM {}", quote_ident(table)))
            .await?;
        let rows = count.as_ref().and_then(|r| u64_at(r, 0)).unwrap_or(0);

        let avg: Option<Row> = conn.exec_first(QUERY_AVG_ROW_LENGTH_SQL, (table,)).await?;
        let avg_row_bytes = avg.as_ref().and_then(|r| u64_at(r, 0)).unwrap_or(0);

        Ok(TableStats {
            rows,
            avg_row_bytes,
        })
    }

    async fn create_table_statement(&self, table: &str) -> Result<String, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn
            .query_first(format!("SHOW CREATE TABLE {}", quote_ident(table)))
            .await?;
        match row {
            Some(row) => string_at(&row, 1),
            None => Err(DbError::TableNotFound(table.to_string())),
        }
    }

    async fn server_version(&self) -> Result<String, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn.query_first("SELECT VERSION()").await?;
        match row {
            Some(row) => string_at(&row, 0),
            None => Err(DbError::UnexpectedResult("VERSION() returned no row".into())),
        }
    }

    fn escape_string(&self, value: &str) -> Option<String> {
        let quoted = MyValue::Bytes(value.as_bytes().to_vec()).as_sql(false);
        quoted
            .strip_prefix('\'')
            .and_then(|s| s.strip_suffix('\''))
            .map(str::to_string)
    }

    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }
}
