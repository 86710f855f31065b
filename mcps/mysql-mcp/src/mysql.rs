//! MySQL implementation of the database seam, on a bounded sqlx pool

use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures_util::TryStreamExt;
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlPool, MySqlPoolOptions,
    MySqlRow, MySqlSslMode,
};
use sqlx::query::Query;
use sqlx::{Column, Decode, Executor, Row, Transaction, Type, TypeInfo};

use crate::config::{DatabaseConfig, SslMode};
use crate::db::{Database, DbRow, FetchMode, RawResult, SqlParam, SqlValue, TxConnection};
use crate::error::DriverError;

pub struct MySqlDatabase {
    pool: MySqlPool,
}

impl MySqlDatabase {
    /// Open the pool and verify it with a round trip
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DriverError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect_with(connect_options(config))
            .await?;

        let db = Self { pool };
        db.ping().await?;
        Ok(db)
    }

    /// [`connect`](Self::connect), retried `attempts` times with `delay` between tries
    pub async fn connect_with_retry(
        config: &DatabaseConfig,
        attempts: u32,
        delay: Duration,
    ) -> Result<Self, DriverError> {
        let mut attempt = 1;
        loop {
            match Self::connect(config).await {
                Ok(db) => {
                    tracing::info!(
                        host = %config.host,
                        port = config.port,
                        database = %config.database,
                        pool_size = config.pool_size,
                        "Connected to MySQL"
                    );
                    return Ok(db);
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "MySQL connection attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn connect_options(config: &DatabaseConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .charset(&config.charset)
        .ssl_mode(ssl_mode(config.ssl_mode));

    if !config.database.is_empty() {
        options = options.database(&config.database);
    }
    if let Some(ca) = &config.ssl_ca {
        options = options.ssl_ca(ca);
    }
    options
}

fn ssl_mode(mode: SslMode) -> MySqlSslMode {
    match mode {
        SslMode::Disabled => MySqlSslMode::Disabled,
        SslMode::Preferred => MySqlSslMode::Preferred,
        SslMode::Required => MySqlSslMode::Required,
        SslMode::VerifyCa => MySqlSslMode::VerifyCa,
        SslMode::VerifyIdentity => MySqlSslMode::VerifyIdentity,
    }
}

#[async_trait]
impl Database for MySqlDatabase {
    async fn execute(
        &self,
        sql: &str,
        params: &[SqlParam],
        mode: FetchMode,
    ) -> Result<RawResult, DriverError> {
        let mut conn = self.pool.acquire().await?;
        run(&mut conn, sql, params, mode).await
    }

    async fn begin(&self) -> Result<Box<dyn TxConnection>, DriverError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(MySqlTx { tx }))
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct MySqlTx {
    tx: Transaction<'static, MySql>,
}

#[async_trait]
impl TxConnection for MySqlTx {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlParam],
        mode: FetchMode,
    ) -> Result<RawResult, DriverError> {
        run(&mut self.tx, sql, params, mode).await
    }

    async fn commit(self: Box<Self>) -> Result<(), DriverError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DriverError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

// ============================================================================
// Statement execution
// ============================================================================

async fn run(
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[SqlParam],
    mode: FetchMode,
) -> Result<RawResult, DriverError> {
    match mode {
        FetchMode::None | FetchMode::CursorInfo => {
            // a bare &str has no arguments and is sent over the text protocol
            let done = if params.is_empty() {
                conn.execute(sql).await?
            } else {
                bind_all(sqlx::query(sql), params).execute(&mut *conn).await?
            };
            Ok(RawResult::affected(done.rows_affected(), done.last_insert_id()))
        }
        FetchMode::One | FetchMode::All | FetchMode::Many(_) => {
            let cap = match mode {
                FetchMode::One => 1,
                FetchMode::Many(n) => n,
                _ => usize::MAX,
            };
            let mut stream = if params.is_empty() {
                (&mut *conn).fetch(sql)
            } else {
                bind_all(sqlx::query(sql), params).fetch(&mut *conn)
            };

            // rows past the cap are never decoded; sqlx drains them before
            // the connection's next statement
            let mut rows = Vec::new();
            while rows.len() < cap {
                match stream.try_next().await? {
                    Some(row) => rows.push(decode_row(&row)),
                    None => break,
                }
            }
            Ok(RawResult::rows(rows))
        }
    }
}

fn bind_all<'q>(
    mut query: Query<'q, MySql, MySqlArguments>,
    params: &'q [SqlParam],
) -> Query<'q, MySql, MySqlArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(b) => query.bind(*b),
            SqlParam::Int(i) => query.bind(*i),
            SqlParam::UInt(u) => query.bind(*u),
            SqlParam::Float(f) => query.bind(*f),
            SqlParam::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

// ============================================================================
// Row decoding
// ============================================================================

fn decode_row(row: &MySqlRow) -> DbRow {
    let columns = row
        .columns()
        .iter()
        .map(|col| {
            let value = decode_cell(row, col.ordinal(), col.type_info().name());
            (col.name().to_string(), value)
        })
        .collect();
    DbRow { columns }
}

fn get<'r, T>(row: &'r MySqlRow, idx: usize) -> Result<Option<T>, sqlx::Error>
where
    T: Decode<'r, MySql> + Type<MySql>,
{
    row.try_get::<Option<T>, _>(idx)
}

fn decode_cell(row: &MySqlRow, idx: usize, type_name: &str) -> SqlValue {
    let decoded = match type_name {
        "NULL" => Ok(None),
        "BOOLEAN" => get::<bool>(row, idx).map(|v| v.map(SqlValue::Bool)),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
            get::<i64>(row, idx).map(|v| v.map(SqlValue::Int))
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => get::<u64>(row, idx).map(|v| v.map(SqlValue::UInt)),
        "FLOAT" => get::<f32>(row, idx).map(|v| v.map(|f| SqlValue::Float(f64::from(f)))),
        "DOUBLE" => get::<f64>(row, idx).map(|v| v.map(SqlValue::Float)),
        "DECIMAL" => get::<BigDecimal>(row, idx).map(|v| v.map(SqlValue::Decimal)),
        "DATE" => get::<NaiveDate>(row, idx).map(|v| v.map(SqlValue::Date)),
        "TIME" => get::<NaiveTime>(row, idx).map(|v| v.map(SqlValue::Time)),
        "DATETIME" => get::<NaiveDateTime>(row, idx).map(|v| v.map(SqlValue::DateTime)),
        "TIMESTAMP" => get::<DateTime<Utc>>(row, idx).map(|v| v.map(SqlValue::Timestamp)),
        "JSON" => get::<serde_json::Value>(row, idx).map(|v| v.map(SqlValue::Json)),
        "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
        | "GEOMETRY" => get::<Vec<u8>>(row, idx).map(|v| v.map(SqlValue::Bytes)),
        _ => get::<String>(row, idx).map(|v| v.map(SqlValue::Text)),
    };

    match decoded {
        Ok(Some(value)) => value,
        Ok(None) => SqlValue::Null,
        // types sqlx cannot map (negative TIME, YEAR, ...) fall back to raw bytes
        Err(e) => match row.try_get_unchecked::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(bytes)) => SqlValue::Bytes(bytes),
            Ok(None) => SqlValue::Null,
            Err(_) => {
                tracing::debug!(column = idx, type_name, error = %e, "Undecodable column");
                SqlValue::Null
            }
        },
    }
}
