//! PostgreSQL backend using `tokio-postgres` and `deadpool-postgres`.
//!
//! [`PostgresBackend`] implements the pipeline's
//! [`DbExecutor`](graphfetch_db::executor::DbExecutor) trait over a pooled
//! connection. Connections are checked out per statement and returned in
//! auto-commit mode, so the backend itself never reports an active
//! transaction; callers that need one wrap the backend in a
//! [`TransactionManager`](graphfetch_db::transactions::TransactionManager).

use graphfetch_core::{FetchError, FetchResult};
use graphfetch_db::executor::DbExecutor;
use graphfetch_db::value::{Row, Value};

use crate::base::DatabaseConfig;

/// A PostgreSQL database backend.
///
/// Uses `deadpool-postgres` for connection pooling and `tokio-postgres` for
/// statement execution.
pub struct PostgresBackend {
    pool: deadpool_postgres::Pool,
}

impl PostgresBackend {
    /// Creates a new backend from an existing pool.
    pub const fn new(pool: deadpool_postgres::Pool) -> Self {
        Self { pool }
    }

    /// Creates a new backend from a [`DatabaseConfig`].
    ///
    /// # Errors
    ///
    /// Returns `OperationalError` if the pool cannot be created.
    pub fn from_config(config: &DatabaseConfig) -> FetchResult<Self> {
        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.dbname = Some(config.name.clone());
        pg_config.host = Some(config.host.clone());
        pg_config.port = Some(config.port);
        pg_config.user = Some(config.user.clone());
        pg_config.password = Some(config.password.clone());

        let pool = pg_config
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| FetchError::OperationalError(format!("Failed to create pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn client(&self) -> FetchResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| FetchError::OperationalError(format!("Pool error: {e}")))
    }

    /// Converts pipeline `Value` parameters to `tokio-postgres` references.
    fn value_to_sql_params(
        params: &[Value],
    ) -> Vec<Box<dyn tokio_postgres::types::ToSql + Sync + Send>> {
        params
            .iter()
            .map(|v| -> Box<dyn tokio_postgres::types::ToSql + Sync + Send> {
                match v {
                    Value::Null => Box::new(Option::<String>::None),
                    Value::Bool(b) => Box::new(*b),
                    Value::Int(i) => Box::new(*i),
                    Value::Float(f) => Box::new(*f),
                    Value::String(s) => Box::new(s.clone()),
                    Value::Bytes(b) => Box::new(b.clone()),
                    Value::Date(d) => Box::new(*d),
                    Value::DateTime(dt) => Box::new(*dt),
                    Value::DateTimeTz(dt) => Box::new(*dt),
                    Value::Time(t) => Box::new(*t),
                    Value::Uuid(u) => Box::new(*u),
                    Value::Json(j) => Box::new(j.clone()),
                }
            })
            .collect()
    }

    /// Converts a `tokio_postgres::Row` to the pipeline's generic `Row`.
    fn convert_row(pg_row: &tokio_postgres::Row) -> Row {
        let columns: Vec<String> = pg_row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let values: Vec<Value> = pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| {
                use tokio_postgres::types::Type;
                let ty = col.type_();
                if *ty == Type::BOOL {
                    pg_row
                        .try_get::<_, Option<bool>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Bool)
                } else if *ty == Type::INT2 {
                    pg_row
                        .try_get::<_, Option<i16>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, |v| Value::Int(i64::from(v)))
                } else if *ty == Type::INT4 {
                    pg_row
                        .try_get::<_, Option<i32>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, |v| Value::Int(i64::from(v)))
                } else if *ty == Type::INT8 {
                    pg_row
                        .try_get::<_, Option<i64>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Int)
                } else if *ty == Type::FLOAT4 {
                    pg_row
                        .try_get::<_, Option<f32>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, |v| Value::Float(f64::from(v)))
                } else if *ty == Type::FLOAT8 {
                    pg_row
                        .try_get::<_, Option<f64>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Float)
                } else if *ty == Type::BYTEA {
                    pg_row
                        .try_get::<_, Option<Vec<u8>>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Bytes)
                } else if *ty == Type::UUID {
                    pg_row
                        .try_get::<_, Option<uuid::Uuid>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Uuid)
                } else if *ty == Type::DATE {
                    pg_row
                        .try_get::<_, Option<chrono::NaiveDate>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Date)
                } else if *ty == Type::TIMESTAMP {
                    pg_row
                        .try_get::<_, Option<chrono::NaiveDateTime>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::DateTime)
                } else if *ty == Type::TIMESTAMPTZ {
                    pg_row
                        .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::DateTimeTz)
                } else if *ty == Type::TIME {
                    pg_row
                        .try_get::<_, Option<chrono::NaiveTime>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Time)
                } else if *ty == Type::JSON || *ty == Type::JSONB {
                    pg_row
                        .try_get::<_, Option<serde_json::Value>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::Json)
                } else {
                    // TEXT, VARCHAR, and anything unrecognized fall back to
                    // string representation.
                    pg_row
                        .try_get::<_, Option<String>>(i)
                        .ok()
                        .flatten()
                        .map_or(Value::Null, Value::String)
                }
            })
            .collect();

        Row::new(columns, values)
    }
}

#[async_trait::async_trait]
impl DbExecutor for PostgresBackend {
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> FetchResult<u64> {
        let client = self.client().await?;
        let sql_params = Self::value_to_sql_params(params);
        let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = sql_params
            .iter()
            .map(|p| p.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();

        client
            .execute(sql, &param_refs)
            .await
            .map_err(|e| FetchError::DatabaseError(format!("{e}")))
    }

    async fn query(&self, sql: &str, params: &[Value]) -> FetchResult<Vec<Row>> {
        let client = self.client().await?;
        let sql_params = Self::value_to_sql_params(params);
        let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = sql_params
            .iter()
            .map(|p| p.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();

        let rows = client
            .query(sql, &param_refs)
            .await
            .map_err(|e| FetchError::DatabaseError(format!("{e}")))?;

        Ok(rows.iter().map(Self::convert_row).collect())
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> FetchResult<Row> {
        let rows = self.query(sql, params).await?;
        match rows.len() {
            1 => Ok(rows.into_iter().next().ok_or_else(|| {
                FetchError::ImplementationError("row vanished after length check".to_string())
            })?),
            n => Err(FetchError::DatabaseError(format!(
                "Expected exactly 1 row, got {n}"
            ))),
        }
    }
}
