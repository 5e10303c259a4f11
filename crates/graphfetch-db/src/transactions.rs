//! Transaction support for the fetch pipeline.
//!
//! The pipeline needs transactions in two places: large fetches (more than
//! one batch) are wrapped so the fallback path stays serialized with any
//! concurrent function creation, and relation removal runs under
//! `REPEATABLE READ`. The [`TransactionManager`] wraps a
//! [`DbExecutor`](crate::executor::DbExecutor) and reports
//! `in_transaction()` to everything executed through it, which is what
//! suppresses `CREATE FUNCTION` inside transactions.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use graphfetch_core::{FetchError, FetchResult};

use crate::executor::DbExecutor;
use crate::value::{Row, Value};

/// Transaction isolation levels supported on PostgreSQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// READ COMMITTED - the PostgreSQL default.
    ReadCommitted,
    /// REPEATABLE READ - prevents non-repeatable reads.
    RepeatableRead,
    /// SERIALIZABLE - strictest isolation level.
    Serializable,
}

impl IsolationLevel {
    /// Returns the SQL syntax for this isolation level.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::RepeatableRead => "REPEATABLE READ",
            Self::Serializable => "SERIALIZABLE",
        }
    }

    /// Returns the full SET TRANSACTION statement.
    pub fn set_sql(&self) -> String {
        format!("SET TRANSACTION ISOLATION LEVEL {}", self.as_sql())
    }
}

/// Manages transaction state for a database connection.
///
/// Wraps a `DbExecutor` and tracks whether a transaction is open. The
/// wrapped executor is exposed through the manager's own `DbExecutor`
/// implementation, so pipeline code runs unchanged inside or outside a
/// transaction.
pub struct TransactionManager<'a> {
    /// The underlying database executor.
    db: &'a dyn DbExecutor,
    /// 0 = no transaction, 1 = transaction open.
    depth: AtomicU32,
}

impl<'a> TransactionManager<'a> {
    /// Creates a new transaction manager for the given executor.
    pub const fn new(db: &'a dyn DbExecutor) -> Self {
        Self {
            db,
            depth: AtomicU32::new(0),
        }
    }

    /// Returns `true` while a transaction is open.
    pub fn is_open(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }

    /// Begins a new transaction.
    ///
    /// # Errors
    ///
    /// `DatabaseError` if a transaction is already open on this manager or
    /// on the wrapped executor.
    pub async fn begin(&self) -> FetchResult<()> {
        if self.is_open() || self.db.in_transaction() {
            return Err(FetchError::DatabaseError(
                "cannot begin: a transaction is already active".to_string(),
            ));
        }
        self.db.execute_sql("BEGIN", &[]).await?;
        self.depth.store(1, Ordering::Release);
        Ok(())
    }

    /// Begins a transaction with a specific isolation level.
    pub async fn begin_with_isolation(&self, level: IsolationLevel) -> FetchResult<()> {
        self.begin().await?;
        self.db.execute_sql(&level.set_sql(), &[]).await?;
        Ok(())
    }

    /// Commits the open transaction.
    pub async fn commit(&self) -> FetchResult<()> {
        if !self.is_open() {
            return Err(FetchError::DatabaseError(
                "cannot commit: not in a transaction".to_string(),
            ));
        }
        self.db.execute_sql("COMMIT", &[]).await?;
        self.depth.store(0, Ordering::Release);
        Ok(())
    }

    /// Rolls back the open transaction.
    pub async fn rollback(&self) -> FetchResult<()> {
        if !self.is_open() {
            return Err(FetchError::DatabaseError(
                "cannot rollback: not in a transaction".to_string(),
            ));
        }
        self.db.execute_sql("ROLLBACK", &[]).await?;
        self.depth.store(0, Ordering::Release);
        Ok(())
    }
}

#[async_trait::async_trait]
impl DbExecutor for TransactionManager<'_> {
    async fn execute_sql(&self, sql: &str, params: &[Value]) -> FetchResult<u64> {
        self.db.execute_sql(sql, params).await
    }

    async fn query(&self, sql: &str, params: &[Value]) -> FetchResult<Vec<Row>> {
        self.db.query(sql, params).await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> FetchResult<Row> {
        self.db.query_one(sql, params).await
    }

    fn in_transaction(&self) -> bool {
        self.is_open() || self.db.in_transaction()
    }
}

/// Executes a closure within a database transaction.
///
/// If the closure returns `Ok`, the transaction is committed. If it returns
/// `Err`, the transaction is rolled back and the original error returned.
pub async fn atomic<'a, F, Fut, T>(db: &'a dyn DbExecutor, f: F) -> FetchResult<T>
where
    F: FnOnce(Arc<TransactionManager<'a>>) -> Fut,
    Fut: std::future::Future<Output = FetchResult<T>>,
{
    let txn = Arc::new(TransactionManager::new(db));
    txn.begin().await?;

    match f(Arc::clone(&txn)).await {
        Ok(result) => {
            txn.commit().await?;
            Ok(result)
        }
        Err(e) => {
            // Attempt to rollback; if rollback fails, return the original error.
            let _ = txn.rollback().await;
            Err(e)
        }
    }
}

/// Like [`atomic`], but begins the transaction at the given isolation level.
pub async fn atomic_with_isolation<'a, F, Fut, T>(
    db: &'a dyn DbExecutor,
    level: IsolationLevel,
    f: F,
) -> FetchResult<T>
where
    F: FnOnce(Arc<TransactionManager<'a>>) -> Fut,
    Fut: std::future::Future<Output = FetchResult<T>>,
{
    let txn = Arc::new(TransactionManager::new(db));
    txn.begin_with_isolation(level).await?;

    match f(Arc::clone(&txn)).await {
        Ok(result) => {
            txn.commit().await?;
            Ok(result)
        }
        Err(e) => {
            let _ = txn.rollback().await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal executor that records every statement it sees.
    struct LoggingDb {
        log: Mutex<Vec<String>>,
    }

    impl LoggingDb {
        fn new() -> Self {
            Self {
                log: Mutex::new(Vec::new()),
            }
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl DbExecutor for LoggingDb {
        async fn execute_sql(&self, sql: &str, _params: &[Value]) -> FetchResult<u64> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(0)
        }

        async fn query(&self, sql: &str, _params: &[Value]) -> FetchResult<Vec<Row>> {
            self.log.lock().unwrap().push(sql.to_string());
            Ok(Vec::new())
        }

        async fn query_one(&self, sql: &str, _params: &[Value]) -> FetchResult<Row> {
            self.log.lock().unwrap().push(sql.to_string());
            Err(FetchError::DatabaseError("no rows".to_string()))
        }
    }

    #[test]
    fn test_isolation_sql() {
        assert_eq!(IsolationLevel::RepeatableRead.as_sql(), "REPEATABLE READ");
        assert_eq!(
            IsolationLevel::Serializable.set_sql(),
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE"
        );
    }

    #[tokio::test]
    async fn test_begin_commit() {
        let db = LoggingDb::new();
        let txn = TransactionManager::new(&db);
        assert!(!txn.in_transaction());
        txn.begin().await.unwrap();
        assert!(txn.in_transaction());
        txn.commit().await.unwrap();
        assert!(!txn.in_transaction());
        assert_eq!(db.log(), vec!["BEGIN", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_double_begin_rejected() {
        let db = LoggingDb::new();
        let txn = TransactionManager::new(&db);
        txn.begin().await.unwrap();
        assert!(txn.begin().await.is_err());
    }

    #[tokio::test]
    async fn test_commit_outside_transaction_rejected() {
        let db = LoggingDb::new();
        let txn = TransactionManager::new(&db);
        assert!(txn.commit().await.is_err());
        assert!(txn.rollback().await.is_err());
    }

    #[tokio::test]
    async fn test_atomic_commits_on_ok() {
        let db = LoggingDb::new();
        let result = atomic(&db, |txn| async move {
            txn.execute_sql("SELECT 1", &[]).await?;
            Ok(42)
        })
        .await
        .unwrap();
        assert_eq!(result, 42);
        assert_eq!(db.log(), vec!["BEGIN", "SELECT 1", "COMMIT"]);
    }

    #[tokio::test]
    async fn test_atomic_rolls_back_on_err() {
        let db = LoggingDb::new();
        let result: FetchResult<()> = atomic(&db, |_txn| async move {
            Err(FetchError::DatabaseError("boom".to_string()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(db.log(), vec!["BEGIN", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_atomic_with_isolation_sets_level() {
        let db = LoggingDb::new();
        atomic_with_isolation(&db, IsolationLevel::RepeatableRead, |_txn| async move {
            Ok(())
        })
        .await
        .unwrap();
        assert_eq!(
            db.log(),
            vec![
                "BEGIN",
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
                "COMMIT"
            ]
        );
    }
}
