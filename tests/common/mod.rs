//! In-memory `Connector` used by the integration tests

#![allow(dead_code)]

use arrow_array::Int64Array;
use async_trait::async_trait;
use mapd_connector::connection::{ConnectionConfig, Connector, RpcConnection, SessionToken};
use mapd_connector::stream::{DataType, Field, RecordBatch, Schema, SchemaRef};
use mapd_connector::{Error, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Password the mock server rejects
pub const BAD_PASSWORD: &str = "wrong";
/// SQL the mock server rejects
pub const FAILING_SQL: &str = "SELECT * FROM missing_table";
/// SQL the mock server takes a second to answer
pub const SLOW_SQL: &str = "SELECT sleep(1)";
/// User the mock server takes a second to log in
pub const SLOW_USER: &str = "sleepy";

#[derive(Debug, Default)]
pub struct MockStats {
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub logins: AtomicUsize,
    pub logouts: AtomicUsize,
    pub fail_open: AtomicBool,
}

impl MockStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn logouts(&self) -> usize {
        self.logouts.load(Ordering::SeqCst)
    }
}

pub struct MockConnector {
    pub stats: Arc<MockStats>,
}

impl MockConnector {
    pub fn new() -> (Arc<Self>, Arc<MockStats>) {
        let stats = Arc::new(MockStats::default());
        (
            Arc::new(Self {
                stats: stats.clone(),
            }),
            stats,
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, _config: &ConnectionConfig) -> Result<Box<dyn RpcConnection>> {
        if self.stats.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockConnection {
            stats: self.stats.clone(),
            pending: VecDeque::new(),
        }))
    }
}

struct MockConnection {
    stats: Arc<MockStats>,
    pending: VecDeque<RecordBatch>,
}

pub fn numbers_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("n", DataType::Int64, true)]))
}

fn numbers(values: Vec<Option<i64>>) -> RecordBatch {
    RecordBatch::try_new(numbers_schema(), vec![Arc::new(Int64Array::from(values))]).unwrap()
}

#[async_trait]
impl RpcConnection for MockConnection {
    async fn authenticate(&mut self, _: &str, user: &str, password: &str) -> Result<SessionToken> {
        if password == BAD_PASSWORD {
            return Err(Error::Auth("invalid credentials".into()));
        }
        if user == SLOW_USER {
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        let n = self.stats.logins.fetch_add(1, Ordering::SeqCst);
        Ok(SessionToken::new(format!("token-{}", n)))
    }

    async fn execute(
        &mut self,
        _: &SessionToken,
        sql: &str,
        _first_n: Option<u64>,
    ) -> Result<SchemaRef> {
        match sql {
            FAILING_SQL => return Err(Error::Query("table missing_table not found".into())),
            SLOW_SQL => tokio::time::sleep(Duration::from_secs(1)).await,
            _ => {}
        }
        self.pending = VecDeque::from(vec![
            numbers(vec![Some(1), Some(2)]),
            numbers(vec![]),
            numbers(vec![None]),
        ]);
        Ok(numbers_schema())
    }

    async fn next_batch(&mut self) -> Result<Option<RecordBatch>> {
        Ok(self.pending.pop_front())
    }

    async fn logout(&mut self, _: &SessionToken) -> Result<()> {
        self.stats.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wait up to a second for `check` to hold
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
