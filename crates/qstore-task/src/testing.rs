//! 测试用的驱动桩、固定时钟和 SQLite 夹具

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use chrono::{TimeZone, Utc};
use rusqlite::Connection;

use qstore_core::{Clock, Credentials, DatabaseDriver, DatabaseSession, DriverError, FixedClock, ResultSet, Value};

use crate::upload::{UploadError, UploadStatus, Uploader};

/// 2024-03-05 10:20:30 UTC
pub fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 30).unwrap()))
}

/// 建立 scans 表并返回 `sqlite:` 连接目标
pub fn seed_scans_db(dir: &Path) -> String {
    let path = dir.join("scans.db");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE scans (barcode TEXT, carrier INTEGER, ts TEXT);
         INSERT INTO scans VALUES ('B2', 20, NULL);
         INSERT INTO scans VALUES ('B1', 10, '2024-03-05 09:00:00');",
    )
    .unwrap();
    format!("sqlite:{}", path.display())
}

/// 写入任务文件：第一行连接串，之后为 SQL
pub fn write_task(
    dir: &Path,
    name: &str,
    target: &str,
    sql: &str,
) -> PathBuf {
    let path = dir.join(name);
    fs::write(
        &path,
        format!("User Id=reader;Password=secret;Data Source={}\n{}\n", target, sql),
    )
    .unwrap();
    path
}

#[derive(Clone, Copy)]
enum Behavior {
    Rows,
    FailQuery,
    FailClose,
    Panic,
}

/// 不连接真实数据库的驱动，记录 close 次数
pub struct StubDriver {
    behavior: Behavior,
    rows: Vec<Vec<Value>>,
    closed: Arc<AtomicUsize>,
}

impl StubDriver {
    fn new(
        behavior: Behavior,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self {
            behavior,
            rows,
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn returning(rows: Vec<Vec<Value>>) -> Self {
        Self::new(Behavior::Rows, rows)
    }

    pub fn failing_query() -> Self {
        Self::new(Behavior::FailQuery, vec![])
    }

    pub fn failing_close(rows: Vec<Vec<Value>>) -> Self {
        Self::new(Behavior::FailClose, rows)
    }

    pub fn panicking() -> Self {
        Self::new(Behavior::Panic, vec![])
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl DatabaseDriver for StubDriver {
    fn create_connection(
        &self,
        _credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        Ok(Box::new(StubSession {
            behavior: self.behavior,
            rows: self.rows.clone(),
            closed: self.closed.clone(),
        }))
    }
}

struct StubSession {
    behavior: Behavior,
    rows: Vec<Vec<Value>>,
    closed: Arc<AtomicUsize>,
}

impl DatabaseSession for StubSession {
    fn query(
        &mut self,
        _sql: &str,
    ) -> Result<ResultSet, DriverError> {
        match self.behavior {
            Behavior::FailQuery => Err(DriverError::Query("ORA-00942: table or view does not exist".into())),
            Behavior::Panic => panic!("driver exploded"),
            Behavior::Rows | Behavior::FailClose => Ok(ResultSet::from_rows(self.rows.clone())),
        }
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::FailClose => Err(DriverError::Close("socket already closed".into())),
            _ => Ok(()),
        }
    }
}

/// 只计数的上传器
#[derive(Default)]
pub struct CountingUploader {
    calls: AtomicUsize,
}

impl CountingUploader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Uploader for CountingUploader {
    fn upload(&self) -> Result<UploadStatus, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(UploadStatus {
            code: Some(0),
            success: true,
        })
    }
}
