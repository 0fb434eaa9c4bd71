use std::{
    any::Any,
    io,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;
use thiserror::Error;

use qstore_core::{
    Clock, Credentials, CsvEncoder, DatabaseDriver, DatabaseSession, DriverError, EncodeError, OutputPathPlanner,
    SystemClock, ensure_dir, load, write_artifact,
};

/// 单个任务的状态，失败时记录最后到达的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Loaded,
    ConnectionOpen,
    Executed,
    Encoded,
    Written,
    Closed,
}

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("读写文件失败 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Connection(DriverError),

    #[error(transparent)]
    Query(DriverError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("任务线程 panic: {0}")]
    Panic(String),
}

impl TaskError {
    fn io(
        path: &Path,
        source: io::Error,
    ) -> Self {
        TaskError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// 任务结果，用于日志和运行报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Succeeded {
        file: PathBuf,
        output: PathBuf,
        rows: usize,
    },
    Failed {
        file: PathBuf,
        stage: TaskState,
        error: String,
    },
}

impl TaskOutcome {
    pub fn file(&self) -> &Path {
        match self {
            TaskOutcome::Succeeded { file, .. } | TaskOutcome::Failed { file, .. } => file,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// 单个任务：读取 → 解析连接串 → 查询 → 编码 → 写文件
///
/// 任何阶段的错误都在这里被吸收为 `TaskOutcome::Failed`，不会影响其他任务。
pub struct TaskRunner {
    driver: Arc<dyn DatabaseDriver>,
    encoder: CsvEncoder,
    planner: OutputPathPlanner,
    clock: Arc<dyn Clock>,
}

impl TaskRunner {
    pub fn new(
        driver: Arc<dyn DatabaseDriver>,
        planner: OutputPathPlanner,
    ) -> Self {
        Self {
            driver,
            encoder: CsvEncoder::new(),
            planner,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_encoder(
        mut self,
        encoder: CsvEncoder,
    ) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_clock(
        mut self,
        clock: Arc<dyn Clock>,
    ) -> Self {
        self.clock = clock;
        self
    }

    pub fn run(
        &self,
        path: &Path,
    ) -> TaskOutcome {
        tracing::info!("开始处理任务文件: {}", path.display());

        let mut state = TaskState::Pending;
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.execute(path, &mut state)))
            .unwrap_or_else(|payload| Err(TaskError::Panic(panic_message(payload))));

        match result {
            Ok((output, rows)) => {
                tracing::info!("任务完成: {} -> {}，共 {} 行", path.display(), output.display(), rows);
                TaskOutcome::Succeeded {
                    file: path.to_path_buf(),
                    output,
                    rows,
                }
            }
            Err(err) => {
                tracing::error!(stage = ?state, "处理任务文件 {} 失败: {}", path.display(), err);
                TaskOutcome::Failed {
                    file: path.to_path_buf(),
                    stage: state,
                    error: err.to_string(),
                }
            }
        }
    }

    fn execute(
        &self,
        path: &Path,
        state: &mut TaskState,
    ) -> Result<(PathBuf, usize), TaskError> {
        // 1. 读取任务文件
        let input = load(path).map_err(|err| TaskError::io(path, err))?;
        *state = TaskState::Loaded;
        tracing::debug!("任务文件读取成功: {}", path.display());

        // 2. 解析连接串并建立连接
        let credentials = Credentials::parse(&input.connection_target);
        tracing::debug!("连接串解析成功，用户: {}", credentials.user);
        let mut session = self
            .driver
            .create_connection(&credentials)
            .map_err(TaskError::Connection)?;
        *state = TaskState::ConnectionOpen;
        tracing::debug!("数据库连接成功: {}", path.display());

        // 3. 查询并写出；无论成败都关闭连接，关闭失败只记录日志
        let result = self.produce(path, &input.query, session.as_mut(), state);
        match session.close() {
            Ok(()) => tracing::debug!("连接已关闭: {}", path.display()),
            Err(err) => tracing::warn!("关闭连接失败 {}: {}", path.display(), err),
        }

        if result.is_ok() {
            *state = TaskState::Closed;
        }
        result
    }

    fn produce(
        &self,
        path: &Path,
        query: &str,
        session: &mut dyn DatabaseSession,
        state: &mut TaskState,
    ) -> Result<(PathBuf, usize), TaskError> {
        let result = session.query(query).map_err(TaskError::Query)?;
        *state = TaskState::Executed;
        tracing::info!("查询执行成功: {}，返回 {} 行", path.display(), result.len());
        if !result.cols.is_empty() {
            tracing::debug!(cols = ?result.cols, "结果列");
        }

        let csv = self.encoder.encode(&result)?;
        *state = TaskState::Encoded;

        let now = self.clock.now();
        let dir = self.planner.directory_for(now);
        ensure_dir(&dir).map_err(|err| TaskError::io(&dir, err))?;
        let output = dir.join(self.planner.file_name_for(path, now));
        write_artifact(&output, &csv).map_err(|err| TaskError::io(&output, err))?;
        *state = TaskState::Written;

        Ok((output, result.len()))
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知错误".into()
    }
}
