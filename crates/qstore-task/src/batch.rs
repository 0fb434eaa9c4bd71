use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
};

use uuid::Uuid;

use qstore_core::{CsvEncoder, DriverRegistry, OutputPathPlanner};

use crate::{
    config::BatchConfig,
    print_status,
    runner::{TaskOutcome, TaskRunner},
    upload::{self, CommandUploader, DisabledUploader, UploadHandle, Uploader},
};

/// 一次批处理的结果
pub struct BatchReport {
    pub run_id: String,
    pub outcomes: Vec<TaskOutcome>,
    pub upload: UploadHandle,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// 每个任务结束时调用，默认输出一行 status JSON
pub type StatusSink = Arc<dyn Fn(&TaskOutcome) + Send + Sync>;

/// 扫描目录、并发执行所有任务、全部结束后交给上传程序
pub struct BatchOrchestrator {
    runner: TaskRunner,
    uploader: Arc<dyn Uploader>,
    status: StatusSink,
    extension: String,
    max_concurrency: Option<usize>,
}

impl BatchOrchestrator {
    pub fn new(
        runner: TaskRunner,
        uploader: Arc<dyn Uploader>,
    ) -> Self {
        Self {
            runner,
            uploader,
            status: Arc::new(print_status),
            extension: "sql".into(),
            max_concurrency: None,
        }
    }

    pub fn from_config(
        config: &BatchConfig,
        root: &Path,
    ) -> Self {
        let planner = OutputPathPlanner::new(root, config.output_dir.clone(), config.extension.clone());
        let runner = TaskRunner::new(Arc::new(DriverRegistry), planner)
            .with_encoder(CsvEncoder::new().strict_shape(config.strict_shape));

        let uploader: Arc<dyn Uploader> = if config.uploader.enabled {
            Arc::new(CommandUploader::new(
                config.uploader.program.clone(),
                config.uploader.args.clone(),
                root,
            ))
        } else {
            Arc::new(DisabledUploader)
        };

        Self::new(runner, uploader)
            .with_extension(config.extension.clone())
            .with_max_concurrency(config.max_concurrency)
    }

    pub fn with_extension(
        mut self,
        extension: impl Into<String>,
    ) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_status_sink(
        mut self,
        status: StatusSink,
    ) -> Self {
        self.status = status;
        self
    }

    /// None 表示每个任务一个线程
    pub fn with_max_concurrency(
        mut self,
        limit: Option<usize>,
    ) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// 列出目录下扩展名匹配的任务文件（区分大小写），按路径排序
    pub fn discover(
        &self,
        folder: &Path,
    ) -> io::Result<Vec<PathBuf>> {
        let mut files = vec![];
        for entry in fs::read_dir(folder)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == self.extension.as_str()) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    pub fn run_all(
        &self,
        folder: &Path,
    ) -> io::Result<BatchReport> {
        let run_id = Uuid::new_v4().to_string();
        tracing::info!(run_id = %run_id, "处理目录中的任务文件: {}", folder.display());

        let files = self.discover(folder)?;
        tracing::info!("发现 {} 个任务文件", files.len());

        let outcomes = self.run_tasks(&files);
        let report = BatchReport {
            run_id,
            upload: upload::handoff(Arc::clone(&self.uploader)),
            outcomes,
        };
        tracing::info!("批处理完成: 成功 {}，失败 {}", report.succeeded(), report.failed());
        Ok(report)
    }

    /// 工作线程从共享下标领取任务；不限并发时线程数等于任务数
    fn run_tasks(
        &self,
        files: &[PathBuf],
    ) -> Vec<TaskOutcome> {
        if files.is_empty() {
            return vec![];
        }

        let workers = self
            .max_concurrency
            .map_or(files.len(), |limit| limit.clamp(1, files.len()));
        let next = AtomicUsize::new(0);
        let finished = Mutex::new(Vec::with_capacity(files.len()));

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for _ in 0..workers {
                handles.push(scope.spawn(|| {
                    while let Some(file) = files.get(next.fetch_add(1, Ordering::Relaxed)) {
                        let outcome = self.runner.run(file);
                        finished
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(outcome.clone());
                        (self.status)(&outcome);
                    }
                }));
            }

            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("工作线程异常退出，其后续任务不会执行");
                }
            }
        });

        let mut finished = finished.into_inner().unwrap_or_else(PoisonError::into_inner);
        if finished.len() < files.len() {
            tracing::error!("{} 个任务没有结果", files.len() - finished.len());
        }
        finished.sort_by(|a, b| a.file().cmp(b.file()));
        finished
    }
}
