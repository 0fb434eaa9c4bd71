use std::{
    io,
    path::PathBuf,
    process::Command,
    sync::Arc,
    thread::{self, JoinHandle},
};

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("启动上传程序 {program} 失败: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("上传线程创建失败: {0}")]
    Thread(#[source] io::Error),

    #[error("上传线程 panic")]
    Panicked,
}

/// 上传程序的退出状态，只用于日志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadStatus {
    pub code: Option<i32>,
    pub success: bool,
}

/// 批次结束后的上传交接
pub trait Uploader: Send + Sync {
    fn upload(&self) -> Result<UploadStatus, UploadError>;
}

/// 通过外部命令上传（默认 `python3 s3_uploader.py`）
#[derive(Debug, Clone)]
pub struct CommandUploader {
    program: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandUploader {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        working_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: working_dir.into(),
        }
    }
}

impl Uploader for CommandUploader {
    fn upload(&self) -> Result<UploadStatus, UploadError> {
        tracing::info!("运行上传程序: {} {}", self.program, self.args.join(" "));

        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.working_dir)
            .output()
            .map_err(|source| UploadError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            tracing::info!("上传程序 stdout: {}", stdout.trim_end());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::warn!("上传程序 stderr: {}", stderr.trim_end());
        }

        Ok(UploadStatus {
            code: output.status.code(),
            success: output.status.success(),
        })
    }
}

/// 配置关闭上传时使用
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUploader;

impl Uploader for DisabledUploader {
    fn upload(&self) -> Result<UploadStatus, UploadError> {
        tracing::info!("上传已在配置中关闭，跳过");
        Ok(UploadStatus {
            code: None,
            success: true,
        })
    }
}

/// 后台上传线程的句柄，等待它只为拿到退出状态
pub struct UploadHandle {
    inner: Result<JoinHandle<Result<UploadStatus, UploadError>>, io::Error>,
}

impl UploadHandle {
    pub fn wait(self) -> Result<UploadStatus, UploadError> {
        match self.inner {
            Ok(handle) => handle.join().map_err(|_| UploadError::Panicked)?,
            Err(err) => Err(UploadError::Thread(err)),
        }
    }
}

/// 在独立线程上启动上传，结果只记录日志，不影响批次结果
pub fn handoff(uploader: Arc<dyn Uploader>) -> UploadHandle {
    tracing::info!("所有任务结束，开始上传");

    let inner = thread::Builder::new()
        .name("uploader".into())
        .spawn(move || {
            let result = uploader.upload();
            match &result {
                Ok(status) if status.success => tracing::info!("上传程序执行完成"),
                Ok(status) => tracing::warn!("上传程序异常退出，退出码: {:?}", status.code),
                Err(err) => tracing::error!("上传失败: {}", err),
            }
            result
        });

    if let Err(err) = &inner {
        tracing::error!("上传线程创建失败: {}", err);
    }
    UploadHandle { inner }
}
