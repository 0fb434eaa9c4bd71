use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// 扫描目录下的默认配置文件名
pub const CONFIG_FILE: &str = "qstore.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("无法读取配置文件 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("配置文件格式错误 {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("配置字段非法: {0}")]
    Invalid(String),
}

/// 批处理配置
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// 任务文件扩展名（区分大小写，不带点）
    #[serde(default = "default_extension")]
    pub extension: String,
    /// 输出子目录前缀，后接日期
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    /// 输出根目录，缺省为扫描目录
    #[serde(default)]
    pub output_root: Option<PathBuf>,
    /// 最大并发任务数，缺省不限制
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// 结果列数与表头不一致时判定任务失败
    #[serde(default)]
    pub strict_shape: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志目录，相对输出根目录
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default)]
    pub uploader: UploaderConfig,
}

/// 上传程序配置
#[derive(Debug, Clone, Deserialize)]
pub struct UploaderConfig {
    #[serde(default = "default_upload_enabled")]
    pub enabled: bool,
    #[serde(default = "default_upload_program")]
    pub program: String,
    #[serde(default = "default_upload_args")]
    pub args: Vec<String>,
}

fn default_extension() -> String {
    "sql".into()
}

fn default_output_dir() -> String {
    "StorageResults/".into()
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_dir() -> String {
    "logs".into()
}

fn default_upload_enabled() -> bool {
    true
}

fn default_upload_program() -> String {
    "python3".into()
}

fn default_upload_args() -> Vec<String> {
    vec!["s3_uploader.py".into()]
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            enabled: default_upload_enabled(),
            program: default_upload_program(),
            args: default_upload_args(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            output_dir: default_output_dir(),
            output_root: None,
            max_concurrency: None,
            strict_shape: false,
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            uploader: UploaderConfig::default(),
        }
    }
}

impl BatchConfig {
    /// 加载配置：优先使用显式指定的文件，其次为扫描目录下的 qstore.json，都没有时使用默认值
    pub fn load(
        folder: &Path,
        explicit: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = folder.join(CONFIG_FILE);
                if path.is_file() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(mut self) -> Result<Self, ConfigError> {
        self.extension = self.extension.trim_start_matches('.').to_string();
        if self.extension.is_empty() {
            return Err(ConfigError::Invalid("extension 不能为空".into()));
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::Invalid("max_concurrency 必须大于 0".into()));
        }
        if self.uploader.enabled && self.uploader.program.trim().is_empty() {
            return Err(ConfigError::Invalid("uploader.program 不能为空".into()));
        }
        Ok(self)
    }

    /// 输出根目录；相对路径基于扫描目录
    pub fn output_root(
        &self,
        folder: &Path,
    ) -> PathBuf {
        match &self.output_root {
            Some(root) => folder.join(root),
            None => folder.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = BatchConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.extension, "sql");
        assert_eq!(config.output_dir, "StorageResults/");
        assert_eq!(config.max_concurrency, None);
        assert!(!config.strict_shape);
        assert!(config.uploader.enabled);
        assert_eq!(config.uploader.program, "python3");
        assert_eq!(config.uploader.args, vec!["s3_uploader.py"]);
        assert_eq!(config.output_root(dir.path()), dir.path());
    }

    #[test]
    fn reads_folder_config_with_partial_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"extension": ".sql", "max_concurrency": 4, "output_root": "out", "uploader": {"enabled": false}}"#,
        )
        .unwrap();

        let config = BatchConfig::load(dir.path(), None).unwrap();
        assert_eq!(config.extension, "sql");
        assert_eq!(config.max_concurrency, Some(4));
        assert!(!config.uploader.enabled);
        assert_eq!(config.uploader.program, "python3");
        assert_eq!(config.output_root(dir.path()), dir.path().join("out"));
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");

        fs::write(&path, r#"{"max_concurrency": 0}"#).unwrap();
        assert!(matches!(
            BatchConfig::load(dir.path(), Some(&path)),
            Err(ConfigError::Invalid(_))
        ));

        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            BatchConfig::load(dir.path(), Some(&path)),
            Err(ConfigError::Parse { .. })
        ));

        assert!(matches!(
            BatchConfig::load(dir.path(), Some(&dir.path().join("absent.json"))),
            Err(ConfigError::Io { .. })
        ));
    }
}
