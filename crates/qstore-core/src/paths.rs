use std::{
    fs, io,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use chrono::{DateTime, Utc};

/// 时间来源，按秒区分输出文件
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定时间，用于复现同一秒内的文件名
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 获取输出目录（{base}/{subdir_prefix}{YYYY-MM-DD}）
pub fn directory_for(
    base: &Path,
    subdir_prefix: &str,
    now: DateTime<Utc>,
) -> PathBuf {
    base.join(format!("{}{}", subdir_prefix, now.format("%Y-%m-%d")))
}

/// 获取输出文件名（{源文件名去扩展名}_{HH-MM-SS}.csv）
pub fn file_name_for(
    source: &Path,
    extension: &str,
    now: DateTime<Utc>,
) -> String {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = format!(".{}", extension);
    let stem = name.strip_suffix(&suffix).unwrap_or(&name);
    format!("{}_{}.csv", stem, now.format("%H-%M-%S"))
}

/// 确保目录存在；并发创建时“已存在”视为成功
pub fn ensure_dir(dir: &Path) -> io::Result<()> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(err) => Err(err),
    }
}

/// 写入输出文件
///
/// 先写同目录下的临时文件再重命名，失败时不会留下半个 CSV；同名文件后写者覆盖先写者。
pub fn write_artifact(
    path: &Path,
    contents: &str,
) -> io::Result<()> {
    static SEQ: AtomicU64 = AtomicU64::new(0);

    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = SEQ.fetch_add(1, Ordering::Relaxed);
    let tmp = path.with_file_name(format!(".{}.{}-{}.tmp", name, process::id(), seq));

    if let Err(err) = fs::write(&tmp, contents).and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

/// 输出路径规划：基础目录、子目录前缀和任务文件扩展名
#[derive(Debug, Clone)]
pub struct OutputPathPlanner {
    base: PathBuf,
    subdir_prefix: String,
    extension: String,
}

impl OutputPathPlanner {
    pub fn new(
        base: impl Into<PathBuf>,
        subdir_prefix: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            base: base.into(),
            subdir_prefix: subdir_prefix.into(),
            extension: extension.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn directory_for(
        &self,
        now: DateTime<Utc>,
    ) -> PathBuf {
        directory_for(&self.base, &self.subdir_prefix, now)
    }

    pub fn file_name_for(
        &self,
        source: &Path,
        now: DateTime<Utc>,
    ) -> String {
        file_name_for(source, &self.extension, now)
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use chrono::TimeZone;

    use super::*;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
    }

    #[test]
    fn directory_is_date_scoped() {
        let dir = directory_for(Path::new("/data"), "StorageResults/", instant());
        assert_eq!(dir, Path::new("/data/StorageResults/2024-03-05"));

        let dir = directory_for(Path::new("/data"), "run_", instant());
        assert_eq!(dir, Path::new("/data/run_2024-03-05"));
    }

    #[test]
    fn file_name_strips_task_extension_and_uses_dashes() {
        let now = instant();
        assert_eq!(file_name_for(Path::new("/q/daily.sql"), "sql", now), "daily_07-08-09.csv");
        assert_eq!(file_name_for(Path::new("/q/report.v2.sql"), "sql", now), "report.v2_07-08-09.csv");
        assert_eq!(file_name_for(Path::new("/q/UPPER.SQL"), "sql", now), "UPPER.SQL_07-08-09.csv");
    }

    #[test]
    fn planner_combines_directory_and_name() {
        let planner = OutputPathPlanner::new("/out", "StorageResults/", "sql");
        let now = instant();
        let path = planner
            .directory_for(now)
            .join(planner.file_name_for(Path::new("scan.sql"), now));
        assert_eq!(path, Path::new("/out/StorageResults/2024-03-05/scan_07-08-09.csv"));
    }

    #[test]
    fn ensure_dir_is_idempotent_under_concurrency() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("StorageResults").join("2024-03-05");

        thread::scope(|scope| {
            let handles: Vec<_> = (0..8).map(|_| scope.spawn(|| ensure_dir(&target))).collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        });

        assert!(target.is_dir());
        ensure_dir(&target).unwrap();
    }

    #[test]
    fn write_artifact_replaces_and_leaves_no_temp_files() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("scan_07-08-09.csv");

        write_artifact(&path, "first").unwrap();
        write_artifact(&path, "second").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        let entries: Vec<_> = fs::read_dir(root.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn write_artifact_fails_without_directory() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join("missing").join("scan.csv");
        assert!(write_artifact(&path, "x").is_err());
        assert!(!path.exists());
    }
}
