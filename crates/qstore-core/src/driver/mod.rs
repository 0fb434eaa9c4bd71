use crate::{Credentials, ResultSet};

pub use self::mysql::MySQLDriver;
#[cfg(feature = "oracle")]
pub use self::oracle::OracleDriver;
pub use self::postgres::PostgresDriver;
pub use self::sqlite::SQLiteDriver;

mod mysql;
#[cfg(feature = "oracle")]
mod oracle;
mod postgres;
mod sqlite;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("连接失败: {0}")]
    Connect(String),
    #[error("查询失败: {0}")]
    Query(String),
    #[error("关闭连接失败: {0}")]
    Close(String),
    #[error("不支持的连接目标: {0}")]
    Unsupported(String),
    #[error("配置字段非法: {0}")]
    InvalidField(String),
}

/// 驱动：根据账号、密码和连接目标建立会话
pub trait DatabaseDriver: Send + Sync {
    fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError>;
}

/// 会话独占一个数据库连接，调用方负责 close
pub trait DatabaseSession: Send {
    fn query(
        &mut self,
        sql: &str,
    ) -> Result<ResultSet, DriverError>;

    fn close(self: Box<Self>) -> Result<(), DriverError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    SQLite,
    MySQL,
    Postgres,
    Oracle,
}

impl DriverKind {
    /// 根据连接目标的前缀判断驱动类型，无法识别的一律按 Oracle（EZConnect / TNS）处理
    pub fn detect(target: &str) -> Self {
        let lower = target.trim().to_ascii_lowercase();
        if lower.starts_with("sqlite:") {
            DriverKind::SQLite
        } else if lower.starts_with("mysql://") {
            DriverKind::MySQL
        } else if lower.starts_with("postgres://") || lower.starts_with("postgresql://") || lower.starts_with("host=")
        {
            DriverKind::Postgres
        } else {
            DriverKind::Oracle
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DriverKind::SQLite => "SQLite",
            DriverKind::MySQL => "MySQL",
            DriverKind::Postgres => "PostgreSQL",
            DriverKind::Oracle => "Oracle",
        }
    }
}

/// 按连接目标分发到具体驱动
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverRegistry;

impl DatabaseDriver for DriverRegistry {
    fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        if credentials.target().is_empty() {
            return Err(DriverError::InvalidField("连接目标为空".into()));
        }

        let kind = DriverKind::detect(credentials.target());
        tracing::debug!(driver = kind.label(), user = %credentials.user, "选择驱动");
        match kind {
            DriverKind::SQLite => SQLiteDriver.create_connection(credentials),
            DriverKind::MySQL => MySQLDriver.create_connection(credentials),
            DriverKind::Postgres => PostgresDriver.create_connection(credentials),
            #[cfg(feature = "oracle")]
            DriverKind::Oracle => OracleDriver.create_connection(credentials),
            #[cfg(not(feature = "oracle"))]
            DriverKind::Oracle => Err(DriverError::Unsupported(format!(
                "{}（未启用 oracle 特性）",
                credentials.target()
            ))),
        }
    }
}

pub fn create_connection(credentials: &Credentials) -> Result<Box<dyn DatabaseSession>, DriverError> {
    DriverRegistry.create_connection(credentials)
}

pub fn validate_sql(sql: &str) -> Result<(), DriverError> {
    if sql.trim().is_empty() {
        return Err(DriverError::InvalidField("sql".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_driver_from_target() {
        assert_eq!(DriverKind::detect("sqlite:/tmp/a.db"), DriverKind::SQLite);
        assert_eq!(DriverKind::detect("SQLITE:///tmp/a.db"), DriverKind::SQLite);
        assert_eq!(DriverKind::detect("mysql://db:3306/app"), DriverKind::MySQL);
        assert_eq!(DriverKind::detect("postgresql://db/app"), DriverKind::Postgres);
        assert_eq!(DriverKind::detect("host=db dbname=app"), DriverKind::Postgres);
        assert_eq!(DriverKind::detect("db.example.com:1521/ORCLPDB1"), DriverKind::Oracle);
        assert_eq!(DriverKind::detect("(DESCRIPTION=(ADDRESS=(HOST=h)))"), DriverKind::Oracle);
    }

    #[test]
    fn empty_target_is_rejected() {
        let err = create_connection(&Credentials::parse("User Id=a;Password=b;")).err().unwrap();
        assert!(matches!(err, DriverError::InvalidField(_)));
    }

    #[cfg(not(feature = "oracle"))]
    #[test]
    fn oracle_target_requires_feature() {
        let err = create_connection(&Credentials::parse("User Id=a;Password=b;Data Source=db/XE"))
            .err()
            .unwrap();
        assert!(matches!(err, DriverError::Unsupported(_)));
    }

    #[cfg(feature = "oracle")]
    #[test]
    fn ezconnect_target_reaches_oracle_driver() {
        let creds = Credentials::parse("User Id=scott;Password=tiger;Data Source=qstore-no-such-host.invalid:1521/ORCLPDB1");
        let err = create_connection(&creds).err().unwrap();
        assert!(matches!(err, DriverError::Connect(_)), "unexpected error: {err:?}");
    }

    #[test]
    fn blank_sql_is_invalid() {
        assert!(validate_sql("  \n").is_err());
        assert!(validate_sql("SELECT 1").is_ok());
    }
}
