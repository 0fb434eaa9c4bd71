use std::fmt;

// 核心模块导出
pub mod credentials;
pub mod driver;
pub mod encode;
pub mod loader;
pub mod paths;

pub use credentials::Credentials;
pub use driver::{DatabaseDriver, DatabaseSession, DriverError, DriverKind, DriverRegistry, create_connection};
pub use encode::{CsvEncoder, EncodeError, HEADER, LINE_ENDING};
pub use loader::{TaskInput, load};
pub use paths::{Clock, FixedClock, OutputPathPlanner, SystemClock, directory_for, ensure_dir, file_name_for, write_artifact};

// ============================================================================
// Model Types
// ============================================================================

/// 单个字段值，由驱动从数据库类型转换而来
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Int(int) => write!(f, "{}", int),
            Value::UInt(uint) => write!(f, "{}", uint),
            Value::Float(float) => write!(f, "{}", float),
            Value::Text(text) => f.write_str(text),
            // 二进制显示为十六进制字符串
            Value::Bytes(bytes) => bytes.iter().try_for_each(|b| write!(f, "{:02x}", b)),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// 查询结果：按顺序排列的行，每行为按顺序排列的字段
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// 驱动返回的列名，仅用于日志和形状校验
    pub cols: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub fn new(
        cols: Vec<String>,
        rows: Vec<Vec<Value>>,
    ) -> Self {
        Self { cols, rows }
    }

    pub fn from_rows(rows: Vec<Vec<Value>>) -> Self {
        Self { cols: vec![], rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
