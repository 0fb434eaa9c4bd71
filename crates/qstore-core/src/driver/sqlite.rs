use std::path::Path;

use rusqlite::{Connection, OpenFlags, types::ValueRef};

use crate::{Credentials, ResultSet, Value};

use super::{DatabaseDriver, DatabaseSession, DriverError, validate_sql};

/// SQLite 驱动，连接目标为 `sqlite:<文件路径>`，只读打开
#[derive(Debug, Clone, Copy)]
pub struct SQLiteDriver;

struct SQLiteSession {
    conn: Connection,
}

impl SQLiteSession {
    fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for SQLiteSession {
    fn query(
        &mut self,
        sql: &str,
    ) -> Result<ResultSet, DriverError> {
        validate_sql(sql)?;

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|err| DriverError::Query(format!("准备查询失败: {}", err)))?;
        let columns = stmt.column_names().iter().map(|s| s.to_string()).collect::<Vec<_>>();

        let mut rows = stmt
            .query([])
            .map_err(|err| DriverError::Query(format!("执行查询失败: {}", err)))?;

        let mut records = vec![];
        while let Some(row) = rows
            .next()
            .map_err(|err| DriverError::Query(format!("读取结果失败: {}", err)))?
        {
            let mut record = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                let value = row
                    .get_ref(idx)
                    .map_err(|err| DriverError::Query(format!("读取列 {name} 失败: {}", err)))?;
                record.push(parse_value(value));
            }
            records.push(record);
        }

        Ok(ResultSet::new(columns, records))
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.conn
            .close()
            .map_err(|(_, err)| DriverError::Close(err.to_string()))
    }
}

impl DatabaseDriver for SQLiteDriver {
    fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(credentials.target())?;
        Ok(Box::new(SQLiteSession::new(conn)))
    }
}

fn open_conn(target: &str) -> Result<Connection, DriverError> {
    let path_str = strip_scheme(target).trim();
    if path_str.is_empty() {
        return Err(DriverError::InvalidField("file_path".into()));
    }

    let path = Path::new(path_str);
    if !path.is_file() {
        return Err(DriverError::Connect(format!("SQLite 文件不存在: {}", path_str)));
    }

    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|err| DriverError::Connect(format!("打开 SQLite 失败: {}", err)))
}

fn strip_scheme(target: &str) -> &str {
    let trimmed = target.trim();
    for prefix in ["sqlite://", "sqlite:"] {
        if trimmed
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
        {
            return &trimmed[prefix.len()..];
        }
    }
    trimmed
}

fn parse_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(int) => Value::Int(int),
        ValueRef::Real(real) => Value::Float(real),
        ValueRef::Text(text) => Value::Text(String::from_utf8_lossy(text).into_owned()),
        ValueRef::Blob(blob) => Value::Bytes(blob.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_db(dir: &Path) -> String {
        let path = dir.join("scans.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE scans (barcode TEXT, carrier INTEGER, ts TEXT);
             INSERT INTO scans VALUES ('B2', 20, '2024-01-02');
             INSERT INTO scans VALUES ('B1', 10, NULL);",
        )
        .unwrap();
        format!("sqlite:{}", path.display())
    }

    #[test]
    fn strips_sqlite_scheme() {
        assert_eq!(strip_scheme("sqlite:/tmp/a.db"), "/tmp/a.db");
        assert_eq!(strip_scheme("SQLite:///tmp/a.db"), "/tmp/a.db");
        assert_eq!(strip_scheme("/tmp/a.db"), "/tmp/a.db");
    }

    #[test]
    fn query_returns_ordered_rows() {
        let dir = tempfile::tempdir().unwrap();
        let target = seeded_db(dir.path());
        let creds = Credentials::parse(&format!("User Id=reader;Password=secret;Data Source={}", target));

        let mut session = SQLiteDriver.create_connection(&creds).unwrap();
        let result = session
            .query("SELECT barcode, carrier, ts FROM scans ORDER BY barcode")
            .unwrap();
        session.close().unwrap();

        assert_eq!(result.cols, vec!["barcode", "carrier", "ts"]);
        assert_eq!(
            result.rows,
            vec![
                vec![Value::from("B1"), Value::Int(10), Value::Null],
                vec![Value::from("B2"), Value::Int(20), Value::from("2024-01-02")],
            ]
        );
    }

    #[test]
    fn missing_file_is_a_connect_error() {
        let dir = tempfile::tempdir().unwrap();
        let creds = Credentials::parse(&format!("Data Source=sqlite:{}", dir.path().join("absent.db").display()));
        let err = SQLiteDriver.create_connection(&creds).err().unwrap();
        assert!(matches!(err, DriverError::Connect(_)));
    }

    #[test]
    fn bad_sql_is_a_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let creds = Credentials::parse(&format!("Data Source={}", seeded_db(dir.path())));
        let mut session = SQLiteDriver.create_connection(&creds).unwrap();

        assert!(matches!(session.query("SELECT nope FROM missing"), Err(DriverError::Query(_))));
        assert!(matches!(session.query(""), Err(DriverError::InvalidField(_))));
        session.close().unwrap();
    }
}
