use mysql::{Conn, Opts, OptsBuilder, Value as MySQLValue, prelude::Queryable};

use crate::{Credentials, ResultSet, Value};

use super::{DatabaseDriver, DatabaseSession, DriverError, validate_sql};

/// MySQL 驱动，连接目标为 `mysql://host:port/db` 形式的 URL
#[derive(Debug, Clone, Copy)]
pub struct MySQLDriver;

impl DatabaseDriver for MySQLDriver {
    fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = open_conn(credentials)?;
        Ok(Box::new(MySQLSession::new(conn)))
    }
}

struct MySQLSession {
    conn: Conn,
}

impl MySQLSession {
    fn new(conn: Conn) -> Self {
        Self { conn }
    }
}

impl DatabaseSession for MySQLSession {
    fn query(
        &mut self,
        sql: &str,
    ) -> Result<ResultSet, DriverError> {
        validate_sql(sql)?;
        tracing::debug!(sql = %sql);

        let rows: Vec<mysql::Row> = self
            .conn
            .query_iter(sql)
            .map_err(|err| DriverError::Query(format!("执行查询失败: {}", err)))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| DriverError::Query(format!("读取结果失败: {}", err)))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|col| col.name_str().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let records = rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(parse_value).collect())
            .collect();

        Ok(ResultSet::new(columns, records))
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        // 连接在 drop 时发送 COM_QUIT
        drop(self.conn);
        Ok(())
    }
}

fn open_conn(credentials: &Credentials) -> Result<Conn, DriverError> {
    let opts = Opts::from_url(credentials.target())
        .map_err(|err| DriverError::InvalidField(format!("MySQL 连接串非法: {}", err)))?;

    let mut builder = OptsBuilder::from_opts(opts);
    if !credentials.user.is_empty() {
        builder = builder.user(Some(credentials.user.clone()));
    }
    if !credentials.password.is_empty() {
        builder = builder.pass(Some(credentials.password.clone()));
    }

    Conn::new(builder).map_err(|err| DriverError::Connect(err.to_string()))
}

fn parse_value(value: MySQLValue) -> Value {
    match value {
        MySQLValue::NULL => Value::Null,
        MySQLValue::Bytes(bytes) => Value::Text(String::from_utf8_lossy(&bytes).into_owned()),
        MySQLValue::Int(int) => Value::Int(int),
        MySQLValue::UInt(uint) => Value::UInt(uint),
        MySQLValue::Float(float) => Value::Float(float as f64),
        MySQLValue::Double(double) => Value::Float(double),
        MySQLValue::Date(year, month, day, hour, minute, second, micros) => Value::Text(format!(
            "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}.{micros:06}"
        )),
        MySQLValue::Time(neg, days, hours, minutes, seconds, micros) => {
            let sign = if neg { "-" } else { "" };
            Value::Text(format!("{sign}{days} {hours:02}:{minutes:02}:{seconds:02}.{micros:06}"))
        }
    }
}
