use oracle::Connection;

use crate::{Credentials, ResultSet, Value};

use super::{DatabaseDriver, DatabaseSession, DriverError, validate_sql};

/// Oracle 驱动，连接目标为 EZConnect 串、TNS 别名或完整描述符
#[derive(Debug, Clone, Copy)]
pub struct OracleDriver;

struct OracleSession {
    conn: Connection,
}

impl DatabaseSession for OracleSession {
    fn query(
        &mut self,
        sql: &str,
    ) -> Result<ResultSet, DriverError> {
        validate_sql(sql)?;

        let rows = self
            .conn
            .query(sql, &[])
            .map_err(|err| DriverError::Query(format!("执行查询失败: {}", err)))?;
        let columns: Vec<String> = rows
            .column_info()
            .iter()
            .map(|info| info.name().to_string())
            .collect();

        let mut records = vec![];
        for row in rows {
            let row = row.map_err(|err| DriverError::Query(format!("读取结果失败: {}", err)))?;
            let mut record = Vec::with_capacity(columns.len());
            for value in row.sql_values() {
                let is_null = value
                    .is_null()
                    .map_err(|err| DriverError::Query(format!("读取字段失败: {}", err)))?;
                if is_null {
                    record.push(Value::Null);
                } else {
                    let text = value
                        .get::<String>()
                        .map_err(|err| DriverError::Query(format!("转换字段失败: {}", err)))?;
                    record.push(Value::Text(text));
                }
            }
            records.push(record);
        }

        Ok(ResultSet::new(columns, records))
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.conn
            .close()
            .map_err(|err| DriverError::Close(err.to_string()))
    }
}

impl DatabaseDriver for OracleDriver {
    fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let conn = Connection::connect(&credentials.user, &credentials.password, credentials.target())
            .map_err(|err| DriverError::Connect(err.to_string()))?;
        Ok(Box::new(OracleSession { conn }))
    }
}
