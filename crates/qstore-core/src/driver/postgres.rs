use postgres::{Client, Config, NoTls, SimpleQueryMessage};

use crate::{Credentials, ResultSet, Value};

use super::{DatabaseDriver, DatabaseSession, DriverError, validate_sql};

/// PostgreSQL 驱动，连接目标为 URL 或 `host=... dbname=...` 键值串
#[derive(Debug, Clone, Copy)]
pub struct PostgresDriver;

impl DatabaseDriver for PostgresDriver {
    fn create_connection(
        &self,
        credentials: &Credentials,
    ) -> Result<Box<dyn DatabaseSession>, DriverError> {
        let client = open_client(credentials)?;
        Ok(Box::new(PostgresSession::new(client)))
    }
}

struct PostgresSession {
    client: Client,
}

impl PostgresSession {
    fn new(client: Client) -> Self {
        Self { client }
    }
}

impl DatabaseSession for PostgresSession {
    fn query(
        &mut self,
        sql: &str,
    ) -> Result<ResultSet, DriverError> {
        validate_sql(sql)?;

        // simple query 协议下所有类型都以服务端文本格式返回
        let messages = self
            .client
            .simple_query(sql)
            .map_err(|err| DriverError::Query(format!("执行查询失败: {}", err)))?;

        let mut columns = vec![];
        let mut records = vec![];
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                if columns.is_empty() {
                    columns = row.columns().iter().map(|col| col.name().to_string()).collect();
                }
                let record = (0..row.len())
                    .map(|idx| Value::from(row.get(idx)))
                    .collect();
                records.push(record);
            }
        }

        Ok(ResultSet::new(columns, records))
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.client
            .close()
            .map_err(|err| DriverError::Close(err.to_string()))
    }
}

fn open_client(credentials: &Credentials) -> Result<Client, DriverError> {
    let mut config: Config = credentials
        .target()
        .parse()
        .map_err(|err| DriverError::InvalidField(format!("PostgreSQL 连接串非法: {}", err)))?;

    if !credentials.user.is_empty() {
        config.user(credentials.user.as_str());
    }
    if !credentials.password.is_empty() {
        config.password(credentials.password.as_str());
    }

    config
        .connect(NoTls)
        .map_err(|err| DriverError::Connect(err.to_string()))
}
