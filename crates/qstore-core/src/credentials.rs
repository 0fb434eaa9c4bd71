//! 连接串解析
//!
//! 任务文件第一行形如 `User Id=scott;Password=tiger;Data Source=db:1521/ORCL`，键名不区分大小写。
//! 账号和密码被单独取出，剩余部分作为连接目标原样交给驱动。

use std::fmt;

const USER_KEY: &str = "user id=";
const PASSWORD_KEY: &str = "password=";
const DATA_SOURCE_KEY: &str = "data source=";

#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
    pub remaining_connection_string: String,
}

impl Credentials {
    /// 解析连接串
    ///
    /// 缺失的键返回空字符串，不视为错误；键值必须以 `;` 结尾才会被识别。
    pub fn parse(connection_string: &str) -> Self {
        let user = extract_value(connection_string, USER_KEY).unwrap_or_default();
        let password = extract_value(connection_string, PASSWORD_KEY).unwrap_or_default();

        let remaining = strip_pair(connection_string, USER_KEY);
        let remaining = strip_pair(&remaining, PASSWORD_KEY);
        let remaining = strip_key(&remaining, DATA_SOURCE_KEY);

        Self {
            user,
            password,
            remaining_connection_string: remaining.trim().to_string(),
        }
    }

    /// 交给驱动的连接目标（不含账号密码）
    pub fn target(&self) -> &str {
        &self.remaining_connection_string
    }
}

impl fmt::Debug for Credentials {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .field("remaining_connection_string", &self.remaining_connection_string)
            .finish()
    }
}

/// 查找 `key=value;` 键值对，返回 (键起点, 值起点, 分号位置)
///
/// 小写化只改变 ASCII 字节，下标与原串一一对应。
fn find_pair(
    haystack: &str,
    key: &str,
) -> Option<(usize, usize, usize)> {
    let lower = haystack.to_ascii_lowercase();
    let start = lower.find(key)?;
    let value_start = start + key.len();
    let end = value_start + haystack[value_start..].find(';')?;
    Some((start, value_start, end))
}

fn extract_value(
    haystack: &str,
    key: &str,
) -> Option<String> {
    let (_, value_start, end) = find_pair(haystack, key)?;
    Some(haystack[value_start..end].trim().to_string())
}

fn strip_pair(
    haystack: &str,
    key: &str,
) -> String {
    match find_pair(haystack, key) {
        Some((start, _, end)) => format!("{}{}", &haystack[..start], &haystack[end + 1..]),
        None => haystack.to_string(),
    }
}

fn strip_key(
    haystack: &str,
    key: &str,
) -> String {
    match haystack.to_ascii_lowercase().find(key) {
        Some(start) => format!("{}{}", &haystack[..start], &haystack[start + key.len()..]),
        None => haystack.to_string(),
    }
}
