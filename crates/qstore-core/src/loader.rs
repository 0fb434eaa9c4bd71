use std::{fs, io, path::Path};

/// 任务文件内容：第一行为连接串，其余为 SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInput {
    pub connection_target: String,
    pub query: String,
}

/// 读取任务文件
pub fn load(path: &Path) -> io::Result<TaskInput> {
    let content = fs::read_to_string(path)?;
    Ok(split_input(&content))
}

/// 按第一个换行拆分；SQL 保留原有换行，仅去掉首尾空白
pub fn split_input(content: &str) -> TaskInput {
    let (first, rest) = content.split_once('\n').unwrap_or((content, ""));
    TaskInput {
        connection_target: first.trim().to_string(),
        query: rest.trim().to_string(),
    }
}
