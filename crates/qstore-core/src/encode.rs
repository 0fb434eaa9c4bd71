use std::string::FromUtf8Error;

use csv::{QuoteStyle, Terminator, WriterBuilder};
use thiserror::Error;

use crate::ResultSet;

/// 固定表头，约定查询结果依次返回这三列
pub const HEADER: [&str; 3] = ["barcodes", "carrierid", "timestamp"];

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("CSV 编码失败: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV 内容不是合法 UTF-8: {0}")]
    Utf8(#[from] FromUtf8Error),

    #[error("第 {row} 行有 {found} 列，表头要求 {expected} 列")]
    Shape { row: usize, found: usize, expected: usize },
}

/// 结果集转 CSV
///
/// 所有字段一律加双引号，字段内的 `"` 转义为 `""`；行之间用平台换行符连接，最后一行后不追加换行。
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvEncoder {
    strict_shape: bool,
}

impl CsvEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开启后，列数与表头不一致的行会导致编码失败
    pub fn strict_shape(
        mut self,
        strict: bool,
    ) -> Self {
        self.strict_shape = strict;
        self
    }

    pub fn encode(
        &self,
        result: &ResultSet,
    ) -> Result<String, EncodeError> {
        if self.strict_shape {
            check_shape(result)?;
        }

        let mut writer = WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .quote_style(QuoteStyle::Always)
            .terminator(terminator())
            .from_writer(vec![]);

        for row in &result.rows {
            writer.write_record(row.iter().map(|value| value.to_string()))?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|err| csv::Error::from(err.into_error()))?;
        let body = String::from_utf8(bytes)?;
        let body = body.strip_suffix(LINE_ENDING).unwrap_or(&body);

        Ok(format!("{}{}{}", HEADER.join(","), LINE_ENDING, body))
    }
}

fn check_shape(result: &ResultSet) -> Result<(), EncodeError> {
    match result.rows.iter().position(|row| row.len() != HEADER.len()) {
        Some(idx) => Err(EncodeError::Shape {
            row: idx + 1,
            found: result.rows[idx].len(),
            expected: HEADER.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(windows)]
fn terminator() -> Terminator {
    Terminator::CRLF
}

#[cfg(not(windows))]
fn terminator() -> Terminator {
    Terminator::Any(b'\n')
}
