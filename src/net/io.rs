//! I/O 支持：纯文本矩阵格式，以及 JSON / RON 序列化接口。
//!
//! 文本格式（空行忽略）：
//!
//! ```text
//! P T
//! F 的 P 行，每行 T 个非负整数
//! H 的 T 行，每行 P 个非负整数
//! M0 一行，P 个非负整数
//! ```
use std::fmt::Write as FmtWrite;
use std::fs;
use std::path::Path;

use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::core::{Net, ValidationError};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("ron parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Layout(#[from] LayoutError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    #[error("input is empty")]
    Empty,
    #[error("line {line}: expected `P T` header")]
    Header { line: usize },
    #[error("line {line}: `{token}` is not an integer")]
    Parse { line: usize, token: String },
    #[error("unexpected end of input: missing {section}")]
    MissingLine { section: String },
    #[error("line {line}: {section} has {found} values, expected {expected}")]
    RowLength {
        line: usize,
        section: String,
        expected: usize,
        found: usize,
    },
}

/// Tabular net description, as typed in or loaded from a file. Values stay
/// signed so that negative weights reach [`Net::from_matrices`] and are
/// reported there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetLayout {
    pub f: Vec<Vec<i64>>,
    pub h: Vec<Vec<i64>>,
    pub m0: Vec<i64>,
}

impl NetLayout {
    pub fn into_net(self) -> Result<Net, ValidationError> {
        Net::from_matrices(&self.f, &self.h, &self.m0)
    }
}

impl From<&Net> for NetLayout {
    fn from(net: &Net) -> Self {
        let signed = |rows: Vec<Vec<u64>>| -> Vec<Vec<i64>> {
            rows.into_iter()
                .map(|row| row.into_iter().map(|w| w as i64).collect())
                .collect()
        };
        Self {
            f: signed(net.input_table()),
            h: signed(net.output_table()),
            m0: net.places().iter().map(|p| p.tokens as i64).collect(),
        }
    }
}

pub fn parse_layout(input: &str) -> Result<NetLayout, LayoutError> {
    let mut lines = input
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines.next().ok_or(LayoutError::Empty)?;
    let header = parse_row(header_line, header)?;
    let [places, transitions] = header[..] else {
        return Err(LayoutError::Header { line: header_line });
    };
    let (Ok(places), Ok(transitions)) = (usize::try_from(places), usize::try_from(transitions))
    else {
        return Err(LayoutError::Header { line: header_line });
    };

    let mut next_row = |section: String, expected: usize| -> Result<Vec<i64>, LayoutError> {
        let (line, text) = lines
            .next()
            .ok_or_else(|| LayoutError::MissingLine { section: section.clone() })?;
        let row = parse_row(line, text)?;
        if row.len() != expected {
            return Err(LayoutError::RowLength {
                line,
                section,
                expected,
                found: row.len(),
            });
        }
        Ok(row)
    };

    let f = (0..places)
        .map(|p| next_row(format!("row {} of F", p + 1), transitions))
        .collect::<Result<Vec<_>, _>>()?;
    let h = (0..transitions)
        .map(|t| next_row(format!("row {} of H", t + 1), places))
        .collect::<Result<Vec<_>, _>>()?;
    let m0 = next_row("M0".to_string(), places)?;

    if let Some((line, _)) = lines.next() {
        log::warn!("ignoring trailing content starting at line {line}");
    }

    Ok(NetLayout { f, h, m0 })
}

fn parse_row(line: usize, text: &str) -> Result<Vec<i64>, LayoutError> {
    text.split_whitespace()
        .map(|token| {
            token.parse::<i64>().map_err(|_| LayoutError::Parse {
                line,
                token: token.to_string(),
            })
        })
        .collect()
}

pub fn to_layout_string(net: &Net) -> String {
    let join = |row: &[u64]| {
        row.iter()
            .map(|w| w.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    };
    let mut out = String::new();
    let _ = writeln!(out, "{} {}", net.places_len(), net.transitions_len());
    for row in net.input_table() {
        let _ = writeln!(out, "{}", join(&row));
    }
    for row in net.output_table() {
        let _ = writeln!(out, "{}", join(&row));
    }
    let m0 = net.places().iter().map(|p| p.tokens).collect::<Vec<_>>();
    let _ = writeln!(out, "{}", join(&m0));
    out
}

pub fn read_net<P: AsRef<Path>>(path: P) -> Result<Net, IoError> {
    let content = fs::read_to_string(path)?;
    Ok(parse_layout(&content)?.into_net()?)
}

pub fn write_net<P: AsRef<Path>>(path: P, net: &Net) -> Result<(), IoError> {
    fs::write(path, to_layout_string(net))?;
    Ok(())
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    let mut pretty = PrettyConfig::default();
    pretty.new_line = "\n".into();
    Ok(ron::ser::to_string_pretty(value, pretty)?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s)?)
}
