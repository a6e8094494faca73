//! `%`-style format strings such as `[%(levelname)-8s] %(name)-17s %(message)s`.
//!
//! Tokens are parsed once at construction. A field may carry a `-` flag for
//! left alignment, a minimum width, and one of the `s`, `d` or `f`
//! conversions. Unknown keys are looked up in the record's extra fields and
//! left verbatim when absent.

use std::borrow::Cow;
use std::fmt::Write as _;
use std::time::UNIX_EPOCH;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};

use super::{FemtoFormatter, SharedFormatter, append_unconditional_exception};
use crate::log_record::FemtoLogRecord;

/// Date format used for `%(asctime)s` when none is configured.
pub const DEFAULT_DATEFMT: &str = "%Y-%m-%d %H:%M:%S";
/// Upper bound applied when widening the logger name column.
pub const MAX_NAME_WIDTH: usize = 80;

/// Check that `datefmt` only uses strftime specifiers chrono understands.
pub fn validate_datefmt(datefmt: &str) -> Result<(), String> {
    if StrftimeItems::new(datefmt).any(|item| matches!(item, Item::Error)) {
        return Err(format!("invalid datefmt {datefmt:?}"));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(String),
    Field(Field),
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Field {
    key: String,
    left_align: bool,
    width: Option<usize>,
    conversion: char,
    source: String,
}

enum Value<'a> {
    Text(Cow<'a, str>),
    Int(i64),
    Float(f64),
}

#[derive(Clone, Debug)]
pub struct PercentFormatter {
    fmt: String,
    datefmt: Option<String>,
    tokens: Vec<Token>,
}

impl PercentFormatter {
    /// Parse `fmt` using the default date format.
    pub fn new(fmt: impl Into<String>) -> Self {
        let fmt = fmt.into();
        let tokens = parse(&fmt);
        Self {
            fmt,
            datefmt: None,
            tokens,
        }
    }

    /// Set the strftime-style format used by `%(asctime)s`.
    pub fn with_datefmt(mut self, datefmt: impl Into<String>) -> Self {
        self.datefmt = Some(datefmt.into());
        self
    }

    /// The format string this formatter was built from.
    pub fn format_string(&self) -> &str {
        &self.fmt
    }

    pub fn datefmt(&self) -> Option<&str> {
        self.datefmt.as_deref()
    }

    /// Width of the first `%(name)-Ns` field, if present.
    pub fn name_width(&self) -> Option<usize> {
        self.tokens.iter().find_map(|token| match token {
            Token::Field(field) if field.key == "name" && field.left_align => field.width,
            _ => None,
        })
    }

    /// Copy of this formatter with the name column at least `width` wide.
    ///
    /// Returns `None` when there is no `%(name)-Ns` field or it is already
    /// at least as wide, so repeated calls are idempotent.
    pub fn widened(&self, width: usize) -> Option<Self> {
        let current = self.name_width()?;
        if current >= width {
            return None;
        }
        let needle = format!("%(name)-{current}s");
        let fmt = self.fmt.replacen(&needle, &format!("%(name)-{width}s"), 1);
        Some(Self {
            tokens: parse(&fmt),
            fmt,
            datefmt: self.datefmt.clone(),
        })
    }

    fn asctime(&self, record: &FemtoLogRecord) -> String {
        let local: DateTime<Local> = record.metadata.timestamp.into();
        if let Some(datefmt) = &self.datefmt {
            let mut out = String::new();
            if write!(out, "{}", local.format(datefmt)).is_ok() {
                return out;
            }
        }
        format!(
            "{},{:03}",
            local.format(DEFAULT_DATEFMT),
            local.timestamp_subsec_millis()
        )
    }

    fn lookup<'a>(&self, key: &str, record: &'a FemtoLogRecord) -> Option<Value<'a>> {
        let created = record
            .metadata
            .timestamp
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let value = match key {
            "name" => Value::Text(Cow::Borrowed(record.logger())),
            "levelname" => Value::Text(Cow::Owned(record.level_str())),
            "levelno" => Value::Int(i64::from(record.level().value())),
            "message" => Value::Text(record.message()),
            "asctime" => Value::Text(Cow::Owned(self.asctime(record))),
            "created" => Value::Float(created.as_secs_f64()),
            "msecs" => Value::Int(i64::from(created.subsec_millis())),
            "process" => Value::Int(i64::from(record.metadata.process_id)),
            "thread" => Value::Int(thread_number(record)),
            "threadName" => Value::Text(Cow::Borrowed(
                record.metadata.thread_name.as_deref().unwrap_or("unnamed"),
            )),
            "module" => Value::Text(Cow::Borrowed(&record.metadata.module_path)),
            "filename" => Value::Text(Cow::Borrowed(&record.metadata.filename)),
            "lineno" => Value::Int(i64::from(record.metadata.line_number)),
            "bracketname" => Value::Text(Cow::Owned(format!("[{:<17}]", record.logger()))),
            "bracketlevel" => Value::Text(Cow::Owned(format!("[{:<8}]", record.level_str()))),
            "bracketprocess" => {
                Value::Text(Cow::Owned(format!("[{:>5}]", record.metadata.process_id)))
            }
            other => Value::Text(record.metadata.key_values.get(other)?.display_text()),
        };
        Some(value)
    }
}

impl FemtoFormatter for PercentFormatter {
    fn format(&self, record: &FemtoLogRecord) -> String {
        let mut output = String::with_capacity(self.fmt.len() + 64);
        for token in &self.tokens {
            match token {
                Token::Literal(text) => output.push_str(text),
                Token::Field(field) => match self.lookup(&field.key, record) {
                    Some(value) => write_field(&mut output, field, value),
                    None => output.push_str(&field.source),
                },
            }
        }
        append_unconditional_exception(&mut output, record);
        output
    }

    fn widen_name_field(&self, width: usize) -> Option<SharedFormatter> {
        self.widened(width).map(SharedFormatter::new)
    }
}

fn write_field(output: &mut String, field: &Field, value: Value<'_>) {
    let rendered: Cow<'_, str> = match (field.conversion, value) {
        ('d', Value::Int(i)) => Cow::Owned(i.to_string()),
        ('d', Value::Float(f)) => Cow::Owned((f as i64).to_string()),
        ('f', Value::Int(i)) => Cow::Owned(format!("{:.6}", i as f64)),
        ('f', Value::Float(f)) => Cow::Owned(format!("{f:.6}")),
        (_, Value::Text(text)) => text,
        (_, Value::Int(i)) => Cow::Owned(i.to_string()),
        (_, Value::Float(f)) => Cow::Owned(f.to_string()),
    };
    let width = field.width.unwrap_or(0);
    // Width counts characters, matching how the columns line up on screen.
    let _ = if field.left_align {
        write!(output, "{rendered:<width$}")
    } else {
        write!(output, "{rendered:>width$}")
    };
}

fn thread_number(record: &FemtoLogRecord) -> i64 {
    let debug = format!("{:?}", record.metadata.thread_id);
    debug
        .chars()
        .filter(char::is_ascii_digit)
        .collect::<String>()
        .parse()
        .unwrap_or_default()
}

fn parse(fmt: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = fmt;
    while let Some(pos) = rest.find('%') {
        literal.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("%%") {
            literal.push('%');
            rest = after;
            continue;
        }
        match parse_field(tail) {
            Some((field, consumed)) => {
                if !literal.is_empty() {
                    tokens.push(Token::Literal(std::mem::take(&mut literal)));
                }
                tokens.push(Token::Field(field));
                rest = &tail[consumed..];
            }
            None => {
                literal.push('%');
                rest = &tail[1..];
            }
        }
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    tokens
}

/// Parse `%(key)[-][width]conv` at the start of `input`.
fn parse_field(input: &str) -> Option<(Field, usize)> {
    let body = input.strip_prefix("%(")?;
    let close = body.find(')')?;
    let key = &body[..close];
    let mut idx = 2 + close + 1;
    let bytes = input.as_bytes();

    let left_align = bytes.get(idx) == Some(&b'-');
    if left_align {
        idx += 1;
    }
    let digits_start = idx;
    while bytes.get(idx).is_some_and(u8::is_ascii_digit) {
        idx += 1;
    }
    let width = input[digits_start..idx].parse().ok();
    let conversion = match bytes.get(idx) {
        Some(b's') => 's',
        Some(b'd') => 'd',
        Some(b'f') => 'f',
        _ => return None,
    };
    idx += 1;
    Some((
        Field {
            key: key.to_owned(),
            left_align,
            width,
            conversion,
            source: input[..idx].to_owned(),
        },
        idx,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::FemtoLevel;
    use rstest::rstest;

    fn record() -> FemtoLogRecord {
        FemtoLogRecord::new("salt.minion", FemtoLevel::WARNING, "disk %s full").with_args(["/var"])
    }

    #[rstest]
    #[case("%(message)s", "disk /var full")]
    #[case("[%(levelname)-8s] %(message)s", "[WARNING ] disk /var full")]
    #[case("%(name)-15s|", "salt.minion    |")]
    #[case("%(name)15s|", "    salt.minion|")]
    #[case("%(levelno)d 100%%", "30 100%")]
    #[case("%(bracketlevel)s", "[WARNING ]")]
    #[case("%(missing)s", "%(missing)s")]
    #[case("50% off %(message)s", "50% off disk /var full")]
    fn renders_fields(#[case] fmt: &str, #[case] expected: &str) {
        assert_eq!(PercentFormatter::new(fmt).format(&record()), expected);
    }

    #[test]
    fn renders_extra_fields() {
        let record = record().with_extra("jid", "20261014120000");
        let output = PercentFormatter::new("[%(jid)s] %(message)s").format(&record);
        assert_eq!(output, "[20261014120000] disk /var full");
    }

    #[test]
    fn asctime_honours_datefmt() {
        let output = PercentFormatter::new("%(asctime)s")
            .with_datefmt("%Y")
            .format(&record());
        assert_eq!(output.len(), 4);
        assert!(output.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn unknown_datefmt_specifier_falls_back_to_default_layout() {
        let output = PercentFormatter::new("%(asctime)s %(message)s")
            .with_datefmt("%Q")
            .format(&record());
        assert!(output.ends_with(" disk /var full"));
        assert_eq!(output.len(), "2026-10-14 12:00:00,000 disk /var full".len());
    }

    #[rstest]
    #[case("%Y-%m-%d %H:%M:%S", true)]
    #[case("%Q", false)]
    fn datefmt_validation(#[case] datefmt: &str, #[case] valid: bool) {
        assert_eq!(validate_datefmt(datefmt).is_ok(), valid);
    }

    #[test]
    fn widening_grows_name_column_once() {
        let formatter = PercentFormatter::new("%(name)-10s %(message)s");
        let wider = formatter.widened(20).expect("should widen");
        assert_eq!(wider.format_string(), "%(name)-20s %(message)s");
        assert_eq!(wider.name_width(), Some(20));
        assert!(wider.widened(20).is_none());
        assert!(wider.widened(12).is_none());
    }

    #[test]
    fn widening_ignores_formats_without_width() {
        assert!(PercentFormatter::new("%(name)s %(message)s").widened(30).is_none());
        assert!(PercentFormatter::new("%(message)s").widened(30).is_none());
    }
}
