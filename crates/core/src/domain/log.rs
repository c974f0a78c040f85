// Log Domain Model - user-facing log lines (distinct from internal tracing)

use super::command::RequestId;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

/// Severity tag assigned to a log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warn,
    Error,
    Success,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Warn => write!(f, "WARN"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Success => write!(f, "SUCCESS"),
        }
    }
}

/// One log line delivered to the EventSink
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub text: String,
    /// Command that produced the line, None for engine-level messages
    pub request_id: Option<RequestId>,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            timestamp,
            severity,
            text: text.into(),
            request_id: None,
        }
    }

    pub fn for_request(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// `[HH:MM:SS] [LEVEL] text`, local wall-clock time
    pub fn format_line(&self) -> String {
        let local: DateTime<Local> = self.timestamp.with_timezone(&Local);
        format!("[{}] [{}] {}", local.format("%H:%M:%S"), self.severity, self.text)
    }
}

/// Severity filter for viewing a LogBook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFilter {
    #[default]
    All,
    Only(Severity),
}

impl LogFilter {
    pub fn matches(&self, entry: &LogEntry) -> bool {
        match self {
            LogFilter::All => true,
            LogFilter::Only(severity) => entry.severity == *severity,
        }
    }
}

impl std::str::FromStr for LogFilter {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Ok(LogFilter::All),
            "INFO" => Ok(LogFilter::Only(Severity::Info)),
            "WARN" => Ok(LogFilter::Only(Severity::Warn)),
            "ERROR" => Ok(LogFilter::Only(Severity::Error)),
            "SUCCESS" => Ok(LogFilter::Only(Severity::Success)),
            other => Err(format!("unknown log filter: {}", other)),
        }
    }
}

/// Append-only, arrival-ordered log history
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogBook {
    entries: Vec<LogEntry>,
}

impl LogBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn filtered(&self, filter: LogFilter) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| filter.matches(e))
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.filtered(LogFilter::Only(severity)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(severity: Severity, text: &str) -> LogEntry {
        LogEntry::new(Utc::now(), severity, text)
    }

    #[test]
    fn test_log_book_keeps_arrival_order() {
        let mut book = LogBook::new();
        book.append(entry(Severity::Info, "first"));
        book.append(entry(Severity::Error, "second"));
        book.append(entry(Severity::Info, "third"));

        let texts: Vec<&str> = book.entries().iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
        assert_eq!(book.count(Severity::Info), 2);

        let errors: Vec<&LogEntry> = book.filtered("error".parse().unwrap()).collect();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text, "second");
    }

    #[test]
    fn test_filter_parse() {
        assert_eq!("ALL".parse::<LogFilter>(), Ok(LogFilter::All));
        assert_eq!("warn".parse::<LogFilter>(), Ok(LogFilter::Only(Severity::Warn)));
        assert!("verbose".parse::<LogFilter>().is_err());
    }

    #[test]
    fn test_format_line_shape() {
        let line = entry(Severity::Warn, "disk almost full").format_line();
        assert!(line.starts_with('['));
        assert!(line.ends_with("[WARN] disk almost full"));
    }
}
