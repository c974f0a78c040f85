//! Status probe parser - explicit line-pattern matching over helper output
//!
//! Each recognized line is `<Label><sep><token>` where `sep` is `:` (optionally
//! followed by whitespace). Leading decoration such as `✓ `, `[INFO] ` or `- `
//! is skipped before the label is matched. Unrecognized lines are ignored.
//!
//! Known labels:
//! - `Root access: Granted|Denied`
//! - `Device: Connected|Disconnected`
//! - `Memory: <used>/<total> MB`
//! - `Storage free: <bytes>` or a size with a `K`/`M`/`G`/`T` suffix (`12G`, `1.5G`)
//!
//! The parse fails when neither root nor device state is present, or when a
//! recognized label carries a value it cannot read. A failed parse never yields
//! a partial report.

use thiserror::Error;

const ROOT_LABEL: &str = "Root access";
const DEVICE_LABEL: &str = "Device";
const MEMORY_LABEL: &str = "Memory";
const STORAGE_LABEL: &str = "Storage free";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeParseError {
    #[error("Probe output contains no known status fields")]
    NoKnownFields,

    #[error("Unexpected token for '{label}': {token}")]
    InvalidToken { label: String, token: String },

    #[error("Unreadable value for '{label}': {value}")]
    InvalidValue { label: String, value: String },
}

/// Fields read from one probe's output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeReport {
    pub root_granted: Option<bool>,
    pub device_connected: Option<bool>,
    /// (used, total) in MB
    pub memory_mb: Option<(u64, u64)>,
    pub storage_free_bytes: Option<u64>,
}

/// Match `line` against `label` and return the text after the separator
///
/// The label must be followed directly by `:`, so `Device` does not match
/// `Devices attached`.
pub fn match_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let body = line.trim_start_matches(|c: char| !c.is_alphanumeric());
    let body = skip_bracket_tag(body);
    let rest = body.strip_prefix(label)?;
    let value = rest.trim_start_matches([' ', '\t']).strip_prefix(':')?;
    Some(value.trim())
}

/// Skip one leading `[TAG] ` decoration (e.g. `[INFO] Root access: Granted`)
fn skip_bracket_tag(body: &str) -> &str {
    // The leading '[' was already stripped as decoration, so look for "TAG] "
    match body.find("] ") {
        Some(end) if body[..end].chars().all(|c| c.is_ascii_alphanumeric()) => {
            body[end + 2..].trim_start()
        }
        _ => body,
    }
}

/// Parse the full output of a status probe
pub fn parse_probe_output<S: AsRef<str>>(lines: &[S]) -> Result<ProbeReport, ProbeParseError> {
    let mut report = ProbeReport::default();

    for line in lines {
        let line = line.as_ref();

        if let Some(value) = match_label(line, ROOT_LABEL) {
            report.root_granted = Some(parse_choice(ROOT_LABEL, value, "granted", "denied")?);
        } else if let Some(value) = match_label(line, STORAGE_LABEL) {
            report.storage_free_bytes = Some(parse_size(STORAGE_LABEL, value)?);
        } else if let Some(value) = match_label(line, DEVICE_LABEL) {
            report.device_connected =
                Some(parse_choice(DEVICE_LABEL, value, "connected", "disconnected")?);
        } else if let Some(value) = match_label(line, MEMORY_LABEL) {
            report.memory_mb = Some(parse_memory(value)?);
        }
    }

    if report.root_granted.is_none() && report.device_connected.is_none() {
        return Err(ProbeParseError::NoKnownFields);
    }
    Ok(report)
}

/// First whitespace-delimited token, compared case-insensitively
fn parse_choice(
    label: &str,
    value: &str,
    yes: &str,
    no: &str,
) -> Result<bool, ProbeParseError> {
    let token = value.split_whitespace().next().unwrap_or("");
    if token.eq_ignore_ascii_case(yes) {
        Ok(true)
    } else if token.eq_ignore_ascii_case(no) {
        Ok(false)
    } else {
        Err(ProbeParseError::InvalidToken {
            label: label.to_string(),
            token: token.to_string(),
        })
    }
}

/// `<used>/<total>` with an optional `MB` suffix
fn parse_memory(value: &str) -> Result<(u64, u64), ProbeParseError> {
    let invalid = || ProbeParseError::InvalidValue {
        label: MEMORY_LABEL.to_string(),
        value: value.to_string(),
    };

    let numbers = value
        .trim_end_matches(|c: char| c.is_ascii_alphabetic() || c.is_whitespace())
        .trim();
    let (used, total) = numbers.split_once('/').ok_or_else(invalid)?;
    let used: u64 = used.trim().parse().map_err(|_| invalid())?;
    let total: u64 = total.trim().parse().map_err(|_| invalid())?;
    if used > total {
        return Err(invalid());
    }
    Ok((used, total))
}

/// Plain byte count or a `df -h` style size (`512M`, `1.5G`, `12GB`)
pub fn parse_size(label: &str, value: &str) -> Result<u64, ProbeParseError> {
    let invalid = || ProbeParseError::InvalidValue {
        label: label.to_string(),
        value: value.to_string(),
    };

    let token = value.split_whitespace().next().ok_or_else(invalid)?;
    let token = token
        .strip_suffix("iB")
        .or_else(|| token.strip_suffix('B'))
        .unwrap_or(token);

    let (number, multiplier) = match token.chars().last() {
        Some(unit) if unit.is_ascii_alphabetic() => {
            let power = match unit.to_ascii_uppercase() {
                'K' => 1,
                'M' => 2,
                'G' => 3,
                'T' => 4,
                _ => return Err(invalid()),
            };
            (&token[..token.len() - 1], 1024_u64.pow(power))
        }
        _ => (token, 1),
    };

    if multiplier == 1 {
        return number.parse::<u64>().map_err(|_| invalid());
    }
    let scalar: f64 = number.parse().map_err(|_| invalid())?;
    if !scalar.is_finite() || scalar < 0.0 {
        return Err(invalid());
    }
    Ok((scalar * multiplier as f64).round() as u64)
}
