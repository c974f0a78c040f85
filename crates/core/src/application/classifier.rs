//! Output classifier - marker-based severity tagging for output lines
//!
//! Rules, first match wins:
//! 1. leading success glyph (`✓`, `✅`)            → SUCCESS
//! 2. contains `ERROR` or leading `✗` / `❌`        → ERROR
//! 3. contains `WARN` or leading `⚠`                → WARN
//! 4. anything else                                 → INFO
//!
//! Markers are case-sensitive substrings, not a log-level grammar.

use crate::domain::Severity;

const SUCCESS_GLYPHS: &[char] = &['✓', '✅'];
const ERROR_GLYPHS: &[char] = &['✗', '❌'];
const WARN_GLYPHS: &[char] = &['⚠'];

const ERROR_MARKER: &str = "ERROR";
const WARN_MARKER: &str = "WARN";

/// Assign a severity to one line of output. Never fails.
pub fn classify(line: &str) -> Severity {
    let head = line.trim_start();

    if head.starts_with(SUCCESS_GLYPHS) {
        return Severity::Success;
    }
    if line.contains(ERROR_MARKER) || head.starts_with(ERROR_GLYPHS) {
        return Severity::Error;
    }
    if line.contains(WARN_MARKER) || head.starts_with(WARN_GLYPHS) {
        return Severity::Warn;
    }
    Severity::Info
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_lines_are_info() {
        assert_eq!(classify("Root access: Granted"), Severity::Info);
        assert_eq!(classify(""), Severity::Info);
        assert_eq!(classify("   "), Severity::Info);
        assert_eq!(classify("garbage text \u{0}\u{7f} ��"), Severity::Info);
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        assert_eq!(classify("[ERROR] su binary missing"), Severity::Error);
        assert_eq!(classify("error: lowercase is not a marker"), Severity::Info);
        assert_eq!(classify("WARNING: selinux enforcing"), Severity::Warn);
        assert_eq!(classify("warn: lowercase"), Severity::Info);
    }

    #[test]
    fn test_error_wins_over_warn() {
        assert_eq!(classify("WARN then ERROR"), Severity::Error);
    }

    #[test]
    fn test_success_glyph_checked_first() {
        assert_eq!(classify("✓ bash installed successfully"), Severity::Success);
        assert_eq!(classify("  ✅ Found: Termux SU"), Severity::Success);
        // Success glyph wins even when the text carries an error marker
        assert_eq!(classify("✓ cleared ERROR flag"), Severity::Success);
        // Only a leading glyph counts
        assert_eq!(classify("done ✓"), Severity::Info);
    }

    #[test]
    fn test_failure_glyphs() {
        assert_eq!(classify("✗ Failed to install curl"), Severity::Error);
        assert_eq!(classify("❌ Superuser script not found"), Severity::Error);
        assert_eq!(classify("⚠️ Command timed out"), Severity::Warn);
    }
}
