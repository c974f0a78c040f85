// Dependency check - looks up the helper's external tools on PATH
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::{info, warn};

use suterm_core::domain::{LogEntry, Severity};
use suterm_core::port::{EventSink, TimeProvider};

/// Tools the helper script shells out to
pub const REQUIRED_TOOLS: &[&str] = &[
    "bash", "curl", "grep", "awk", "sed", "find", "xargs", "mkdir", "rm", "touch", "chmod",
    "chown",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyReport {
    pub found: Vec<(String, PathBuf)>,
    pub missing: Vec<String>,
}

impl DependencyReport {
    pub fn is_satisfied(&self) -> bool {
        self.missing.is_empty()
    }
}

/// First executable named `tool` in the directories of `path_var`
pub fn find_in_path(tool: &str, path_var: &OsStr) -> Option<PathBuf> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    which::which_in(tool, Some(path_var), cwd).ok()
}

/// Elevation tools in preference order, with the wrapper each one becomes
pub const ROOT_METHODS: &[(&str, &str)] = &[("tsu", "tsu -c"), ("su", "su -c"), ("sudo", "sudo")];

/// Pick the first available root method on `path_var` (`privilege_wrapper = "auto"`)
///
/// Logs `✅ Found: <tool>` (SUCCESS) for the choice, or `❌ No root access method found`
/// (ERROR) and returns None, in which case the helper runs unwrapped.
pub fn detect_privilege_wrapper(
    methods: &[(&str, &str)],
    path_var: &OsStr,
    sink: &dyn EventSink,
    time_provider: &dyn TimeProvider,
) -> Option<String> {
    for (tool, wrapper) in methods {
        if let Some(location) = find_in_path(tool, path_var) {
            sink.on_log_entry(LogEntry::new(
                time_provider.now(),
                Severity::Success,
                format!("✅ Found: {} ({})", tool, location.display()),
            ));
            info!(tool = %tool, wrapper = %wrapper, "Root method detected");
            return Some(wrapper.to_string());
        }
    }

    sink.on_log_entry(LogEntry::new(
        time_provider.now(),
        Severity::Error,
        "❌ No root access method found",
    ));
    warn!("No root method on PATH, running helper without a wrapper");
    None
}

/// Check `tools` against `path_var`, reporting each one to the sink
///
/// Emits `✓ <tool> found` (SUCCESS) or `✗ <tool> missing` (ERROR), then a summary line.
pub fn check_dependencies(
    tools: &[&str],
    path_var: &OsStr,
    sink: &dyn EventSink,
    time_provider: &dyn TimeProvider,
) -> DependencyReport {
    let mut report = DependencyReport::default();

    for tool in tools {
        match find_in_path(tool, path_var) {
            Some(location) => {
                sink.on_log_entry(LogEntry::new(
                    time_provider.now(),
                    Severity::Success,
                    format!("✓ {} found ({})", tool, location.display()),
                ));
                report.found.push((tool.to_string(), location));
            }
            None => {
                sink.on_log_entry(LogEntry::new(
                    time_provider.now(),
                    Severity::Error,
                    format!("✗ {} missing", tool),
                ));
                report.missing.push(tool.to_string());
            }
        }
    }

    let summary = if report.is_satisfied() {
        LogEntry::new(time_provider.now(), Severity::Info, "All dependencies are satisfied")
    } else {
        LogEntry::new(
            time_provider.now(),
            Severity::Warn,
            format!("Missing dependencies: {}", report.missing.join(", ")),
        )
    };
    sink.on_log_entry(summary);

    info!(
        found = report.found.len(),
        missing = report.missing.len(),
        "Dependency check completed"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsString;
    use std::path::Path;
    use suterm_core::port::event_sink::mocks::RecordingEventSink;
    use suterm_core::port::time_provider::SystemTimeProvider;

    fn fake_tool(dir: &Path, name: &str, executable: bool) {
        let path = dir.join(name);
        std::fs::write(&path, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        }
    }

    #[test]
    fn test_find_in_path_skips_non_executables() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fake_tool(first.path(), "awk", false);
        fake_tool(second.path(), "awk", true);

        let path_var = std::env::join_paths([first.path(), second.path()]).unwrap();
        let found = find_in_path("awk", &path_var).unwrap();
        assert_eq!(
            found.canonicalize().unwrap(),
            second.path().join("awk").canonicalize().unwrap()
        );
        assert_eq!(find_in_path("sed", &path_var), None);
    }

    #[test]
    fn test_detect_prefers_earlier_root_method() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "su", true);
        fake_tool(dir.path(), "sudo", true);
        let path_var = OsString::from(dir.path());
        let sink = RecordingEventSink::new();

        let wrapper = detect_privilege_wrapper(ROOT_METHODS, &path_var, &sink, &SystemTimeProvider);

        assert_eq!(wrapper.as_deref(), Some("su -c"));
        let success = sink.logs_with(Severity::Success);
        assert_eq!(success.len(), 1);
        assert!(success[0].text.starts_with("✅ Found: su"));
    }

    #[test]
    fn test_detect_without_root_method() {
        let dir = tempfile::tempdir().unwrap();
        let path_var = OsString::from(dir.path());
        let sink = RecordingEventSink::new();

        assert_eq!(
            detect_privilege_wrapper(ROOT_METHODS, &path_var, &sink, &SystemTimeProvider),
            None
        );
        let errors = sink.logs_with(Severity::Error);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].text, "❌ No root access method found");
    }

    #[test]
    fn test_check_reports_each_tool() {
        let dir = tempfile::tempdir().unwrap();
        fake_tool(dir.path(), "bash", true);
        let path_var = OsString::from(dir.path());
        let sink = RecordingEventSink::new();

        let report = check_dependencies(&["bash", "curl"], &path_var, &sink, &SystemTimeProvider);

        assert!(!report.is_satisfied());
        assert_eq!(report.missing, vec!["curl".to_string()]);
        let success = sink.logs_with(Severity::Success);
        assert_eq!(success.len(), 1);
        assert!(success[0].text.starts_with("✓ bash found"));
        let errors = sink.logs_with(Severity::Error);
        assert_eq!(errors[0].text, "✗ curl missing");
        assert_eq!(sink.logs_with(Severity::Warn).len(), 1);
    }
}
