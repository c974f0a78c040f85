//! Privileged helper invocation - builds CommandRequests for `<wrapper> <helper> <subcommand>`
//!
//! The subcommand vocabulary is open: any string is passed through as
//! whitespace-separated tokens. The names below are the ones the helper ships with.

use crate::domain::CommandRequest;
use crate::port::IdProvider;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Known helper subcommands
pub mod actions {
    pub const CHECK: &str = "check";
    pub const CHECK_DETAIL: &str = "check detail";
    pub const BACKUP: &str = "backup";
    pub const ANDROID_USER: &str = "android-user";
    pub const PERFORMANCE_TEST: &str = "performance-test";
    pub const INTERACTIVE: &str = "interactive";
}

/// Factory for helper and shell requests
pub struct HelperInvoker {
    helper_path: PathBuf,
    /// e.g. `sudo`, `sudo -n` or `su -c`; None runs the helper directly
    privilege_wrapper: Option<String>,
    id_provider: Arc<dyn IdProvider>,
}

impl HelperInvoker {
    pub fn new(
        helper_path: impl Into<PathBuf>,
        privilege_wrapper: Option<String>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            helper_path: helper_path.into(),
            privilege_wrapper: privilege_wrapper.filter(|w| !w.trim().is_empty()),
            id_provider,
        }
    }

    pub fn helper_path(&self) -> &Path {
        &self.helper_path
    }

    /// Request for `<wrapper> <helper> <subcommand tokens>`
    ///
    /// A wrapper ending in `-c` (`su -c`, `tsu -c`) takes one command string,
    /// so the helper and its subcommand are quoted into a single argument.
    ///
    /// # Example
    /// ```text
    /// let req = invoker.request(actions::CHECK_DETAIL, Duration::from_secs(60));
    /// // sudo:  ["sudo", "/opt/su/Superuser_main", "check", "detail"]
    /// // su -c: ["su", "-c", "'/opt/su/Superuser_main' 'check' 'detail'"]
    /// ```
    pub fn request(&self, subcommand: &str, timeout: Duration) -> CommandRequest {
        let mut invocation = vec![self.helper_path.to_string_lossy().into_owned()];
        invocation.extend(subcommand.split_whitespace().map(str::to_string));

        let wrapper: Vec<String> = self
            .privilege_wrapper
            .as_deref()
            .map(|w| w.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        let argv: Vec<String> = if wrapper.last().map(String::as_str) == Some("-c") {
            let line = invocation
                .iter()
                .map(|token| shell_quote(token))
                .collect::<Vec<_>>()
                .join(" ");
            wrapper.into_iter().chain(std::iter::once(line)).collect()
        } else {
            wrapper.into_iter().chain(invocation).collect()
        };

        CommandRequest::argv(self.id_provider.generate_id(), argv, timeout)
            .with_label(subcommand.trim())
            .privileged(true)
            .requiring_path(&self.helper_path)
    }

    /// Request for an ad-hoc, unprivileged shell line
    pub fn shell(&self, line: &str, timeout: Duration) -> CommandRequest {
        CommandRequest::shell(self.id_provider.generate_id(), line, timeout)
    }
}

/// Single-quote a token for `sh`
fn shell_quote(token: &str) -> String {
    format!("'{}'", token.replace('\'', "'\\''"))
}
