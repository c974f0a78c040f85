// Panic isolation for execution tasks
use std::any::Any;
use tokio::task::JoinError;
use tracing::error;

/// Extract a readable message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Describe why a spawned execution task did not return
///
/// Execution runs in its own tokio task so a panic surfaces here as a
/// `JoinError` instead of unwinding through the queue worker.
pub fn describe_join_error(join_err: JoinError) -> String {
    if join_err.is_panic() {
        let msg = panic_message(join_err.into_panic().as_ref());
        error!(panic_msg = %msg, "Execution task panicked");
        format!("execution task panicked: {}", msg)
    } else {
        error!("Execution task was aborted");
        "execution task was aborted".to_string()
    }
}
