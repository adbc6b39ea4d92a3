use tracing::error;

/// Receives faults that must be recorded but never alter ad flow
pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &str, message: &str);
}

/// Reporter that writes faults to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogErrorReporter;

impl ErrorReporter for LogErrorReporter {
    fn report(&self, context: &str, message: &str) {
        error!(context = context, "{}", message);
    }
}
