use std::fmt;

use crate::request::RequestContext;

/// Request-scoped logging for one resolution.
///
/// Every record carries the request id, so log lines from the risk gate, the
/// resolvers and the hooks of one login can be correlated.
///
/// It borrows the request context and cannot outlive it.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionLog<'a> {
    request_id: &'a str,
}

impl<'a> ResolutionLog<'a> {
    /// Creates a log bound to the given context.
    pub fn for_request(ctx: &'a RequestContext) -> Self {
        Self {
            request_id: ctx.request_id(),
        }
    }

    /// Returns the request ID associated with this logger.
    pub fn request_id(&self) -> &str {
        self.request_id
    }

    /// Logs an info-level message with request ID.
    pub fn info(&self, args: fmt::Arguments<'_>) {
        tracing::info!(request_id = %self.request_id, "{}", args);
    }

    /// Logs a warning-level message with request ID.
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        tracing::warn!(request_id = %self.request_id, "{}", args);
    }

    /// Logs a debug-level message with request ID.
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        tracing::debug!(request_id = %self.request_id, "{}", args);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_is_bound_to_request_id() {
        let ctx = RequestContext::builder("req-log").build();
        let log = ResolutionLog::for_request(&ctx);
        assert_eq!(log.request_id(), "req-log");

        // Emitting without a subscriber must not panic
        log.info(format_args!("resolved {}", "success"));
        log.warn(format_args!("denied"));
        log.debug(format_args!("trace"));
    }
}
