use std::time::Duration;

use metrics::{counter, histogram};

use super::InternalEvent;

#[derive(Debug)]
pub struct PollSatisfied<'a> {
    pub what: &'a str,
    pub attempts: usize,
    pub elapsed: Duration,
}

impl InternalEvent for PollSatisfied<'_> {
    fn emit(self) {
        debug!(
            message = "Condition met.",
            what = %self.what,
            attempts = %self.attempts,
            elapsed = ?self.elapsed,
        );
        counter!("poll_attempts_total", "outcome" => "satisfied").increment(self.attempts as u64);
        histogram!("poll_wait_seconds").record(self.elapsed);
    }
}

#[derive(Debug)]
pub struct PollTransientError<'a> {
    pub what: &'a str,
    pub error: &'a crate::Error,
    pub attempts: usize,
}

impl InternalEvent for PollTransientError<'_> {
    fn emit(self) {
        debug!(
            message = "Query failed, retrying.",
            what = %self.what,
            error = %self.error,
            attempts = %self.attempts,
        );
        counter!("poll_transient_errors_total").increment(1);
    }
}

#[derive(Debug)]
pub struct PollRejected<'a> {
    pub what: &'a str,
    pub error: &'a crate::Error,
}

impl InternalEvent for PollRejected<'_> {
    fn emit(self) {
        error!(
            message = "Query failed permanently.",
            what = %self.what,
            error = %self.error,
            error_type = "request_failed",
        );
        counter!(
            "component_errors_total",
            "error_type" => "request_failed",
            "stage" => "polling",
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct PollTimedOut<'a> {
    pub what: &'a str,
    pub waited: Duration,
    pub attempts: usize,
}

impl InternalEvent for PollTimedOut<'_> {
    fn emit(self) {
        warn!(
            message = "Condition not met before the deadline.",
            what = %self.what,
            waited = ?self.waited,
            attempts = %self.attempts,
        );
        counter!("poll_attempts_total", "outcome" => "timed_out").increment(self.attempts as u64);
        counter!("poll_timeouts_total").increment(1);
    }
}
