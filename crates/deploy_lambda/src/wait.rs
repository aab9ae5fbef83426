//! Bounded polling for asynchronous control-plane convergence.
//!
//! The control plane applies some updates in the background and rejects new
//! ones until the previous update settles. [`wait_until`] calls a status check at a
//! fixed interval until it reports a terminal state or the attempt budget is
//! spent. The sleep is synchronous; the calling invocation is suspended for the
//! whole wait.

use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_MAX_ATTEMPTS: u32 = 30;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    pub interval: Duration,
    /// Number of polls before giving up; always at least one poll is made.
    pub max_attempts: u32,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_POLL_MAX_ATTEMPTS,
        }
    }
}

impl WaitPolicy {
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            interval: Duration::ZERO,
            max_attempts,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum WaitError<E> {
    /// The check reported a terminal failure or could not be evaluated.
    Failed(E),
    /// Every attempt observed a non-terminal state.
    Exhausted { attempts: u32 },
}

/// Calls `check` until it returns `Ok(Some(_))`.
///
/// `Ok(None)` means "not settled yet" and schedules another attempt after
/// `policy.interval`. An `Err` stops polling immediately.
pub fn wait_until<T, E>(
    policy: &WaitPolicy,
    operation_name: &str,
    mut check: impl FnMut(u32) -> Result<Option<T>, E>,
) -> Result<T, WaitError<E>> {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        if let Some(value) = check(attempt).map_err(WaitError::Failed)? {
            return Ok(value);
        }

        if attempt < max_attempts {
            debug!(
                operation = %operation_name,
                attempt,
                delay_ms = policy.interval.as_millis() as u64,
                "not settled yet, polling again"
            );
            thread::sleep(policy.interval);
        }
    }

    warn!(
        operation = %operation_name,
        attempts = max_attempts,
        "gave up waiting for a terminal state"
    );
    Err(WaitError::Exhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_on_first_terminal_poll() {
        let mut polls = 0;
        let result: Result<&str, WaitError<String>> =
            wait_until(&WaitPolicy::immediate(3), "op", |_| {
                polls += 1;
                Ok(Some("done"))
            });

        assert_eq!(result, Ok("done"));
        assert_eq!(polls, 1);
    }

    #[test]
    fn keeps_polling_while_pending() {
        let result: Result<u32, WaitError<String>> =
            wait_until(&WaitPolicy::immediate(5), "op", |attempt| {
                Ok((attempt == 3).then_some(attempt))
            });

        assert_eq!(result, Ok(3));
    }

    #[test]
    fn exhausts_attempt_budget() {
        let mut polls = 0;
        let result: Result<(), WaitError<String>> =
            wait_until(&WaitPolicy::immediate(4), "op", |_| {
                polls += 1;
                Ok(None)
            });

        assert_eq!(result, Err(WaitError::Exhausted { attempts: 4 }));
        assert_eq!(polls, 4);
    }

    #[test]
    fn failure_stops_polling_immediately() {
        let mut polls = 0;
        let result: Result<(), WaitError<String>> =
            wait_until(&WaitPolicy::immediate(10), "op", |attempt| {
                polls += 1;
                if attempt == 2 {
                    Err("update failed".to_string())
                } else {
                    Ok(None)
                }
            });

        assert_eq!(result, Err(WaitError::Failed("update failed".to_string())));
        assert_eq!(polls, 2);
    }

    #[test]
    fn zero_attempts_still_polls_once() {
        let mut polls = 0;
        let result: Result<(), WaitError<String>> =
            wait_until(&WaitPolicy::immediate(0), "op", |_| {
                polls += 1;
                Ok(None)
            });

        assert_eq!(result, Err(WaitError::Exhausted { attempts: 1 }));
        assert_eq!(polls, 1);
    }
}
