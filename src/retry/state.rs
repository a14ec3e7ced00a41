//! State-change poller.
//!
//! A [`StateChangeConf`] repeatedly calls a refresh function that maps the
//! current AWS view of a resource to a status string, until the status lands
//! in the target set, leaves the pending set, or the timeout elapses.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, trace, warn};

use crate::error::{AwsformError, NotFoundError, Result, TimeoutError, UnexpectedStateError};

/// Default number of consecutive "not found" refreshes tolerated.
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Upper bound of the exponential backoff between refreshes.
pub const MAX_BACKOFF: Duration = Duration::from_secs(10);

/// Time a refresh still running at the deadline is given to finish.
pub const REFRESH_GRACE_PERIOD: Duration = Duration::from_secs(30);

/// Poll intervals at or above this value are ignored.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(180);

/// Starting value of the backoff schedule.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Configuration of a state wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateChangeConf {
    /// States that mean "still working on it".
    pub pending: Vec<String>,
    /// States that mean "done".
    pub target: Vec<String>,
    /// Overall deadline, measured from the start of the wait.
    pub timeout: Duration,
    /// Initial sleep before the first refresh.
    pub delay: Duration,
    /// Lower bound of the wait between refreshes.
    pub min_timeout: Duration,
    /// Fixed wait between refreshes, overriding the backoff when in (0, 180s).
    pub poll_interval: Duration,
    /// Consecutive "not found" refreshes tolerated before failing; zero
    /// means [`DEFAULT_NOT_FOUND_CHECKS`].
    pub not_found_checks: u32,
    /// Consecutive target hits required before succeeding.
    pub continuous_target_occurrence: u32,
}

impl StateChangeConf {
    /// Creates a poller configuration for the given state sets.
    #[must_use]
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            pending: pending.iter().map(ToString::to_string).collect(),
            target: target.iter().map(ToString::to_string).collect(),
            timeout,
            delay: Duration::ZERO,
            min_timeout: Duration::ZERO,
            poll_interval: Duration::ZERO,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            continuous_target_occurrence: 1,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets the minimum wait between refreshes.
    #[must_use]
    pub const fn with_min_timeout(mut self, min_timeout: Duration) -> Self {
        self.min_timeout = min_timeout;
        self
    }

    /// Sets a fixed poll interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Sets how many consecutive "not found" refreshes are tolerated.
    ///
    /// Zero selects [`DEFAULT_NOT_FOUND_CHECKS`].
    #[must_use]
    pub const fn with_not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Sets how many consecutive target hits are required.
    #[must_use]
    pub const fn with_continuous_target_occurrence(mut self, occurrences: u32) -> Self {
        self.continuous_target_occurrence = occurrences;
        self
    }

    /// Polls `refresh` until a target state is reached.
    ///
    /// `refresh` returns `Ok(None)` when the resource does not exist and
    /// `Ok(Some((value, state)))` otherwise. When the target set is empty the
    /// wait is for the resource to disappear, and success yields `Ok(None)`.
    ///
    /// A refresh still running at the deadline gets [`REFRESH_GRACE_PERIOD`]
    /// to finish. Its outcome becomes the last state or last error of the
    /// timeout, or the result if it reached the target.
    ///
    /// # Errors
    ///
    /// - the first error returned by `refresh`
    /// - [`AwsformError::NotFound`] after too many consecutive misses
    /// - [`AwsformError::UnexpectedState`] for a state outside both sets
    /// - [`AwsformError::Timeout`] when the deadline passes
    pub async fn wait_for_state<T, F, Fut>(&self, mut refresh: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<(T, String)>>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut backoff = Backoff::new(self.min_timeout, self.poll_interval);
        let mut tracker = Tracker::default();

        if !self.delay.is_zero() {
            trace!("Waiting {:?} before first refresh", self.delay);
            if timeout_at(deadline, sleep(self.delay)).await.is_err() {
                return Err(self.timeout_error(&tracker, None));
            }
        }

        loop {
            let refresh_call = refresh();
            tokio::pin!(refresh_call);

            let attempt = timeout_at(deadline, &mut refresh_call).await;
            let Ok(observed) = attempt else {
                return self.finish_in_grace(refresh_call, &mut tracker).await;
            };

            match self.observe(&mut tracker, observed?) {
                Step::Done(value) => return Ok(value),
                Step::Failed(err) => return Err(err),
                Step::Pending => {}
            }

            let wait = backoff.next(tracker.target_occurrence == 0);
            debug!("Waiting {wait:?} before next refresh");
            if timeout_at(deadline, sleep(wait)).await.is_err() {
                return Err(self.timeout_error(&tracker, None));
            }
        }
    }

    /// Lets a refresh that outlived the deadline finish within the grace
    /// period, then reports the timeout.
    async fn finish_in_grace<T, Fut>(
        &self,
        refresh_call: Pin<&mut Fut>,
        tracker: &mut Tracker,
    ) -> Result<Option<T>>
    where
        Fut: Future<Output = Result<Option<(T, String)>>>,
    {
        warn!(
            "Wait timed out after {}, allowing {} for the last refresh",
            humantime::format_duration(self.timeout),
            humantime::format_duration(REFRESH_GRACE_PERIOD)
        );

        let last_error = match timeout(REFRESH_GRACE_PERIOD, refresh_call).await {
            Ok(Ok(observed)) => match self.observe(tracker, observed) {
                Step::Done(value) => return Ok(value),
                Step::Pending => None,
                Step::Failed(err) => Some(err),
            },
            Ok(Err(err)) => Some(err),
            Err(_) => {
                warn!("Refresh exceeded the grace period");
                None
            }
        };

        Err(self.timeout_error(tracker, last_error))
    }

    /// Applies one refresh outcome to the counters.
    fn observe<T>(&self, tracker: &mut Tracker, observed: Option<(T, String)>) -> Step<T> {
        let not_found_checks = if self.not_found_checks == 0 {
            DEFAULT_NOT_FOUND_CHECKS
        } else {
            self.not_found_checks
        };

        match observed {
            None if self.target.is_empty() => {
                tracker.target_occurrence += 1;
                if tracker.target_occurrence >= self.continuous_target_occurrence {
                    return Step::Done(None);
                }
            }
            None => {
                tracker.not_found_tick += 1;
                if tracker.not_found_tick > not_found_checks {
                    return Step::Failed(AwsformError::NotFound(NotFoundError {
                        retries: tracker.not_found_tick,
                        ..NotFoundError::default()
                    }));
                }
            }
            Some((value, state)) => {
                tracker.not_found_tick = 0;
                tracker.last_state.clone_from(&state);

                if self.target.contains(&state) {
                    tracker.target_occurrence += 1;
                    if tracker.target_occurrence >= self.continuous_target_occurrence {
                        return Step::Done(Some(value));
                    }
                } else if self.pending.contains(&state) {
                    tracker.target_occurrence = 0;
                } else if !self.pending.is_empty() {
                    return Step::Failed(AwsformError::UnexpectedState(UnexpectedStateError {
                        last_error: None,
                        state,
                        expected_state: self.target.clone(),
                    }));
                }
            }
        }

        Step::Pending
    }

    fn timeout_error(&self, tracker: &Tracker, last_error: Option<AwsformError>) -> AwsformError {
        debug!(
            "Wait timed out after {} (last state: '{}')",
            humantime::format_duration(self.timeout),
            tracker.last_state
        );
        AwsformError::Timeout(TimeoutError {
            last_error: last_error.map(Box::new),
            last_state: tracker.last_state.clone(),
            timeout: self.timeout,
            expected_state: self.target.clone(),
        })
    }
}

/// Counters carried across refreshes.
#[derive(Debug, Default)]
struct Tracker {
    target_occurrence: u32,
    not_found_tick: u32,
    last_state: String,
}

/// Outcome of a single refresh.
enum Step<T> {
    Done(Option<T>),
    Pending,
    Failed(AwsformError),
}

/// Exponential backoff between polls.
///
/// Starts at 100ms and doubles on each step that asks for growth. A poll
/// interval in (0, 180s) replaces the schedule. Otherwise the value is raised
/// to `min` or capped at [`MAX_BACKOFF`].
#[derive(Debug, Clone)]
pub(crate) struct Backoff {
    wait: Duration,
    min: Duration,
    poll_interval: Duration,
}

impl Backoff {
    pub(crate) const fn new(min: Duration, poll_interval: Duration) -> Self {
        Self {
            wait: INITIAL_BACKOFF,
            min,
            poll_interval,
        }
    }

    pub(crate) fn next(&mut self, grow: bool) -> Duration {
        if grow {
            self.wait = self.wait.saturating_mul(2);
        }

        if !self.poll_interval.is_zero() && self.poll_interval < MAX_POLL_INTERVAL {
            self.wait = self.poll_interval;
        } else if self.wait < self.min {
            self.wait = self.min;
        } else if self.wait > MAX_BACKOFF {
            self.wait = MAX_BACKOFF;
        }

        self.wait
    }
}
