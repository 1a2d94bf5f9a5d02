//! Fixed-interval polling with an attempt ceiling.

use std::future::Future;
use std::time::Duration;

/// Result of one check.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStep<T> {
    /// Not done yet; check again after the interval.
    Pending,
    Ready(T),
}

/// How a polling run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome<T, E> {
    Ready { value: T, attempts: u32 },
    /// Every attempt came back pending.
    Exhausted { attempts: u32 },
    /// A check failed; polling stopped at the first error.
    Errored { error: E, attempts: u32 },
}

/// Sleep-then-check polling: wait `interval`, check, repeat up to
/// `max_attempts` times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    /// 10 seconds between checks, 30 checks: a 5 minute ceiling.
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            max_attempts: 30,
        }
    }
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Longest a run can take.
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }

    /// Drive `check` until it is ready, errors, or the attempts run out.
    ///
    /// `check` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, mut check: F) -> PollOutcome<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<PollStep<T>, E>>,
    {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.interval).await;

            match check(attempt).await {
                Ok(PollStep::Ready(value)) => {
                    return PollOutcome::Ready {
                        value,
                        attempts: attempt,
                    }
                }
                Ok(PollStep::Pending) => continue,
                Err(error) => {
                    return PollOutcome::Errored {
                        error,
                        attempts: attempt,
                    }
                }
            }
        }

        PollOutcome::Exhausted {
            attempts: self.max_attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn policy() -> PollPolicy {
        PollPolicy::new(Duration::from_secs(10), 30)
    }

    #[test]
    fn default_ceiling_is_five_minutes() {
        assert_eq!(PollPolicy::default().ceiling(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_on_third_check_after_three_intervals() {
        let start = Instant::now();

        let outcome: PollOutcome<&str, ()> = policy()
            .run(|attempt| async move {
                if attempt < 3 {
                    Ok(PollStep::Pending)
                } else {
                    Ok(PollStep::Ready("done"))
                }
            })
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Ready {
                value: "done",
                attempts: 3
            }
        );
        assert!(start.elapsed() >= Duration::from_secs(30));
        assert!(start.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let start = Instant::now();
        let mut calls = 0;

        let outcome: PollOutcome<(), ()> = policy()
            .run(|_| {
                calls += 1;
                async { Ok(PollStep::Pending) }
            })
            .await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 30 });
        assert_eq!(calls, 30);
        assert!(start.elapsed() >= policy().ceiling());
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_stops_polling() {
        let mut calls = 0;

        let outcome: PollOutcome<(), &str> = policy()
            .run(|attempt| {
                calls += 1;
                async move {
                    if attempt == 2 {
                        Err("status check failed")
                    } else {
                        Ok(PollStep::Pending)
                    }
                }
            })
            .await;

        assert_eq!(
            outcome,
            PollOutcome::Errored {
                error: "status check failed",
                attempts: 2
            }
        );
        assert_eq!(calls, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn checks_only_after_first_interval() {
        let start = Instant::now();

        let outcome: PollOutcome<Duration, ()> = policy()
            .run(|_| async move { Ok(PollStep::Ready(start.elapsed())) })
            .await;

        match outcome {
            PollOutcome::Ready { value, attempts } => {
                assert_eq!(attempts, 1);
                assert!(value >= Duration::from_secs(10));
                assert!(value < Duration::from_secs(11));
            }
            other => panic!("expected ready, got {:?}", other),
        }
    }
}
