//! Poll backoff policies and per-provider poll budgets.
//!
//! A [`PollConfig`] describes how long to wait between poll attempts and
//! when to give up. Every config must carry at least one bound
//! (`max_attempts` or `max_elapsed`); [`PollConfig::validate`] rejects
//! configs that would poll forever.

use std::time::Duration;

use crate::error::CoreError;

/// Largest first delay a provider ETA may seed, unless the config says otherwise.
pub const DEFAULT_ETA_CAP: Duration = Duration::from_secs(60);

/// How the delay evolves between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BackoffPolicy {
    /// Constant delay of `base_delay` between attempts.
    Fixed,
    /// `delay(n+1) = min(delay(n) * factor, base_delay * cap_multiplier)`,
    /// applied only after a `Processing` response.
    Bounded { factor: f64, cap_multiplier: f64 },
}

/// Poll schedule and budget for one provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay before the first attempt, and the unit for the backoff cap.
    pub base_delay: Duration,
    /// Give up after this many poll attempts.
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed since submission.
    pub max_elapsed: Option<Duration>,
    pub backoff: BackoffPolicy,
    /// Upper bound for an ETA-seeded first delay.
    pub eta_cap: Duration,
    /// Extra submit attempts allowed after a transport failure.
    pub submit_retries: u32,
}

impl PollConfig {
    /// Fixed-interval polling bounded by an attempt count.
    pub fn fixed(base_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_attempts: Some(max_attempts),
            max_elapsed: None,
            backoff: BackoffPolicy::Fixed,
            eta_cap: DEFAULT_ETA_CAP,
            submit_retries: 0,
        }
    }

    /// Bounded multiplicative backoff bounded by an attempt count.
    pub fn bounded(
        base_delay: Duration,
        max_attempts: u32,
        factor: f64,
        cap_multiplier: f64,
    ) -> Self {
        Self {
            backoff: BackoffPolicy::Bounded {
                factor,
                cap_multiplier,
            },
            ..Self::fixed(base_delay, max_attempts)
        }
    }

    pub fn with_max_elapsed(mut self, max_elapsed: Option<Duration>) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    pub fn with_submit_retries(mut self, retries: u32) -> Self {
        self.submit_retries = retries;
        self
    }

    /// Reject configs that could poll forever or never grow sensibly.
    pub fn validate(&self) -> Result<(), CoreError> {
        let attempts_bounded = matches!(self.max_attempts, Some(n) if n > 0);
        let elapsed_bounded = matches!(self.max_elapsed, Some(d) if !d.is_zero());
        if !attempts_bounded && !elapsed_bounded {
            return Err(CoreError::Validation(
                "Poll config must set a positive max_attempts or max_elapsed".to_string(),
            ));
        }
        if self.base_delay.is_zero() {
            return Err(CoreError::Validation(
                "Poll base_delay must be greater than zero".to_string(),
            ));
        }
        if let BackoffPolicy::Bounded {
            factor,
            cap_multiplier,
        } = self.backoff
        {
            if !(factor >= 1.0 && factor.is_finite()) {
                return Err(CoreError::Validation(format!(
                    "Backoff factor must be a finite value >= 1, got {factor}"
                )));
            }
            if !(cap_multiplier >= 1.0 && cap_multiplier.is_finite()) {
                return Err(CoreError::Validation(format!(
                    "Backoff cap multiplier must be a finite value >= 1, got {cap_multiplier}"
                )));
            }
        }
        Ok(())
    }

    /// Largest delay the policy will ever schedule after the first attempt.
    pub fn max_delay(&self) -> Duration {
        match self.backoff {
            BackoffPolicy::Fixed => self.base_delay,
            BackoffPolicy::Bounded { cap_multiplier, .. } => {
                scale(self.base_delay, cap_multiplier)
            }
        }
    }

    /// Delay before attempt 1, seeded by the provider's ETA when present.
    ///
    /// The ETA is clamped to `[base_delay, eta_cap]`.
    pub fn first_delay(&self, eta: Option<Duration>) -> Duration {
        match eta {
            Some(eta) => eta.clamp(self.base_delay, self.eta_cap.max(self.base_delay)),
            None => self.base_delay,
        }
    }

    /// Delay to use after a `Processing` response, given the current delay.
    ///
    /// The result is clamped to [`max_delay`](Self::max_delay).
    pub fn next_delay(&self, current: Duration) -> Duration {
        match self.backoff {
            BackoffPolicy::Fixed => self.base_delay,
            BackoffPolicy::Bounded { factor, .. } => scale(current, factor).min(self.max_delay()),
        }
    }
}

fn scale(delay: Duration, factor: f64) -> Duration {
    Duration::from_millis((delay.as_millis() as f64 * factor) as u64)
}
