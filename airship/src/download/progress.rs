//! Download progress values and reporting throttle.

use crate::error::{EngineError, EngineResult};

/// Minimum fraction advance between two reported progress values.
pub const PROGRESS_STEP: f64 = 0.1;

/// Progress of one download attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    /// `downloaded_bytes / total_bytes`, clamped to `[0, 1]`.
    pub fraction: f64,
}

/// Decides which chunk updates are worth reporting.
///
/// A value is reported only once the fraction has moved at least
/// [`PROGRESS_STEP`] past the last reported one, so a full download yields
/// at most ten reports, in non-decreasing order.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    total_bytes: u64,
    last_reported: f64,
}

impl ProgressThrottle {
    /// Start a throttle for `total_bytes`, resuming at `start_bytes`.
    pub fn new(total_bytes: u64, start_bytes: u64) -> Self {
        let last_reported = if total_bytes == 0 {
            0.0
        } else {
            (start_bytes as f64 / total_bytes as f64).clamp(0.0, 1.0)
        };
        Self {
            total_bytes,
            last_reported,
        }
    }

    /// Account for `downloaded_bytes` written so far.
    ///
    /// Returns the progress to report, `None` when throttled, or an error
    /// when the fraction is not a finite number.
    pub fn update(&mut self, downloaded_bytes: u64) -> EngineResult<Option<DownloadProgress>> {
        let fraction = downloaded_bytes as f64 / self.total_bytes as f64;
        if !fraction.is_finite() {
            return Err(EngineError::ProgressComputationError {
                downloaded: downloaded_bytes,
                total: self.total_bytes,
            });
        }

        let fraction = fraction.min(1.0);
        if fraction - self.last_reported < PROGRESS_STEP {
            return Ok(None);
        }

        self.last_reported = fraction;
        Ok(Some(DownloadProgress {
            downloaded_bytes,
            total_bytes: self.total_bytes,
            fraction,
        }))
    }
}
