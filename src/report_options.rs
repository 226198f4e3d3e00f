use std::fmt;

/// Used by [`TrialProgressCallback`](crate::progress_callback::TrialProgressCallback) and
/// [`ProgressTuner`](crate::progress_tuner::ProgressTuner) to decide how progress frames are laid out.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ReportOptions {
    /// number of most recent epochs shown in each progress frame. Older epochs are summarized in a single count line
    pub history_window: usize,
    /// width, in characters, of the `=` rules separating sections of a frame
    pub rule_width: usize,
}

impl ReportOptions {
    /// Create a new ReportOptions struct with the given parameters.
    /// # Errors
    /// Returns a [`ReportOptionsError`] if...
    /// * `history_window` is 0, since every frame must show the latest epoch,
    /// * `rule_width` is 0.
    pub fn new(history_window: usize, rule_width: usize) -> Result<Self, ReportOptionsError> {
        if history_window == 0 {
            return Err(ReportOptionsError::ZeroHistoryWindow);
        }
        if rule_width == 0 {
            return Err(ReportOptionsError::ZeroRuleWidth);
        }
        Ok(ReportOptions {
            history_window,
            rule_width,
        })
    }

    /// A line of `=` characters, `rule_width` long
    pub fn rule(&self) -> String {
        "=".repeat(self.rule_width)
    }
}

impl Default for ReportOptions {
    /// Returns a ReportOptions struct with the following default values:
    /// * `history_window`: 2
    /// * `rule_width`: 60
    fn default() -> Self {
        ReportOptions {
            history_window: 2,
            rule_width: 60,
        }
    }
}

/// Errors that can occur when creating a new ReportOptions struct
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOptionsError {
    /// The history window was 0
    ZeroHistoryWindow,
    /// The rule width was 0
    ZeroRuleWidth,
}

impl fmt::Display for ReportOptionsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReportOptionsError::ZeroHistoryWindow => write!(f, "History window must show at least one epoch"),
            ReportOptionsError::ZeroRuleWidth => write!(f, "Rule width must be at least one character"),
        }
    }
}

impl std::error::Error for ReportOptionsError {}
