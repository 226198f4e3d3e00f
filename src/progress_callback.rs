use std::{rc::Rc, time::Instant};

use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::{
    display::{DisplayFrame, DisplaySink},
    float_format::{format_fixed, format_scientific},
    oracle::Oracle,
    report_options::ReportOptions,
    training_callback::{EpochLogs, TrainingCallback},
};

/// Key under which training loops report the epoch's training loss
pub const LOSS_KEY: &str = "loss";
/// Key under which training loops report the epoch's validation loss
pub const VALIDATION_LOSS_KEY: &str = "val_loss";
/// Key under which training loops report the learning rate in effect during the epoch
pub const LEARNING_RATE_KEY: &str = "lr";
/// Longer spelling of [`LEARNING_RATE_KEY`] used by some training loops. Only consulted when `lr` is absent
pub const LEARNING_RATE_ALIAS: &str = "learning_rate";

/// The metrics of one finished epoch, as shown in progress frames
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct EpochRecord {
    /// one-based epoch number
    pub epoch: usize,
    /// training loss
    pub loss: f64,
    /// validation loss
    pub validation_loss: f64,
    /// learning rate
    pub learning_rate: f64,
}

impl EpochRecord {
    /// Build a record from a zero-based epoch index and the logs reported for it. Missing metrics are recorded as 0.
    pub fn from_logs(epoch: usize, logs: &EpochLogs) -> Self {
        let metric = |key: &str| logs.get(key).copied();
        EpochRecord {
            epoch: epoch + 1,
            loss: metric(LOSS_KEY).unwrap_or(0.0),
            validation_loss: metric(VALIDATION_LOSS_KEY).unwrap_or(0.0),
            learning_rate: metric(LEARNING_RATE_KEY)
                .or_else(|| metric(LEARNING_RATE_ALIAS))
                .unwrap_or(0.0),
        }
    }

    /// The record as a single progress line
    pub fn progress_line(&self) -> String {
        format!(
            "Epoch {:3} - Loss: {} - Val Loss: {} - LR: {}",
            self.epoch,
            format_fixed(self.loss, 6),
            format_fixed(self.validation_loss, 6),
            format_scientific(self.learning_rate, 2)
        )
    }
}

/// Build the best-trial section of a progress frame, querying `oracle` for its single best trial.
///
/// Oracle errors are rendered as a diagnostic line instead of being returned, so this never fails.
pub fn best_trial_block(oracle: &dyn Oracle, options: &ReportOptions) -> Vec<String> {
    let rule = options.rule();
    let mut lines = vec![rule.clone(), "BEST TRIAL SUMMARY".to_string(), rule];

    let best_trials = match oracle.best_trials(1) {
        Ok(best_trials) => best_trials,
        Err(e) => {
            warn!("could not query best trial: {}", e);
            lines.push(format!("Could not retrieve best trial info: {}", e));
            return lines;
        }
    };
    let Some(best) = best_trials.first() else {
        lines.push("No completed trials yet.".to_string());
        return lines;
    };

    lines.push(format!("Trial ID: {}", best.trial_id));
    lines.push(format!("Best Validation Loss: {}", format_fixed(best.score, 6)));
    if let Some(duration) = best.duration_secs() {
        lines.push(format!("Trial Duration: {} seconds", format_fixed(duration, 2)));
    }

    lines.push(String::new());
    lines.push("Best Hyperparameters:".to_string());
    for (name, value) in &best.hyperparameters {
        lines.push(format!("  {}: {}", name, value));
    }

    if !best.metrics.is_empty() {
        lines.push(String::new());
        lines.push("Best Trial Metrics:".to_string());
        for (name, value) in &best.metrics {
            lines.push(format!("  {}: {}", name, format_fixed(*value, 6)));
        }
    }
    lines
}

/// A [`TrainingCallback`] that redraws a progress frame at the end of every epoch of one trial.
///
/// Each frame shows the search's best trial so far, followed by the most recent epochs of this trial.
/// Only the epochs of the current training run are kept; [`TrainingCallback::on_train_begin`] discards them.
pub struct TrialProgressCallback {
    trial_id: String,
    oracle: Rc<dyn Oracle>,
    sink: Rc<dyn DisplaySink>,
    options: ReportOptions,
    trial_start: Instant,
    epoch_history: Vec<EpochRecord>,
}

impl TrialProgressCallback {
    /// Create a callback reporting on the trial `trial_id`
    pub fn new(
        trial_id: impl Into<String>,
        oracle: Rc<dyn Oracle>,
        sink: Rc<dyn DisplaySink>,
        options: ReportOptions,
    ) -> Self {
        TrialProgressCallback {
            trial_id: trial_id.into(),
            oracle,
            sink,
            options,
            trial_start: Instant::now(),
            epoch_history: Vec::new(),
        }
    }

    /// The trial this callback reports on
    pub fn trial_id(&self) -> &str {
        &self.trial_id
    }

    /// Every epoch recorded since training began
    pub fn epoch_history(&self) -> &[EpochRecord] {
        &self.epoch_history
    }

    /// Seconds since training began (or since the callback was created, if training hasn't begun)
    pub fn elapsed_secs(&self) -> f64 {
        self.trial_start.elapsed().as_secs_f64()
    }

    /// The epochs shown in the next frame: at most `history_window` of the most recent
    pub fn recent_epochs(&self) -> &[EpochRecord] {
        let shown = self.epoch_history.len().min(self.options.history_window);
        &self.epoch_history[self.epoch_history.len() - shown..]
    }

    /// Build the frame for the current state: the best-trial block, then this trial's recent epochs
    pub fn progress_frame(&self) -> DisplayFrame {
        let mut lines = best_trial_block(self.oracle.as_ref(), &self.options);

        let rule = self.options.rule();
        lines.push(String::new());
        lines.push(rule.clone());
        lines.push(format!("TRIAL {} - RECENT EPOCH PROGRESS", self.trial_id));
        lines.push(rule);

        lines.extend(self.recent_epochs().iter().map(EpochRecord::progress_line));

        if self.epoch_history.len() > self.options.history_window {
            lines.push(format!(
                "... (showing last {} of {} epochs)",
                self.options.history_window,
                self.epoch_history.len()
            ));
        }
        DisplayFrame::replacing(lines)
    }
}

impl TrainingCallback for TrialProgressCallback {
    fn on_train_begin(&mut self) {
        self.trial_start = Instant::now();
        self.epoch_history.clear();
    }

    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs) {
        let record = EpochRecord::from_logs(epoch, logs);
        trace!("trial {} recorded {:?}", self.trial_id, record);
        self.epoch_history.push(record);
        self.sink.render(&self.progress_frame());
    }
}
