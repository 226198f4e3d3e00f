use std::{collections::BTreeMap, fmt, rc::Rc, thread, time::Duration};

use log::{debug, trace};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    oracle::{Hyperparameters, Trial, TrialLedger},
    progress_tuner::TrialRunner,
    training_callback::{notify_epoch_end, notify_train_begin, CallbackList, EpochLogs},
};

/// A search that has already been run, recorded trial by trial so it can be replayed through the reporting machinery.
#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct SearchHistory {
    /// the search's trial budget. If absent, the number of recorded trials is used
    #[serde(default)]
    pub max_trials: Option<usize>,
    /// the recorded trials, in the order they were run
    pub trials: Vec<RecordedTrial>,
}

impl SearchHistory {
    /// The trial budget of the recorded search
    pub fn budget(&self) -> usize {
        self.max_trials.unwrap_or(self.trials.len())
    }
}

/// One recorded trial: its hyperparameters, the logs of each epoch, and how it ended.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct RecordedTrial {
    /// identifier of the trial
    pub trial_id: String,
    /// the hyperparameters the trial ran with
    #[serde(default)]
    pub hyperparameters: Hyperparameters,
    /// the metrics logged at the end of each epoch, in epoch order
    #[serde(default)]
    pub epochs: Vec<BTreeMap<String, f64>>,
    /// the trial's final objective value. A trial with neither a score nor an error replays as complete-but-unscored
    #[serde(default)]
    pub score: Option<f64>,
    /// if set, the trial failed with this message after its recorded epochs
    #[serde(default)]
    pub error: Option<String>,
}

impl RecordedTrial {
    /// The handle to pass to a [`TrialRunner`] to replay this trial
    pub fn trial(&self) -> Trial {
        Trial::with_hyperparameters(self.trial_id.clone(), self.hyperparameters.clone())
    }
}

/// An error produced while replaying a recorded trial
#[derive(Clone, PartialEq, Debug)]
pub enum ReplayError {
    /// The runner was asked to run a trial it has no recording for
    UnknownTrial {
        /// the requested trial
        trial_id: String,
    },
    /// The recording says the trial failed
    RecordedFailure {
        /// the failed trial
        trial_id: String,
        /// the recorded failure message
        message: String,
    },
}

impl fmt::Display for ReplayError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ReplayError::UnknownTrial { trial_id } => write!(f, "no recording for trial {}", trial_id),
            ReplayError::RecordedFailure { message, .. } => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for ReplayError {}

/// A [`TrialRunner`] that plays back a [`SearchHistory`], feeding each recorded epoch to the attached callbacks
/// and writing results into a shared [`TrialLedger`].
pub struct ReplayRunner {
    ledger: Rc<TrialLedger>,
    recordings: FxHashMap<String, RecordedTrial>,
    epoch_delay: Duration,
}

impl ReplayRunner {
    /// Create a runner for the trials in `history`, recording results in `ledger`
    pub fn new(history: &SearchHistory, ledger: Rc<TrialLedger>) -> Self {
        let recordings = history
            .trials
            .iter()
            .map(|recorded| (recorded.trial_id.clone(), recorded.clone()))
            .collect();
        ReplayRunner {
            ledger,
            recordings,
            epoch_delay: Duration::ZERO,
        }
    }

    /// Pause for `epoch_delay` after each replayed epoch, so progress frames can be watched
    pub fn with_epoch_delay(mut self, epoch_delay: Duration) -> Self {
        self.epoch_delay = epoch_delay;
        self
    }

    /// The ledger this runner writes to
    pub fn ledger(&self) -> &Rc<TrialLedger> {
        &self.ledger
    }
}

impl TrialRunner for ReplayRunner {
    type Args = ();
    type Output = Option<f64>;
    type Error = ReplayError;

    fn run_trial(
        &mut self,
        trial: &Trial,
        callbacks: &mut CallbackList,
        _args: (),
    ) -> Result<Option<f64>, ReplayError> {
        let recorded = self
            .recordings
            .get(trial.id())
            .ok_or_else(|| ReplayError::UnknownTrial {
                trial_id: trial.id().to_string(),
            })?;
        debug!(
            "replaying trial {} ({} epochs)",
            trial.id(),
            recorded.epochs.len()
        );

        self.ledger.open_trial(trial);
        notify_train_begin(callbacks);
        for (epoch, metrics) in recorded.epochs.iter().enumerate() {
            let logs: EpochLogs = metrics
                .iter()
                .map(|(name, value)| (name.clone(), *value))
                .collect();
            trace!("replaying epoch {} of trial {}: {:?}", epoch, trial.id(), logs);
            notify_epoch_end(callbacks, epoch, &logs);
            if !self.epoch_delay.is_zero() {
                thread::sleep(self.epoch_delay);
            }
        }

        if let Some(message) = &recorded.error {
            self.ledger.fail_trial(trial.id());
            return Err(ReplayError::RecordedFailure {
                trial_id: trial.id().to_string(),
                message: message.clone(),
            });
        }
        let last_metrics = recorded.epochs.last().cloned().unwrap_or_default();
        self.ledger
            .complete_trial(trial.id(), recorded.score, last_metrics);
        Ok(recorded.score)
    }
}
