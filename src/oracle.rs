use std::{cell::RefCell, collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{float_format::format_shortest, oracle_error::OracleError};

/// A single hyperparameter value, as chosen by the search backend for one trial.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HyperparameterValue {
    /// A boolean choice
    Bool(bool),
    /// An integer choice, such as a layer width
    Int(i64),
    /// A continuous choice, such as a learning rate
    Float(f64),
    /// A categorical choice, such as an activation name
    Text(String),
}

impl fmt::Display for HyperparameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HyperparameterValue::Bool(b) => write!(f, "{}", b),
            HyperparameterValue::Int(i) => write!(f, "{}", i),
            HyperparameterValue::Float(x) => write!(f, "{}", format_shortest(*x)),
            HyperparameterValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// The hyperparameters of a trial, ordered by name
pub type Hyperparameters = BTreeMap<String, HyperparameterValue>;

/// A handle to one trial of a search, passed to [`TrialRunner`](crate::progress_tuner::TrialRunner)s.
///
/// The search backend owns trial identity; this crate only reads it.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Trial {
    id: String,
    hyperparameters: Hyperparameters,
}

impl Trial {
    /// Create a new trial handle with no hyperparameters
    pub fn new(id: impl Into<String>) -> Self {
        Trial {
            id: id.into(),
            hyperparameters: Hyperparameters::new(),
        }
    }

    /// Create a new trial handle with the given hyperparameters
    pub fn with_hyperparameters(id: impl Into<String>, hyperparameters: Hyperparameters) -> Self {
        Trial {
            id: id.into(),
            hyperparameters,
        }
    }

    /// Get the trial's identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Get the hyperparameters chosen for this trial
    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }
}

/// Where a trial is in its lifecycle. `Completed` and `Failed` are terminal.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum TrialStatus {
    /// The trial has not been handed to a runner
    NotStarted,
    /// The trial's training loop is in progress
    Running,
    /// The trial finished and produced a result
    Completed,
    /// The trial's runner returned an error
    Failed,
}

impl TrialStatus {
    /// true if no further transitions are possible from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, TrialStatus::Completed | TrialStatus::Failed)
    }
}

/// A read-only snapshot of a finished trial, as reported by an [`Oracle`].
///
/// Snapshots are recomputed on every query and never cached.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct TrialSummary {
    /// identifier of the trial
    pub trial_id: String,
    /// the trial's objective value. Lower is better
    pub score: f64,
    /// when the trial started, if the backend tracks it
    pub start_time: Option<DateTime<Utc>>,
    /// when the trial ended, if the backend tracks it
    pub end_time: Option<DateTime<Utc>>,
    /// the hyperparameters the trial was run with
    pub hyperparameters: Hyperparameters,
    /// the latest value of each metric the trial reported. May be empty
    pub metrics: BTreeMap<String, f64>,
}

impl TrialSummary {
    /// Wall-clock duration of the trial in seconds, if both timestamps are known
    pub fn duration_secs(&self) -> Option<f64> {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// The read-only view of a search backend needed to report progress.
///
/// Ranking, persistence and scheduling all stay inside the implementor.
pub trait Oracle {
    /// Returns up to `num_trials` completed trials, best first.
    ///
    /// # Errors
    /// Returns an [`OracleError`] if the backend's trial state can't currently be read.
    fn best_trials(&self, num_trials: usize) -> Result<Vec<TrialSummary>, OracleError>;

    /// The number of trials the backend knows about, including the one currently running
    fn trial_count(&self) -> usize;

    /// The configured trial budget of the search
    fn max_trials(&self) -> usize;
}

#[derive(Clone, Debug)]
struct LedgerEntry {
    trial_id: String,
    hyperparameters: Hyperparameters,
    status: TrialStatus,
    score: Option<f64>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    metrics: BTreeMap<String, f64>,
}

impl LedgerEntry {
    fn new(trial_id: &str) -> Self {
        LedgerEntry {
            trial_id: trial_id.to_string(),
            hyperparameters: Hyperparameters::new(),
            status: TrialStatus::NotStarted,
            score: None,
            start_time: None,
            end_time: None,
            metrics: BTreeMap::new(),
        }
    }
}

/// An in-memory [`Oracle`] that records trials as a runner opens, completes and fails them.
///
/// Trials are ranked by ascending score. The ledger is meant to be shared (behind an [`Rc`](std::rc::Rc))
/// between the runner that writes to it and the reporters that read from it.
#[derive(Debug, Default)]
pub struct TrialLedger {
    max_trials: usize,
    entries: RefCell<Vec<LedgerEntry>>,
}

impl TrialLedger {
    /// Create an empty ledger for a search with the given trial budget
    pub fn new(max_trials: usize) -> Self {
        TrialLedger {
            max_trials,
            entries: RefCell::new(Vec::new()),
        }
    }

    /// Record that `trial` has started running. Re-opening a known trial resets its results.
    pub fn open_trial(&self, trial: &Trial) {
        self.with_entry(trial.id(), |entry| {
            entry.hyperparameters = trial.hyperparameters().clone();
            entry.status = TrialStatus::Running;
            entry.score = None;
            entry.start_time = Some(Utc::now());
            entry.end_time = None;
            entry.metrics.clear();
        });
        debug!("ledger opened trial {}", trial.id());
    }

    /// Record that a trial has finished. A `score` of `None` leaves the trial in an incomplete state,
    /// which [`Oracle::best_trials`] reports as an error.
    pub fn complete_trial(&self, trial_id: &str, score: Option<f64>, metrics: BTreeMap<String, f64>) {
        self.with_entry(trial_id, |entry| {
            entry.status = TrialStatus::Completed;
            entry.score = score;
            entry.end_time = Some(Utc::now());
            entry.metrics = metrics;
        });
        debug!("ledger completed trial {} with score {:?}", trial_id, score);
    }

    /// Record that a trial's run returned an error
    pub fn fail_trial(&self, trial_id: &str) {
        self.with_entry(trial_id, |entry| {
            entry.status = TrialStatus::Failed;
            entry.end_time = Some(Utc::now());
        });
        debug!("ledger failed trial {}", trial_id);
    }

    /// The recorded status of a trial. Unknown trials have not started.
    pub fn status(&self, trial_id: &str) -> TrialStatus {
        self.entries
            .borrow()
            .iter()
            .find(|entry| entry.trial_id == trial_id)
            .map_or(TrialStatus::NotStarted, |entry| entry.status)
    }

    fn with_entry(&self, trial_id: &str, update: impl FnOnce(&mut LedgerEntry)) {
        let mut entries = self.entries.borrow_mut();
        let position = match entries.iter().position(|entry| entry.trial_id == trial_id) {
            Some(position) => position,
            None => {
                entries.push(LedgerEntry::new(trial_id));
                entries.len() - 1
            }
        };
        update(&mut entries[position]);
    }
}

impl Oracle for TrialLedger {
    fn best_trials(&self, num_trials: usize) -> Result<Vec<TrialSummary>, OracleError> {
        let entries = self.entries.borrow();
        let mut completed = Vec::new();
        for entry in entries
            .iter()
            .filter(|entry| entry.status == TrialStatus::Completed)
        {
            let score = entry
                .score
                .ok_or_else(|| OracleError::IncompleteTrialState {
                    trial_id: entry.trial_id.clone(),
                })?;
            completed.push(TrialSummary {
                trial_id: entry.trial_id.clone(),
                score,
                start_time: entry.start_time,
                end_time: entry.end_time,
                hyperparameters: entry.hyperparameters.clone(),
                metrics: entry.metrics.clone(),
            });
        }
        // stable sort, so ties keep completion order
        completed.sort_by(|a, b| a.score.total_cmp(&b.score));
        completed.truncate(num_trials);
        trace!("ledger best trials: {:?}", completed);
        Ok(completed)
    }

    fn trial_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|entry| entry.status != TrialStatus::NotStarted)
            .count()
    }

    fn max_trials(&self) -> usize {
        self.max_trials
    }
}
