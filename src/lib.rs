#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! Live progress reporting for hyperparameter searches.
//!
//! The `tuner_progress` crate wraps whatever runs the trials of a search and turns its training callbacks into a
//! refreshable summary: the best trial found so far, the most recent epochs of the trial in progress, and a closing
//! banner with each trial's score and duration.
//!
//! The crate owns no search algorithm. Everything it knows about the search comes through the read-only [`Oracle`]
//! trait, and everything it shows goes through a [`DisplaySink`].
//!
//! The [progress_callback] module contains [`TrialProgressCallback`], which redraws a frame at the end of every epoch.
//! The [progress_tuner] module contains [`ProgressTuner`], which wraps a [`TrialRunner`], attaches a fresh
//! progress callback to each trial, times the trial, and reports how it ended.
//!
//! # Examples
//! Replay a recorded two-epoch trial through a [`ProgressTuner`], capturing the frames in a [`BufferSink`](display::BufferSink):
//! ```
//! use std::{collections::BTreeMap, rc::Rc};
//! use tuner_progress::{
//!     display::BufferSink,
//!     oracle::TrialLedger,
//!     replay::{RecordedTrial, ReplayRunner, SearchHistory},
//!     ProgressTuner,
//! };
//!
//! let history = SearchHistory {
//!     max_trials: Some(5),
//!     trials: vec![RecordedTrial {
//!         trial_id: "0000".to_string(),
//!         hyperparameters: BTreeMap::new(),
//!         epochs: vec![
//!             BTreeMap::from([("loss".to_string(), 0.9), ("val_loss".to_string(), 1.0)]),
//!             BTreeMap::from([("loss".to_string(), 0.7), ("val_loss".to_string(), 0.8)]),
//!         ],
//!         score: Some(0.8),
//!         error: None,
//!     }],
//! };
//!
//! let ledger = Rc::new(TrialLedger::new(history.budget()));
//! let sink = Rc::new(BufferSink::new());
//! let runner = ReplayRunner::new(&history, ledger.clone());
//! let mut tuner = ProgressTuner::new(runner, ledger, sink.clone());
//!
//! let score = tuner.run_trial_with_new_callbacks(&history.trials[0].trial(), ())?;
//! assert_eq!(score, Some(0.8));
//! assert!(sink.screen().contains("TRIAL 0000 COMPLETED"));
//! assert!(sink.screen().contains("Completed Trials: 1/5"));
//! # Ok::<(), tuner_progress::replay::ReplayError>(())
//! ```

/// Frames, and the surfaces they can be drawn on.
pub mod display;
pub mod float_format;
/// Provides the read-only [`Oracle`] view of a search backend, and the in-memory [`TrialLedger`](oracle::TrialLedger).
pub mod oracle;
pub mod oracle_error;
/// Provides [`TrialProgressCallback`], which reports per-epoch progress of a single trial.
pub mod progress_callback;
/// Provides [`ProgressTuner`], which wraps a [`TrialRunner`] with per-trial reporting and timing.
pub mod progress_tuner;
/// Replaying recorded searches through a [`TrialRunner`].
pub mod replay;
/// Options controlling the layout of progress frames.
pub mod report_options;
/// Provides a trait for observing the training loop of a trial.
pub mod training_callback;

pub use display::{DisplayFrame, DisplaySink};
pub use oracle::{Oracle, Trial, TrialStatus, TrialSummary};
pub use oracle_error::OracleError;
pub use progress_callback::TrialProgressCallback;
pub use progress_tuner::{ProgressTuner, TrialOutcome, TrialRunner};
pub use report_options::ReportOptions;
use training_callback::{EpochLogs, TrainingCallback};

// EmptyCallback has no state, so there's no point in implementing any other common traits
/// A callback that does nothing when called.
/// Used to fill callback slots that must be occupied.
#[derive(Default)]
pub struct EmptyCallback {}
impl EmptyCallback {
    /// Create a new instance of the EmptyCallback
    pub fn new() -> Self {
        EmptyCallback {}
    }
}
impl TrainingCallback for EmptyCallback {
    fn on_train_begin(&mut self) {
        // do nothing
    }

    fn on_epoch_end(&mut self, _epoch: usize, _logs: &EpochLogs) {
        // do nothing
    }
}
