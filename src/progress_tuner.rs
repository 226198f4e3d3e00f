use std::{fmt, rc::Rc, time::Instant};

use log::{debug, warn};
use rustc_hash::FxHashMap;

use crate::{
    display::{DisplayFrame, DisplaySink},
    float_format::format_fixed,
    oracle::{Oracle, Trial, TrialStatus},
    progress_callback::TrialProgressCallback,
    report_options::ReportOptions,
    training_callback::CallbackList,
};

/// Runs a single trial of a search, calling the attached callbacks from its training loop.
///
/// [`ProgressTuner`] implements this trait too, so it can stand in wherever the runner it wraps was used.
pub trait TrialRunner {
    /// Extra, runner-specific arguments forwarded untouched by wrappers
    type Args;
    /// What a successful run produces
    type Output: TrialOutcome;
    /// What a failed run produces
    type Error: fmt::Display;

    /// Train and evaluate `trial`, invoking every callback in `callbacks`.
    ///
    /// # Errors
    /// Returns the runner's error if the trial could not be completed.
    fn run_trial(
        &mut self,
        trial: &Trial,
        callbacks: &mut CallbackList,
        args: Self::Args,
    ) -> Result<Self::Output, Self::Error>;
}

/// The result of a successful trial, as far as progress reporting is concerned
pub trait TrialOutcome {
    /// The trial's final objective value, if it has one
    fn final_score(&self) -> Option<f64>;
}

impl TrialOutcome for f64 {
    fn final_score(&self) -> Option<f64> {
        Some(*self)
    }
}

impl TrialOutcome for Option<f64> {
    fn final_score(&self) -> Option<f64> {
        *self
    }
}

/// Wraps a [`TrialRunner`] so every trial is timed, observed by a fresh [`TrialProgressCallback`],
/// and closed with a summary frame.
///
/// Failures from the wrapped runner are reported and then returned unchanged.
pub struct ProgressTuner<R: TrialRunner> {
    runner: R,
    oracle: Rc<dyn Oracle>,
    sink: Rc<dyn DisplaySink>,
    options: ReportOptions,
    trial_times: FxHashMap<String, f64>,
    statuses: FxHashMap<String, TrialStatus>,
}

impl<R: TrialRunner> ProgressTuner<R> {
    /// Wrap `runner`, reading search state from `oracle` and drawing on `sink` with the default [`ReportOptions`]
    pub fn new(runner: R, oracle: Rc<dyn Oracle>, sink: Rc<dyn DisplaySink>) -> Self {
        Self::with_options(runner, oracle, sink, ReportOptions::default())
    }

    /// Wrap `runner` with custom [`ReportOptions`]
    pub fn with_options(
        runner: R,
        oracle: Rc<dyn Oracle>,
        sink: Rc<dyn DisplaySink>,
        options: ReportOptions,
    ) -> Self {
        ProgressTuner {
            runner,
            oracle,
            sink,
            options,
            trial_times: FxHashMap::default(),
            statuses: FxHashMap::default(),
        }
    }

    /// Seconds taken by each successfully completed trial, keyed by trial id
    pub fn trial_times(&self) -> &FxHashMap<String, f64> {
        &self.trial_times
    }

    /// Where the trial `trial_id` is in its lifecycle, as seen by this tuner
    pub fn status(&self, trial_id: &str) -> TrialStatus {
        self.statuses
            .get(trial_id)
            .copied()
            .unwrap_or(TrialStatus::NotStarted)
    }

    /// The wrapped runner
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Consume the tuner, returning the wrapped runner
    pub fn into_inner(self) -> R {
        self.runner
    }

    /// Run `trial` with no callbacks other than the progress callback this tuner attaches
    pub fn run_trial_with_new_callbacks(
        &mut self,
        trial: &Trial,
        args: R::Args,
    ) -> Result<R::Output, R::Error> {
        let mut callbacks = CallbackList::new();
        self.run_trial(trial, &mut callbacks, args)
    }

    fn completion_frame(&self, trial_id: &str, score: Option<f64>, duration: f64) -> DisplayFrame {
        let rule = self.options.rule();
        let score = match score {
            Some(score) => format_fixed(score, 6),
            None => "n/a".to_string(),
        };
        DisplayFrame::replacing(vec![
            rule.clone(),
            format!("TRIAL {} COMPLETED", trial_id),
            rule,
            format!("Final Validation Loss: {}", score),
            format!("Trial Duration: {} seconds", format_fixed(duration, 2)),
            format!(
                "Completed Trials: {}/{}",
                self.oracle.trial_count(),
                self.oracle.max_trials()
            ),
        ])
    }
}

impl<R: TrialRunner> TrialRunner for ProgressTuner<R> {
    type Args = R::Args;
    type Output = R::Output;
    type Error = R::Error;

    fn run_trial(
        &mut self,
        trial: &Trial,
        callbacks: &mut CallbackList,
        args: Self::Args,
    ) -> Result<Self::Output, Self::Error> {
        let trial_start = Instant::now();
        let trial_id = trial.id().to_string();
        debug!("starting trial {}", trial_id);
        self.statuses.insert(trial_id.clone(), TrialStatus::Running);

        callbacks.push(Box::new(TrialProgressCallback::new(
            trial_id.clone(),
            self.oracle.clone(),
            self.sink.clone(),
            self.options,
        )));

        match self.runner.run_trial(trial, callbacks, args) {
            Ok(output) => {
                let duration = trial_start.elapsed().as_secs_f64();
                self.trial_times.insert(trial_id.clone(), duration);
                self.statuses.insert(trial_id.clone(), TrialStatus::Completed);
                debug!("trial {} completed in {:.2}s", trial_id, duration);

                let frame = self.completion_frame(&trial_id, output.final_score(), duration);
                self.sink.render(&frame);
                self.sink.on_trial_finished(&trial_id, TrialStatus::Completed);
                Ok(output)
            }
            Err(e) => {
                self.statuses.insert(trial_id.clone(), TrialStatus::Failed);
                warn!("trial {} failed: {}", trial_id, e);
                self.sink.render(&DisplayFrame::appending(vec![format!(
                    "Trial {} failed: {}",
                    trial_id, e
                )]));
                self.sink.on_trial_finished(&trial_id, TrialStatus::Failed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        display::BufferSink,
        oracle::TrialLedger,
        training_callback::{notify_epoch_end, notify_train_begin, EpochLogs, TrainingCallback},
    };
    use std::{cell::Cell, collections::BTreeMap};
    use test_log::test;

    #[derive(Debug, PartialEq)]
    struct ValueError(String);

    impl fmt::Display for ValueError {
        fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    /// Runs a fixed number of epochs, then either scores the trial in the ledger or fails
    struct ScriptedRunner {
        ledger: Rc<TrialLedger>,
        epochs: usize,
        fail_with: Option<String>,
        callbacks_seen: Cell<usize>,
    }

    impl TrialRunner for ScriptedRunner {
        type Args = f64;
        type Output = f64;
        type Error = ValueError;

        fn run_trial(
            &mut self,
            trial: &Trial,
            callbacks: &mut CallbackList,
            final_score: f64,
        ) -> Result<f64, ValueError> {
            self.callbacks_seen.set(callbacks.len());
            self.ledger.open_trial(trial);
            notify_train_begin(callbacks);
            for epoch in 0..self.epochs {
                let mut logs = EpochLogs::default();
                logs.insert("loss".to_string(), 1.0 / (epoch + 1) as f64);
                notify_epoch_end(callbacks, epoch, &logs);
            }
            if let Some(message) = &self.fail_with {
                self.ledger.fail_trial(trial.id());
                return Err(ValueError(message.clone()));
            }
            self.ledger
                .complete_trial(trial.id(), Some(final_score), BTreeMap::new());
            Ok(final_score)
        }
    }

    struct CountingCallback;

    impl TrainingCallback for CountingCallback {
        fn on_train_begin(&mut self) {}
        fn on_epoch_end(&mut self, _epoch: usize, _logs: &EpochLogs) {}
    }

    fn tuner(epochs: usize, fail_with: Option<&str>) -> (ProgressTuner<ScriptedRunner>, Rc<BufferSink>) {
        let ledger = Rc::new(TrialLedger::new(4));
        let sink = Rc::new(BufferSink::new());
        let runner = ScriptedRunner {
            ledger: ledger.clone(),
            epochs,
            fail_with: fail_with.map(String::from),
            callbacks_seen: Cell::new(0),
        };
        (ProgressTuner::new(runner, ledger, sink.clone()), sink)
    }

    #[test]
    fn test_success_records_one_timing_entry() {
        let (mut tuner, _sink) = tuner(3, None);
        let result = tuner.run_trial_with_new_callbacks(&Trial::new("00"), 0.42);
        assert_eq!(result, Ok(0.42));
        assert_eq!(tuner.trial_times().len(), 1);
        assert!(tuner.trial_times()["00"] >= 0.0);
        assert_eq!(tuner.status("00"), TrialStatus::Completed);
    }

    #[test]
    fn test_success_renders_completion_banner() {
        let (mut tuner, sink) = tuner(3, None);
        tuner
            .run_trial_with_new_callbacks(&Trial::new("00"), 0.42)
            .unwrap();
        let screen = sink.screen();
        assert!(screen.starts_with(&"=".repeat(60)));
        assert!(screen.contains("TRIAL 00 COMPLETED"));
        assert!(screen.contains("Final Validation Loss: 0.420000"));
        assert!(screen.contains("Trial Duration: "));
        assert!(screen.contains("Completed Trials: 1/4"));
        // the banner replaces the last epoch frame
        assert!(!screen.contains("RECENT EPOCH PROGRESS"));
    }

    #[test]
    fn test_nan_score_in_completion_banner() {
        let (mut tuner, sink) = tuner(1, None);
        let result = tuner.run_trial_with_new_callbacks(&Trial::new("00"), f64::NAN);
        assert!(result.unwrap().is_nan());
        assert!(sink.screen().contains("Final Validation Loss: nan"));
    }

    #[test]
    fn test_failure_is_reported_and_returned_unchanged() {
        let (mut tuner, sink) = tuner(2, Some("x"));
        let result = tuner.run_trial_with_new_callbacks(&Trial::new("07"), 0.0);
        assert_eq!(result, Err(ValueError("x".to_string())));
        assert!(sink.screen().contains("Trial 07 failed: x"));
        assert!(tuner.trial_times().is_empty());
        assert_eq!(tuner.status("07"), TrialStatus::Failed);
    }

    #[test]
    fn test_failure_line_is_appended_to_last_epoch_frame() {
        let (mut tuner, sink) = tuner(2, Some("diverged"));
        let _ = tuner.run_trial_with_new_callbacks(&Trial::new("07"), 0.0);
        let screen = sink.screen();
        assert!(screen.contains("TRIAL 07 - RECENT EPOCH PROGRESS"));
        assert!(screen.ends_with("Trial 07 failed: diverged\n"));
    }

    #[test]
    fn test_progress_callback_is_appended_in_place() {
        let (mut tuner, _sink) = tuner(1, None);
        let mut callbacks: CallbackList = vec![Box::new(CountingCallback)];
        tuner
            .run_trial(&Trial::new("00"), &mut callbacks, 1.0)
            .unwrap();
        assert_eq!(callbacks.len(), 2);
        assert_eq!(tuner.runner().callbacks_seen.get(), 2);
    }

    #[test]
    fn test_trials_are_independent() {
        let (mut tuner, _sink) = tuner(1, None);
        tuner
            .run_trial_with_new_callbacks(&Trial::new("00"), 0.5)
            .unwrap();
        tuner
            .run_trial_with_new_callbacks(&Trial::new("01"), 0.3)
            .unwrap();
        assert_eq!(tuner.trial_times().len(), 2);
        assert_eq!(tuner.status("02"), TrialStatus::NotStarted);
    }

    #[test]
    fn test_missing_score_renders_placeholder() {
        struct UnscoredRunner;
        impl TrialRunner for UnscoredRunner {
            type Args = ();
            type Output = Option<f64>;
            type Error = ValueError;
            fn run_trial(
                &mut self,
                _trial: &Trial,
                _callbacks: &mut CallbackList,
                _args: (),
            ) -> Result<Option<f64>, ValueError> {
                Ok(None)
            }
        }
        let sink = Rc::new(BufferSink::new());
        let mut tuner =
            ProgressTuner::new(UnscoredRunner, Rc::new(TrialLedger::new(1)), sink.clone());
        tuner
            .run_trial_with_new_callbacks(&Trial::new("00"), ())
            .unwrap();
        assert!(sink.screen().contains("Final Validation Loss: n/a"));
    }
}
