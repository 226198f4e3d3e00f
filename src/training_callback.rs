use rustc_hash::FxHashMap;

/// Metric values reported by a training loop at the end of an epoch, keyed by metric name (e.g. `loss`, `val_loss`, `lr`).
pub type EpochLogs = FxHashMap<String, f64>;

/// The callbacks attached to a single trial's training run. Runners are expected to call every callback in the list, in order.
pub type CallbackList = Vec<Box<dyn TrainingCallback>>;

/// Structs implementing this trait can be attached to a trial and observe its training loop.
pub trait TrainingCallback {
    /// called by the [`TrialRunner`](crate::progress_tuner::TrialRunner) once, before the first epoch of a training run.
    fn on_train_begin(&mut self);

    /// called by the [`TrialRunner`](crate::progress_tuner::TrialRunner) at the end of each epoch. `epoch` is zero-based.
    /// `logs` holds whatever metrics the training loop produced; callbacks must tolerate missing keys.
    fn on_epoch_end(&mut self, epoch: usize, logs: &EpochLogs);
}

/// Call [`TrainingCallback::on_train_begin`] on every callback in the list
pub fn notify_train_begin(callbacks: &mut CallbackList) {
    for callback in callbacks.iter_mut() {
        callback.on_train_begin();
    }
}

/// Call [`TrainingCallback::on_epoch_end`] on every callback in the list
pub fn notify_epoch_end(callbacks: &mut CallbackList, epoch: usize, logs: &EpochLogs) {
    for callback in callbacks.iter_mut() {
        callback.on_epoch_end(epoch, logs);
    }
}
