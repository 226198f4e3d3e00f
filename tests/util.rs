use std::{collections::BTreeMap, fmt, rc::Rc};

use tuner_progress::{
    oracle::TrialLedger,
    training_callback::{notify_epoch_end, notify_train_begin, CallbackList, EpochLogs},
    Trial, TrialRunner,
};

/// The error raised by [`ScriptedRunner`] when a trial is scripted to fail
#[derive(Debug, Clone, PartialEq)]
pub struct ValueError(pub String);

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for ValueError {}

/// What a [`ScriptedRunner`] does for one trial
pub struct Script {
    pub losses: Vec<f64>,
    pub fail_with: Option<String>,
}

/// A runner that trains nothing: it reports the scripted losses as epochs and records the last one as the trial's score
pub struct ScriptedRunner {
    pub ledger: Rc<TrialLedger>,
}

impl ScriptedRunner {
    pub fn new(ledger: Rc<TrialLedger>) -> Self {
        ScriptedRunner { ledger }
    }
}

impl TrialRunner for ScriptedRunner {
    type Args = Script;
    type Output = f64;
    type Error = ValueError;

    fn run_trial(
        &mut self,
        trial: &Trial,
        callbacks: &mut CallbackList,
        script: Script,
    ) -> Result<f64, ValueError> {
        self.ledger.open_trial(trial);
        notify_train_begin(callbacks);
        for (epoch, loss) in script.losses.iter().enumerate() {
            let mut logs = EpochLogs::default();
            logs.insert("loss".to_string(), *loss);
            logs.insert("val_loss".to_string(), *loss + 0.1);
            logs.insert("lr".to_string(), 0.001);
            notify_epoch_end(callbacks, epoch, &logs);
        }
        if let Some(message) = script.fail_with {
            self.ledger.fail_trial(trial.id());
            return Err(ValueError(message));
        }
        let score = script.losses.last().copied().unwrap_or(f64::NAN) + 0.1;
        let metrics = BTreeMap::from([("val_loss".to_string(), score)]);
        self.ledger.complete_trial(trial.id(), Some(score), metrics);
        Ok(score)
    }
}

pub fn succeed(losses: &[f64]) -> Script {
    Script {
        losses: losses.to_vec(),
        fail_with: None,
    }
}

pub fn fail(losses: &[f64], message: &str) -> Script {
    Script {
        losses: losses.to_vec(),
        fail_with: Some(message.to_string()),
    }
}
