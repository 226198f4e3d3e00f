//! Replays recorded hyperparameter searches through the progress reporter
use std::{
    error::Error,
    fs::File,
    io::{self, Write},
    path::PathBuf,
    rc::Rc,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{debug, info};

use tuner_progress::{
    display::{BufferSink, ConsoleSink, DisplaySink, ProgressBarSink},
    oracle::TrialLedger,
    progress_callback::best_trial_block,
    replay::{ReplayRunner, SearchHistory},
    ProgressTuner, ReportOptions,
};

/// A CLI for watching hyperparameter searches. Replays a recorded search, drawing the same live summary a running search would.
#[derive(Parser, Debug, Clone)]
struct Cli {
    #[command(subcommand)]
    command: WhatCommands,
}

#[derive(Subcommand, Debug, Clone)]
enum WhatCommands {
    /// Replay every trial of a recorded search, redrawing progress after each epoch
    Replay(ReplayArgs),
    /// Replay a recorded search silently, then print only the best trial
    Summary(HistoryArgs),
}

#[derive(Args, Clone, Debug)]
struct HistoryArgs {
    /// path to the file containing the recorded search.
    /// The file format is determined by the file extension. Supported formats are: json, pickle, cbor
    #[arg(short = 'H', long = "history")]
    history_file: PathBuf,

    /// override the trial budget recorded in the history file
    #[arg(long)]
    max_trials: Option<usize>,
}

#[derive(Args, Clone, Debug)]
struct ReplayArgs {
    #[command(flatten)]
    history: HistoryArgs,

    /// how many of the most recent epochs to show in each frame
    #[arg(short = 'w', long, default_value = "2")]
    window: usize,

    /// where to draw progress frames
    #[arg(long, value_enum, default_value_t = DisplayKind::Console)]
    display: DisplayKind,

    /// milliseconds to pause after each replayed epoch, so frames can be watched
    #[arg(long, default_value = "0")]
    epoch_delay_ms: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum DisplayKind {
    /// redraw frames in place on the terminal
    Console,
    /// print every frame, one after another. Appropriate for piping
    Plain,
    /// print frames above a progress bar counting finished trials
    Bar,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    debug!("Using arguments {cli:?}");
    match cli.command {
        WhatCommands::Replay(replay_args) => {
            let history = replay_args.history.load()?;
            let options = ReportOptions::new(replay_args.window, ReportOptions::default().rule_width)?;

            // the bar sink needs finishing once the replay is over, so keep a typed handle to it
            let bar = match replay_args.display {
                DisplayKind::Bar => Some(Rc::new(ProgressBarSink::new(history.budget() as u64))),
                _ => None,
            };
            let sink: Rc<dyn DisplaySink> = match (&bar, replay_args.display) {
                (Some(bar), _) => bar.clone(),
                (None, DisplayKind::Plain) => Rc::new(ConsoleSink::plain()),
                (None, _) => Rc::new(ConsoleSink::new()),
            };

            replay_search(
                &history,
                options,
                sink,
                Duration::from_millis(replay_args.epoch_delay_ms),
            );
            if let Some(bar) = bar {
                bar.finish("Replay complete");
            }
            Ok(())
        }
        WhatCommands::Summary(history_args) => {
            let history = history_args.load()?;
            summarize(&history, &mut io::stdout().lock())?;
            Ok(())
        }
    }
}

impl HistoryArgs {
    /// Load the history file, applying any budget override
    fn load(&self) -> Result<SearchHistory, Box<dyn Error>> {
        let mut history = load_history(&self.history_file)?;
        if let Some(max_trials) = self.max_trials {
            history.max_trials = Some(max_trials);
        }
        Ok(history)
    }
}

/// Replay every trial of `history`, drawing progress on `sink`. Returns how many trials failed.
fn replay_search(
    history: &SearchHistory,
    options: ReportOptions,
    sink: Rc<dyn DisplaySink>,
    epoch_delay: Duration,
) -> usize {
    let ledger = Rc::new(TrialLedger::new(history.budget()));
    let runner = ReplayRunner::new(history, ledger.clone()).with_epoch_delay(epoch_delay);
    let mut tuner = ProgressTuner::with_options(runner, ledger, sink, options);
    let failures = run_all(&mut tuner, history);
    info!(
        "replayed {} trials ({} failed)",
        history.trials.len(),
        failures
    );
    failures
}

/// Replay `history` without drawing anything, then write its best-trial block to `out`.
/// Returns how many trials failed.
fn summarize(history: &SearchHistory, out: &mut impl Write) -> io::Result<usize> {
    let ledger = Rc::new(TrialLedger::new(history.budget()));
    let runner = ReplayRunner::new(history, ledger.clone());
    // frames from the silent replay are collected and dropped
    let mut tuner = ProgressTuner::new(runner, ledger.clone(), Rc::new(BufferSink::new()));
    let failures = run_all(&mut tuner, history);
    info!(
        "summarized {} trials ({} failed)",
        history.trials.len(),
        failures
    );
    for line in best_trial_block(&*ledger, &ReportOptions::default()) {
        writeln!(out, "{}", line)?;
    }
    Ok(failures)
}

fn run_all(tuner: &mut ProgressTuner<ReplayRunner>, history: &SearchHistory) -> usize {
    let mut failures = 0;
    for recorded in &history.trials {
        // a failed trial has already been reported; keep replaying the rest of the search
        if tuner
            .run_trial_with_new_callbacks(&recorded.trial(), ())
            .is_err()
        {
            failures += 1;
        }
    }
    failures
}

const SUPPORTED_EXTENSIONS: [&str; 3] = ["json", "pkl", "cbor"];

/// An error for history files whose extension doesn't name a supported format
#[derive(Debug)]
struct UnsupportedHistoryFormat(String);

impl std::fmt::Display for UnsupportedHistoryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "UNABLE TO LOAD HISTORY: unsupported file extension: {}. Supported extensions are: {}",
            self.0,
            SUPPORTED_EXTENSIONS.join(", ")
        )
    }
}

impl Error for UnsupportedHistoryFormat {}

fn load_history(history_file_path: &PathBuf) -> Result<SearchHistory, Box<dyn Error>> {
    debug!("Loading search history from file: {:?}", history_file_path);
    let file_extension = history_file_path
        .extension()
        .and_then(|extension| extension.to_str())
        .unwrap_or_default()
        .to_string();
    let file = File::open(history_file_path)?;
    let history: SearchHistory = match file_extension.as_str() {
        "json" => serde_json::from_reader(file)?,
        "pkl" => serde_pickle::from_reader(file, Default::default())?,
        "cbor" => ciborium::from_reader(file)?,
        _ => return Err(Box::new(UnsupportedHistoryFormat(file_extension))),
    };
    debug!(
        "Loaded {} recorded trials (budget {})",
        history.trials.len(),
        history.budget()
    );
    Ok(history)
}

#[cfg(test)]
mod test_main {
    use super::*;

    use std::{collections::BTreeMap, io::Seek};
    use tempfile::tempdir;
    use tuner_progress::{oracle::HyperparameterValue, replay::RecordedTrial};

    fn history() -> SearchHistory {
        SearchHistory {
            max_trials: Some(4),
            trials: vec![
                RecordedTrial {
                    trial_id: "0000".to_string(),
                    hyperparameters: BTreeMap::from([
                        ("units".to_string(), HyperparameterValue::Int(64)),
                        ("dropout".to_string(), HyperparameterValue::Float(0.25)),
                    ]),
                    epochs: vec![BTreeMap::from([
                        ("loss".to_string(), 0.5),
                        ("val_loss".to_string(), 0.6),
                    ])],
                    score: Some(0.6),
                    error: None,
                },
                RecordedTrial {
                    trial_id: "0001".to_string(),
                    hyperparameters: BTreeMap::from([(
                        "activation".to_string(),
                        HyperparameterValue::Text("tanh".to_string()),
                    )]),
                    epochs: vec![],
                    score: None,
                    error: Some("NaN loss".to_string()),
                },
            ],
        }
    }

    #[test]
    fn read_json_history() {
        let tmp_dir = tempdir().unwrap();
        let file_path = tmp_dir.path().join("search.json");
        let mut file = File::create(&file_path).unwrap();
        serde_json::to_writer(&mut file, &history()).unwrap();
        file.seek(std::io::SeekFrom::Start(0)).unwrap();
        assert_eq!(load_history(&file_path).unwrap(), history());
    }

    #[test]
    fn read_pickle_history() {
        let tmp_dir = tempdir().unwrap();
        let file_path = tmp_dir.path().join("search.pkl");
        let mut file = File::create(&file_path).unwrap();
        serde_pickle::to_writer(&mut file, &history(), Default::default()).unwrap();
        assert_eq!(load_history(&file_path).unwrap(), history());
    }

    #[test]
    fn read_cbor_history() {
        let tmp_dir = tempdir().unwrap();
        let file_path = tmp_dir.path().join("search.cbor");
        let mut file = File::create(&file_path).unwrap();
        ciborium::into_writer(&history(), &mut file).unwrap();
        assert_eq!(load_history(&file_path).unwrap(), history());
    }

    #[test]
    fn reject_unknown_extension() {
        let tmp_dir = tempdir().unwrap();
        let file_path = tmp_dir.path().join("search.avro");
        File::create(&file_path).unwrap();
        let error = load_history(&file_path).unwrap_err();
        assert!(error
            .to_string()
            .contains("unsupported file extension: avro"));
    }

    #[test]
    fn summary_prints_best_trial() {
        let mut out = Vec::new();
        let failures = summarize(&history(), &mut out).unwrap();
        let summary = String::from_utf8(out).unwrap();
        assert_eq!(failures, 1);
        assert!(summary.contains("BEST TRIAL SUMMARY"));
        assert!(summary.contains("Trial ID: 0000"));
        assert!(summary.contains("Best Validation Loss: 0.600000"));
        assert!(summary.contains("  dropout: 0.25"));
        assert!(summary.contains("  units: 64"));
        assert!(!summary.contains("activation"));
    }

    #[test]
    fn replay_draws_every_trial_and_counts_failures() {
        let sink = Rc::new(BufferSink::new());
        let failures = replay_search(
            &history(),
            ReportOptions::default(),
            sink.clone(),
            Duration::ZERO,
        );
        assert_eq!(failures, 1);
        let transcript = sink.transcript();
        assert!(transcript.contains("TRIAL 0000 - RECENT EPOCH PROGRESS"));
        assert!(transcript.contains("TRIAL 0000 COMPLETED"));
        assert!(transcript.contains("Completed Trials: 1/4"));
        assert!(sink.screen().ends_with("Trial 0001 failed: NaN loss\n"));
    }

    #[test]
    fn history_arguments_override_budget() {
        let tmp_dir = tempdir().unwrap();
        let file_path = tmp_dir.path().join("search.json");
        let file = File::create(&file_path).unwrap();
        serde_json::to_writer(file, &history()).unwrap();
        let args = HistoryArgs {
            history_file: file_path,
            max_trials: Some(10),
        };
        assert_eq!(args.load().unwrap().budget(), 10);
    }

    #[test]
    fn parse_replay_arguments() {
        let cli = Cli::try_parse_from([
            "tuner-progress",
            "replay",
            "--history",
            "search.json",
            "--window",
            "3",
            "--display",
            "bar",
        ])
        .unwrap();
        match cli.command {
            WhatCommands::Replay(args) => {
                assert_eq!(args.window, 3);
                assert_eq!(args.display, DisplayKind::Bar);
                assert_eq!(args.history.history_file, PathBuf::from("search.json"));
                assert_eq!(args.epoch_delay_ms, 0);
            }
            other => panic!("expected replay, got {other:?}"),
        }
    }
}
