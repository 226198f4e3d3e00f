use std::{
    cell::{Cell, RefCell},
    io::{self, IsTerminal, Write},
};

use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

use crate::oracle::TrialStatus;

/// A block of text to show on a display surface.
///
/// If `clear_previous` is set, the block replaces whatever the surface currently shows; otherwise it is appended.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct DisplayFrame {
    /// whether to wipe the surface before drawing this frame
    pub clear_previous: bool,
    /// the lines of the frame, without trailing newlines. Empty strings are blank lines
    pub lines: Vec<String>,
}

impl DisplayFrame {
    /// A frame that replaces the current contents of the surface
    pub fn replacing(lines: Vec<String>) -> Self {
        DisplayFrame {
            clear_previous: true,
            lines,
        }
    }

    /// A frame that is appended below the current contents of the surface
    pub fn appending(lines: Vec<String>) -> Self {
        DisplayFrame {
            clear_previous: false,
            lines,
        }
    }

    /// The frame's lines joined with newlines, including a trailing newline
    pub fn text(&self) -> String {
        let mut text = String::new();
        for line in &self.lines {
            text.push_str(line);
            text.push('\n');
        }
        text
    }
}

/// Somewhere progress frames can be drawn. Rendering is fire-and-forget: sinks swallow their own I/O errors.
pub trait DisplaySink {
    /// Draw a frame on the surface
    fn render(&self, frame: &DisplayFrame);

    /// Called by [`ProgressTuner`](crate::progress_tuner::ProgressTuner) when a trial reaches a terminal status.
    /// Does nothing by default.
    fn on_trial_finished(&self, _trial_id: &str, _status: TrialStatus) {}
}

/// Draws frames on standard output, clearing the terminal between replacing frames.
///
/// Clearing only happens when stdout is a terminal, so piped output keeps every frame.
pub struct ConsoleSink {
    clear_screen: bool,
}

impl ConsoleSink {
    /// Create a console sink that clears the terminal between frames when stdout is a terminal
    pub fn new() -> Self {
        ConsoleSink {
            clear_screen: io::stdout().is_terminal(),
        }
    }

    /// Create a console sink that never clears, printing every frame one after another
    pub fn plain() -> Self {
        ConsoleSink {
            clear_screen: false,
        }
    }

    /// Write `frame` to `out` the way this sink writes to stdout, preceded by the clear-screen sequence
    /// only when the frame replaces the previous one and clearing is on.
    ///
    /// # Errors
    /// Returns any error from writing to or flushing `out`.
    pub fn render_to<W: Write>(&self, out: &mut W, frame: &DisplayFrame) -> io::Result<()> {
        if frame.clear_previous && self.clear_screen {
            out.write_all(CLEAR_AND_HOME.as_bytes())?;
        }
        out.write_all(frame.text().as_bytes())?;
        out.flush()
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

const CLEAR_AND_HOME: &str = "\x1B[2J\x1B[1;1H";

impl DisplaySink for ConsoleSink {
    fn render(&self, frame: &DisplayFrame) {
        if let Err(e) = self.render_to(&mut io::stdout().lock(), frame) {
            warn!("failed to draw progress frame: {}", e);
        }
    }
}

/// Keeps frames in memory. Useful for tests and for capturing reports to be shown later.
#[derive(Debug, Default)]
pub struct BufferSink {
    screen: RefCell<String>,
    transcript: RefCell<String>,
    frames_rendered: Cell<usize>,
    clears: Cell<usize>,
}

impl BufferSink {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// What a refreshable surface would currently show: everything drawn since the last clearing frame
    pub fn screen(&self) -> String {
        self.screen.borrow().clone()
    }

    /// Everything ever drawn, ignoring clears
    pub fn transcript(&self) -> String {
        self.transcript.borrow().clone()
    }

    /// How many frames have been rendered
    pub fn frames_rendered(&self) -> usize {
        self.frames_rendered.get()
    }

    /// How many of the rendered frames cleared the surface
    pub fn clears(&self) -> usize {
        self.clears.get()
    }
}

impl DisplaySink for BufferSink {
    fn render(&self, frame: &DisplayFrame) {
        let text = frame.text();
        if frame.clear_previous {
            self.screen.borrow_mut().clear();
            self.clears.set(self.clears.get() + 1);
        }
        self.screen.borrow_mut().push_str(&text);
        self.transcript.borrow_mut().push_str(&text);
        self.frames_rendered.set(self.frames_rendered.get() + 1);
    }
}

/// Prints frames above a progress bar that counts finished trials against the search's trial budget.
///
/// Lines printed above the bar scroll rather than being cleared.
pub struct ProgressBarSink {
    pb: ProgressBar,
}

impl ProgressBarSink {
    /// Create a progress bar sink for a search with `max_trials` trials
    pub fn new(max_trials: u64) -> Self {
        let pb = ProgressBar::new(max_trials);
        let style = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.green/white}] {human_pos}/{human_len} trials ({eta}) {msg}");
        match style {
            Ok(style) => pb.set_style(style),
            Err(e) => warn!("falling back to the default progress style: {}", e),
        }
        ProgressBarSink { pb }
    }

    /// Finish the bar, leaving it on screen with a closing message
    pub fn finish(&self, message: &str) {
        self.pb.finish_with_message(message.to_string());
    }
}

impl DisplaySink for ProgressBarSink {
    fn render(&self, frame: &DisplayFrame) {
        let text = frame.text();
        self.pb.println(text.trim_end_matches('\n'));
    }

    fn on_trial_finished(&self, trial_id: &str, status: TrialStatus) {
        self.pb.set_message(format!("trial {} {}", trial_id, status));
        self.pb.inc(1);
    }
}
