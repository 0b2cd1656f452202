//! Unified logging and progress UI.
//!
//! [`Notifier`] wraps `env_logger` (text logs) and `indicatif` (spinner) under a single
//! verbosity switch:
//! - [`VerbosityLevel::Quiet`] → no text logs; a live spinner tracks the current step and
//!   the latest line of build output.
//! - [`VerbosityLevel::Info`]/[`VerbosityLevel::Debug`]/[`VerbosityLevel::Trace`] → standard
//!   logs on stderr, build output streamed to stdout.
//!
//! What you get:
//! - [`Notifier::info`]/[`Notifier::debug`]/[`Notifier::warn`]/[`Notifier::trace`]: emit logs
//!   (or update the Quiet-mode spinner message for `info`).
//! - [`Notifier::stream`]: forward one line of engine build output.
//! - [`Notifier::println_above`]: print to stdout, hiding the spinner while the line is written.
//! - [`Notifier::finish`]: clear the spinner once the run is over.

use env_logger::Env;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Record};
use std::cell::RefCell;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VerbosityLevel {
    Quiet = 0, // Spinner, no text logs
    Info = 1,  // Text logs at info level
    Debug = 2, // Text logs at debug level
    Trace = 3, // Text logs at trace level
}

impl From<u8> for VerbosityLevel {
    fn from(level: u8) -> Self {
        match level {
            0 => VerbosityLevel::Quiet,
            1 => VerbosityLevel::Info,
            2 => VerbosityLevel::Debug,
            _ => VerbosityLevel::Trace,
        }
    }
}

impl VerbosityLevel {
    fn to_log_level(self) -> LevelFilter {
        match self {
            VerbosityLevel::Quiet => LevelFilter::Warn,
            VerbosityLevel::Info => LevelFilter::Info,
            VerbosityLevel::Debug => LevelFilter::Debug,
            VerbosityLevel::Trace => LevelFilter::Trace,
        }
    }
}

pub struct Notifier {
    verbosity: VerbosityLevel,
    logger: env_logger::Logger,
    multi_progress: Option<MultiProgress>,
    active_spinner: RefCell<Option<ProgressBar>>,
}

impl Notifier {
    pub fn new(verbosity_level: u8) -> Self {
        let verbosity = VerbosityLevel::from(verbosity_level);

        let logger = env_logger::Builder::from_env(Env::default())
            .filter_level(verbosity.to_log_level())
            .build();

        let multi_progress = if verbosity == VerbosityLevel::Quiet {
            Some(MultiProgress::new())
        } else {
            None
        };

        Self {
            verbosity,
            logger,
            multi_progress,
            active_spinner: RefCell::new(None),
        }
    }

    pub fn info(&self, message: &str) {
        match self.verbosity {
            VerbosityLevel::Quiet => self.set_spinner_message(message),
            _ => self.log(Level::Info, message),
        }
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Debug, message);
        }
    }

    pub fn warn(&self, message: &str) {
        match self.verbosity {
            VerbosityLevel::Quiet => self.suspended(|| eprintln!("warning: {}", message)),
            _ => self.log(Level::Warn, message),
        }
    }

    pub fn trace(&self, message: &str) {
        if self.verbosity != VerbosityLevel::Quiet {
            self.log(Level::Trace, message);
        }
    }

    /// Forwards one line of build output from the engine.
    pub fn stream(&self, line: &str) {
        let line = line.trim_end();
        if line.is_empty() {
            return;
        }

        match self.verbosity {
            VerbosityLevel::Quiet => self.set_spinner_message(line),
            _ => println!("{}", line),
        }
    }

    pub fn println_above<S: AsRef<str>>(&self, message: S) {
        self.suspended(|| println!("{}", message.as_ref()));
    }

    pub fn finish(&self) {
        if let Some(spinner) = self.active_spinner.borrow_mut().take() {
            spinner.finish_and_clear();
        }
    }

    /// Runs `write` with the spinner cleared, so terminal output stays intact.
    /// Without an active spinner it runs directly.
    fn suspended<F: FnOnce()>(&self, write: F) {
        let spinning = self.active_spinner.borrow().is_some();
        match &self.multi_progress {
            Some(multi_progress) if spinning => multi_progress.suspend(write),
            _ => write(),
        }
    }

    fn set_spinner_message(&self, message: &str) {
        // Lazy initialize spinner on first message
        if self.active_spinner.borrow().is_none() {
            if let Some(multi_progress) = &self.multi_progress {
                let spinner_style = ProgressStyle::default_spinner()
                    .template("{spinner:.green} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());

                let spinner = multi_progress.add(ProgressBar::new_spinner());
                spinner.set_style(spinner_style);
                spinner.enable_steady_tick(Duration::from_millis(100));

                *self.active_spinner.borrow_mut() = Some(spinner);
            }
        }

        if let Some(spinner) = self.active_spinner.borrow().as_ref() {
            spinner.set_message(message.to_string());
        }
    }

    fn log(&self, level: Level, message: &str) {
        self.logger.log(
            &Record::builder()
                .args(format_args!("{}", message))
                .level(level)
                .target(module_path!())
                .build(),
        );
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.finish();
    }
}
