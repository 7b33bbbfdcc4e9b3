//! Logging for the watcher.
//!
//! The job table owns stdout, so terminal logs go to stderr. The log file is
//! appended to across runs rather than truncated.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use jobsync_logging::{parse_level, TARGET};
use log::LevelFilter;
use serde::Deserialize;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, SharedLogger, TermLogger, TerminalMode,
    WriteLogger,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum LogSink {
    #[default]
    File,
    Stderr,
    Both,
}

/// `log: (sink: Both, level: "debug", file: "watch.log")` in the config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub sink: LogSink,
    pub level: String,
    pub file: PathBuf,
    /// Also show logs from dependencies (reqwest, tungstenite), not just sync
    /// engine and app output.
    pub include_dependencies: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            sink: LogSink::default(),
            level: "info".to_string(),
            file: PathBuf::from("jobsync.log"),
            include_dependencies: false,
        }
    }
}

impl LogSettings {
    pub fn level_filter(&self) -> LevelFilter {
        parse_level(&self.level).unwrap_or(LevelFilter::Info)
    }
}

pub fn initialize(settings: &LogSettings) {
    let loggers = build_loggers(settings);
    if loggers.is_empty() {
        return;
    }
    let _ = CombinedLogger::init(loggers);
}

fn build_loggers(settings: &LogSettings) -> Vec<Box<dyn SharedLogger>> {
    let level = settings.level_filter();
    let config = build_config(settings.include_dependencies);
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();

    if matches!(settings.sink, LogSink::Stderr | LogSink::Both) {
        loggers.push(TermLogger::new(
            level,
            config.clone(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        ));
    }
    if matches!(settings.sink, LogSink::File | LogSink::Both) {
        match open_log_file(settings) {
            Some(file) => loggers.push(WriteLogger::new(level, config, file)),
            // Nothing else would report it.
            None if settings.sink == LogSink::File => loggers.push(TermLogger::new(
                level,
                build_config(settings.include_dependencies),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            )),
            None => {}
        }
    }
    loggers
}

fn build_config(include_dependencies: bool) -> Config {
    let mut builder = ConfigBuilder::new();
    builder
        .set_time_format_rfc3339()
        .set_target_level(LevelFilter::Error);
    if !include_dependencies {
        builder.add_filter_allow_str(TARGET);
        builder.add_filter_allow_str(env!("CARGO_CRATE_NAME"));
    }
    builder.build()
}

fn open_log_file(settings: &LogSettings) -> Option<File> {
    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.file)
    {
        Ok(file) => Some(file),
        Err(err) => {
            eprintln!(
                "jobsync: cannot open log file {}: {err}; logging to stderr",
                settings.file.display()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sinks_select_loggers() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("watch.log");
        let settings = |sink| LogSettings {
            sink,
            file: file.clone(),
            ..LogSettings::default()
        };

        assert_eq!(build_loggers(&settings(LogSink::Stderr)).len(), 1);
        assert_eq!(build_loggers(&settings(LogSink::File)).len(), 1);
        assert_eq!(build_loggers(&settings(LogSink::Both)).len(), 2);
        assert!(file.exists());
    }

    #[test]
    fn unopenable_file_falls_back_to_stderr() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = LogSettings {
            sink: LogSink::Both,
            file: dir.path().join("missing").join("watch.log"),
            ..LogSettings::default()
        };
        assert_eq!(build_loggers(&settings).len(), 1);

        let file_only = LogSettings {
            sink: LogSink::File,
            ..settings
        };
        assert_eq!(build_loggers(&file_only).len(), 1);
    }

    #[test]
    fn unknown_level_falls_back_to_info() {
        let settings = LogSettings {
            level: "chatty".to_string(),
            ..LogSettings::default()
        };
        assert_eq!(settings.level_filter(), LevelFilter::Info);
        let debug = LogSettings {
            level: "debug".to_string(),
            ..LogSettings::default()
        };
        assert_eq!(debug.level_filter(), LevelFilter::Debug);
    }
}
