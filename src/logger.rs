use colored::{ColoredString, Colorize};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::io::{self, Write};
use std::sync::{Mutex, OnceLock};

static LOGGER: OnceLock<&'static FakeChrootLogger> = OnceLock::new();

/**
 * Writes `[LEVEL] pid target: message` lines to stderr.
 *
 * Several test-runner processes usually share one terminal, hence the pid.
 * Records are held back until `print_deferred` is called so messages logged
 * while the configuration (and with it the level) is still being resolved
 * are filtered by the final level.
 */
pub struct FakeChrootLogger {
    level: Mutex<LevelFilter>,
    output: Mutex<Box<dyn Write + Send>>,
    deferred: Mutex<Option<Vec<(Level, ColoredString)>>>,
    pid: u32,
}

impl FakeChrootLogger {
    fn new(level: LevelFilter, defer: bool) -> Self {
        Self {
            level: Mutex::new(level),
            output: Mutex::new(Box::new(io::stderr())),
            deferred: Mutex::new(defer.then(Vec::new)),
            pid: std::process::id(),
        }
    }

    /**
     * Installs the logger for a command line run, buffering output until
     * `print_deferred`. Fails if another logger is already installed.
     */
    pub fn install(
        level: LevelFilter,
    ) -> Result<&'static Self, log::SetLoggerError> {
        let logger: &'static Self = Box::leak(Box::new(Self::new(level, true)));
        log::set_logger(logger)?;
        log::set_max_level(LevelFilter::Trace);
        let _ = LOGGER.set(logger);
        Ok(logger)
    }

    pub fn set_level(&self, level: LevelFilter) {
        if let Ok(mut current) = self.level.lock() {
            *current = level;
        }
    }

    fn level(&self) -> LevelFilter {
        self.level.lock().map(|l| *l).unwrap_or(LevelFilter::Info)
    }

    /// Prints what was held back and stops deferring.
    pub fn print_deferred(&self) {
        let deferred = match self.deferred.lock() {
            Ok(mut deferred) => deferred.take(),
            Err(_) => return,
        };
        let Some(deferred) = deferred else {
            return;
        };

        let level_filter = self.level();
        if let Ok(mut output) = self.output.lock() {
            for (level, line) in deferred {
                if level <= level_filter {
                    let _ = writeln!(output, "{}", line);
                }
            }
        }
    }

    fn format(&self, record: &Record) -> ColoredString {
        let color = match record.level() {
            Level::Error => colored::Color::Red,
            Level::Warn => colored::Color::Yellow,
            Level::Info => colored::Color::White,
            Level::Debug => colored::Color::Blue,
            Level::Trace => colored::Color::BrightBlack,
        };
        format!(
            "[{:<5}] {} {}: {}",
            record.level(),
            self.pid,
            record.target(),
            record.args()
        )
        .color(color)
    }
}

/**
 * Installs an undeferred logger at `level`, or adjusts the level if this
 * crate's logger is already installed. Meant for test suites, which may call
 * it from every test.
 */
pub fn init(level: LevelFilter) {
    if let Some(logger) = LOGGER.get() {
        logger.set_level(level);
        return;
    }
    let logger: &'static FakeChrootLogger =
        Box::leak(Box::new(FakeChrootLogger::new(level, false)));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(LevelFilter::Trace);
        let _ = LOGGER.set(logger);
    }
}

impl Log for FakeChrootLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record) {
        let line = self.format(record);

        if let Ok(mut deferred) = self.deferred.lock() {
            if let Some(deferred) = deferred.as_mut() {
                deferred.push((record.level(), line));
                return;
            }
        }

        if self.enabled(record.metadata()) {
            if let Ok(mut output) = self.output.lock() {
                let _ = writeln!(output, "{}", line);
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut output) = self.output.lock() {
            let _ = output.flush();
        }
    }
}
