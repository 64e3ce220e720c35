use crate::env;
use console::style;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::Lazy;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Mutex;

struct Logger {
    level: LevelFilter,
    file_level: LevelFilter,
    log_file: Option<Mutex<File>>,
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level.max(self.file_level)
    }

    fn log(&self, record: &Record) {
        if record.level() <= self.file_level
            && let Some(log_file) = &self.log_file
        {
            let mut log_file = log_file.lock().unwrap_or_else(|e| e.into_inner());
            let out = format!(
                "{} {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                format_level(record.level()),
                record.args()
            );
            let _ = writeln!(log_file, "{}", console::strip_ansi_codes(&out));
        }
        if record.level() <= self.level {
            eprintln!("{} {}", self.styled_level(record.level()), record.args());
        }
    }

    fn flush(&self) {
        if let Some(log_file) = &self.log_file {
            let mut log_file = log_file.lock().unwrap_or_else(|e| e.into_inner());
            let _ = log_file.flush();
        }
    }
}

static LOGGER: Lazy<Logger> = Lazy::new(Logger::new);

pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        if let Err(err) = log::set_logger(&*LOGGER).map(|()| log::set_max_level(LOGGER.max_level()))
        {
            eprintln!("omnify-sidecar: could not initialize logger: {err}");
        }
    });
}

impl Logger {
    fn new() -> Self {
        let log_file = env::SIDECAR_LOG_FILE.as_ref().and_then(|path| {
            if let Some(parent) = path.parent()
                && let Err(err) = xx::file::mkdirp(parent)
            {
                eprintln!("omnify-sidecar: could not create log dir: {err}");
                return None;
            }
            match OpenOptions::new().create(true).append(true).open(path) {
                Ok(f) => Some(Mutex::new(f)),
                Err(err) => {
                    eprintln!(
                        "omnify-sidecar: could not open log file {}: {err}",
                        path.display()
                    );
                    None
                }
            }
        });
        let file_level = if log_file.is_some() {
            *env::SIDECAR_LOG_FILE_LEVEL
        } else {
            LevelFilter::Off
        };
        Self {
            level: *env::SIDECAR_LOG,
            file_level,
            log_file,
        }
    }

    fn max_level(&self) -> LevelFilter {
        self.level.max(self.file_level)
    }

    fn styled_level(&self, level: Level) -> String {
        let name = format_level(level);
        match level {
            Level::Error => style(name).red().bold().to_string(),
            Level::Warn => style(name).yellow().bold().to_string(),
            Level::Info => style(name).cyan().to_string(),
            Level::Debug => style(name).magenta().dim().to_string(),
            Level::Trace => style(name).dim().to_string(),
        }
    }
}

fn format_level(level: Level) -> String {
    format!("[{}]", level.to_string().to_uppercase())
}
