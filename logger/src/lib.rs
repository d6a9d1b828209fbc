//! Default logging setup for splitmap binaries and tests
#![warn(missing_docs)]

use std::{
    fmt,
    sync::{Mutex, PoisonError},
    thread,
};

/// Short label of the thread emitting a record.
struct ThreadLabel(thread::Thread);

impl fmt::Display for ThreadLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.name() {
            Some(name) => write!(f, "{name:>8.8}"),
            None => {
                let id = format!("{:?}", self.0.id());
                let id = id.trim_start_matches("ThreadId(").trim_end_matches(')');
                write!(f, "{:>8}", format!("#{id}"))
            }
        }
    }
}

const TIMESTAMP_STYLE: anstyle::Style =
    anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightBlack)));

const THREAD_STYLE: anstyle::Style =
    anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Blue)));

const TARGET_STYLE: anstyle::Style =
    anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Magenta)));

/// Environment variable holding the log filter, defaulting to `info`.
pub const LOG_ENV: &str = "SPLITMAP_LOG";

/// Environment variable controlling colored output.
pub const LOG_STYLE_ENV: &str = "SPLITMAP_LOG_STYLE";

fn builder(default_filter: &str) -> env_logger::Builder {
    let start_time = std::time::Instant::now();
    let last_target = Mutex::new(String::new());

    let mut builder = env_logger::Builder::from_env(
        env_logger::Env::new()
            .filter_or(LOG_ENV, default_filter)
            .write_style(LOG_STYLE_ENV),
    );
    builder.format(move |buf, record| {
        use std::io::Write;

        let timestamp = start_time.elapsed();
        let level = record.level();
        let target = record.target();
        let thread = ThreadLabel(thread::current());

        let mut last_target = last_target.lock().unwrap_or_else(PoisonError::into_inner);

        if target != *last_target {
            last_target.clear();
            last_target.push_str(target);

            writeln!(
                buf,
                "{} {}",
                format_args!("{style}{timestamp:>9.2?}{style:#}", style = TIMESTAMP_STYLE),
                format_args!("{style}{target}{style:#}", style = TARGET_STYLE)
            )?;
        }
        writeln!(
            buf,
            "{} {} {} {}",
            format_args!("{style}{timestamp:>9.2?}{style:#}", style = TIMESTAMP_STYLE),
            format_args!("{style}{thread}{style:#}", style = THREAD_STYLE),
            format_args!(
                "{style}{level:<5}{style:#}",
                style = buf.default_level_style(level),
            ),
            record.args(),
        )
    });
    builder
}

/// Perform the default logging setup used by splitmap binaries
///
/// The filter is read from `SPLITMAP_LOG` and defaults to `info`.
pub fn setup() {
    builder("info").init();
}

/// Perform the logging setup used by tests
///
/// Output is captured by the test harness. `filter` is used unless `SPLITMAP_LOG` is set. Calling
/// this more than once, e.g. from several tests of the same binary, is fine.
pub fn test_setup(filter: &str) {
    let _ = builder(filter).is_test(true).try_init();
}
