use miette::{Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use time::{
    format_description::{self, FormatItem},
    OffsetDateTime, UtcOffset,
};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    fmt::{format, FmtContext, FormatEvent, FormatFields},
    registry::LookupSpan,
    FmtSubscriber,
};

/// Pick the log level from the number of `-v` and whether `-q` was given.
pub fn level_from_flags(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialize the logging system
pub fn init_logging(level: Level) -> Result<()> {
    // Getting the offset fails on some platforms once threads are running,
    // fall back to UTC in that case
    let local_offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);

    let logger = ThreadLogger::new(local_offset)?;

    let subscriber = FmtSubscriber::builder()
        .event_format(logger)
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .into_diagnostic()
        .wrap_err("Setting default subscriber failed")
}

/// Event formatter printing the local time, the level and the thread name.
///
/// The thread name tells apart what the UI thread and the download worker did.
struct ThreadLogger {
    offset: UtcOffset,
    time_format: Vec<FormatItem<'static>>,
}

impl ThreadLogger {
    fn new(offset: UtcOffset) -> Result<Self> {
        Ok(Self {
            offset,
            time_format: format_description::parse("[hour]:[minute]:[second]")
                .into_diagnostic()
                .wrap_err("Invalid log time format")?,
        })
    }
}

impl<S, N> FormatEvent<S, N> for ThreadLogger
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let now = OffsetDateTime::now_utc().to_offset(self.offset).time();
        let now = now.format(&self.time_format).map_err(|_| std::fmt::Error)?;
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("?");

        if writer.has_ansi_escapes() {
            let level = match *metadata.level() {
                Level::ERROR => metadata.level().red().to_string(),
                Level::WARN => metadata.level().yellow().to_string(),
                Level::DEBUG => metadata.level().blue().to_string(),
                _ => metadata.level().green().to_string(),
            };

            write!(&mut writer, "{now} {level:>5} {} ", thread_name.yellow())?;
        } else {
            write!(
                &mut writer,
                "{now} {:>5} {thread_name} ",
                metadata.level()
            )?;
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_wins_over_verbose() {
        assert_eq!(level_from_flags(3, true), Level::ERROR);
    }

    #[test]
    fn verbosity_steps() {
        assert_eq!(level_from_flags(0, false), Level::INFO);
        assert_eq!(level_from_flags(1, false), Level::DEBUG);
        assert_eq!(level_from_flags(5, false), Level::TRACE);
    }
}
