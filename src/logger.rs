use fern::colors::{Color, ColoredLevelConfig};
use fern::Dispatch;
use log::LevelFilter;

/// Maps the number of `-v` flags to a level; warnings are always shown.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Routes `log` records to stderr so stdout only ever carries results.
pub fn initialize(verbosity: u8, colored: bool) -> Result<(), log::SetLoggerError> {
    let colors = ColoredLevelConfig::new()
        .trace(Color::Magenta)
        .debug(Color::Blue)
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    Dispatch::new()
        .level(level_for(verbosity))
        .format(move |out, message, record| {
            if colored {
                out.finish(format_args!(
                    "[{}] {}: {}",
                    colors.color(record.level()),
                    record.target(),
                    message
                ))
            } else {
                out.finish(format_args!(
                    "[{}] {}: {}",
                    record.level(),
                    record.target(),
                    message
                ))
            }
        })
        .chain(std::io::stderr())
        .apply()
}
