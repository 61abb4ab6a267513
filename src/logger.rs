use log::LevelFilter;
use log4rs::{
    Config,
    append::console::{ConsoleAppender, Target},
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
};

/// Error returned when the console logger cannot be installed.
#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("Invalid logger configuration: {0}")]
    Config(#[from] log4rs::config::runtime::ConfigErrors),

    #[error("A logger is already installed: {0}")]
    AlreadySet(#[from] log::SetLoggerError),
}

/// Install a console logger writing to stderr, keeping stdout for command output.
pub fn init_log(level: LevelFilter) -> Result<(), LoggerError> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("[{h({l})} - {f}:{L}] {m}{n}")))
        .build();
    let appender = Appender::builder().build("stderr", Box::new(stderr));

    log4rs::init_config(
        Config::builder()
            .appender(appender)
            .build(Root::builder().appender("stderr").build(level))?,
    )?;
    update_panic_hook();

    Ok(())
}

/// Map the CLI verbosity flags to a level filter.
pub fn level_from_verbosity(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Warn;
    }

    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

fn update_panic_hook() {
    let hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        hook(info);
    }));
}
