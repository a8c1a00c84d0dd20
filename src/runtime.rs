use evlog::Logger;
use once_cell::sync::OnceCell;

static LOGGER: OnceCell<Logger> = OnceCell::new();

/// Install the process logger. Later calls are ignored; the first one wins.
pub fn set_logger(logger: Logger) {
    let _ = LOGGER.set(logger);
}

/// Process logger. An unregistered default, which drops events, is installed
/// if `set_logger` was never called.
pub fn get_logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::default)
}
