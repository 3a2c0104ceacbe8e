use crate::{ConsoleDevice, console_trace};
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// `log` backend writing `[LEVEL] target: message` lines to a console device.
pub struct ConsoleLogger<D> {
    device: D,
    max_level: LevelFilter,
}

impl<D: ConsoleDevice> ConsoleLogger<D> {
    #[must_use]
    pub const fn new(device: D, max_level: LevelFilter) -> Self {
        Self { device, max_level }
    }

    pub const fn device(&self) -> &D {
        &self.device
    }

    /// Register as the global logger. Call once during early init.
    ///
    /// # Errors
    /// If a logger is already installed.
    pub fn install(&'static self) -> Result<(), SetLoggerError>
    where
        D: Sync + Send,
    {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl<D: ConsoleDevice + Sync + Send> Log for ConsoleLogger<D> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        console_trace!(
            self.device,
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}
