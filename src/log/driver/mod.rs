mod console_driver;
mod registry;
mod trait_;

pub use console_driver::{ConsoleDriver, ConsoleDriverConfig, Target};
pub use registry::{create_driver_from_options, register_drivers};
pub use trait_::LogDriver;
