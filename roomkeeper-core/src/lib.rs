pub mod config;
pub mod core_room;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_room::{RoomError, RoomService};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let _ = LogLevel::Info;
        assert!(Config::default().validate().is_ok());
    }
}
