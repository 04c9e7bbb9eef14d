pub mod error;
pub mod config;
pub mod credential;
pub mod http;
pub mod dispatch;
pub mod api;
pub mod identity;
pub mod notifications;
pub mod notice;
pub mod channel;
pub mod client;

pub use client::TripClient;
pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};

// Session transition tracing on stderr; compiled out of release builds.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
