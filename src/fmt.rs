//! Logging macros that forward to `defmt` when the feature is enabled.
//!
//! Host test builds run without a global logger, so every statement
//! compiles to nothing unless the `defmt` feature is active.
#![macro_use]
#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:expr),* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::trace!($($arg),*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($(&$arg),*);
        }
    };
}

macro_rules! debug {
    ($($arg:expr),* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::debug!($($arg),*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($(&$arg),*);
        }
    };
}

macro_rules! info {
    ($($arg:expr),* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::info!($($arg),*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($(&$arg),*);
        }
    };
}

macro_rules! warning {
    ($($arg:expr),* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::warn!($($arg),*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($(&$arg),*);
        }
    };
}

macro_rules! error {
    ($($arg:expr),* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::error!($($arg),*);
            #[cfg(not(feature = "defmt"))]
            let _ = ($(&$arg),*);
        }
    };
}
