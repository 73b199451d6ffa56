//! Logging interface, contingent on the `log` feature
//!
//! Only enable `log` when debugging, and when you're certain that your
//! logger isn't using this USB link! A logger that sends its records over
//! the CDC-ECM interface would recurse into the TX path.
//!
//! Without the feature, the arguments are still type checked, but never
//! formatted.

macro_rules! trace {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        ::__log::trace!($($args)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($args)*);
    }};
}

macro_rules! debug {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        ::__log::debug!($($args)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($args)*);
    }};
}

macro_rules! info {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        ::__log::info!($($args)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($args)*);
    }};
}

macro_rules! warn {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        ::__log::warn!($($args)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($args)*);
    }};
}

macro_rules! error {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        ::__log::error!($($args)*);
        #[cfg(not(feature = "log"))]
        let _ = format_args!($($args)*);
    }};
}
