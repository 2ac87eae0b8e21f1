//! Logging shims that forward to the `log` crate when the `log` feature is
//! enabled, and expand to nothing otherwise.

#[cfg(feature = "log")]
macro_rules! info {
    ($($t:tt)*) => { ::log::info!($($t)*) };
}

#[cfg(not(feature = "log"))]
macro_rules! info {
    ($($t:tt)*) => {{}};
}
