//! Logging helpers.

/// Emit a `tracing` event only when client diagnostics are switched on.
///
/// ```ignore
/// diag!(self.diagnostics, debug, event = %name, "dropping frame");
/// ```
macro_rules! diag {
    ($enabled:expr, $level:ident, $($arg:tt)+) => {
        if $enabled {
            ::tracing::$level!($($arg)+);
        }
    };
}
