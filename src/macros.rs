//! Macros for the virtual interrupt subsystem.

/// A macro for formatted printing without a newline.
///
/// Output goes to the console sink registered with
/// [`set_console`](crate::utils::set_console).
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::utils::_print(format_args!($($arg)*)));
}

/// A macro for formatted printing with a newline.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
