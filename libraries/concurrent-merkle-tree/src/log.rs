macro_rules! cmt_logging {
    ($message:literal, $($arg:tt)*) => {
        #[cfg(feature = "log")]
        ::log::debug!($message, $($arg)*);
    };
    ($message:literal) => {
        #[cfg(feature = "log")]
        ::log::debug!($message);
    };
}
