/// Turns a `Result` into an `Option`, logging the error at `level`.
///
/// Used where a failure must not abort the surrounding operation, such as
/// a controller the kernel refuses to delegate.
pub trait ResultOkLogExt<T, E> {
    fn ok_log(self, level: log::Level) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self, level: log::Level) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::log!(level, "{err}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_log_passes_value() {
        let result: Result<u32, std::io::Error> = Ok(7);
        assert_eq!(result.ok_log(log::Level::Warn), Some(7));
    }

    #[test]
    fn test_ok_log_discards_error() {
        let result: Result<u32, std::io::Error> = Err(std::io::Error::other("boom"));
        assert_eq!(result.ok_log(log::Level::Error), None);
    }
}
