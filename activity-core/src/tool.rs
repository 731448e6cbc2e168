use std::{io::Write, sync::Once};

/// Init log. Set log format.
pub fn init_log() {
    env_logger::builder()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}:{} - {}",
                chrono::Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .filter_level(log::LevelFilter::Info)
        .init();
}

static INIT_LOG: Once = Once::new();

/// Setup.
pub fn setup_log() {
    INIT_LOG.call_once(|| {
        init_log();
    });
}

/// Log the message as an error, then return it as an `anyhow` error.
#[macro_export]
macro_rules! error_bail {
    ($msg:literal $(,)?) => {
        log::error!($msg);
        anyhow::bail!($msg)
    };
    ($err:expr $(,)?) => {
        log::error!("{}", $err);
        anyhow::bail!($err)
    };
    ($fmt:expr, $($arg:tt)*) => {
        log::error!($fmt, $($arg)*);
        anyhow::bail!($fmt, $($arg)*)
    };
}

/// Second resolution timestamp used in every generated file name.
///
/// Two files created within the same second get the same name.
pub fn timestamp_string(now: &chrono::DateTime<chrono::Local>) -> String {
    now.format("%d_%m_%Y_%H_%M_%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_string() {
        let now = chrono::Local
            .with_ymd_and_hms(2024, 3, 7, 9, 5, 1)
            .single()
            .unwrap();

        assert_eq!(timestamp_string(&now), "07_03_2024_09_05_01");
    }

    #[test]
    fn test_error_bail() {
        setup_log();

        fn fail(name: &str) -> anyhow::Result<()> {
            error_bail!("missing column: {}", name);
        }

        let err = fail("user_id").unwrap_err();
        assert_eq!(err.to_string(), "missing column: user_id");
    }
}
