// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Logging for programs using this crate.

/// Send log messages to stdout. A verbosity of 0 shows info-level messages, 1
/// debug and 2 trace; any higher also prints the timestamp, source module
/// and line of each message. `RUST_LOG` can override the filter.
///
/// Only the first call installs a logger; later calls return an error that
/// can be ignored.
pub fn setup_logging(verbosity: u8) -> Result<(), log::SetLoggerError> {
    let mut builder = env_logger::Builder::new();
    builder.target(env_logger::Target::Stdout);
    builder.format_target(false);
    match verbosity {
        0 => builder.filter_level(log::LevelFilter::Info),
        1 => builder.filter_level(log::LevelFilter::Debug),
        2 => builder.filter_level(log::LevelFilter::Trace),
        _ => {
            builder.filter_level(log::LevelFilter::Trace);
            builder.format(|buf, record| {
                use std::io::Write;

                let timestamp = buf.timestamp();
                let level = record.level();
                let target = record.target();
                let line = record.line().unwrap_or(0);
                let message = record.args();

                writeln!(buf, "[{timestamp} {level} {target}:{line}] {message}")
            })
        }
    };
    builder.parse_default_env();
    builder.try_init()
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial]
    fn test_second_setup_is_harmless() {
        // Another test may have installed a logger already, so only the
        // second call's result is certain.
        let _ = setup_logging(1);
        assert!(setup_logging(3).is_err());
        log::debug!("still logging");
    }
}
