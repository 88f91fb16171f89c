// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use conclave_api::pb::LoggerLevel;

/// Maps a [`LoggerLevel`] to the `tracing::Level` it corresponds to, where
/// one exists. `Unknown` and `Notset` have no `tracing::Level` counterpart:
/// `Unknown` is reported back for a logger nobody has ever configured, and
/// `Notset` means "inherit whatever the parent/default directive says".
/// `Critical` has no `tracing` equivalent above `ERROR`, so it maps there.
pub fn to_tracing_level(level: LoggerLevel) -> Option<tracing::Level> {
    match level {
        LoggerLevel::LvlUnknown | LoggerLevel::LvlNotset => None,
        LoggerLevel::LvlDebug => Some(tracing::Level::DEBUG),
        LoggerLevel::LvlInfo => Some(tracing::Level::INFO),
        LoggerLevel::LvlWarning => Some(tracing::Level::WARN),
        LoggerLevel::LvlError | LoggerLevel::LvlCritical => Some(tracing::Level::ERROR),
    }
}

/// The persisted spelling of a level, matching the original's
/// `LVL_`-stripped enum name (`"DEBUG"`, `"INFO"`, ...).
pub fn to_persisted_name(level: LoggerLevel) -> Option<&'static str> {
    match level {
        LoggerLevel::LvlUnknown => None,
        LoggerLevel::LvlNotset => Some("NOTSET"),
        LoggerLevel::LvlDebug => Some("DEBUG"),
        LoggerLevel::LvlInfo => Some("INFO"),
        LoggerLevel::LvlWarning => Some("WARNING"),
        LoggerLevel::LvlError => Some("ERROR"),
        LoggerLevel::LvlCritical => Some("CRITICAL"),
    }
}

pub fn from_persisted_name(name: &str) -> Option<LoggerLevel> {
    Some(match name.to_uppercase().as_str() {
        "NOTSET" => LoggerLevel::LvlNotset,
        "DEBUG" => LoggerLevel::LvlDebug,
        "INFO" => LoggerLevel::LvlInfo,
        "WARNING" => LoggerLevel::LvlWarning,
        "ERROR" => LoggerLevel::LvlError,
        "CRITICAL" => LoggerLevel::LvlCritical,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persisted_round_trips() {
        for level in [
            LoggerLevel::LvlNotset,
            LoggerLevel::LvlDebug,
            LoggerLevel::LvlInfo,
            LoggerLevel::LvlWarning,
            LoggerLevel::LvlError,
            LoggerLevel::LvlCritical,
        ] {
            let name = to_persisted_name(level).unwrap();
            assert_eq!(from_persisted_name(name), Some(level));
        }
    }

    #[test]
    fn unknown_level_has_no_tracing_equivalent() {
        assert_eq!(to_tracing_level(LoggerLevel::LvlUnknown), None);
    }
}
