// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! The configuration items every conclave server carries regardless of what
//! services it hosts: worker pool size, shutdown grace periods, log
//! rotation, and the main listener's host/port.

use std::sync::Arc;

use conclave_api::pb::ConfigValidator;
use conclave_api::RpcError;

use crate::item::ConfigItemSpec;

pub const MAX_WORKERS: &str = "rpc-max-workers";
pub const SHUTDOWN_GRACE: &str = "rpc-shutdown-grace";
pub const SHUTDOWN_TIMEOUT: &str = "rpc-shutdown-timeout";
pub const LOGS_FOLDER: &str = "rpc-logs-folder";
pub const LOGS_BACKUP: &str = "rpc-logs-backup";
pub const LOGS_ROLLOVER_INTERVAL_UNIT: &str = "rpc-logs-interval-unit";
pub const LOGS_ROLLOVER_INTERVAL: &str = "rpc-logs-interval";
pub const MAIN_HOST: &str = "rpc-main-host";
pub const MAIN_PORT: &str = "rpc-main-port";
pub const CLIENT_TIMEOUT: &str = "rpc-client-timeout";
pub const EVENT_RETAIN_TIMEOUT: &str = "event-retain-timeout";
pub const EVENT_KEEPALIVE_TIMEOUT: &str = "event-keepalive-timeout";

/// Rollover interval units accepted by `rpc-logs-interval-unit`, matching
/// Python's `TimedRotatingFileHandler`: seconds, minutes, hours, days,
/// midnight, or a weekday (`W0`..`W6`).
const INTERVAL_UNITS: &[&str] = &["S", "M", "H", "D", "MIDNIGHT", "W0", "W1", "W2", "W3", "W4", "W5", "W6"];

fn validate_interval_unit(name: &str, value: &str) -> Result<(), RpcError> {
    if INTERVAL_UNITS.contains(&value.to_uppercase().as_str()) {
        Ok(())
    } else {
        Err(RpcError::param_invalid(name, format!("not a valid interval unit: {value}")))
    }
}

/// Returns the static config item specs every server registers.
pub fn items() -> Vec<ConfigItemSpec> {
    vec![
        ConfigItemSpec::new(MAX_WORKERS, "Maximum parallel RPC worker threads", "30", ConfigValidator::ConfigValidPosInt),
        ConfigItemSpec::new(
            SHUTDOWN_GRACE,
            "Grace period for pending calls to be terminated on shutdown (seconds)",
            "30",
            ConfigValidator::ConfigValidPosFloat,
        ),
        ConfigItemSpec::new(
            SHUTDOWN_TIMEOUT,
            "Final timeout before real shutdown (i.e. end of process; seconds)",
            "60",
            ConfigValidator::ConfigValidPosFloat,
        ),
        ConfigItemSpec::new(LOGS_FOLDER, "Workspace relative folder where to store rolling logs", "logs", ConfigValidator::ConfigValidString),
        ConfigItemSpec::new(
            LOGS_BACKUP,
            "Backup log files to be persisted for each manager on rollover",
            "10",
            ConfigValidator::ConfigValidInt,
        ),
        ConfigItemSpec::new(LOGS_ROLLOVER_INTERVAL_UNIT, "Rollover interval unit", "H", ConfigValidator::ConfigValidString)
            .with_custom_validator(Arc::new(validate_interval_unit)),
        ConfigItemSpec::new(LOGS_ROLLOVER_INTERVAL, "Rollover interval", "1", ConfigValidator::ConfigValidPosInt),
        ConfigItemSpec::new(MAIN_HOST, "Main RPC server host (used by proxied services)", "localhost", ConfigValidator::ConfigValidString),
        ConfigItemSpec::new(MAIN_PORT, "Main RPC server port (used by proxied services)", "54321", ConfigValidator::ConfigValidPosInt),
        ConfigItemSpec::new(
            CLIENT_TIMEOUT,
            "Timeout for an RPC client when the server is unreachable or a proxy isn't registered yet (seconds)",
            "60",
            ConfigValidator::ConfigValidPosFloat,
        ),
        ConfigItemSpec::new(
            EVENT_RETAIN_TIMEOUT,
            "Window during which an interrupted event subscriber may resume before its queue is dropped (seconds)",
            "300",
            ConfigValidator::ConfigValidPosInt,
        ),
        ConfigItemSpec::new(
            EVENT_KEEPALIVE_TIMEOUT,
            "Interval between keep-alive events pushed to every subscriber (seconds)",
            "60",
            ConfigValidator::ConfigValidPosInt,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_static_names_are_registered() {
        let names: Vec<&str> = items().iter().map(|i| i.name.as_str()).collect();
        assert!(names.contains(&MAX_WORKERS));
        assert!(names.contains(&MAIN_PORT));
        assert!(names.contains(&EVENT_RETAIN_TIMEOUT));
        assert_eq!(names.len(), 12);
    }

    #[test]
    fn interval_unit_accepts_weekdays_and_rejects_garbage() {
        assert!(validate_interval_unit("x", "w3").is_ok());
        assert!(validate_interval_unit("x", "MIDNIGHT").is_ok());
        assert!(validate_interval_unit("x", "nope").is_err());
    }
}
