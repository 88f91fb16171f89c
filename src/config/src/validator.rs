// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use std::sync::Arc;

use conclave_api::pb::ConfigValidator;
use conclave_api::RpcError;

/// A caller-supplied validator for `ConfigValidator::Custom` items. Receives
/// the item name (for error messages) and the candidate value, and returns
/// an error if the value is unacceptable.
pub type CustomValidator = Arc<dyn Fn(&str, &str) -> Result<(), RpcError> + Send + Sync>;

pub fn validate_int(name: &str, value: &str) -> Result<i64, RpcError> {
    value
        .parse()
        .map_err(|_| RpcError::param_invalid(name, format!("not an int: {value}")))
}

pub fn validate_pos_int(name: &str, value: &str) -> Result<(), RpcError> {
    let v = validate_int(name, value)?;
    if v <= 0 {
        return Err(RpcError::param_invalid(name, format!("expected a strictly positive int, got {value}")));
    }
    Ok(())
}

pub fn validate_float(name: &str, value: &str) -> Result<f64, RpcError> {
    value
        .parse()
        .map_err(|_| RpcError::param_invalid(name, format!("not a float: {value}")))
}

pub fn validate_pos_float(name: &str, value: &str) -> Result<(), RpcError> {
    let v = validate_float(name, value)?;
    if v <= 0.0 {
        return Err(RpcError::param_invalid(name, format!("expected a strictly positive float, got {value}")));
    }
    Ok(())
}

/// Runs the validator associated with `kind` against `value`, delegating to
/// `custom` when `kind` is [`ConfigValidator::Custom`].
pub fn run(kind: ConfigValidator, custom: Option<&CustomValidator>, name: &str, value: &str) -> Result<(), RpcError> {
    match kind {
        ConfigValidator::ConfigValidString => Ok(()),
        ConfigValidator::ConfigValidInt => validate_int(name, value).map(|_| ()),
        ConfigValidator::ConfigValidPosInt => validate_pos_int(name, value),
        ConfigValidator::ConfigValidFloat => validate_float(name, value).map(|_| ()),
        ConfigValidator::ConfigValidPosFloat => validate_pos_float(name, value),
        ConfigValidator::ConfigValidCustom => match custom {
            Some(f) => f(name, value),
            None => Err(RpcError::new(
                conclave_api::ResultCode::ErrorParamMissing,
                format!("missing custom validator for config item: {name}"),
            )),
        },
    }
}

/// A valid config item name is `[a-z][a-z0-9-]*`.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pos_int_rejects_zero_and_negative() {
        assert!(validate_pos_int("x", "0").is_err());
        assert!(validate_pos_int("x", "-1").is_err());
        assert!(validate_pos_int("x", "1").is_ok());
    }

    #[test]
    fn names_must_start_lowercase() {
        assert!(is_valid_name("rpc-main-port"));
        assert!(is_valid_name("a1-b2"));
        assert!(!is_valid_name("1abc"));
        assert!(!is_valid_name("Rpc-Main"));
        assert!(!is_valid_name(""));
    }
}
