// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

use conclave_api::pb::ConfigValidator;
use conclave_api::{RpcError, RpcResult};

use crate::validator::{self, CustomValidator};

/// The static part of a configuration item: its name, description,
/// hard-coded default, and how to validate a candidate value. Declared once
/// per item by whichever crate owns it (the framework itself, or a hosted
/// service) and handed to a [`crate::ConfigManager`] at construction.
#[derive(Clone)]
pub struct ConfigItemSpec {
    pub name: String,
    pub description: String,
    pub default_value: String,
    pub validator: ConfigValidator,
    pub can_be_empty: bool,
    pub custom_validator: Option<CustomValidator>,
}

impl ConfigItemSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_value: impl Into<String>, validator: ConfigValidator) -> Self {
        ConfigItemSpec {
            name: name.into(),
            description: description.into(),
            default_value: default_value.into(),
            validator,
            can_be_empty: false,
            custom_validator: None,
        }
    }

    pub fn can_be_empty(mut self, can_be_empty: bool) -> Self {
        self.can_be_empty = can_be_empty;
        self
    }

    pub fn with_custom_validator(mut self, f: CustomValidator) -> Self {
        self.validator = ConfigValidator::ConfigValidCustom;
        self.custom_validator = Some(f);
        self
    }

    fn validate(&self, value: &str) -> RpcResult<()> {
        if value.is_empty() {
            if !self.can_be_empty {
                return Err(RpcError::param_missing(&self.name));
            }
            return Ok(());
        }
        validator::run(self.validator, self.custom_validator.as_ref(), &self.name, value)
    }
}

/// A live configuration item: its spec, plus the effective default (after
/// layering) and current value. `hard_coded_default` is kept around
/// separately from `default_value` because tests construct fresh specs with
/// overridden hard-coded defaults and expect those to take precedence over
/// anything layered from a prior run.
pub(crate) struct ConfigItem {
    pub spec: ConfigItemSpec,
    pub hard_coded_default: String,
    pub default_value: String,
    pub value: String,
}

impl ConfigItem {
    pub(crate) fn new(spec: ConfigItemSpec) -> RpcResult<Self> {
        if !validator::is_valid_name(&spec.name) {
            return Err(RpcError::param_invalid(&spec.name, "must match [a-z][a-z0-9-]*"));
        }
        if spec.validator == ConfigValidator::ConfigValidCustom && spec.custom_validator.is_none() {
            return Err(RpcError::new(
                conclave_api::ResultCode::ErrorParamMissing,
                format!("missing custom validator for config item: {}", spec.name),
            ));
        }
        let hard_coded_default = spec.default_value.clone();
        Ok(ConfigItem {
            spec,
            hard_coded_default,
            default_value: String::new(),
            value: String::new(),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.spec.name
    }

    pub(crate) fn validate(&self, value: &str) -> RpcResult<()> {
        self.spec.validate(value)
    }

    /// Sets the effective default for this item, validating it first. Called
    /// once per item while layering defaults at manager construction.
    pub(crate) fn set_default(&mut self, value: String) -> RpcResult<()> {
        self.validate(&value)?;
        self.default_value = value;
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.value = self.default_value.clone();
    }

    pub(crate) fn update(&mut self, value: String) -> RpcResult<()> {
        self.validate(&value)?;
        self.value = value;
        Ok(())
    }

    pub(crate) fn to_wire(&self) -> conclave_api::ConfigItem {
        conclave_api::ConfigItem {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            default_value: self.default_value.clone(),
            value: self.value.clone(),
            validator: self.spec.validator as i32,
            can_be_empty: self.spec.can_be_empty,
        }
    }
}
