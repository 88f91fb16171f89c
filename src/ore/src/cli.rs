// Copyright conclave contributors. All rights reserved.
//
// Use of this software is governed by the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance with the
// License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Command-line parsing utilities.

use clap::Parser;

/// A help template that omits the binary name and version from the help
/// output, since every conclave binary reports its version through
/// `srv.info` rather than `--version`.
pub const NO_VERSION_HELP_TEMPLATE: &str = "{about}

USAGE:
    {usage}

{all-args}";

/// Parses command-line arguments for a clap-derived `Parser`, applying the
/// conclave-wide help template.
pub fn parse_args<O>() -> O
where
    O: Parser,
{
    O::parse()
}

/// `name=value` pairs collected from repeated `-c`/`--config` flags, e.g.
/// `-c rpc-main-port=8080 -c rpc-logs-folder=/tmp/logs`.
///
/// Kept separate from a plain `Vec<(String, String)>` so that clap's derive
/// can report a useful parse error (`"bad config override"`) instead of a
/// generic one when a flag is missing its `=`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigOverride {
    pub name: String,
    pub value: String,
}

impl std::str::FromStr for ConfigOverride {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((name, value)) => Ok(ConfigOverride {
                name: name.to_owned(),
                value: value.to_owned(),
            }),
            None => Err(format!("expected name=value, got {s:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_override_parses() {
        let o: ConfigOverride = "rpc-main-port=8080".parse().unwrap();
        assert_eq!(o.name, "rpc-main-port");
        assert_eq!(o.value, "8080");
    }

    #[test]
    fn config_override_rejects_missing_equals() {
        assert!("rpc-main-port".parse::<ConfigOverride>().is_err());
    }
}
