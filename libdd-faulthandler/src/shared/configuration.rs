// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::shared::constants::{
    DD_FAULTHANDLER_ALT_STACK, DD_FAULTHANDLER_REPORT_PATH, DD_FAULTHANDLER_SIGNALS,
};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultHandlerConfiguration {
    create_alt_stack: bool,
    // Where to mirror the crash report, in addition to stderr
    report_path: Option<PathBuf>,
    // Signal names, e.g. "SIGSEGV"; `None` selects the default set
    signals: Option<Vec<String>>,
    use_alt_stack: bool,
}

impl FaultHandlerConfiguration {
    pub fn new(
        signals: Option<Vec<String>>,
        report_path: Option<PathBuf>,
        create_alt_stack: bool,
        use_alt_stack: bool,
    ) -> anyhow::Result<Self> {
        // Requesting to create, but not use, the altstack is considered paradoxical.
        anyhow::ensure!(
            !create_alt_stack || use_alt_stack,
            "Cannot create an altstack without using it"
        );
        Ok(Self {
            create_alt_stack,
            report_path,
            signals,
            use_alt_stack,
        })
    }

    /// Reads the configuration from `DD_FAULTHANDLER_*` environment variables.
    ///
    /// `DD_FAULTHANDLER_SIGNALS` is a comma separated list of names,
    /// `DD_FAULTHANDLER_REPORT_PATH` a file path and `DD_FAULTHANDLER_ALT_STACK` a boolean that
    /// both creates and uses an alternate signal stack. Unset or empty variables keep defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let lookup = |name: &str| var(name).filter(|value| !value.trim().is_empty());

        let signals = lookup(DD_FAULTHANDLER_SIGNALS).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect()
        });
        let report_path = lookup(DD_FAULTHANDLER_REPORT_PATH).map(PathBuf::from);
        let alt_stack = match lookup(DD_FAULTHANDLER_ALT_STACK) {
            Some(value) => parse_bool(&value)
                .with_context(|| format!("Invalid value for {DD_FAULTHANDLER_ALT_STACK}"))?,
            None => false,
        };
        Self::new(signals, report_path, alt_stack, alt_stack)
    }

    pub fn create_alt_stack(&self) -> bool {
        self.create_alt_stack
    }

    pub fn use_alt_stack(&self) -> bool {
        self.use_alt_stack
    }

    pub fn report_path(&self) -> Option<&Path> {
        self.report_path.as_deref()
    }

    pub fn signals(&self) -> Option<&[String]> {
        self.signals.as_deref()
    }

    pub fn set_report_path(&mut self, report_path: Option<PathBuf>) {
        self.report_path = report_path;
    }

    pub fn set_signals(&mut self, signals: Option<Vec<String>>) {
        self.signals = signals;
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(vars: &[(&str, &str)]) -> anyhow::Result<FaultHandlerConfiguration> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        FaultHandlerConfiguration::from_vars(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_alt_stack_must_be_used() {
        let err = FaultHandlerConfiguration::new(None, None, true, false).unwrap_err();
        assert!(err.to_string().contains("altstack"));
        FaultHandlerConfiguration::new(None, None, false, true).unwrap();
        FaultHandlerConfiguration::new(None, None, true, true).unwrap();
    }

    #[test]
    fn test_from_env_defaults() -> anyhow::Result<()> {
        let config = from_map(&[])?;
        assert_eq!(config, FaultHandlerConfiguration::default());
        assert_eq!(config.signals(), None);
        assert_eq!(config.report_path(), None);
        assert!(!config.use_alt_stack());

        let config = from_map(&[
            (DD_FAULTHANDLER_SIGNALS, "  "),
            (DD_FAULTHANDLER_REPORT_PATH, ""),
        ])?;
        assert_eq!(config, FaultHandlerConfiguration::default());
        Ok(())
    }

    #[test]
    fn test_from_env_values() -> anyhow::Result<()> {
        let config = from_map(&[
            (DD_FAULTHANDLER_SIGNALS, "SIGSEGV, SIGILL,,SIGBUS"),
            (DD_FAULTHANDLER_REPORT_PATH, "/tmp/crash.log"),
            (DD_FAULTHANDLER_ALT_STACK, "True"),
        ])?;
        assert_eq!(
            config.signals(),
            Some(&["SIGSEGV".to_string(), "SIGILL".to_string(), "SIGBUS".to_string()][..])
        );
        assert_eq!(config.report_path(), Some(Path::new("/tmp/crash.log")));
        assert!(config.create_alt_stack());
        assert!(config.use_alt_stack());
        Ok(())
    }

    #[test]
    fn test_from_env_invalid_bool() {
        let err = from_map(&[(DD_FAULTHANDLER_ALT_STACK, "maybe")]).unwrap_err();
        assert!(format!("{err:#}").contains(DD_FAULTHANDLER_ALT_STACK));
    }

    #[test]
    fn test_json_round_trip_with_defaults() -> anyhow::Result<()> {
        let config: FaultHandlerConfiguration =
            serde_json::from_str(r#"{"signals": ["SIGABRT"]}"#)?;
        assert_eq!(config.signals(), Some(&["SIGABRT".to_string()][..]));
        assert!(!config.create_alt_stack());

        let mut config = config;
        config.set_report_path(Some(PathBuf::from("/tmp/x.log")));
        config.set_signals(None);
        let json = serde_json::to_string(&config)?;
        let back: FaultHandlerConfiguration = serde_json::from_str(&json)?;
        assert_eq!(back, config);
        Ok(())
    }
}
