// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use libdd_faulthandler::FaultHandlerConfiguration;
use std::path::Path;

use crate::modes::unix::*;

/// Name of the report file the test app mirrors its crash report to, inside the output dir.
pub const REPORT_FILE_NAME: &str = "crash.log";

/// How the test app brings itself down once the handler is in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crash {
    /// Invalid read in `fn3`, reached through `fn1` and `fn2`.
    NullDeref,
    Abort,
    Raise(libc::c_int),
}

/// Defines the additional behavior for a given fault handler test
pub trait Behavior {
    fn setup(&self, output_dir: &Path, config: &mut FaultHandlerConfiguration) -> Result<()>;
    /// Runs after the handler is enabled, right before crashing.
    fn pre(&self, output_dir: &Path) -> Result<()>;

    fn install(&self) -> bool {
        true
    }

    fn crash(&self) -> Crash {
        Crash::NullDeref
    }
}

/// Rebuilds `config` with an alternate signal stack created and used.
pub fn with_alt_stack(config: &FaultHandlerConfiguration) -> Result<FaultHandlerConfiguration> {
    FaultHandlerConfiguration::new(
        config.signals().map(<[String]>::to_vec),
        config.report_path().map(Path::to_path_buf),
        true,
        true,
    )
}

pub fn get_behavior(mode_str: &str) -> Result<Box<dyn Behavior>> {
    Ok(match mode_str {
        "segv" => Box::new(test_000_segv::Test),
        "abort" => Box::new(test_001_abort::Test),
        "fpe" => Box::new(test_002_fpe::Test),
        "nohandler" => Box::new(test_003_nohandler::Test),
        "disabled" => Box::new(test_004_disabled::Test),
        "segv_sigstack" => Box::new(test_005_segv_sigstack::Test),
        "env_config" => Box::new(test_006_env_config::Test),
        "backtrace" => Box::new(test_007_backtrace::Test),
        _ => anyhow::bail!("Unknown mode: {mode_str}"),
    })
}
