// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::modes::behavior::{Behavior, Crash};
use libdd_faulthandler::FaultHandlerConfiguration;
use std::path::Path;

/// Installs the default signal set and aborts.
pub struct Test;

impl Behavior for Test {
    fn setup(
        &self,
        _output_dir: &Path,
        config: &mut FaultHandlerConfiguration,
    ) -> anyhow::Result<()> {
        config.set_signals(None);
        Ok(())
    }

    fn pre(&self, _output_dir: &Path) -> anyhow::Result<()> {
        anyhow::ensure!(
            libdd_faulthandler::installed_signals().contains(&libc::SIGABRT),
            "SIGABRT should be part of the default signals"
        );
        Ok(())
    }

    fn crash(&self) -> Crash {
        Crash::Abort
    }
}
