// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::modes::behavior::Behavior;
use libdd_faulthandler::FaultHandlerConfiguration;
use std::path::Path;

pub struct Test;

impl Behavior for Test {
    fn setup(
        &self,
        _output_dir: &Path,
        _config: &mut FaultHandlerConfiguration,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre(&self, _output_dir: &Path) -> anyhow::Result<()> {
        libdd_faulthandler::disable();
        anyhow::ensure!(!libdd_faulthandler::is_enabled());
        anyhow::ensure!(libdd_faulthandler::installed_signals().is_empty());
        Ok(())
    }
}
