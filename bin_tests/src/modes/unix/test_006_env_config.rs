// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::modes::behavior::Behavior;
use libdd_faulthandler::FaultHandlerConfiguration;
use std::path::Path;

/// Takes the whole configuration from `DD_FAULTHANDLER_*` variables set by the test.
pub struct Test;

impl Behavior for Test {
    fn setup(
        &self,
        _output_dir: &Path,
        config: &mut FaultHandlerConfiguration,
    ) -> anyhow::Result<()> {
        *config = FaultHandlerConfiguration::from_env()?;
        Ok(())
    }

    fn pre(&self, _output_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }
}
