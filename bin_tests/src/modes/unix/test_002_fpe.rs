// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::modes::behavior::{Behavior, Crash};
use libdd_faulthandler::FaultHandlerConfiguration;
use std::path::Path;

pub struct Test;

impl Behavior for Test {
    fn setup(
        &self,
        _output_dir: &Path,
        config: &mut FaultHandlerConfiguration,
    ) -> anyhow::Result<()> {
        config.set_signals(Some(vec!["SIGFPE".to_string()]));
        Ok(())
    }

    fn pre(&self, _output_dir: &Path) -> anyhow::Result<()> {
        Ok(())
    }

    fn crash(&self) -> Crash {
        Crash::Raise(libc::SIGFPE)
    }
}
