// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::modes::behavior::Behavior;
use anyhow::Context;
use libdd_faulthandler::FaultHandlerConfiguration;
use std::{fs::File, io::BufWriter, path::Path};

/// Name of the file the backtrace query is printed to, inside the output dir.
pub const BACKTRACE_FILE_NAME: &str = "backtrace.txt";

/// Queries and prints the current backtrace before crashing.
pub struct Test;

impl Behavior for Test {
    fn setup(
        &self,
        _output_dir: &Path,
        _config: &mut FaultHandlerConfiguration,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre(&self, output_dir: &Path) -> anyhow::Result<()> {
        anyhow::ensure!(libdd_faulthandler::supported());
        let frames = libdd_faulthandler::get_backtrace(0);
        anyhow::ensure!(!frames.is_empty(), "backtrace should not be empty");

        let path = output_dir.join(BACKTRACE_FILE_NAME);
        let mut out =
            BufWriter::new(File::create(&path).with_context(|| format!("create {path:?}"))?);
        libdd_faulthandler::print_backtrace(0, &mut out)?;
        out.into_inner()
            .map_err(|e| e.into_error())?
            .sync_all()?;
        Ok(())
    }
}
