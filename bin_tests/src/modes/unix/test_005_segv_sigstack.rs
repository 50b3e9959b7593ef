// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
use crate::modes::behavior::{with_alt_stack, Behavior};
use libdd_faulthandler::FaultHandlerConfiguration;
use std::path::Path;

pub struct Test;

impl Behavior for Test {
    fn setup(
        &self,
        _output_dir: &Path,
        config: &mut FaultHandlerConfiguration,
    ) -> anyhow::Result<()> {
        *config = with_alt_stack(config)?;
        Ok(())
    }

    fn pre(&self, _output_dir: &Path) -> anyhow::Result<()> {
        let mut old = std::mem::MaybeUninit::<libc::stack_t>::uninit();
        // SAFETY: a null new stack only queries the current one.
        let res = unsafe { libc::sigaltstack(std::ptr::null(), old.as_mut_ptr()) };
        anyhow::ensure!(res == 0, "sigaltstack failed");
        // SAFETY: sigaltstack succeeded, so `old` is initialized.
        let old = unsafe { old.assume_init() };
        anyhow::ensure!(
            old.ss_flags & libc::SS_DISABLE == 0,
            "an alternate signal stack should be installed"
        );
        Ok(())
    }
}
