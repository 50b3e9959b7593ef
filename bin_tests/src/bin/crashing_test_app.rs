// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#[cfg(not(unix))]
fn main() {}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    unix::main()
}

#[cfg(unix)]
mod unix {
    use anyhow::Context;
    use std::env;
    use std::path::PathBuf;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    use bin_tests::modes::behavior::{get_behavior, Crash, REPORT_FILE_NAME};
    use libdd_faulthandler::{self as faulthandler, FaultHandlerConfiguration};

    #[inline(never)]
    unsafe fn fn3() {
        #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
        {
            std::arch::asm!("mov eax, [0]", options(nostack));
        }

        #[cfg(target_arch = "aarch64")]
        {
            std::arch::asm!("mov x0, #0", "ldr x1, [x0]", options(nostack));
        }
    }

    #[inline(never)]
    fn fn2() {
        unsafe { fn3() }
    }

    #[inline(never)]
    fn fn1() {
        fn2()
    }

    #[inline(never)]
    pub fn main() -> anyhow::Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();

        let mut args = env::args().skip(1);
        let mode = args.next().context("Unexpected number of arguments 1")?;
        let output_dir = PathBuf::from(args.next().context("Unexpected number of arguments 2")?);
        anyhow::ensure!(args.next().is_none(), "unexpected extra arguments");

        let behavior = get_behavior(&mode)?;
        let mut config = FaultHandlerConfiguration::new(
            Some(vec!["SIGSEGV".to_string()]),
            Some(output_dir.join(REPORT_FILE_NAME)),
            false, // create_alt_stack
            false, // use_alt_stack
        )?;
        behavior.setup(&output_dir, &mut config)?;
        if behavior.install() {
            info!(mode = %mode, ?config, "Enabling fault handler");
            faulthandler::enable_with_config(&config)?;
        }
        behavior.pre(&output_dir)?;

        let crash = behavior.crash();
        info!(mode = %mode, ?crash, "Crashing");
        match crash {
            Crash::NullDeref => fn1(),
            Crash::Abort => std::process::abort(),
            Crash::Raise(signum) => {
                // SAFETY: raising a signal has no memory safety requirements.
                unsafe { libc::raise(signum) };
            }
        }
        anyhow::bail!("mode {mode} did not crash")
    }
}
