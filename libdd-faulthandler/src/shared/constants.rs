// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed text of the crash report. Each constant is emitted with a single `write`.

pub const FAULTHANDLER_BANNER: &str = "\n\
================================================================\n\
              NATIVE CRASH REPORT\n\
================================================================\n\n";

pub const FAULTHANDLER_BEGIN_STACKTRACE: &str = "Native Stack Trace:\n\
------------------------------------------------------------\n";

pub const FAULTHANDLER_NO_SYMBOLIZER: &str = "  (backtrace state not initialized)\n";

pub const FAULTHANDLER_FOOTER: &str = "\n\
------------------------------------------------------------\n\
Tip: Build with debug info (e.g. `debug = \"line-tables-only\"`) to resolve files and lines,\n\
     and enable your runtime's own fault handler for interpreter-level stack traces.\n\
================================================================\n\n";

pub const FAULTHANDLER_REPORT_SAVED: &str = "Crash report saved to: ";

pub const FAULTHANDLER_UNKNOWN_SYMBOL: &str = "???";

pub const DD_FAULTHANDLER_SIGNALS: &str = "DD_FAULTHANDLER_SIGNALS";
pub const DD_FAULTHANDLER_REPORT_PATH: &str = "DD_FAULTHANDLER_REPORT_PATH";
pub const DD_FAULTHANDLER_ALT_STACK: &str = "DD_FAULTHANDLER_ALT_STACK";
