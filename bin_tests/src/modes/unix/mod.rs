// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
pub mod test_000_segv;
pub mod test_001_abort;
pub mod test_002_fpe;
pub mod test_003_nohandler;
pub mod test_004_disabled;
pub mod test_005_segv_sigstack;
pub mod test_006_env_config;
pub mod test_007_backtrace;
