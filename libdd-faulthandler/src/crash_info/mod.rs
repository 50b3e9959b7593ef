// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

mod sig_info;
mod stacktrace;

pub use sig_info::*;
pub use stacktrace::*;
