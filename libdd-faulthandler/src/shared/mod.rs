// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! This module holds constants/structures that are shared between configuration and collection

pub(crate) mod configuration;
pub(crate) mod constants;
