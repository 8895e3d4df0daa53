// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Configuration and wiring for the statsd-bridge daemon.

pub mod config;
pub mod error;
pub mod services;
