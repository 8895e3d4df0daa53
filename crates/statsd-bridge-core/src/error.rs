// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use statsd::errors::AddrError;

/// Errors that can occur while configuring or starting the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid {listener} listen address {addr}: {source}")]
    Addr {
        listener: &'static str,
        addr: String,
        #[source]
        source: AddrError,
    },

    #[error("Failed to bind {listener} listener on {addr}: {source}")]
    Bind {
        listener: &'static str,
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
