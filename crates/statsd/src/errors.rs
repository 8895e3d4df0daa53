// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types for the line parser and the address helpers.

/// Errors from turning a parsed sample into an event.
#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum ParseError {
    /// The StatsD `set` type is not supported.
    #[error("no support for StatsD sets")]
    SetsUnsupported,
    /// A type code outside the StatsD alphabet.
    #[error("bad stat type {0}")]
    BadStatType(String),
}

/// Errors from resolving a listen address.
#[derive(Debug, thiserror::Error)]
pub enum AddrError {
    /// Not a usable `host:port` address.
    #[error("bad listen address {0}")]
    Invalid(String),
    /// The host did not resolve.
    #[error("unable to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}
