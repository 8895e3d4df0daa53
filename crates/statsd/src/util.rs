// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Name sanitization and listen-address helpers.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::errors::AddrError;

/// Rewrite a metric or label name into the exposition charset.
///
/// Every character outside `[A-Za-z0-9_]` becomes an underscore, and a
/// leading digit gets one prepended.
///
/// # Examples
///
/// ```
/// use statsd::util::escape_metric_name;
///
/// assert_eq!(escape_metric_name("tag.with.dots"), "tag_with_dots");
/// assert_eq!(escape_metric_name("09digits"), "_09digits");
/// ```
pub fn escape_metric_name(name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }

    let mut escaped = String::with_capacity(name.len() + 1);
    if name.as_bytes()[0].is_ascii_digit() {
        escaped.push('_');
    }
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            escaped.push(c);
        } else {
            escaped.push('_');
        }
    }
    escaped
}

/// Resolve a UDP `host:port` listen address. An empty host means all
/// interfaces, so `":9125"` is accepted.
pub fn udp_addr(addr: &str) -> Result<SocketAddr, AddrError> {
    host_port(addr)
}

/// Resolve a TCP `host:port` listen address.
pub fn tcp_addr(addr: &str) -> Result<SocketAddr, AddrError> {
    host_port(addr)
}

fn host_port(addr: &str) -> Result<SocketAddr, AddrError> {
    if !addr.contains(':') {
        return Err(AddrError::Invalid(addr.to_string()));
    }

    let target = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };

    target
        .to_socket_addrs()
        .map_err(|source| AddrError::Resolve {
            addr: addr.to_string(),
            source,
        })?
        .next()
        .ok_or_else(|| AddrError::Invalid(addr.to_string()))
}
