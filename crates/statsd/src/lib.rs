// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! StatsD ingestion pipeline.
//!
//! Bytes arrive over UDP, TCP, or Unix datagram sockets, get split into
//! lines, and each line is parsed into zero or more typed [`event::Event`]s.
//! Events are batched by the [`queue::EventQueue`] and handed to the
//! downstream exporter over a channel. Everything the pipeline observes
//! about itself is counted through the handles in [`telemetry`].

pub mod errors;
pub mod event;
pub mod line;
pub mod listener;
pub mod queue;
pub mod telemetry;
pub mod util;
