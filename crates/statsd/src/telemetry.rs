// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Self-observability counters.
//!
//! Counters are plain [`metrics::Counter`] handles held in small structs
//! and threaded into the listeners, parser, and queue by whoever owns
//! them. Nothing here is global: tests swap in a local recorder or the
//! no-op handles from the `disabled` constructors.

use metrics::{counter, describe_counter, Counter};

/// Why a sample was rejected. Each reason is a label value on
/// `sample_errors_total`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SampleError {
    MalformedLine,
    MalformedComponent,
    MalformedValue,
    InvalidSampleFactor,
    MixedTaggingStyles,
    IllegalEvent,
}

impl SampleError {
    pub fn reason(self) -> &'static str {
        match self {
            SampleError::MalformedLine => "malformed_line",
            SampleError::MalformedComponent => "malformed_component",
            SampleError::MalformedValue => "malformed_value",
            SampleError::InvalidSampleFactor => "invalid_sample_factor",
            SampleError::MixedTaggingStyles => "mixed_tagging_styles",
            SampleError::IllegalEvent => "illegal_event",
        }
    }
}

/// `sample_errors_total` fanned out per `reason` label, so incrementing
/// never goes through the recorder's key lookup on the hot path.
#[derive(Clone)]
pub struct SampleErrors {
    malformed_line: Counter,
    malformed_component: Counter,
    malformed_value: Counter,
    invalid_sample_factor: Counter,
    mixed_tagging_styles: Counter,
    illegal_event: Counter,
}

impl SampleErrors {
    fn new() -> Self {
        describe_counter!(
            "sample_errors_total",
            "Number of samples discarded, by reason."
        );
        let reason_counter =
            |error: SampleError| counter!("sample_errors_total", "reason" => error.reason());
        Self {
            malformed_line: reason_counter(SampleError::MalformedLine),
            malformed_component: reason_counter(SampleError::MalformedComponent),
            malformed_value: reason_counter(SampleError::MalformedValue),
            invalid_sample_factor: reason_counter(SampleError::InvalidSampleFactor),
            mixed_tagging_styles: reason_counter(SampleError::MixedTaggingStyles),
            illegal_event: reason_counter(SampleError::IllegalEvent),
        }
    }

    fn disabled() -> Self {
        Self {
            malformed_line: Counter::noop(),
            malformed_component: Counter::noop(),
            malformed_value: Counter::noop(),
            invalid_sample_factor: Counter::noop(),
            mixed_tagging_styles: Counter::noop(),
            illegal_event: Counter::noop(),
        }
    }

    pub fn increment(&self, error: SampleError) {
        match error {
            SampleError::MalformedLine => self.malformed_line.increment(1),
            SampleError::MalformedComponent => self.malformed_component.increment(1),
            SampleError::MalformedValue => self.malformed_value.increment(1),
            SampleError::InvalidSampleFactor => self.invalid_sample_factor.increment(1),
            SampleError::MixedTaggingStyles => self.mixed_tagging_styles.increment(1),
            SampleError::IllegalEvent => self.illegal_event.increment(1),
        }
    }
}

/// Counters the line parser increments.
#[derive(Clone)]
pub struct LineTelemetry {
    pub samples_received: Counter,
    pub tags_received: Counter,
    pub tag_errors: Counter,
    pub sample_errors: SampleErrors,
}

impl LineTelemetry {
    pub fn new() -> Self {
        describe_counter!(
            "samples_received_total",
            "Total number of StatsD samples received."
        );
        describe_counter!(
            "tags_received_total",
            "Total number of samples that carried tags."
        );
        describe_counter!("tag_errors_total", "Number of tags that could not be parsed.");
        Self {
            samples_received: counter!("samples_received_total"),
            tags_received: counter!("tags_received_total"),
            tag_errors: counter!("tag_errors_total"),
            sample_errors: SampleErrors::new(),
        }
    }

    /// No-op handles, for tests and benches that do not observe counters.
    pub fn disabled() -> Self {
        Self {
            samples_received: Counter::noop(),
            tags_received: Counter::noop(),
            tag_errors: Counter::noop(),
            sample_errors: SampleErrors::disabled(),
        }
    }
}

impl Default for LineTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters the socket listeners increment.
#[derive(Clone)]
pub struct ListenerTelemetry {
    pub udp_packets: Counter,
    pub unixgram_packets: Counter,
    pub tcp_connections: Counter,
    pub tcp_errors: Counter,
    pub tcp_line_too_long: Counter,
    pub lines_received: Counter,
}

impl ListenerTelemetry {
    pub fn new() -> Self {
        describe_counter!("udp_packets_total", "Number of UDP packets received.");
        describe_counter!(
            "unixgram_packets_total",
            "Number of Unix datagram packets received."
        );
        describe_counter!(
            "tcp_connections_total",
            "Number of TCP connections accepted."
        );
        describe_counter!("tcp_errors_total", "Number of TCP read failures.");
        describe_counter!(
            "tcp_line_too_long_total",
            "Number of connections dropped for exceeding the line limit."
        );
        describe_counter!("lines_received_total", "Total number of lines received.");
        Self {
            udp_packets: counter!("udp_packets_total"),
            unixgram_packets: counter!("unixgram_packets_total"),
            tcp_connections: counter!("tcp_connections_total"),
            tcp_errors: counter!("tcp_errors_total"),
            tcp_line_too_long: counter!("tcp_line_too_long_total"),
            lines_received: counter!("lines_received_total"),
        }
    }

    pub fn disabled() -> Self {
        Self {
            udp_packets: Counter::noop(),
            unixgram_packets: Counter::noop(),
            tcp_connections: Counter::noop(),
            tcp_errors: Counter::noop(),
            tcp_line_too_long: Counter::noop(),
            lines_received: Counter::noop(),
        }
    }
}

impl Default for ListenerTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters the event queue increments.
#[derive(Clone)]
pub struct QueueTelemetry {
    pub events_flushed: Counter,
}

impl QueueTelemetry {
    pub fn new() -> Self {
        describe_counter!(
            "events_flushed_total",
            "Number of batches delivered to the exporter."
        );
        Self {
            events_flushed: counter!("events_flushed_total"),
        }
    }

    pub fn disabled() -> Self {
        Self {
            events_flushed: Counter::noop(),
        }
    }
}

impl Default for QueueTelemetry {
    fn default() -> Self {
        Self::new()
    }
}
