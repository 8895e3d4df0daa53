// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The StatsD line parser.
//!
//! One line in, zero or more events out. The parser understands the plain
//! protocol plus the three tagging dialects in the wild: Librato
//! (`metric#k=v,...:...`), InfluxDB (`metric,k=v,...:...`), and DogStatsD
//! (`metric:...|#k:v,...`). It never fails loudly: malformed input is
//! counted on the telemetry handles, logged at debug, and skipped, so one
//! bad sample never takes down its neighbors.

use tracing::debug;

use crate::errors::ParseError;
use crate::event::{CounterEvent, Event, Events, GaugeEvent, Labels, TimerEvent};
use crate::telemetry::{LineTelemetry, SampleError};
use crate::util::escape_metric_name;

fn build_event(
    stat_type: &str,
    metric: &str,
    value: f64,
    relative: bool,
    labels: Labels,
) -> Result<Event, ParseError> {
    match stat_type {
        "c" => Ok(Event::Counter(CounterEvent {
            name: metric.to_string(),
            value,
            labels,
        })),
        "g" => Ok(Event::Gauge(GaugeEvent {
            name: metric.to_string(),
            value,
            relative,
            labels,
        })),
        "ms" | "h" | "d" => Ok(Event::Timer(TimerEvent {
            name: metric.to_string(),
            value,
            labels,
        })),
        "s" => Err(ParseError::SetsUnsupported),
        other => Err(ParseError::BadStatType(other.to_string())),
    }
}

/// Parse a single `key<separator>value` tag into `labels`. Only the first
/// separator splits, so values may contain further separator characters.
fn parse_tag(tag: &str, separator: char, labels: &mut Labels, telemetry: &LineTelemetry) {
    if tag.is_empty() {
        telemetry.tag_errors.increment(1);
        debug!("empty tag");
        return;
    }

    match tag.find(separator) {
        Some(i) => {
            let (key, value) = (&tag[..i], &tag[i + 1..]);
            if key.is_empty() || value.is_empty() {
                telemetry.tag_errors.increment(1);
                debug!(key, value, "malformed tag");
            } else {
                labels.insert(escape_metric_name(key), value.to_string());
            }
        }
        None => {
            // A tag without a value is an error.
            telemetry.tag_errors.increment(1);
            debug!(tag, "malformed tag");
        }
    }
}

/// Librato/InfluxDB style `k=v` tag list embedded in the name component.
fn parse_name_tags(component: &str, labels: &mut Labels, telemetry: &LineTelemetry) {
    let mut last = 0;
    for (i, c) in component.char_indices() {
        if c == ',' {
            parse_tag(&component[last..i], '=', labels, telemetry);
            last = i + 1;
        }
    }
    if last < component.len() {
        parse_tag(&component[last..], '=', labels, telemetry);
    }
}

/// DogStatsD style `k:v` tag list. Some clients prefix every key with `#`,
/// not just the list itself; a leading `#` on a tag is stripped.
fn parse_dogstatsd_tags(component: &str, labels: &mut Labels, telemetry: &LineTelemetry) {
    let mut last = 0;
    for (i, c) in component.char_indices() {
        if c == ',' {
            let tag = &component[last..i];
            parse_tag(tag.strip_prefix('#').unwrap_or(tag), ':', labels, telemetry);
            last = i + 1;
        }
    }
    if last < component.len() {
        let tag = &component[last..];
        parse_tag(tag.strip_prefix('#').unwrap_or(tag), ':', labels, telemetry);
    }
}

/// Split the name component into the metric name and any in-name tags.
/// `#` starts a Librato tag list, `,` an InfluxDB one.
fn parse_name_and_tags<'a>(
    name: &'a str,
    labels: &mut Labels,
    telemetry: &LineTelemetry,
) -> &'a str {
    if let Some(i) = name.find(['#', ',']) {
        parse_name_tags(&name[i + 1..], labels, telemetry);
        return &name[..i];
    }
    name
}

/// Turn one line into events.
///
/// An empty line produces no events and no error. Anything else that is
/// not a well-formed sample increments the matching `sample_errors_total`
/// reason and is dropped; the rest of the line's samples still go through.
pub fn line_to_events(line: &[u8], telemetry: &LineTelemetry) -> Events {
    let mut events = Events::new();
    if line.is_empty() {
        return events;
    }

    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(_) => {
            telemetry.sample_errors.increment(SampleError::MalformedLine);
            debug!(line = %String::from_utf8_lossy(line), "bad line");
            return events;
        }
    };

    let (name_component, rest) = match line.split_once(':') {
        Some((name, rest)) if !name.is_empty() => (name, rest),
        _ => {
            telemetry.sample_errors.increment(SampleError::MalformedLine);
            debug!(line, "bad line");
            return events;
        }
    };

    let mut labels = Labels::new();
    let metric = parse_name_and_tags(name_component, &mut labels, telemetry);

    let samples: Vec<&str> = if rest.contains("|#") {
        // DogStatsD tags disable multi-sample lines, and mixing them with
        // in-name tags is rejected outright.
        if !labels.is_empty() {
            telemetry
                .sample_errors
                .increment(SampleError::MixedTaggingStyles);
            debug!(line, "multiple tagging styles on one line");
            return events;
        }
        vec![rest]
    } else {
        rest.split(':').collect()
    };

    'samples: for sample in samples {
        telemetry.samples_received.increment(1);

        let components: Vec<&str> = sample.split('|').collect();
        if components.len() < 2 || components.len() > 4 {
            telemetry
                .sample_errors
                .increment(SampleError::MalformedComponent);
            debug!(line, "bad component");
            continue;
        }
        let (value_str, stat_type) = (components[0], components[1]);

        // An explicit sign marks the value as relative; only gauges care.
        let relative = value_str.starts_with('+') || value_str.starts_with('-');

        let mut value = match value_str.parse::<f64>() {
            Ok(value) => value,
            Err(_) => {
                telemetry
                    .sample_errors
                    .increment(SampleError::MalformedValue);
                debug!(line, value = value_str, "bad value");
                continue;
            }
        };

        let mut multiply_events = 1usize;
        if components.len() > 2 {
            if components[2..].iter().any(|component| component.is_empty()) {
                telemetry
                    .sample_errors
                    .increment(SampleError::MalformedComponent);
                debug!(line, "empty component");
                continue 'samples;
            }

            for component in components[2..].iter().copied() {
                match component.as_bytes()[0] {
                    b'@' => {
                        let mut sampling_factor = match component[1..].parse::<f64>() {
                            Ok(factor) => factor,
                            Err(_) => {
                                telemetry
                                    .sample_errors
                                    .increment(SampleError::InvalidSampleFactor);
                                debug!(line, component, "invalid sampling factor");
                                0.0
                            }
                        };
                        if sampling_factor == 0.0 {
                            sampling_factor = 1.0;
                        }

                        match stat_type {
                            // Gauges are absolute readings, never scaled.
                            "g" => {}
                            // Upscale to the estimated true count.
                            "c" => value /= sampling_factor,
                            // Duplicate to reconstruct the distribution.
                            "ms" | "h" | "d" => {
                                multiply_events = (1.0 / sampling_factor) as usize;
                            }
                            _ => {}
                        }
                    }
                    b'#' => parse_dogstatsd_tags(&component[1..], &mut labels, telemetry),
                    _ => {
                        telemetry
                            .sample_errors
                            .increment(SampleError::InvalidSampleFactor);
                        debug!(line, component, "invalid sampling factor or tag section");
                    }
                }
            }
        }

        if !labels.is_empty() {
            telemetry.tags_received.increment(1);
        }

        for _ in 0..multiply_events {
            match build_event(stat_type, metric, value, relative, labels.clone()) {
                Ok(event) => events.push(event),
                Err(error) => {
                    telemetry.sample_errors.increment(SampleError::IllegalEvent);
                    debug!(line, %error, "error building event");
                }
            }
        }
    }

    events
}
