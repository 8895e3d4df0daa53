// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The typed events the parser produces and the exporter consumes.

use std::collections::BTreeMap;

/// Labels attached to an event. Keys are sanitized by the parser; a sorted
/// map keeps label sets comparable and their rendering stable.
pub type Labels = BTreeMap<String, String>;

/// An ordered sequence of events. Empty is a valid value: the line parsed
/// but produced nothing.
pub type Events = Vec<Event>;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
/// What kind of metric an event updates downstream.
pub enum MetricType {
    /// Monotonically increasing counter.
    Counter,
    /// Point-in-time value, absolute or relative.
    Gauge,
    /// A single timing/size observation.
    Timer,
    /// An observation routed into a histogram or summary by the consumer.
    Observer,
}

/// A counter increment, already scaled by the sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterEvent {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
}

/// A gauge update. `relative` is set when the value literal carried an
/// explicit sign, meaning "adjust by" rather than "set to".
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeEvent {
    pub name: String,
    pub value: f64,
    pub relative: bool,
    pub labels: Labels,
}

/// One timing observation. Covers the `ms`, `h`, and `d` type codes; the
/// consumer decides between histogram and summary.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerEvent {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
}

/// A single-value observation, the exploded form of
/// [`MultiObserverEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct ObserverEvent {
    pub name: String,
    pub value: f64,
    pub labels: Labels,
}

/// An observation carrying several values at once, produced by consumers
/// that pack values before hand-off. `values` holds at least one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiObserverEvent {
    pub name: String,
    pub values: Vec<f64>,
    pub labels: Labels,
    /// Client-side emission probability; zero means unsampled.
    pub sample_rate: f64,
}

/// A parsed metric sample.
///
/// The parser emits only the counter, gauge, and timer variants; the
/// observer variants exist for consumers that regroup observations after
/// the queue. The exporter pattern-matches the variant directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Counter(CounterEvent),
    Gauge(GaugeEvent),
    Timer(TimerEvent),
    Observer(ObserverEvent),
    MultiObserver(MultiObserverEvent),
}

impl Event {
    pub fn metric_name(&self) -> &str {
        match self {
            Event::Counter(e) => &e.name,
            Event::Gauge(e) => &e.name,
            Event::Timer(e) => &e.name,
            Event::Observer(e) => &e.name,
            Event::MultiObserver(e) => &e.name,
        }
    }

    /// The event value. Multi-value events report their first value.
    pub fn value(&self) -> f64 {
        match self {
            Event::Counter(e) => e.value,
            Event::Gauge(e) => e.value,
            Event::Timer(e) => e.value,
            Event::Observer(e) => e.value,
            Event::MultiObserver(e) => e.values.first().copied().unwrap_or_default(),
        }
    }

    pub fn labels(&self) -> &Labels {
        match self {
            Event::Counter(e) => &e.labels,
            Event::Gauge(e) => &e.labels,
            Event::Timer(e) => &e.labels,
            Event::Observer(e) => &e.labels,
            Event::MultiObserver(e) => &e.labels,
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            Event::Counter(_) => MetricType::Counter,
            Event::Gauge(_) => MetricType::Gauge,
            Event::Timer(_) => MetricType::Timer,
            Event::Observer(_) | Event::MultiObserver(_) => MetricType::Observer,
        }
    }
}

impl MultiObserverEvent {
    /// Split into one [`ObserverEvent`] per value, repeating the whole
    /// sequence `1 / sample_rate` times to reconstruct the sampled
    /// distribution. A single-value event explodes to itself.
    pub fn explode(&self) -> Events {
        if self.values.len() == 1 {
            return vec![Event::MultiObserver(self.clone())];
        }

        let mut copies = 1;
        if self.sample_rate > 0.0 && self.sample_rate < 1.0 {
            copies = (1.0 / self.sample_rate) as usize;
        }

        let mut events = Events::with_capacity(self.values.len() * copies);
        for _ in 0..copies {
            for &value in &self.values {
                events.push(Event::Observer(ObserverEvent {
                    name: self.name.clone(),
                    value,
                    labels: self.labels.clone(),
                }));
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn multi_observer(values: &[f64], sample_rate: f64) -> MultiObserverEvent {
        MultiObserverEvent {
            name: "test_metric".to_string(),
            values: values.to_vec(),
            labels: labels(&[("label", "value")]),
            sample_rate,
        }
    }

    #[test]
    fn accessors() {
        let event = Event::MultiObserver(multi_observer(&[1.0, 2.0, 3.0], 0.5));

        assert_eq!(event.metric_name(), "test_metric");
        assert_eq!(event.value(), 1.0);
        assert_eq!(event.metric_type(), MetricType::Observer);
        assert_eq!(event.labels(), &labels(&[("label", "value")]));
    }

    #[test]
    fn explode_single_value_is_identity() {
        let event = multi_observer(&[1.0], 0.0);
        assert_eq!(event.explode(), vec![Event::MultiObserver(event.clone())]);

        // Sample rate does not matter when there is nothing to split.
        let event = multi_observer(&[1.0], 0.5);
        assert_eq!(event.explode(), vec![Event::MultiObserver(event.clone())]);
    }

    #[test]
    fn explode_multiple_values_no_sampling() {
        let event = multi_observer(&[1.0, 2.0, 3.0], 0.0);

        let exploded = event.explode();
        assert_eq!(exploded.len(), 3);
        for (got, want) in exploded.iter().zip([1.0, 2.0, 3.0]) {
            assert_eq!(
                got,
                &Event::Observer(ObserverEvent {
                    name: "test_metric".to_string(),
                    value: want,
                    labels: labels(&[("label", "value")]),
                })
            );
        }
    }

    #[test]
    fn explode_repeats_values_for_sample_rate() {
        let event = multi_observer(&[1.0, 2.0], 0.5);

        let values: Vec<f64> = event.explode().iter().map(Event::value).collect();
        assert_eq!(values, vec![1.0, 2.0, 1.0, 2.0]);
    }

    #[test]
    fn metric_types() {
        let counter = Event::Counter(CounterEvent {
            name: "c".to_string(),
            value: 1.0,
            labels: Labels::new(),
        });
        let gauge = Event::Gauge(GaugeEvent {
            name: "g".to_string(),
            value: 1.0,
            relative: false,
            labels: Labels::new(),
        });
        let timer = Event::Timer(TimerEvent {
            name: "t".to_string(),
            value: 1.0,
            labels: Labels::new(),
        });

        assert_eq!(counter.metric_type(), MetricType::Counter);
        assert_eq!(gauge.metric_type(), MetricType::Gauge);
        assert_eq!(timer.metric_type(), MetricType::Timer);
    }
}
