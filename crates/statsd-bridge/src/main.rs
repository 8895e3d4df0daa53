// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;

use metrics::{counter, gauge, histogram, Label};
use metrics_exporter_prometheus::PrometheusBuilder;
use statsd::event::{Event, Events};
use statsd::util::{escape_metric_name, tcp_addr};
use statsd_bridge_core::config::BridgeConfig;
use statsd_bridge_core::services::BridgeServices;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
pub async fn main() {
    let log_level = env::var("STATSD_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match BridgeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on bridge startup: {e}");
            return;
        }
    };

    let http_addr = match tcp_addr(&config.http_addr) {
        Ok(addr) => addr,
        Err(e) => {
            error!("Bad exposition address {}: {e}", config.http_addr);
            return;
        }
    };
    if let Err(e) = PrometheusBuilder::new()
        .with_http_listener(http_addr)
        .install()
    {
        error!("Error installing the Prometheus exporter: {e}");
        return;
    }
    info!("exposition: serving metrics on {http_addr}");

    let mut handle = match BridgeServices::new(config).start().await {
        Ok(handle) => handle,
        Err(e) => {
            error!("Error starting the statsd listeners: {e}");
            return;
        }
    };

    loop {
        tokio::select! {
            batch = handle.events.recv() => match batch {
                Some(batch) => apply_events(&batch),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                handle.stop().await;
                // Drain what the final flush produced.
                while let Some(batch) = handle.events.recv().await {
                    apply_events(&batch);
                }
                break;
            }
        }
    }
}

/// Apply one batch to the installed recorder.
///
/// This is the thinnest possible consumer: no metric renaming beyond
/// charset sanitization, and counter increments truncate to whole units
/// because facade counters are integer-valued.
fn apply_events(events: &Events) {
    for event in events {
        apply_event(event);
    }
}

fn apply_event(event: &Event) {
    let name = escape_metric_name(event.metric_name());
    let labels: Vec<Label> = event
        .labels()
        .iter()
        .map(|(k, v)| Label::new(k.clone(), v.clone()))
        .collect();

    match event {
        Event::Counter(c) => counter!(name, labels).increment(c.value as u64),
        Event::Gauge(g) if g.relative => gauge!(name, labels).increment(g.value),
        Event::Gauge(g) => gauge!(name, labels).set(g.value),
        Event::Timer(t) => histogram!(name, labels).record(t.value),
        Event::Observer(o) => histogram!(name, labels).record(o.value),
        Event::MultiObserver(m) => {
            for exploded in m.explode() {
                match exploded {
                    Event::Observer(o) => {
                        histogram!(name.clone(), labels.clone()).record(o.value);
                    }
                    other => histogram!(name.clone(), labels.clone()).record(other.value()),
                }
            }
        }
    }
}
