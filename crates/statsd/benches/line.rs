// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use statsd::line::line_to_events;
use statsd::telemetry::LineTelemetry;

fn benchmark_line_to_events(c: &mut Criterion) {
    let telemetry = LineTelemetry::disabled();
    let mut group = c.benchmark_group("line_to_events");

    let cases = vec![
        ("bare_counter", "backend.requests:1|c"),
        ("sampled_counter", "backend.requests:1|c|@0.1"),
        (
            "dogstatsd_tags",
            "backend.requests:1|c|#env:prod,service:api,version:1.0.0",
        ),
        ("influx_tags", "backend.requests,env=prod,service=api:1|c"),
        ("librato_tags", "backend.requests#env=prod,service=api:1|c"),
        ("multi_sample", "backend.rtt:200|ms:300|ms:5|c|@0.1:6|g"),
        ("malformed_value", "backend.requests:one|c"),
    ];

    for (name, line) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &line, |b, &line| {
            b.iter(|| line_to_events(black_box(line.as_bytes()), &telemetry));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_line_to_events);
criterion_main!(benches);
