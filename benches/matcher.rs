//! Benchmarks for request matching

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use reel::matcher::{ConsumptionState, RuleSet};
use reel::message::{Body, Headers, Interaction, InteractionMessage, Request, Response};

fn request(index: usize) -> Request {
    let mut headers = Headers::new();
    headers.append("Accept", "application/json");
    headers.append("X-Request-Id", index.to_string());
    Request {
        method: if index % 2 == 0 { "GET" } else { "POST" }.to_string(),
        url: format!("https://api.example.com/v1/items/{index}?page=2&limit=50"),
        headers,
        body: Some(Body::new(
            Bytes::from(format!("{{\"id\":{index},\"tags\":[\"a\",\"b\"]}}")),
            Some("application/json".to_string()),
        )),
    }
}

fn response() -> Response {
    Response {
        http_version: "HTTP/1.1".to_string(),
        status: 200,
        status_text: "OK".to_string(),
        headers: Headers::new(),
        body: None,
    }
}

fn interaction(size: usize) -> Interaction {
    let messages = (0..size)
        .map(|i| InteractionMessage::new(request(i), response()))
        .collect();
    Interaction::with_messages("bench", messages)
}

fn bench_find_last(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_last");
    let rules = RuleSet::default();
    let consumption = ConsumptionState::new();

    for size in [10, 100, 1000] {
        let interaction = interaction(size);
        let live = request(size - 1);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| rules.find(black_box(&live), &interaction, &consumption));
        });
    }

    group.finish();
}

fn bench_rule_sets(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_set");
    let recorded = request(7);
    let live = request(7);

    let sets = [
        ("method_url", RuleSet::default()),
        ("method_path", RuleSet::match_once().by_method().by_path()),
        ("header", RuleSet::match_once().by_header("x-request-id")),
        ("body", RuleSet::match_once().by_body()),
        ("json_body", RuleSet::match_once().by_json_body()),
    ];

    for (name, rules) in &sets {
        group.bench_with_input(BenchmarkId::from_parameter(name), rules, |b, rules| {
            b.iter(|| rules.matches(black_box(&live), black_box(&recorded)));
        });
    }

    group.finish();
}

fn bench_consumed_prefix(c: &mut Criterion) {
    let rules = RuleSet::match_once().by_method().by_path();
    let interaction = Interaction::with_messages(
        "bench",
        (0..500)
            .map(|_| InteractionMessage::new(request(0), response()))
            .collect(),
    );
    let mut consumption = ConsumptionState::new();
    for index in 0..499 {
        consumption.consume(index);
    }
    let live = request(0);

    c.bench_function("find_after_consumed_prefix", |b| {
        b.iter(|| rules.find(black_box(&live), &interaction, &consumption));
    });
}

criterion_group!(benches, bench_find_last, bench_rule_sets, bench_consumed_prefix);
criterion_main!(benches);
