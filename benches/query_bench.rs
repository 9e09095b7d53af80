//! Benchmarks for query compilation and response flattening
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use serde_json::{json, Value};

use tsquery::elasticsearch::{build_search, parse_response, ElasticDatasource, EsQuery};
use tsquery::influxdb::{build_query, InfluxQuery};
use tsquery::tsdb::{interval_for_span, DataSourceInfo, TimeRange};

fn bench_interval(c: &mut Criterion) {
    let mut group = c.benchmark_group("interval");

    group.bench_function("ladder_sweep", |b| {
        b.iter(|| {
            let mut span = 1_000i64;
            while span < 10 * 31_536_000_000 {
                black_box(interval_for_span(black_box(span), None));
                span *= 3;
            }
        })
    });

    group.finish();
}

fn es_query() -> EsQuery {
    serde_json::from_value(json!({
        "refId": "A",
        "query": "status:500 AND service:api",
        "metrics": [
            {"id": "1", "type": "count"},
            {"id": "3", "type": "avg", "field": "latency"},
            {"id": "4", "type": "derivative", "field": "3"}
        ],
        "bucketAggs": [
            {"id": "5", "type": "terms", "field": "host", "settings": {"size": "10"}},
            {"id": "2", "type": "date_histogram", "field": "@timestamp", "settings": {"interval": "auto"}}
        ]
    }))
    .unwrap()
}

fn es_response(hosts: usize, buckets: usize) -> Value {
    let host_buckets: Vec<Value> = (0..hosts)
        .map(|h| {
            let time_buckets: Vec<Value> = (0..buckets)
                .map(|t| {
                    json!({
                        "key": t as i64 * 60_000,
                        "doc_count": t + h,
                        "3": {"value": (t * h) as f64 / 2.0},
                        "4": {"value": 0.5}
                    })
                })
                .collect();
            json!({"key": format!("web{:02}", h), "doc_count": buckets, "2": {"buckets": time_buckets}})
        })
        .collect();

    json!({"aggregations": {"5": {"buckets": host_buckets}}})
}

fn bench_elasticsearch(c: &mut Criterion) {
    let mut group = c.benchmark_group("elasticsearch");

    let ds = ElasticDatasource::from_info(
        &DataSourceInfo::new("logs", "elasticsearch", "http://localhost:9200")
            .database("[logs-]YYYY.MM.DD")
            .json_data(json!({"timeField": "@timestamp", "esVersion": 56, "interval": "Daily"})),
    )
    .unwrap();
    let query = es_query();
    let range = TimeRange::new("7d", "now");

    group.bench_function("build_search", |b| {
        b.iter(|| build_search(black_box(&query), &ds, &range, None).unwrap())
    });

    for buckets in [60, 600] {
        let response = es_response(10, buckets);
        group.throughput(Throughput::Elements((10 * buckets) as u64));
        group.bench_function(format!("parse_10x{}", buckets), |b| {
            b.iter(|| parse_response(&query, black_box(&response)))
        });
    }

    group.finish();
}

fn bench_influxdb(c: &mut Criterion) {
    let mut group = c.benchmark_group("influxdb");

    let query: InfluxQuery = serde_json::from_value(json!({
        "refId": "A",
        "measurement": "cpu",
        "policy": "autogen",
        "tags": [
            {"key": "host", "value": "/^web/"},
            {"key": "dc", "value": "eu", "condition": "AND"}
        ],
        "select": [
            [{"type": "field", "params": ["usage_idle"]}, {"type": "mean", "params": []}, {"type": "math", "params": ["* -1 + 100"]}],
            [{"type": "field", "params": ["usage_user"]}, {"type": "max", "params": []}, {"type": "alias", "params": ["peak"]}]
        ],
        "groupBy": [
            {"type": "time", "params": ["auto"]},
            {"type": "tag", "params": ["host"]},
            {"type": "fill", "params": ["null"]}
        ]
    }))
    .unwrap();
    let range = TimeRange::new("24h", "now");

    group.bench_function("build_query", |b| {
        b.iter(|| build_query(black_box(&query), &range, None).unwrap())
    });

    group.finish();
}

criterion_group!(benches, bench_interval, bench_elasticsearch, bench_influxdb);
criterion_main!(benches);
