use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use tinyrp::config::{ProxyConfig, ResourceConfig};
use tinyrp::rate_limit::{ClientId, MemoryStore, RateLimitConfig, RateLimiter};
use tinyrp::router::RouteTable;

fn resource(endpoint: &str, port: i64) -> ResourceConfig {
    ResourceConfig {
        domain_name: "localhost".to_string(),
        port,
        endpoint: endpoint.to_string(),
    }
}

fn benchmark_route_resolution(c: &mut Criterion) {
    let table = RouteTable::new(&[
        resource("/", 3000),
        resource("/api/users", 3001),
        resource("/api/orders", 3002),
        resource("/api/products", 3003),
    ])
    .expect("Failed to create route table");

    c.bench_function("route_exact_match", |b| {
        b.iter(|| black_box(table.resolve("/api/users")))
    });

    c.bench_function("route_nested_match", |b| {
        b.iter(|| black_box(table.resolve("/api/orders/123/items/7")))
    });

    c.bench_function("route_fallback_match", |b| {
        b.iter(|| black_box(table.resolve("/static/site.css")))
    });
}

fn benchmark_route_scale(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_scale");

    for num_routes in [10, 50, 100, 500].iter() {
        let resources: Vec<_> = (0..*num_routes)
            .map(|i| resource(&format!("/api/service{}", i), 3000 + i))
            .collect();
        let table = RouteTable::new(&resources).expect("Failed to create route table");

        group.bench_with_input(
            BenchmarkId::from_parameter(num_routes),
            num_routes,
            |b, &_num| b.iter(|| black_box(table.resolve("/api/service5/items"))),
        );
    }
    group.finish();
}

fn benchmark_memory_consume(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("Failed to build runtime");
    let limiter = RateLimiter::new(
        Arc::new(MemoryStore::new()),
        RateLimitConfig::new(u32::MAX, 3600),
    );

    let limiter = &limiter;

    c.bench_function("memory_consume_single_client", |b| {
        let client = ClientId::from_ip("10.0.0.1".parse().unwrap());
        let client = &client;
        b.to_async(&runtime)
            .iter(move || async move { black_box(limiter.consume(client).await) })
    });

    c.bench_function("memory_consume_many_clients", |b| {
        let clients: Vec<_> = (0..=255u8)
            .map(|i| ClientId::from_ip(format!("10.0.1.{}", i).parse().unwrap()))
            .collect();
        let clients = &clients;
        let mut next = 0usize;
        b.to_async(&runtime).iter(move || {
            let client = &clients[next % clients.len()];
            next += 1;
            async move { black_box(limiter.consume(client).await) }
        })
    });
}

fn benchmark_config_parsing(c: &mut Criterion) {
    let yaml = r#"
DomainName: "0.0.0.0"
Port: 8080
Resources:
  - DomainName: "localhost"
    Port: 3000
    Endpoint: "/api/users"
  - DomainName: "localhost"
    Port: 3001
    Endpoint: "/api/orders"
RateLimit:
  Capacity: 20
  WindowSecs: 60
"#;

    c.bench_function("config_parsing", |b| {
        b.iter(|| black_box(ProxyConfig::from_yaml(yaml)))
    });
}

criterion_group!(
    benches,
    benchmark_route_resolution,
    benchmark_route_scale,
    benchmark_memory_consume,
    benchmark_config_parsing
);
criterion_main!(benches);
