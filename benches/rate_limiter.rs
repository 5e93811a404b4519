use criterion::{black_box, criterion_group, criterion_main, Criterion};
use forumgate::rate_limit::{ActionRequest, RateLimitLayer};
use forumgate::{
    FixedWindowLimiter, GateError, InMemoryWindowStore, PolicyCatalog, Principal,
    RateLimitPolicy, RateLimiter, Role,
};

use futures::future::Ready;
use std::sync::atomic::{AtomicUsize, Ordering};
use tower::{Service, ServiceBuilder};

struct Like {
    principal: Principal,
}

impl ActionRequest for Like {
    fn principal(&self) -> &Principal {
        &self.principal
    }

    fn action(&self) -> &str {
        "like_action"
    }
}

// Accepts every like.
#[derive(Clone)]
struct LikeService;

impl Service<Like> for LikeService {
    type Response = ();
    type Error = GateError;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: Like) -> Self::Future {
        futures::future::ready(Ok(()))
    }
}

// Effectively unbounded so the hot path is always the admitting CAS.
fn roomy_limiter() -> FixedWindowLimiter<InMemoryWindowStore> {
    let catalog = PolicyCatalog::empty()
        .with_policy("like_action", RateLimitPolicy::new(3_600_000, u32::MAX).unwrap());
    FixedWindowLimiter::new(InMemoryWindowStore::new(), catalog)
}

fn check_admitted(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = roomy_limiter();
    let counter = AtomicUsize::new(0);

    c.bench_function("fixed_window_check_admitted", |b| {
        b.to_async(&rt).iter(|| async {
            // Spread over many principals so the map grows like a real forum's.
            let n = counter.fetch_add(1, Ordering::Relaxed) % 10_000;
            let principal = Principal::new(format!("u-{n}"), Role::Member);
            let _ = black_box(limiter.check(&principal, black_box("like_action")).await);
        });
    });
}

fn check_denied(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let catalog = PolicyCatalog::forum_defaults();
    let limiter = FixedWindowLimiter::new(InMemoryWindowStore::new(), catalog);
    let principal = Principal::new("spammer", Role::Member);
    rt.block_on(async {
        for _ in 0..5 {
            let _ = limiter.check(&principal, "thread_create").await;
        }
    });

    c.bench_function("fixed_window_check_denied", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.check(&principal, black_box("thread_create")).await);
        });
    });
}

fn check_exempt(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = FixedWindowLimiter::new(InMemoryWindowStore::new(), PolicyCatalog::forum_defaults());
    let principal = Principal::new("admin-1", Role::Admin);

    c.bench_function("fixed_window_check_exempt", |b| {
        b.to_async(&rt).iter(|| async {
            let _ = black_box(limiter.check(&principal, black_box("thread_create")).await);
        });
    });
}

fn layer_throughput(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let svc = ServiceBuilder::new()
        .layer(RateLimitLayer::new(roomy_limiter()))
        .service(LikeService);

    c.bench_function("rate_limit_layer_like", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let req = Like { principal: Principal::new("u-1", Role::Member) };
            let _ = black_box(local_svc.call(black_box(req))).await;
        });
    });
}

criterion_group!(benches, check_admitted, check_denied, check_exempt, layer_throughput);
criterion_main!(benches);
