use chrono::{Duration, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use keyward::credentials::basic::{decode_credentials, encode_credentials};
use keyward::secrets::Secret;
use keyward::token::TokenCodec;
use std::hint::black_box;
use uuid::Uuid;

/// Helper to build a role list of the given size
fn roles(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("role_{}", i)).collect()
}

/// Benchmark signing an access token
fn bench_encode(c: &mut Criterion) {
    let codec = TokenCodec::new("admin");
    let secret = Secret::generate();
    let user_id = Uuid::new_v4();
    let roles = roles(3);
    let expires_at = Utc::now() + Duration::minutes(15);

    c.bench_function("token_encode", |b| {
        b.iter(|| codec.encode(user_id, &roles, &secret, expires_at));
    });
}

/// Benchmark both decode phases with different role counts
fn bench_decode(c: &mut Criterion) {
    let codec = TokenCodec::new("admin");
    let secret = Secret::generate();
    let expires_at = Utc::now() + Duration::hours(1);

    let mut group = c.benchmark_group("token_decode");
    for n_roles in [0, 4, 32].iter() {
        let token = codec
            .encode(Uuid::new_v4(), &roles(*n_roles), &secret, expires_at)
            .unwrap();

        group.bench_with_input(
            BenchmarkId::new("unverified", format!("{}_roles", n_roles)),
            &token,
            |b, token| {
                b.iter(|| codec.decode_unverified(black_box(token)));
            },
        );
        group.bench_with_input(
            BenchmarkId::new("verified", format!("{}_roles", n_roles)),
            &token,
            |b, token| {
                b.iter(|| codec.decode_verified(black_box(token), &secret));
            },
        );
    }
    group.finish();
}

/// Benchmark Basic credential parsing
fn bench_basic_credentials(c: &mut Criterion) {
    let presented = encode_credentials("someone@example.com", "correct horse battery");

    c.bench_function("basic_decode", |b| {
        b.iter(|| decode_credentials(black_box(&presented)));
    });
}

criterion_group!(tokens, bench_encode, bench_decode);
criterion_group!(credentials, bench_basic_credentials);

criterion_main!(tokens, credentials);
