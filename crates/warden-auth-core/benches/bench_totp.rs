//! Benchmarks for TOTP validation and password hashing

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use warden_auth_core::{PasswordHasher, TotpConfig, TotpEngine};

fn bench_totp(c: &mut Criterion) {
    let engine = TotpEngine::new(TotpConfig::default());
    let secret = engine.generate_secret();
    let now = 1_700_000_000;
    let code = engine.generate_at(&secret, now).unwrap();

    c.bench_function("totp_generate", |b| {
        b.iter(|| engine.generate_at(black_box(&secret), black_box(now)))
    });
    c.bench_function("totp_validate_hit", |b| {
        b.iter(|| engine.validate_at(black_box(&secret), black_box(&code), now))
    });
    c.bench_function("totp_validate_miss", |b| {
        b.iter(|| engine.validate_at(black_box(&secret), black_box("000000"), now + 3600))
    });
}

fn bench_password(c: &mut Criterion) {
    let mut group = c.benchmark_group("argon2id");
    group.sample_size(10);

    let hasher = PasswordHasher::new();
    let encoded = hasher.hash("Correct1pass").unwrap();
    group.bench_function("hash_default_cost", |b| b.iter(|| hasher.hash(black_box("Correct1pass"))));
    group.bench_function("verify_default_cost", |b| {
        b.iter(|| hasher.verify(black_box("Correct1pass"), black_box(&encoded)))
    });

    group.finish();
}

criterion_group!(benches, bench_totp, bench_password);
criterion_main!(benches);
