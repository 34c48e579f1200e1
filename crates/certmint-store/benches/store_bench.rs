// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for content hashing, record lookup, and ledger
// appends in the certmint-store crate.

use chrono::{TimeZone, Utc};
use criterion::{Criterion, black_box, criterion_group, criterion_main};

use certmint_core::types::{
    CertStatus, Certificate, CertificateId, VerificationEvent, VerifyOutcome,
};
use certmint_store::{CertificateStore, content_hash};

fn bench_cert() -> Certificate {
    let issue_date = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
    let valid_until = Some(Utc.with_ymd_and_hms(2027, 1, 15, 0, 0, 0).unwrap());
    let now = Utc::now();
    Certificate {
        id: CertificateId::parse("MTN-CERT-1234").expect("valid id"),
        recipient_id: "2".into(),
        recipient_name: "John Doe".into(),
        program: "Digital Marketing Fundamentals".into(),
        issuing_authority: "MTN Cameroon Professional Development".into(),
        issue_date,
        valid_until,
        status: CertStatus::Issued,
        content_hash: content_hash(
            "2",
            "John Doe",
            "Digital Marketing Fundamentals",
            "MTN Cameroon Professional Development",
            &issue_date,
            valid_until.as_ref(),
        ),
        revocation_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// Benchmark the content-hash computation over typical field lengths.
fn bench_content_hash(c: &mut Criterion) {
    let issue_date = Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap();
    c.bench_function("content_hash", |b| {
        b.iter(|| {
            let hash = content_hash(
                black_box("2"),
                black_box("John Doe"),
                black_box("Digital Marketing Fundamentals"),
                black_box("MTN Cameroon Professional Development"),
                &issue_date,
                None,
            );
            black_box(hash);
        });
    });
}

/// Benchmark the verification hot path: a keyed record lookup.
fn bench_get(c: &mut Criterion) {
    let store = CertificateStore::open_in_memory().expect("open store");
    let cert = bench_cert();
    store.put(&cert).expect("put");

    c.bench_function("store_get (in-memory SQLite)", |b| {
        b.iter(|| {
            let found = store.get(black_box(&cert.id)).expect("get");
            black_box(found);
        });
    });
}

/// Benchmark appending one verification event to the ledger.
fn bench_append_event(c: &mut Criterion) {
    let store = CertificateStore::open_in_memory().expect("open store");
    let cert = bench_cert();
    store.put(&cert).expect("put");

    c.bench_function("append_event (in-memory SQLite)", |b| {
        b.iter(|| {
            let event =
                VerificationEvent::new("MTN-CERT-1234", VerifyOutcome::Success, None);
            store.append_event(black_box(&event)).expect("append");
        });
    });
}

criterion_group!(benches, bench_content_hash, bench_get, bench_append_event);
criterion_main!(benches);
