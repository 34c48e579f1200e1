// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certmint Store — durable keyed storage of certificate records plus the
// append-only ledger of verification events. This crate is the exclusive
// owner of both lifecycles; every other component goes through its
// operations.

pub mod integrity;
pub mod store;

pub use integrity::{content_hash, hash_bytes, verify_certificate, verify_hash};
pub use store::CertificateStore;
