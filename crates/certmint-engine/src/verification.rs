// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Verification engine — answers "is this certificate authentic and
// currently valid" with one of four outcomes, and appends exactly one
// ledger event per query regardless of outcome.
//
// Outcome narrowing is deliberate: drafts and hint mismatches surface as
// `NotFound`, indistinguishable from ids that never existed, so the public
// endpoint cannot be used to enumerate the id space.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use certmint_core::error::Result;
use certmint_core::types::{
    Certificate, CertificateId, CertStatus, Verification, VerificationEvent, VerifyOutcome,
};
use certmint_store::CertificateStore;

/// Stateless verification handler over the record store.
pub struct VerificationEngine {
    store: Arc<CertificateStore>,
}

impl VerificationEngine {
    pub fn new(store: Arc<CertificateStore>) -> Self {
        Self { store }
    }

    /// Verify a certificate id against the store.
    ///
    /// Every call appends exactly one `VerificationEvent` before returning,
    /// on every outcome path — the ledger exists for fraud detection, so
    /// failed lookups matter as much as successful ones. Store failures
    /// propagate as errors and are never folded into a `NotFound` outcome.
    #[instrument(skip(self), fields(id = %id))]
    pub fn verify(
        &self,
        id: &CertificateId,
        name_hint: Option<&str>,
        verifier_identity: Option<&str>,
    ) -> Result<Verification> {
        let now = Utc::now();
        let cert = self.store.get(id)?;

        let (outcome, projection) = match &cert {
            None => (VerifyOutcome::NotFound, None),
            Some(cert) => evaluate(cert, name_hint, now),
        };

        let event = VerificationEvent::new(
            id.as_str(),
            outcome,
            verifier_identity.map(str::to_owned),
        );
        if cert.is_some() {
            self.store.append_event(&event)?;
        } else {
            self.store.append_miss_event(&event)?;
        }

        debug!(outcome = ?outcome, "verification complete");
        Ok(Verification {
            outcome,
            certificate: projection,
        })
    }
}

/// Evaluate an existing record against the query.
///
/// Precedence: draft (hidden) before revoked before expired before the
/// name hint. A revoked certificate therefore never re-evaluates as
/// expired, and a hint mismatch on a live certificate reads exactly like
/// an absent id.
fn evaluate(
    cert: &Certificate,
    name_hint: Option<&str>,
    now: DateTime<Utc>,
) -> (VerifyOutcome, Option<Certificate>) {
    if cert.status == CertStatus::Draft {
        return (VerifyOutcome::NotFound, None);
    }
    if cert.status == CertStatus::Revoked {
        return (VerifyOutcome::Revoked, None);
    }
    if is_expired(cert, now) {
        return (VerifyOutcome::Expired, None);
    }
    if let Some(hint) = name_hint
        && !hint.trim().is_empty()
        && !name_matches(&cert.recipient_name, hint)
    {
        return (VerifyOutcome::NotFound, None);
    }
    (VerifyOutcome::Success, Some(cert.clone()))
}

/// Whether the certificate has expired relative to `now`.
///
/// Comparison is by calendar day, and `valid_until` is inclusive of its
/// own day: a certificate valid until 2027-01-15 still verifies at any
/// time on 2027-01-15.
fn is_expired(cert: &Certificate, now: DateTime<Utc>) -> bool {
    cert.valid_until
        .is_some_and(|until| now.date_naive() > until.date_naive())
}

/// Case-insensitive substring match of the hint against the stored name.
fn name_matches(stored: &str, hint: &str) -> bool {
    stored
        .to_lowercase()
        .contains(hint.trim().to_lowercase().as_str())
}
