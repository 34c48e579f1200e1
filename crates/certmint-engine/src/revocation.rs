// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Revocation manager — the only component permitted to drive
// `Issued -> Revoked`. Revocation invalidates a certificate permanently
// but never deletes the record or its event history.

use std::sync::Arc;

use tracing::{info, instrument};

use certmint_core::error::Result;
use certmint_core::types::{Certificate, CertificateId, CertStatus};
use certmint_store::CertificateStore;

pub struct RevocationManager {
    store: Arc<CertificateStore>,
}

impl RevocationManager {
    pub fn new(store: Arc<CertificateStore>) -> Self {
        Self { store }
    }

    /// Revoke an issued certificate, recording the reason.
    ///
    /// A repeat revoke fails with `AlreadyRevoked`: callers must be able to
    /// tell a first revocation from a no-op, so the second call is a
    /// defined failure rather than a silent success. Revoking a draft is an
    /// `InvalidTransition`; drafts are withdrawn by never publishing them.
    #[instrument(skip(self), fields(id = %id))]
    pub fn revoke(&self, id: &CertificateId, reason: &str) -> Result<Certificate> {
        let cert = self
            .store
            .set_status(id, CertStatus::Revoked, Some(reason))?;
        info!(id = %id, reason, "certificate revoked");
        Ok(cert)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    use certmint_core::config::ServiceConfig;
    use certmint_core::error::CertmintError;
    use certmint_core::types::IssueRequest;

    use crate::issuance::IssuanceService;

    fn setup() -> (Arc<CertificateStore>, IssuanceService, RevocationManager) {
        let store = Arc::new(CertificateStore::open_in_memory().expect("open store"));
        let issuance = IssuanceService::new(Arc::clone(&store), &ServiceConfig::default());
        let revocation = RevocationManager::new(Arc::clone(&store));
        (store, issuance, revocation)
    }

    fn request(as_draft: bool) -> IssueRequest {
        IssueRequest {
            recipient_id: "6".into(),
            recipient_name: "Charlie Brown".into(),
            program: "Data Analytics".into(),
            issuing_authority: None,
            issue_date: Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap(),
            valid_until: None,
            as_draft,
        }
    }

    #[test]
    fn revoke_records_reason() {
        let (store, issuance, revocation) = setup();
        let cert = issuance.issue(&request(false)).expect("issue");

        let revoked = revocation.revoke(&cert.id, "credential fraud").expect("revoke");
        assert_eq!(revoked.status, CertStatus::Revoked);
        assert_eq!(revoked.revocation_reason.as_deref(), Some("credential fraud"));

        let stored = store.get(&cert.id).expect("get").expect("found");
        assert_eq!(stored.status, CertStatus::Revoked);
    }

    #[test]
    fn second_revoke_is_defined_failure() {
        let (_, issuance, revocation) = setup();
        let cert = issuance.issue(&request(false)).expect("issue");

        revocation.revoke(&cert.id, "fraud").expect("first revoke");
        let result = revocation.revoke(&cert.id, "fraud");
        assert!(matches!(result, Err(CertmintError::AlreadyRevoked(_))));
    }

    #[test]
    fn revoke_missing_id_is_not_found() {
        let (_, _, revocation) = setup();
        let id = CertificateId::parse("MTN-CERT-9999").expect("valid id");
        let result = revocation.revoke(&id, "fraud");
        assert!(matches!(result, Err(CertmintError::NotFound(_))));
    }

    #[test]
    fn revoke_draft_is_invalid_transition() {
        let (_, issuance, revocation) = setup();
        let cert = issuance.issue(&request(true)).expect("issue");

        let result = revocation.revoke(&cert.id, "fraud");
        assert!(matches!(
            result,
            Err(CertmintError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn revocation_preserves_event_history() {
        let (store, issuance, revocation) = setup();
        let cert = issuance.issue(&request(false)).expect("issue");

        store
            .append_event(&certmint_core::types::VerificationEvent::new(
                cert.id.as_str(),
                certmint_core::types::VerifyOutcome::Success,
                None,
            ))
            .expect("append");

        revocation.revoke(&cert.id, "fraud").expect("revoke");
        assert_eq!(store.events_for(cert.id.as_str()).expect("events").len(), 1);
    }
}
