// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Issuance service — validates requests and commits new certificate
// records with a unique id and a content hash over the immutable fields.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use certmint_core::config::ServiceConfig;
use certmint_core::error::{CertmintError, Result};
use certmint_core::types::{Certificate, CertificateId, CertStatus, IssueRequest};
use certmint_store::{CertificateStore, integrity};

/// Validates and commits new certificates.
pub struct IssuanceService {
    store: Arc<CertificateStore>,
    /// When set, every new certificate lands as `Draft` pending review.
    draft_review: bool,
    default_issuing_authority: String,
    max_id_attempts: u32,
}

impl IssuanceService {
    pub fn new(store: Arc<CertificateStore>, config: &ServiceConfig) -> Self {
        Self {
            store,
            draft_review: config.draft_review,
            default_issuing_authority: config.default_issuing_authority.clone(),
            max_id_attempts: config.max_id_attempts,
        }
    }

    /// Issue a new certificate.
    ///
    /// Validates the request, computes the content hash, and commits under
    /// a freshly generated id. The serial space is only 9000 wide, so id
    /// collisions against the store are expected under load; generation
    /// retries up to the configured bound and then fails with
    /// `IdExhaustion` rather than looping forever.
    #[instrument(skip_all, fields(recipient = %request.recipient_id, program = %request.program))]
    pub fn issue(&self, request: &IssueRequest) -> Result<Certificate> {
        validate(request)?;

        let issuing_authority = request
            .issuing_authority
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| self.default_issuing_authority.clone());

        let content_hash = integrity::content_hash(
            &request.recipient_id,
            &request.recipient_name,
            &request.program,
            &issuing_authority,
            &request.issue_date,
            request.valid_until.as_ref(),
        );

        let status = if self.draft_review || request.as_draft {
            CertStatus::Draft
        } else {
            CertStatus::Issued
        };

        for attempt in 1..=self.max_id_attempts {
            let now = Utc::now();
            let cert = Certificate {
                id: CertificateId::generate(),
                recipient_id: request.recipient_id.clone(),
                recipient_name: request.recipient_name.clone(),
                program: request.program.clone(),
                issuing_authority: issuing_authority.clone(),
                issue_date: request.issue_date,
                valid_until: request.valid_until,
                status,
                content_hash: content_hash.clone(),
                revocation_reason: None,
                created_at: now,
                updated_at: now,
            };

            match self.store.put(&cert) {
                Ok(stored) => {
                    info!(id = %stored.id, status = ?stored.status, "certificate issued");
                    return Ok(stored);
                }
                Err(CertmintError::DuplicateId(id)) => {
                    warn!(%id, attempt, "id collision, regenerating");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(CertmintError::IdExhaustion {
            attempts: self.max_id_attempts,
        })
    }

    /// Publish a draft certificate (`Draft -> Issued`).
    #[instrument(skip(self), fields(id = %id))]
    pub fn publish(&self, id: &CertificateId) -> Result<Certificate> {
        let cert = self.store.set_status(id, CertStatus::Issued, None)?;
        info!(id = %id, "draft certificate published");
        Ok(cert)
    }
}

/// Reject issuance requests with missing fields or an inverted date range.
fn validate(request: &IssueRequest) -> Result<()> {
    if request.recipient_id.trim().is_empty() {
        return Err(CertmintError::Validation("recipientId is required".into()));
    }
    if request.recipient_name.trim().is_empty() {
        return Err(CertmintError::Validation("recipientName is required".into()));
    }
    if request.program.trim().is_empty() {
        return Err(CertmintError::Validation("program is required".into()));
    }
    if let Some(valid_until) = request.valid_until
        && valid_until < request.issue_date
    {
        return Err(CertmintError::Validation(
            "validUntil precedes issueDate".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> IssueRequest {
        IssueRequest {
            recipient_id: "2".into(),
            recipient_name: "John Doe".into(),
            program: "Digital Marketing Fundamentals".into(),
            issuing_authority: None,
            issue_date: Utc.with_ymd_and_hms(2025, 1, 15, 0, 0, 0).unwrap(),
            valid_until: Some(Utc.with_ymd_and_hms(2027, 1, 15, 0, 0, 0).unwrap()),
            as_draft: false,
        }
    }

    fn service() -> IssuanceService {
        let store = Arc::new(CertificateStore::open_in_memory().expect("open store"));
        IssuanceService::new(store, &ServiceConfig::default())
    }

    #[test]
    fn issue_commits_issued_certificate() {
        let svc = service();
        let cert = svc.issue(&request()).expect("issue");

        assert_eq!(cert.status, CertStatus::Issued);
        assert_eq!(cert.recipient_name, "John Doe");
        assert_eq!(
            cert.issuing_authority,
            "MTN Cameroon Professional Development"
        );
        CertificateId::parse(cert.id.as_str()).expect("well-formed id");
        assert_eq!(cert.content_hash.len(), 64);
    }

    #[test]
    fn issue_as_draft() {
        let svc = service();
        let mut req = request();
        req.as_draft = true;

        let cert = svc.issue(&req).expect("issue");
        assert_eq!(cert.status, CertStatus::Draft);
    }

    #[test]
    fn draft_review_config_forces_draft() {
        let store = Arc::new(CertificateStore::open_in_memory().expect("open store"));
        let config = ServiceConfig {
            draft_review: true,
            ..ServiceConfig::default()
        };
        let svc = IssuanceService::new(store, &config);

        let cert = svc.issue(&request()).expect("issue");
        assert_eq!(cert.status, CertStatus::Draft);
    }

    #[test]
    fn publish_promotes_draft() {
        let svc = service();
        let mut req = request();
        req.as_draft = true;
        let cert = svc.issue(&req).expect("issue");

        let published = svc.publish(&cert.id).expect("publish");
        assert_eq!(published.status, CertStatus::Issued);
    }

    #[test]
    fn publish_issued_certificate_fails() {
        let svc = service();
        let cert = svc.issue(&request()).expect("issue");
        let result = svc.publish(&cert.id);
        assert!(matches!(
            result,
            Err(CertmintError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn blank_fields_rejected() {
        let svc = service();

        let mut req = request();
        req.recipient_id = "  ".into();
        assert!(matches!(
            svc.issue(&req),
            Err(CertmintError::Validation(_))
        ));

        let mut req = request();
        req.recipient_name = String::new();
        assert!(matches!(
            svc.issue(&req),
            Err(CertmintError::Validation(_))
        ));

        let mut req = request();
        req.program = String::new();
        assert!(matches!(
            svc.issue(&req),
            Err(CertmintError::Validation(_))
        ));
    }

    #[test]
    fn valid_until_before_issue_date_rejected() {
        let svc = service();
        let mut req = request();
        req.valid_until = Some(Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap());
        assert!(matches!(
            svc.issue(&req),
            Err(CertmintError::Validation(_))
        ));
    }

    #[test]
    fn concurrent_issuance_yields_distinct_ids() {
        let store = Arc::new(CertificateStore::open_in_memory().expect("open store"));
        let svc = Arc::new(IssuanceService::new(
            Arc::clone(&store),
            &ServiceConfig::default(),
        ));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let svc = Arc::clone(&svc);
                std::thread::spawn(move || svc.issue(&request()).expect("issue"))
            })
            .collect();

        let mut ids: Vec<String> = handles
            .into_iter()
            .map(|h| h.join().expect("thread").id.to_string())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16, "all issued ids must be distinct");
    }
}
