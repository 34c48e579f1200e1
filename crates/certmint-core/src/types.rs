// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for the Certmint issuance and verification engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CertmintError;

/// Prefix of every external certificate identifier.
pub const CERT_ID_PREFIX: &str = "MTN-CERT-";

/// Unique identifier for a certificate.
///
/// External format is `MTN-CERT-nnnn` where `nnnn` is a four-digit decimal
/// number in 1000..=9999. Ids are assigned exactly once and never reused,
/// even after revocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CertificateId(String);

impl CertificateId {
    /// Parse and validate an external-format id string.
    pub fn parse(s: &str) -> Result<Self, CertmintError> {
        let digits = s
            .strip_prefix(CERT_ID_PREFIX)
            .ok_or_else(|| CertmintError::Validation(format!("malformed certificate id: {s}")))?;

        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CertmintError::Validation(format!(
                "malformed certificate id: {s}"
            )));
        }
        // Leading-zero serials are never issued.
        if digits.starts_with('0') {
            return Err(CertmintError::Validation(format!(
                "malformed certificate id: {s}"
            )));
        }

        Ok(Self(s.to_owned()))
    }

    /// Generate a candidate id from uuid-v4 entropy.
    ///
    /// Collisions against the store are possible (the serial space is only
    /// 9000 wide) and are handled by the issuance retry loop.
    pub fn generate() -> Self {
        let serial = 1000 + (Uuid::new_v4().as_u128() % 9000) as u32;
        Self(format!("{CERT_ID_PREFIX}{serial}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CertificateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle states of a certificate.
///
/// Transitions are one-way: `Draft -> Issued` (publish) and
/// `Issued -> Revoked` (terminal). Nothing leaves `Revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertStatus {
    /// Created but not yet published; invisible to public verification.
    Draft,
    /// Published and verifiable.
    Issued,
    /// Permanently invalidated by the issuing authority.
    Revoked,
}

impl CertStatus {
    /// Whether the state machine permits `self -> next`.
    pub fn can_transition_to(self, next: CertStatus) -> bool {
        matches!(
            (self, next),
            (CertStatus::Draft, CertStatus::Issued) | (CertStatus::Issued, CertStatus::Revoked)
        )
    }
}

/// Outcome of a verification query.
///
/// This is the complete public result set. A hint mismatch and a
/// never-issued id both surface as `NotFound` so the verify endpoint cannot
/// be used to enumerate which ids exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    Success,
    NotFound,
    Revoked,
    Expired,
}

/// A complete certificate record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Certificate {
    pub id: CertificateId,
    pub recipient_id: String,
    pub recipient_name: String,
    pub program: String,
    pub issuing_authority: String,
    /// Immutable after issuance.
    pub issue_date: DateTime<Utc>,
    /// Absent means the certificate never expires. Expiry is inclusive of
    /// its own calendar day.
    pub valid_until: Option<DateTime<Utc>>,
    pub status: CertStatus,
    /// SHA-256 hex digest binding the immutable fields, computed at
    /// issuance. Detects tampering if the record is exported and re-imported.
    pub content_hash: String,
    /// Reason supplied with the revoke action, if any.
    pub revocation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A request to issue a new certificate (HTTP body of `POST /certificates`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRequest {
    pub recipient_id: String,
    pub recipient_name: String,
    pub program: String,
    /// Defaults to the configured issuing authority when absent.
    #[serde(default)]
    pub issuing_authority: Option<String>,
    pub issue_date: DateTime<Utc>,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
    /// Commit as `Draft` for the review workflow instead of `Issued`.
    #[serde(default)]
    pub as_draft: bool,
}

/// One entry in the append-only verification ledger.
///
/// Events are never mutated or deleted. For `NotFound` outcomes the
/// `certificate_id` may name an id that was never issued — probes of
/// nonexistent ids are part of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationEvent {
    /// Store-assigned append sequence number (0 until persisted).
    #[serde(default)]
    pub seq: i64,
    pub certificate_id: String,
    pub timestamp: DateTime<Utc>,
    /// Optional self-reported identity of the verifier (e.g. an email).
    pub verifier_identity: Option<String>,
    pub outcome: VerifyOutcome,
}

impl VerificationEvent {
    pub fn new(
        certificate_id: &str,
        outcome: VerifyOutcome,
        verifier_identity: Option<String>,
    ) -> Self {
        Self {
            seq: 0,
            certificate_id: certificate_id.to_owned(),
            timestamp: Utc::now(),
            verifier_identity,
            outcome,
        }
    }
}

/// Result of a verification query: the outcome plus, on success, the full
/// certificate projection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Verification {
    pub outcome: VerifyOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Certificate>,
}

impl Verification {
    pub fn miss(outcome: VerifyOutcome) -> Self {
        Self {
            outcome,
            certificate: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_id() {
        let id = CertificateId::parse("MTN-CERT-1234").expect("valid id");
        assert_eq!(id.as_str(), "MTN-CERT-1234");
    }

    #[test]
    fn parse_rejects_bad_prefix() {
        assert!(CertificateId::parse("XYZ-CERT-1234").is_err());
    }

    #[test]
    fn parse_rejects_short_serial() {
        assert!(CertificateId::parse("MTN-CERT-123").is_err());
    }

    #[test]
    fn parse_rejects_non_digits() {
        assert!(CertificateId::parse("MTN-CERT-12ab").is_err());
    }

    #[test]
    fn parse_rejects_leading_zero() {
        assert!(CertificateId::parse("MTN-CERT-0123").is_err());
    }

    #[test]
    fn generated_ids_are_well_formed() {
        for _ in 0..100 {
            let id = CertificateId::generate();
            CertificateId::parse(id.as_str()).expect("generated id must parse");
        }
    }

    #[test]
    fn status_transitions() {
        assert!(CertStatus::Draft.can_transition_to(CertStatus::Issued));
        assert!(CertStatus::Issued.can_transition_to(CertStatus::Revoked));

        assert!(!CertStatus::Draft.can_transition_to(CertStatus::Revoked));
        assert!(!CertStatus::Issued.can_transition_to(CertStatus::Draft));
        assert!(!CertStatus::Revoked.can_transition_to(CertStatus::Issued));
        assert!(!CertStatus::Revoked.can_transition_to(CertStatus::Draft));
        assert!(!CertStatus::Revoked.can_transition_to(CertStatus::Revoked));
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&VerifyOutcome::NotFound).expect("serialize");
        assert_eq!(json, "\"not_found\"");
    }

    #[test]
    fn status_serializes_lowercase() {
        let json = serde_json::to_string(&CertStatus::Issued).expect("serialize");
        assert_eq!(json, "\"issued\"");
    }
}
