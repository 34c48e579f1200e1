// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Record integrity — SHA-256 content hashing for tamper detection.
//
// The content hash binds a certificate's immutable fields at issuance time.
// If a record is exported, edited, and re-imported, recomputing the hash
// exposes the change. The hash deliberately excludes `status`,
// `revocation_reason`, and the bookkeeping timestamps, which change after
// issuance.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use certmint_core::error::CertmintError;
use certmint_core::types::Certificate;

/// Compute the SHA-256 hash of `data` and return it as a lowercase hex string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    hex::encode(result)
}

/// Verify that `data` matches the expected SHA-256 hex digest.
pub fn verify_hash(data: &[u8], expected_hex: &str) -> Result<(), CertmintError> {
    let actual = hash_bytes(data);
    if actual == expected_hex {
        Ok(())
    } else {
        Err(CertmintError::IntegrityMismatch {
            expected: expected_hex.to_owned(),
            actual,
        })
    }
}

/// Compute the content hash over a certificate's immutable fields.
///
/// Fields are joined with `\n` in a fixed order; dates are canonicalised to
/// RFC 3339 UTC with second precision so that re-parsing a stored record
/// reproduces the exact preimage.
pub fn content_hash(
    recipient_id: &str,
    recipient_name: &str,
    program: &str,
    issuing_authority: &str,
    issue_date: &DateTime<Utc>,
    valid_until: Option<&DateTime<Utc>>,
) -> String {
    let issue = issue_date.to_rfc3339_opts(SecondsFormat::Secs, true);
    let until = valid_until
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    let preimage = format!(
        "{recipient_id}\n{recipient_name}\n{program}\n{issuing_authority}\n{issue}\n{until}"
    );
    hash_bytes(preimage.as_bytes())
}

/// Recompute a certificate's content hash and compare it to the stored one.
pub fn verify_certificate(cert: &Certificate) -> Result<(), CertmintError> {
    let actual = content_hash(
        &cert.recipient_id,
        &cert.recipient_name,
        &cert.program,
        &cert.issuing_authority,
        &cert.issue_date,
        cert.valid_until.as_ref(),
    );
    if actual == cert.content_hash {
        Ok(())
    } else {
        Err(CertmintError::IntegrityMismatch {
            expected: cert.content_hash.clone(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    /// SHA-256 of the empty byte slice (well-known constant).
    const EMPTY_SHA256: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn hash_empty_input() {
        assert_eq!(hash_bytes(b""), EMPTY_SHA256);
    }

    #[test]
    fn verify_matching_hash() {
        let data = b"certmint";
        let hex = hash_bytes(data);
        assert!(verify_hash(data, &hex).is_ok());
    }

    #[test]
    fn verify_mismatched_hash() {
        let result = verify_hash(b"a", "0000");
        assert!(matches!(
            result,
            Err(CertmintError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn content_hash_is_deterministic() {
        let issue = date(2025, 1, 15);
        let until = date(2027, 1, 15);
        let a = content_hash("2", "John Doe", "Digital Marketing Fundamentals",
            "MTN Cameroon Professional Development", &issue, Some(&until));
        let b = content_hash("2", "John Doe", "Digital Marketing Fundamentals",
            "MTN Cameroon Professional Development", &issue, Some(&until));
        assert_eq!(a, b);
    }

    #[test]
    fn content_hash_changes_with_any_field() {
        let issue = date(2025, 1, 15);
        let base = content_hash("2", "John Doe", "P", "A", &issue, None);

        assert_ne!(base, content_hash("3", "John Doe", "P", "A", &issue, None));
        assert_ne!(base, content_hash("2", "Jane Doe", "P", "A", &issue, None));
        assert_ne!(base, content_hash("2", "John Doe", "Q", "A", &issue, None));
        assert_ne!(base, content_hash("2", "John Doe", "P", "B", &issue, None));
        assert_ne!(
            base,
            content_hash("2", "John Doe", "P", "A", &date(2025, 1, 16), None)
        );
        assert_ne!(
            base,
            content_hash("2", "John Doe", "P", "A", &issue, Some(&date(2027, 1, 15)))
        );
    }
}
