// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Versioned QR payload format for printed certificates.
//
// A scanned code carries `CERTMINT:v1:<certificate-id>`. The explicit
// scheme and version let future payloads add fields (e.g. a content-hash
// fragment) without breaking deployed scanners. Bare certificate ids are
// accepted for compatibility with cards printed before the format was
// versioned.

use crate::error::CertmintError;
use crate::types::CertificateId;

/// Scheme tag at the start of every versioned payload.
pub const QR_SCHEME: &str = "CERTMINT";

/// Current payload version.
pub const QR_VERSION: &str = "v1";

/// Encode a certificate id as a v1 QR payload.
pub fn encode(id: &CertificateId) -> String {
    format!("{QR_SCHEME}:{QR_VERSION}:{id}")
}

/// Parse a scanned QR payload into a certificate id.
///
/// Accepts the versioned `CERTMINT:v1:<id>` form and, as a legacy fallback,
/// a bare well-formed certificate id. Anything else is a `Validation`
/// error.
pub fn parse(payload: &str) -> Result<CertificateId, CertmintError> {
    let trimmed = payload.trim();

    if let Some(rest) = trimmed.strip_prefix(QR_SCHEME) {
        let mut parts = rest.splitn(3, ':');
        // First split element is the empty string before the leading ':'.
        match (parts.next(), parts.next(), parts.next()) {
            (Some(""), Some(version), Some(id)) if version == QR_VERSION => {
                return CertificateId::parse(id);
            }
            (Some(""), Some(version), Some(_)) => {
                return Err(CertmintError::Validation(format!(
                    "unsupported QR payload version: {version}"
                )));
            }
            _ => {
                return Err(CertmintError::Validation(format!(
                    "malformed QR payload: {trimmed}"
                )));
            }
        }
    }

    // Legacy cards encode the id with no scheme wrapper.
    CertificateId::parse(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let id = CertificateId::parse("MTN-CERT-1234").expect("valid id");
        let payload = encode(&id);
        assert_eq!(payload, "CERTMINT:v1:MTN-CERT-1234");
        assert_eq!(parse(&payload).expect("parse"), id);
    }

    #[test]
    fn legacy_bare_id_accepted() {
        let id = parse("MTN-CERT-4321").expect("legacy payload");
        assert_eq!(id.as_str(), "MTN-CERT-4321");
    }

    #[test]
    fn whitespace_is_trimmed() {
        assert!(parse("  CERTMINT:v1:MTN-CERT-1234\n").is_ok());
    }

    #[test]
    fn unknown_version_rejected() {
        let err = parse("CERTMINT:v9:MTN-CERT-1234").unwrap_err();
        assert!(matches!(err, CertmintError::Validation(_)));
    }

    #[test]
    fn garbage_rejected() {
        assert!(parse("https://example.com/verify").is_err());
        assert!(parse("CERTMINT").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn versioned_payload_with_bad_id_rejected() {
        assert!(parse("CERTMINT:v1:MTN-CERT-12").is_err());
    }
}
