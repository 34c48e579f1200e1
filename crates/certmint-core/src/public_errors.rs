// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Public error projection for the HTTP surface.
//
// Internal errors carry detail (SQL text, file paths, transition states)
// that must not reach anonymous callers: the verify endpoint in particular
// must not reveal anything beyond the four defined outcomes, or it becomes
// an oracle for enumerating the certificate-id space. Every error crossing
// the API boundary is mapped through here first.

use serde::Serialize;

use crate::error::CertmintError;

/// A sanitized error ready for serialization in an HTTP response body.
#[derive(Debug, Clone, Serialize)]
pub struct PublicError {
    /// HTTP status code the handler should respond with.
    #[serde(skip)]
    pub status: u16,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable summary, free of internal detail.
    pub message: String,
    /// Whether the caller may retry the same request unchanged.
    pub retriable: bool,
}

/// Project a `CertmintError` onto its public form.
pub fn project(err: &CertmintError) -> PublicError {
    match err {
        CertmintError::Validation(detail) => PublicError {
            status: 400,
            code: "validation",
            message: detail.clone(),
            retriable: false,
        },

        CertmintError::NotFound(id) => PublicError {
            status: 404,
            code: "not_found",
            message: format!("certificate {id} not found"),
            retriable: false,
        },

        CertmintError::AlreadyRevoked(id) => PublicError {
            status: 409,
            code: "already_revoked",
            message: format!("certificate {id} is already revoked"),
            retriable: false,
        },

        CertmintError::InvalidTransition { from, to } => PublicError {
            status: 409,
            code: "invalid_transition",
            message: format!("status transition {from:?} -> {to:?} is not permitted"),
            retriable: false,
        },

        // Surfaced only after the bounded internal retry loop has given up.
        CertmintError::DuplicateId(_) | CertmintError::IdExhaustion { .. } => PublicError {
            status: 503,
            code: "id_allocation",
            message: "could not allocate a certificate id, try again".into(),
            retriable: true,
        },

        CertmintError::IntegrityMismatch { .. } => PublicError {
            status: 409,
            code: "integrity",
            message: "certificate record failed its integrity check".into(),
            retriable: false,
        },

        CertmintError::Unauthorized(_) => PublicError {
            status: 401,
            code: "unauthorized",
            message: "missing or invalid credentials".into(),
            retriable: false,
        },

        CertmintError::Forbidden => PublicError {
            status: 403,
            code: "forbidden",
            message: "insufficient role for this operation".into(),
            retriable: false,
        },

        // Infrastructure failures: callers retry with backoff. The detail
        // string stays in the server log only.
        CertmintError::StoreUnavailable(_) | CertmintError::Io(_) => PublicError {
            status: 503,
            code: "store_unavailable",
            message: "record store temporarily unavailable".into(),
            retriable: true,
        },

        CertmintError::Serialization(_) => PublicError {
            status: 400,
            code: "bad_body",
            message: "request body could not be parsed".into(),
            retriable: false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CertStatus;

    #[test]
    fn store_failure_hides_detail() {
        let err = CertmintError::StoreUnavailable("disk I/O error on /var/lib/certmint".into());
        let public = project(&err);
        assert_eq!(public.status, 503);
        assert!(public.retriable);
        assert!(!public.message.contains("/var/lib"));
    }

    #[test]
    fn validation_is_bad_request() {
        let public = project(&CertmintError::Validation("recipientId is required".into()));
        assert_eq!(public.status, 400);
        assert!(!public.retriable);
    }

    #[test]
    fn repeat_revoke_is_conflict() {
        let public = project(&CertmintError::AlreadyRevoked("MTN-CERT-1240".into()));
        assert_eq!(public.status, 409);
        assert_eq!(public.code, "already_revoked");
    }

    #[test]
    fn id_exhaustion_is_retriable() {
        let public = project(&CertmintError::IdExhaustion { attempts: 32 });
        assert_eq!(public.status, 503);
        assert!(public.retriable);
    }

    #[test]
    fn invalid_transition_is_conflict() {
        let public = project(&CertmintError::InvalidTransition {
            from: CertStatus::Draft,
            to: CertStatus::Revoked,
        });
        assert_eq!(public.status, 409);
    }
}
