// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Certmint.

use thiserror::Error;

use crate::types::CertStatus;

/// Top-level error type for all Certmint operations.
#[derive(Debug, Error)]
pub enum CertmintError {
    // -- Issuance errors --
    #[error("invalid issuance request: {0}")]
    Validation(String),

    #[error("certificate id {0} already exists")]
    DuplicateId(String),

    #[error("could not allocate a unique certificate id after {attempts} attempts")]
    IdExhaustion { attempts: u32 },

    // -- Lifecycle errors --
    #[error("certificate {0} not found")]
    NotFound(String),

    #[error("invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: CertStatus, to: CertStatus },

    #[error("certificate {0} is already revoked")]
    AlreadyRevoked(String),

    // -- Integrity --
    #[error("content hash mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    // -- Auth --
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    #[error("insufficient role for this operation")]
    Forbidden,

    // -- Storage / infrastructure --
    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, CertmintError>;
