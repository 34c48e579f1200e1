// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Service configuration.

use serde::{Deserialize, Serialize};

/// Persistent service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// TCP port for the HTTP API (default 8431).
    pub server_port: u16,
    /// When true, new certificates are committed as `Draft` and must be
    /// published explicitly before they verify.
    pub draft_review: bool,
    /// Issuing authority recorded on certificates that do not name one.
    pub default_issuing_authority: String,
    /// Bound on id-generation retries before issuance fails.
    pub max_id_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_port: 8431,
            draft_review: false,
            default_issuing_authority: "MTN Cameroon Professional Development".into(),
            max_id_attempts: 32,
        }
    }
}
