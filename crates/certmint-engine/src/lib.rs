// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certmint Engine — the stateless request handlers over the record store:
// issuance, verification, and revocation. Each service holds a shared
// handle to the store and keeps no state of its own.

pub mod issuance;
pub mod revocation;
pub mod verification;

pub use issuance::IssuanceService;
pub use revocation::RevocationManager;
pub use verification::VerificationEngine;
