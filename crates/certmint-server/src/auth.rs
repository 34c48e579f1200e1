// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Credential store — server-side bearer-token verification.
//
// Tokens are never stored in clear: the table keeps SHA-256 digests, and a
// presented token is hashed and looked up. The caller's role comes from
// the matched credential row, never from anything the client sends.
//
// Schema:
//   credentials(
//     token_digest TEXT PRIMARY KEY,  -- SHA-256 hex of the bearer token
//     role         TEXT NOT NULL,     -- "admin" | "recipient"
//     label        TEXT NOT NULL,     -- operator-facing name for the token
//     created_at   TEXT NOT NULL      -- RFC 3339
//   )

use std::path::Path;

use chrono::Utc;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use certmint_core::error::{CertmintError, Result};
use certmint_store::hash_bytes;

/// Role attached to a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// May issue, publish, revoke, and read audit trails.
    Admin,
    /// May list certificates for recipients.
    Recipient,
}

/// A matched credential (the token itself is never retained).
#[derive(Debug, Clone)]
pub struct Credential {
    pub label: String,
    pub role: Role,
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// SQLite-backed credential store.
pub struct CredentialStore {
    conn: Connection,
}

const CREATE_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS credentials (
    token_digest TEXT PRIMARY KEY,
    role         TEXT NOT NULL,
    label        TEXT NOT NULL,
    created_at   TEXT NOT NULL
);";

/// Convert a `rusqlite::Error` into a `StoreUnavailable` with context.
fn db_err(ctx: &str, e: rusqlite::Error) -> CertmintError {
    CertmintError::StoreUnavailable(format!("{ctx}: {e}"))
}

impl CredentialStore {
    /// Open (or create) the credential database at `path`.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| db_err("open", e))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| db_err("create table", e))?;
        debug!("credential store opened");
        Ok(Self { conn })
    }

    /// Open an in-memory credential database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| db_err("create table", e))?;
        Ok(Self { conn })
    }

    /// Register a token. Idempotent: re-registering an existing token is a
    /// no-op (the original role and label win).
    #[instrument(skip(self, token), fields(%label, role = ?role))]
    pub fn add_token(&self, token: &str, role: Role, label: &str) -> Result<()> {
        let digest = hash_bytes(token.as_bytes());
        let role_json = serde_json::to_string(&role)?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO credentials (token_digest, role, label, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![digest, role_json, label, Utc::now().to_rfc3339()],
            )
            .map_err(|e| db_err("insert credential", e))?;

        info!(label, "credential registered");
        Ok(())
    }

    /// Look up a presented token. `Ok(None)` means the token is unknown —
    /// an authentication failure, not an infrastructure error.
    pub fn authenticate(&self, token: &str) -> Result<Option<Credential>> {
        let digest = hash_bytes(token.as_bytes());

        let mut stmt = self
            .conn
            .prepare("SELECT role, label FROM credentials WHERE token_digest = ?1")
            .map_err(|e| db_err("prepare authenticate", e))?;

        let mut rows = stmt
            .query_map(params![digest], |row| {
                let role_json: String = row.get(0)?;
                let label: String = row.get(1)?;
                let role: Role = serde_json::from_str(&role_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        0,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(Credential { label, role })
            })
            .map_err(|e| db_err("query authenticate", e))?;

        match rows.next() {
            Some(Ok(cred)) => Ok(Some(cred)),
            Some(Err(e)) => Err(db_err("row parse", e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> CredentialStore {
        CredentialStore::open_in_memory().expect("open credential store")
    }

    #[test]
    fn register_and_authenticate() {
        let store = make_store();
        store
            .add_token("s3cret-admin-token", Role::Admin, "ops")
            .expect("add");

        let cred = store
            .authenticate("s3cret-admin-token")
            .expect("authenticate")
            .expect("matched");
        assert_eq!(cred.role, Role::Admin);
        assert_eq!(cred.label, "ops");
    }

    #[test]
    fn unknown_token_is_none() {
        let store = make_store();
        assert!(store.authenticate("nope").expect("authenticate").is_none());
    }

    #[test]
    fn reregistering_does_not_escalate_role() {
        let store = make_store();
        store
            .add_token("token-a", Role::Recipient, "dashboard")
            .expect("add");
        store
            .add_token("token-a", Role::Admin, "sneaky")
            .expect("add again");

        let cred = store
            .authenticate("token-a")
            .expect("authenticate")
            .expect("matched");
        assert_eq!(cred.role, Role::Recipient);
    }

    #[test]
    fn tokens_are_stored_hashed() {
        let store = make_store();
        store
            .add_token("cleartext-token", Role::Admin, "ops")
            .expect("add");

        let stored: String = store
            .conn
            .query_row("SELECT token_digest FROM credentials", [], |row| row.get(0))
            .expect("query");
        assert_ne!(stored, "cleartext-token");
        assert_eq!(stored, hash_bytes(b"cleartext-token"));
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(bearer_token("Bearer  abc123 "), Some("abc123"));
        assert_eq!(bearer_token("Basic abc123"), None);
        assert_eq!(bearer_token("Bearer "), None);
        assert_eq!(bearer_token(""), None);
    }
}
