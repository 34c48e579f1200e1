// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent certificate record store backed by SQLite.
//
// Two tables: `certificates` (one durable record per id) and
// `verification_events` (append-only ledger, one row per verification
// attempt). Committed writes survive process restarts.
//
// # Concurrency
//
// All mutating operations on a single certificate id are serialized through
// a per-id lock map, so compound check-then-write sequences (status
// transitions, existence-checked appends) are atomic per id. Reads take
// only the connection lock and observe either the pre- or post-mutation
// state — individual statements are transactional in SQLite, so no partial
// write is ever visible.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use tracing::{debug, info, instrument};

use certmint_core::error::{CertmintError, Result};
use certmint_core::types::{
    Certificate, CertificateId, CertStatus, VerificationEvent, VerifyOutcome,
};

/// SQLite schema for both tables.
const CREATE_TABLES_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS certificates (
        id TEXT PRIMARY KEY,
        recipient_id TEXT NOT NULL,
        recipient_name TEXT NOT NULL,
        program TEXT NOT NULL,
        issuing_authority TEXT NOT NULL,
        issue_date TEXT NOT NULL,
        valid_until TEXT,
        status TEXT NOT NULL,
        content_hash TEXT NOT NULL,
        revocation_reason TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS verification_events (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        certificate_id TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        verifier_identity TEXT,
        outcome TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_events_certificate
        ON verification_events(certificate_id);
    CREATE INDEX IF NOT EXISTS idx_certificates_recipient
        ON certificates(recipient_id);
"#;

/// Convert a `rusqlite::Error` into a `StoreUnavailable` with context.
fn db_err(ctx: &str, e: rusqlite::Error) -> CertmintError {
    CertmintError::StoreUnavailable(format!("{ctx}: {e}"))
}

/// Durable certificate record store.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively. In an async context, calls are fast enough (sub-millisecond)
/// to run inline behind the service layer's mutex.
pub struct CertificateStore {
    /// The open SQLite connection.
    conn: Mutex<Connection>,
    /// Per-certificate-id mutation locks. Entries are created on first use
    /// and kept for the store's lifetime; the id space is 9000 wide so the
    /// map stays small.
    id_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CertificateStore {
    /// Open (or create) the store database at `path`.
    ///
    /// WAL journal mode is enabled for better concurrent-read performance
    /// and more graceful recovery from unclean shutdowns.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| db_err("open", e))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("WAL pragma", e))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| db_err("create tables", e))?;

        info!("certificate store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            id_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Open an in-memory store (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;

        conn.execute_batch(CREATE_TABLES_SQL)
            .map_err(|e| db_err("create tables", e))?;

        debug!("in-memory certificate store opened");
        Ok(Self {
            conn: Mutex::new(conn),
            id_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Get (or create) the mutation lock for a certificate id.
    fn id_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.id_locks.lock().expect("id lock map poisoned");
        Arc::clone(locks.entry(id.to_owned()).or_default())
    }

    // -- Certificates --------------------------------------------------------

    /// Insert a new certificate record.
    ///
    /// Fails with `DuplicateId` if the id already exists. Ids are never
    /// reused, so a conflict here means the issuance retry loop must pick a
    /// fresh id.
    #[instrument(skip(self, cert), fields(id = %cert.id))]
    pub fn put(&self, cert: &Certificate) -> Result<Certificate> {
        let lock = self.id_lock(cert.id.as_str());
        let _guard = lock.lock().expect("id lock poisoned");

        let conn = self.conn.lock().expect("store lock poisoned");

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM certificates WHERE id = ?1)",
                params![cert.id.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| db_err("existence check", e))?;
        if exists {
            return Err(CertmintError::DuplicateId(cert.id.to_string()));
        }

        let status_json = serde_json::to_string(&cert.status)?;

        conn.execute(
            "INSERT INTO certificates (id, recipient_id, recipient_name, program,
             issuing_authority, issue_date, valid_until, status, content_hash,
             revocation_reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                cert.id.as_str(),
                cert.recipient_id,
                cert.recipient_name,
                cert.program,
                cert.issuing_authority,
                cert.issue_date.to_rfc3339(),
                cert.valid_until.map(|d| d.to_rfc3339()),
                status_json,
                cert.content_hash,
                cert.revocation_reason,
                cert.created_at.to_rfc3339(),
                cert.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| db_err("insert certificate", e))?;

        info!(id = %cert.id, "certificate record stored");
        Ok(cert.clone())
    }

    /// Retrieve a certificate by id.
    ///
    /// Absence is a normal-path `None`, not an error — verification queries
    /// nonexistent ids routinely.
    #[instrument(skip(self), fields(id = %id))]
    pub fn get(&self, id: &CertificateId) -> Result<Option<Certificate>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        self.get_locked(&conn, id)
    }

    /// `get` against an already-held connection guard.
    fn get_locked(&self, conn: &Connection, id: &CertificateId) -> Result<Option<Certificate>> {
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient_id, recipient_name, program, issuing_authority,
                        issue_date, valid_until, status, content_hash,
                        revocation_reason, created_at, updated_at
                 FROM certificates WHERE id = ?1",
            )
            .map_err(|e| db_err("prepare get", e))?;

        let mut rows = stmt
            .query_map(params![id.as_str()], row_to_certificate)
            .map_err(|e| db_err("query get", e))?;

        match rows.next() {
            Some(Ok(cert)) => Ok(Some(cert)),
            Some(Err(e)) => Err(db_err("row parse", e)),
            None => Ok(None),
        }
    }

    /// Transition a certificate to a new lifecycle status.
    ///
    /// The check-and-update runs under the id's mutation lock, so a
    /// concurrent transition on the same id cannot interleave. `reason` is
    /// recorded as the revocation reason when transitioning to `Revoked`.
    ///
    /// # Errors
    ///
    /// `NotFound` if the id does not exist, `AlreadyRevoked` for a repeat
    /// revoke (defined failure, never a silent no-op), `InvalidTransition`
    /// for every other forbidden edge.
    #[instrument(skip(self), fields(id = %id, status = ?new_status))]
    pub fn set_status(
        &self,
        id: &CertificateId,
        new_status: CertStatus,
        reason: Option<&str>,
    ) -> Result<Certificate> {
        let lock = self.id_lock(id.as_str());
        let _guard = lock.lock().expect("id lock poisoned");

        let conn = self.conn.lock().expect("store lock poisoned");

        let current = self
            .get_locked(&conn, id)?
            .ok_or_else(|| CertmintError::NotFound(id.to_string()))?;

        if current.status == CertStatus::Revoked && new_status == CertStatus::Revoked {
            return Err(CertmintError::AlreadyRevoked(id.to_string()));
        }
        if !current.status.can_transition_to(new_status) {
            return Err(CertmintError::InvalidTransition {
                from: current.status,
                to: new_status,
            });
        }

        let status_json = serde_json::to_string(&new_status)?;
        let now = Utc::now();

        conn.execute(
            "UPDATE certificates
             SET status = ?1, revocation_reason = COALESCE(?2, revocation_reason),
                 updated_at = ?3
             WHERE id = ?4",
            params![status_json, reason, now.to_rfc3339(), id.as_str()],
        )
        .map_err(|e| db_err("update status", e))?;

        debug!(id = %id, from = ?current.status, to = ?new_status, "status transition");

        Ok(Certificate {
            status: new_status,
            revocation_reason: reason
                .map(str::to_owned)
                .or(current.revocation_reason.clone()),
            updated_at: now,
            ..current
        })
    }

    /// Retrieve all certificates, newest first.
    #[instrument(skip(self))]
    pub fn list_all(&self) -> Result<Vec<Certificate>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient_id, recipient_name, program, issuing_authority,
                        issue_date, valid_until, status, content_hash,
                        revocation_reason, created_at, updated_at
                 FROM certificates ORDER BY created_at DESC",
            )
            .map_err(|e| db_err("prepare list_all", e))?;

        let certs = stmt
            .query_map([], row_to_certificate)
            .map_err(|e| db_err("query list_all", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))?;

        debug!(count = certs.len(), "retrieved all certificates");
        Ok(certs)
    }

    /// Retrieve all certificates belonging to a recipient, newest first.
    #[instrument(skip(self))]
    pub fn list_by_recipient(&self, recipient_id: &str) -> Result<Vec<Certificate>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, recipient_id, recipient_name, program, issuing_authority,
                        issue_date, valid_until, status, content_hash,
                        revocation_reason, created_at, updated_at
                 FROM certificates WHERE recipient_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(|e| db_err("prepare list_by_recipient", e))?;

        let certs = stmt
            .query_map(params![recipient_id], row_to_certificate)
            .map_err(|e| db_err("query list_by_recipient", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))?;

        Ok(certs)
    }

    // -- Verification ledger -------------------------------------------------

    /// Append a verification event for an existing certificate.
    ///
    /// Fails with `NotFound` if the certificate does not exist; for probes
    /// of nonexistent ids use [`append_miss_event`](Self::append_miss_event).
    #[instrument(skip(self, event), fields(id = %event.certificate_id, outcome = ?event.outcome))]
    pub fn append_event(&self, event: &VerificationEvent) -> Result<()> {
        let lock = self.id_lock(&event.certificate_id);
        let _guard = lock.lock().expect("id lock poisoned");

        let conn = self.conn.lock().expect("store lock poisoned");

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM certificates WHERE id = ?1)",
                params![event.certificate_id],
                |row| row.get(0),
            )
            .map_err(|e| db_err("existence check", e))?;
        if !exists {
            return Err(CertmintError::NotFound(event.certificate_id.clone()));
        }

        insert_event(&conn, event)?;
        debug!("verification event appended");
        Ok(())
    }

    /// Append a `NotFound` probe event without an existence check.
    ///
    /// The ledger deliberately records lookups of ids that were never
    /// issued — probing patterns are themselves fraud signals.
    #[instrument(skip(self, event), fields(id = %event.certificate_id))]
    pub fn append_miss_event(&self, event: &VerificationEvent) -> Result<()> {
        let conn = self.conn.lock().expect("store lock poisoned");
        insert_event(&conn, event)?;
        debug!("miss event appended");
        Ok(())
    }

    /// Retrieve all verification events for an id in append order.
    ///
    /// The sequence is finite and restartable: each call re-queries the
    /// ledger from the start.
    #[instrument(skip(self), fields(id = %id))]
    pub fn events_for(&self, id: &str) -> Result<Vec<VerificationEvent>> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT seq, certificate_id, timestamp, verifier_identity, outcome
                 FROM verification_events WHERE certificate_id = ?1 ORDER BY seq ASC",
            )
            .map_err(|e| db_err("prepare events_for", e))?;

        let events = stmt
            .query_map(params![id], row_to_event)
            .map_err(|e| db_err("query events_for", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))?;

        Ok(events)
    }

    /// Count of successful verifications for an id.
    ///
    /// Derived from the ledger on demand — there is no mutable counter to
    /// lose under concurrent verification.
    pub fn verification_count(&self, id: &str) -> Result<u64> {
        let success_json = serde_json::to_string(&VerifyOutcome::Success)?;
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row(
            "SELECT COUNT(*) FROM verification_events
             WHERE certificate_id = ?1 AND outcome = ?2",
            params![id, success_json],
            |row| row.get(0),
        )
        .map_err(|e| db_err("verification count", e))
    }
}

/// Insert a single event row. Callers hold the connection lock.
fn insert_event(conn: &Connection, event: &VerificationEvent) -> Result<()> {
    let outcome_json = serde_json::to_string(&event.outcome)?;
    conn.execute(
        "INSERT INTO verification_events (certificate_id, timestamp, verifier_identity, outcome)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            event.certificate_id,
            event.timestamp.to_rfc3339(),
            event.verifier_identity,
            outcome_json,
        ],
    )
    .map_err(|e| db_err("insert event", e))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

/// Map a SQLite row to a `Certificate`.
///
/// Column indices must match the SELECT order used in the query methods above.
fn row_to_certificate(row: &rusqlite::Row<'_>) -> rusqlite::Result<Certificate> {
    let id_str: String = row.get(0)?;
    let recipient_id: String = row.get(1)?;
    let recipient_name: String = row.get(2)?;
    let program: String = row.get(3)?;
    let issuing_authority: String = row.get(4)?;
    let issue_date_str: String = row.get(5)?;
    let valid_until_str: Option<String> = row.get(6)?;
    let status_json: String = row.get(7)?;
    let content_hash: String = row.get(8)?;
    let revocation_reason: Option<String> = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let updated_at_str: String = row.get(11)?;

    let id = CertificateId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let status: CertStatus = serde_json::from_str(&status_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let issue_date = parse_rfc3339(&issue_date_str, 5)?;
    let valid_until = match valid_until_str {
        Some(s) => Some(parse_rfc3339(&s, 6)?),
        None => None,
    };
    let created_at = parse_rfc3339(&created_at_str, 10)?;
    let updated_at = parse_rfc3339(&updated_at_str, 11)?;

    Ok(Certificate {
        id,
        recipient_id,
        recipient_name,
        program,
        issuing_authority,
        issue_date,
        valid_until,
        status,
        content_hash,
        revocation_reason,
        created_at,
        updated_at,
    })
}

/// Map a SQLite row to a `VerificationEvent`.
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<VerificationEvent> {
    let seq: i64 = row.get(0)?;
    let certificate_id: String = row.get(1)?;
    let timestamp_str: String = row.get(2)?;
    let verifier_identity: Option<String> = row.get(3)?;
    let outcome_json: String = row.get(4)?;

    let outcome: VerifyOutcome = serde_json::from_str(&outcome_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(VerificationEvent {
        seq,
        certificate_id,
        timestamp: parse_rfc3339(&timestamp_str, 2)?,
        verifier_identity,
        outcome,
    })
}

/// Parse an RFC 3339 column value, surfacing a column-tagged error.
fn parse_rfc3339(s: &str, col: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
        })
}
