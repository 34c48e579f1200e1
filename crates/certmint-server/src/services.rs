// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — initialises the backend subsystems and provides
// the methods the HTTP handlers call.
//
// The record store is internally synchronised and shared via `Arc`; the
// credential store (rusqlite, `Send` but not `Sync`) is wrapped in
// `Arc<Mutex<>>`. Mutex contention is minimal because all operations are
// fast (sub-millisecond SQLite queries).

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tracing::info;

use certmint_core::config::ServiceConfig;
use certmint_core::error::Result;
use certmint_core::qr;
use certmint_core::types::{
    Certificate, CertificateId, IssueRequest, Verification, VerificationEvent, VerifyOutcome,
};
use certmint_engine::{IssuanceService, RevocationManager, VerificationEngine};
use certmint_store::CertificateStore;

use crate::auth::{Credential, CredentialStore, Role};
use crate::data_dir;

/// Shared service handles, cheaply cloneable into connection tasks.
#[derive(Clone)]
pub struct CertServices {
    store: Arc<CertificateStore>,
    issuance: Arc<IssuanceService>,
    verification: Arc<VerificationEngine>,
    revocation: Arc<RevocationManager>,
    credentials: Arc<Mutex<CredentialStore>>,
    config: ServiceConfig,
}

impl CertServices {
    /// Initialise all services against the on-disk databases. Call once at
    /// startup.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        info!(path = %dir.display(), "initialising services");

        let config = load_config(&dir).unwrap_or_default();

        let store = Arc::new(CertificateStore::open(dir.join("certificates.db"))?);
        let credentials = CredentialStore::open(dir.join("credentials.db"))?;

        info!("services initialised");
        Ok(Self::assemble(store, credentials, config))
    }

    /// Fully in-memory services (tests).
    pub fn in_memory() -> Result<Self> {
        let store = Arc::new(CertificateStore::open_in_memory()?);
        let credentials = CredentialStore::open_in_memory()?;
        Ok(Self::assemble(store, credentials, ServiceConfig::default()))
    }

    fn assemble(
        store: Arc<CertificateStore>,
        credentials: CredentialStore,
        config: ServiceConfig,
    ) -> Self {
        Self {
            issuance: Arc::new(IssuanceService::new(Arc::clone(&store), &config)),
            verification: Arc::new(VerificationEngine::new(Arc::clone(&store))),
            revocation: Arc::new(RevocationManager::new(Arc::clone(&store))),
            credentials: Arc::new(Mutex::new(credentials)),
            store,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // -- Issuance ------------------------------------------------------------

    pub fn issue(&self, request: &IssueRequest) -> Result<Certificate> {
        self.issuance.issue(request)
    }

    pub fn publish(&self, id: &str) -> Result<Certificate> {
        self.issuance.publish(&CertificateId::parse(id)?)
    }

    // -- Verification --------------------------------------------------------

    /// Verify a raw id string as presented by a caller.
    ///
    /// Accepts a bare certificate id or a versioned QR payload. A string
    /// that parses as neither is reported as `not_found` — and still lands
    /// in the ledger, because garbage probes are part of the fraud signal.
    pub fn verify(
        &self,
        raw_id: &str,
        name_hint: Option<&str>,
        verifier_identity: Option<&str>,
    ) -> Result<Verification> {
        match qr::parse(raw_id) {
            Ok(id) => self.verification.verify(&id, name_hint, verifier_identity),
            Err(_) => {
                let event = VerificationEvent::new(
                    raw_id,
                    VerifyOutcome::NotFound,
                    verifier_identity.map(str::to_owned),
                );
                self.store.append_miss_event(&event)?;
                Ok(Verification::miss(VerifyOutcome::NotFound))
            }
        }
    }

    // -- Revocation ----------------------------------------------------------

    pub fn revoke(&self, id: &str, reason: &str) -> Result<Certificate> {
        self.revocation.revoke(&CertificateId::parse(id)?, reason)
    }

    // -- Queries -------------------------------------------------------------

    pub fn events_for(&self, id: &str) -> Result<Vec<VerificationEvent>> {
        self.store.events_for(id)
    }

    pub fn list_all(&self) -> Result<Vec<Certificate>> {
        self.store.list_all()
    }

    pub fn list_by_recipient(&self, recipient_id: &str) -> Result<Vec<Certificate>> {
        self.store.list_by_recipient(recipient_id)
    }

    pub fn verification_count(&self, id: &str) -> Result<u64> {
        self.store.verification_count(id)
    }

    // -- Auth ----------------------------------------------------------------

    pub fn authenticate(&self, token: &str) -> Result<Option<Credential>> {
        let creds = self.credentials.lock().expect("credential lock poisoned");
        creds.authenticate(token)
    }

    pub fn add_token(&self, token: &str, role: Role, label: &str) -> Result<()> {
        let creds = self.credentials.lock().expect("credential lock poisoned");
        creds.add_token(token, role, label)
    }
}

// -- Config file persistence -------------------------------------------------

const CONFIG_FILE: &str = "config.json";

fn load_config(data_dir: &std::path::Path) -> Option<ServiceConfig> {
    let path = data_dir.join(CONFIG_FILE);
    let data = std::fs::read_to_string(&path).ok()?;
    serde_json::from_str(&data).ok()
}

/// Persist the config next to the databases.
pub fn persist_config(data_dir: &PathBuf, config: &ServiceConfig) -> Result<()> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(())
}
