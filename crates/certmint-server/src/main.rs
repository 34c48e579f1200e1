// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Certmint — Certificate Issuance and Verification Service
//
// Entry point. Initialises logging and backend services, bootstraps the
// admin credential if one is configured, and runs the API server until
// interrupted.

mod auth;
mod data_dir;
mod http;
mod services;

use auth::Role;
use http::ApiServer;
use services::CertServices;

/// Environment variable that seeds the admin bearer token on startup.
///
/// Registration is idempotent, so passing the same token on every start
/// is harmless.
const ADMIN_TOKEN_ENV: &str = "CERTMINT_ADMIN_TOKEN";

#[tokio::main]
async fn main() -> std::process::ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Certmint starting");

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> certmint_core::error::Result<()> {
    let svc = match CertServices::init() {
        Ok(s) => {
            tracing::info!("backend services initialised");
            s
        }
        Err(e) => {
            tracing::error!(error = %e, "persistent storage failed — using in-memory fallback");
            CertServices::in_memory()?
        }
    };

    if let Ok(token) = std::env::var(ADMIN_TOKEN_ENV)
        && !token.trim().is_empty()
    {
        svc.add_token(token.trim(), Role::Admin, "bootstrap admin")?;
        tracing::info!("admin credential registered from {ADMIN_TOKEN_ENV}");
    }

    let mut server = ApiServer::new(Some(svc.config().server_port));
    server.start(svc).await?;

    tokio::signal::ctrl_c()
        .await
        .map_err(certmint_core::error::CertmintError::Io)?;
    tracing::info!("interrupt received, shutting down");

    server.stop().await?;
    Ok(())
}
