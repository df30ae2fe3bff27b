//! ContentsClient factory from gvault config + session

use std::time::Duration;

use gvault_core::{GvaultConfig, Session, VaultError, VaultResult};
use secrecy::{ExposeSecret, SecretString};

use crate::contents::{ClientSettings, ContentsClient};

/// Build a content API client for the configured repository.
///
/// If `repo.enforce_tls` is true and the API URL uses HTTP, this returns an
/// error. Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_client(config: &GvaultConfig, session: &Session) -> VaultResult<ContentsClient> {
    let repo = &config.repo;
    if repo.owner.trim().is_empty() || repo.name.trim().is_empty() {
        return Err(VaultError::Config(
            "repo.owner and repo.name must both be set".into(),
        ));
    }
    if repo.branch.trim().is_empty() {
        return Err(VaultError::Config("repo.branch must not be empty".into()));
    }
    if session.bearer_token().expose_secret().trim().is_empty() {
        return Err(VaultError::Authorization("session has an empty bearer token".into()));
    }

    if repo.api_url.starts_with("http://") {
        if repo.enforce_tls {
            return Err(VaultError::Config(format!(
                "API URL uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set repo.enforce_tls = false for local development.",
                repo.api_url
            )));
        }
        tracing::warn!(
            api_url = %repo.api_url,
            "API URL uses plaintext HTTP; the bearer token is transmitted unencrypted. \
             Set repo.enforce_tls = true and use HTTPS in production."
        );
    }

    let settings = ClientSettings {
        api_url: repo.api_url.clone(),
        owner: repo.owner.clone(),
        repo: repo.name.clone(),
        branch: repo.branch.clone(),
        timeout: Duration::from_secs(config.storage.request_timeout_secs),
        max_object_bytes: config.storage.max_object_bytes,
        user_agent: config.storage.user_agent.clone(),
    };

    tracing::debug!(
        owner = %settings.owner,
        repo = %settings.repo,
        branch = %settings.branch,
        user_type = %session.user_type,
        "building content API client"
    );

    ContentsClient::new(
        settings,
        SecretString::from(session.bearer_token().expose_secret().to_owned()),
    )
}
