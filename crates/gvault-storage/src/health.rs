//! Repository health check

use gvault_core::{VaultError, VaultResult};
use tracing::{info, warn};

use crate::contents::{ContentsClient, RepoInfo};

/// Verify the repository is reachable with the current token, and that the
/// token can write to it.
pub async fn verify_repository(client: &ContentsClient) -> VaultResult<RepoInfo> {
    let info = client.repository().await?;

    if let Some(perms) = &info.permissions {
        if !perms.push {
            return Err(VaultError::Authorization(format!(
                "token has no write access to {}",
                info.full_name
            )));
        }
    } else {
        warn!(repo = %info.full_name, "host did not report permissions; write access unverified");
    }

    if !info.default_branch.is_empty() && info.default_branch != client.branch() {
        info!(
            repo = %info.full_name,
            default_branch = %info.default_branch,
            branch = %client.branch(),
            "using a non-default branch"
        );
    }
    Ok(info)
}

/// Returns true if the repository is reachable and writable (non-panicking)
pub async fn is_reachable(client: &ContentsClient) -> bool {
    verify_repository(client).await.is_ok()
}
