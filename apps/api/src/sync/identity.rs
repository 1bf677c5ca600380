use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, DiaryBackend};
use crate::models::user::RemoteUser;
use crate::store::{LocalStore, USERNAME_KEY};

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("no username is configured")]
    MissingUsername,

    #[error("could not resolve remote user: {0}")]
    Resolution(#[source] BackendError),

    #[error("remote user id '{0}' is not a UUID")]
    MalformedId(String),
}

/// Username from the local store, falling back to the configured default.
pub fn resolve_username(
    store: &dyn LocalStore,
    fallback: Option<&str>,
) -> Result<String, IdentityError> {
    store
        .get(USERNAME_KEY)
        .filter(|name| !name.trim().is_empty())
        .or_else(|| {
            fallback
                .filter(|name| !name.trim().is_empty())
                .map(str::to_string)
        })
        .ok_or(IdentityError::MissingUsername)
}

/// Strict hyphenated UUID shape (any version). Remote ids are foreign keys,
/// so braced or compact forms are rejected.
pub fn parse_user_id(id: &str) -> Option<Uuid> {
    if id.len() != 36 {
        return None;
    }
    Uuid::parse_str(id).ok()
}

/// Resolves the remote user, reusing `cached` when it belongs to `username`.
/// A malformed id earns exactly one fresh lookup before giving up.
pub async fn resolve_user(
    backend: &dyn DiaryBackend,
    username: &str,
    cached: Option<RemoteUser>,
) -> Result<(RemoteUser, Uuid), IdentityError> {
    let user = match cached.filter(|u| u.line_username == username) {
        Some(user) => user,
        None => lookup(backend, username).await?,
    };
    if let Some(id) = parse_user_id(&user.id) {
        return Ok((user, id));
    }

    warn!("Remote user id '{}' is malformed, resolving again", user.id);
    let user = lookup(backend, username).await?;
    match parse_user_id(&user.id) {
        Some(id) => Ok((user, id)),
        None => Err(IdentityError::MalformedId(user.id)),
    }
}

async fn lookup(backend: &dyn DiaryBackend, username: &str) -> Result<RemoteUser, IdentityError> {
    let user = backend
        .find_or_create_user(username)
        .await
        .map_err(IdentityError::Resolution)?;
    info!("Resolved remote user '{}' (id {})", user.line_username, user.id);
    Ok(user)
}
