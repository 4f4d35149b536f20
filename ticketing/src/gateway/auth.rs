//! Authentication gates.
//!
//! Tokens are minted and verified by the user service. The gateway only
//! checks that a bearer credential is present, asks the user service who it
//! belongs to, and enforces roles.

use async_trait::async_trait;
use cinema_core::{Error, Result, UserId};
use cinema_web::Authorization;
use serde::{Deserialize, Serialize};

/// Account role.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, async_graphql::Enum)]
pub enum Role {
    /// Regular customer
    #[default]
    User,
    /// Back-office operator
    Admin,
}

impl Role {
    /// Parses the user service's role label. Unknown labels get the least
    /// privilege.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        if label.trim().eq_ignore_ascii_case("admin") {
            Self::Admin
        } else {
            Self::User
        }
    }
}

/// The verified caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Account id
    pub user_id: UserId,
    /// Display name
    pub username: String,
    /// Login email
    pub email: String,
    /// Role
    pub role: Role,
}

impl Identity {
    /// Whether the caller holds the admin role
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// A freshly issued credential.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthSession {
    /// Bearer token
    pub token: String,
    /// Account it belongs to
    pub user: Identity,
}

/// The user collaborator.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` when the account is rejected, availability errors when the
    /// service cannot be reached.
    async fn register(&self, username: &str, email: &str, password: &str) -> Result<AuthSession>;

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// `BAD_INPUT` for wrong credentials, availability errors otherwise.
    async fn login(&self, email: &str, password: &str) -> Result<AuthSession>;

    /// Resolves the account behind an `Authorization` header value.
    ///
    /// # Errors
    ///
    /// `INVALID_TOKEN` when the credential is rejected.
    async fn verify(&self, authorization: &str) -> Result<Identity>;

    /// Lists accounts; the user service checks the forwarded header too.
    ///
    /// # Errors
    ///
    /// Propagates the user service's error.
    async fn users(&self, authorization: &str) -> Result<Vec<Identity>>;
}

/// Resolves the caller or fails.
///
/// # Errors
///
/// - `AUTHENTICATION_REQUIRED` without a bearer credential
/// - `INVALID_TOKEN` when the user service rejects it
/// - availability errors when the user service cannot answer
pub async fn require_auth(
    directory: &dyn UserDirectory,
    authorization: &Authorization,
) -> Result<Identity> {
    let header = authorization
        .header_value()
        .filter(|value| !value.trim().is_empty())
        .ok_or(Error::AuthenticationRequired)?;
    if authorization.bearer_token().is_none() {
        return Err(Error::InvalidToken);
    }

    match directory.verify(header).await {
        Ok(identity) => Ok(identity),
        Err(err) if err.is_availability() || matches!(err, Error::Internal(_)) => Err(err),
        Err(err) => {
            tracing::debug!(error = %err, "Token rejected by user service");
            Err(Error::InvalidToken)
        }
    }
}

/// Fails unless the caller is an admin.
///
/// # Errors
///
/// `FORBIDDEN` for non-admins.
pub fn require_admin(identity: &Identity) -> Result<()> {
    if identity.is_admin() {
        Ok(())
    } else {
        Err(Error::Forbidden("admin role required".into()))
    }
}
