//! Login verification hook.
//!
//! Convoy doesn't store accounts or passwords — that's the consuming
//! application's job (or its auth provider's). The gateway only needs one
//! question answered at login time: "are these credentials valid, and what
//! is this account's display name?". The [`AccountStore`] trait is that
//! question.
//!
//! Implementations range from a hashed-password database lookup in
//! production to a literal `HashMap` in tests and demos. The gateway calls
//! the trait and never learns anything about how verification happened.

/// What a successful credential check returns.
///
/// `display_name` is the account's stored username; on authentication it
/// replaces the connection's placeholder name on the shared roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountProfile {
    pub email: String,
    pub display_name: String,
}

/// Errors an [`AccountStore`] may return.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    /// Wrong email or wrong password — deliberately indistinguishable,
    /// so a failed login can't reveal which accounts exist.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// The account backend itself failed (database down, upstream
    /// timeout). Not a verdict on the credentials.
    #[error("account backend unavailable: {0}")]
    Unavailable(String),
}

/// Validates login credentials and returns the account's profile.
///
/// # Trait bounds
///
/// - `Send + Sync` — the store is shared with the gateway task and may be
///   called from any runtime thread.
/// - `'static` — it must not borrow temporary data; it lives as long as
///   the server.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
///
/// use convoy_session::{AccountError, AccountProfile, AccountStore};
///
/// /// Fixed credential list. Fine for demos and tests; production
/// /// implementations verify against hashed storage.
/// struct StaticAccounts {
///     by_email: HashMap<String, (String, String)>, // email → (password, name)
/// }
///
/// impl AccountStore for StaticAccounts {
///     async fn verify_credentials(
///         &self,
///         email: &str,
///         password: &str,
///     ) -> Result<AccountProfile, AccountError> {
///         match self.by_email.get(email) {
///             Some((expected, name)) if expected == password => {
///                 Ok(AccountProfile {
///                     email: email.to_owned(),
///                     display_name: name.clone(),
///                 })
///             }
///             _ => Err(AccountError::InvalidCredentials),
///         }
///     }
/// }
/// ```
pub trait AccountStore: Send + Sync + 'static {
    /// Checks `email`/`password` and returns the account profile.
    ///
    /// # Returns
    /// - `Ok(AccountProfile)` — credentials are valid
    /// - `Err(AccountError::InvalidCredentials)` — they are not
    /// - `Err(AccountError::Unavailable)` — verification couldn't run
    fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> impl std::future::Future<Output = Result<AccountProfile, AccountError>> + Send;
}
