//! Client error types.

use thiserror::Error;

/// Errors returned by [`LocationClient`] handle methods.
///
/// [`LocationClient`]: crate::LocationClient
#[derive(Debug, Error)]
pub enum ClientError {
    /// The driver task is gone, after [`close`] or a crash. The handle
    /// can no longer do anything.
    ///
    /// [`close`]: crate::LocationClient::close
    #[error("client driver is no longer running")]
    Stopped,
}
