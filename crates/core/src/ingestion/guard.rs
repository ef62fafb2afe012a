//! Shared-secret verification for inbound notifications

use calmirror_common::SecretString;
use calmirror_domain::WebhookAuthError;

/// Checks the channel token echoed by the provider
#[derive(Debug, Clone)]
pub struct SecretGuard {
    secret: SecretString,
}

impl SecretGuard {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Constant-time comparison of the presented token
    ///
    /// # Errors
    /// `MissingToken` when no token was sent, `Mismatch` otherwise.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), WebhookAuthError> {
        match presented {
            None => Err(WebhookAuthError::MissingToken),
            Some(token) if self.secret.matches(token) => Ok(()),
            Some(_) => Err(WebhookAuthError::Mismatch),
        }
    }
}
