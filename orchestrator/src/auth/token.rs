//! Session token signing
//!
//! Tokens are HS256 JWTs signed with a secret read once at startup from the
//! cookie secret file.

use std::path::Path;

use anyhow::{Context, Result};
use base64::Engine;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::AuthError;

const SECRET_BYTES: usize = 32;
const MIN_SECRET_BYTES: usize = 16;

/// JWT claims for an admitted user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identity)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Is admin user
    #[serde(default)]
    pub admin: bool,
}

/// Signed token returned by a successful login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionToken {
    pub token: String,
    pub expires_in: u64,
}

/// Signs and verifies session tokens
pub struct TokenSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiration_secs: u64,
}

impl TokenSigner {
    pub fn new(secret: &[u8], expiration_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiration_secs,
        }
    }

    pub fn issue(&self, identity: &str, is_admin: bool) -> Result<SessionToken, AuthError> {
        let now = chrono::Utc::now().timestamp() as u64;
        let claims = Claims {
            sub: identity.to_string(),
            exp: now + self.expiration_secs,
            iat: now,
            admin: is_admin,
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("Failed to sign token: {}", e)))?;

        Ok(SessionToken {
            token,
            expires_in: self.expiration_secs,
        })
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                debug!(error = %e, "JWT validation failed");
                AuthError::InvalidCredentials
            })
    }
}

/// Read the signing secret, generating and saving a new one if the file is
/// missing
pub fn load_or_create_secret(path: &Path) -> Result<Vec<u8>> {
    if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read secret file {}", path.display()))?;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(content.trim())
            .with_context(|| format!("Secret file {} is not valid base64", path.display()))?;
        if secret.len() < MIN_SECRET_BYTES {
            anyhow::bail!("Signing secret must be at least {} bytes", MIN_SECRET_BYTES);
        }
        info!(path = %path.display(), "Signing secret loaded");
        return Ok(secret);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create secret directory")?;
    }

    let mut secret = vec![0u8; SECRET_BYTES];
    rand::thread_rng().fill_bytes(&mut secret);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&secret);
    std::fs::write(path, encoded)
        .with_context(|| format!("Failed to write secret file {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .context("Failed to restrict secret file permissions")?;
    }

    info!(path = %path.display(), "Generated new signing secret");
    Ok(secret)
}
