//! Session token signing and verification.
//!
//! Tokens are standard JWTs carrying the project-scoped role claim. The
//! signer holds a single immutable key for the process lifetime; the
//! verifier may hold a second, older key so deployments can rotate keys
//! through a two-key window without invalidating live sessions.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Role;

/// Issuer embedded in, and required of, every session token.
pub const ISSUER: &str = "PipeCD";

/// Cookie key carrying the signed session token.
pub const SIGNED_TOKEN_KEY: &str = "token";

/// Supported signing algorithm families.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningMethod {
    HS256,
    HS384,
    HS512,
    RS256,
    RS384,
    RS512,
}

impl SigningMethod {
    fn algorithm(self) -> Algorithm {
        match self {
            SigningMethod::HS256 => Algorithm::HS256,
            SigningMethod::HS384 => Algorithm::HS384,
            SigningMethod::HS512 => Algorithm::HS512,
            SigningMethod::RS256 => Algorithm::RS256,
            SigningMethod::RS384 => Algorithm::RS384,
            SigningMethod::RS512 => Algorithm::RS512,
        }
    }

    fn is_rsa(self) -> bool {
        matches!(
            self,
            SigningMethod::RS256 | SigningMethod::RS384 | SigningMethod::RS512
        )
    }
}

impl FromStr for SigningMethod {
    type Err = JwtError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "HS256" => Ok(SigningMethod::HS256),
            "HS384" => Ok(SigningMethod::HS384),
            "HS512" => Ok(SigningMethod::HS512),
            "RS256" => Ok(SigningMethod::RS256),
            "RS384" => Ok(SigningMethod::RS384),
            "RS512" => Ok(SigningMethod::RS512),
            _ => Err(JwtError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl fmt::Display for SigningMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SigningMethod::HS256 => "HS256",
            SigningMethod::HS384 => "HS384",
            SigningMethod::HS512 => "HS512",
            SigningMethod::RS256 => "RS256",
            SigningMethod::RS384 => "RS384",
            SigningMethod::RS512 => "RS512",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("unsupported signing method: {0}")]
    UnsupportedMethod(String),
    #[error("failed to read key file {path}: {source}")]
    KeyFile {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid signing key: {0}")]
    InvalidKey(jsonwebtoken::errors::Error),
    #[error("unexpected signing method")]
    MethodMismatch,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("token has expired")]
    Expired,
    #[error("token is not valid yet")]
    Immature,
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    #[error("invalid signature")]
    InvalidSignature,
    #[error("unable to parse token: {0}")]
    Parse(String),
    #[error("failed to sign token: {0}")]
    Sign(String),
}

/// Claims carried by a session token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    #[serde(rename = "avatarUrl", default)]
    pub avatar_url: String,
    pub role: Role,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Build claims for a freshly authenticated user: `iat = nbf = now`,
    /// `exp = now + ttl`.
    #[must_use]
    pub fn new(subject: &str, avatar_url: &str, role: Role, ttl: Duration) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: subject.to_string(),
            avatar_url: avatar_url.to_string(),
            role,
            iss: ISSUER.to_string(),
            iat: now,
            nbf: now,
            exp: now + i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

/// Signs session claims under a fixed method and key.
pub struct Signer {
    header: Header,
    key: EncodingKey,
}

impl Signer {
    /// Load the signing key from a file. HS* methods treat the file bytes as
    /// the shared secret; RS* methods parse a PEM-encoded RSA private key.
    ///
    /// # Errors
    /// Returns an error when the file is unreadable or the key is invalid.
    pub fn from_key_file(method: SigningMethod, path: impl AsRef<Path>) -> Result<Self, JwtError> {
        let data = read_key_file(path.as_ref())?;
        Self::from_key_data(method, &data)
    }

    /// Build a signer from in-memory key material.
    ///
    /// # Errors
    /// Returns an error when an RS* key is not valid PEM.
    pub fn from_key_data(method: SigningMethod, data: &[u8]) -> Result<Self, JwtError> {
        let key = if method.is_rsa() {
            EncodingKey::from_rsa_pem(data).map_err(JwtError::InvalidKey)?
        } else {
            EncodingKey::from_secret(data)
        };
        Ok(Self {
            header: Header::new(method.algorithm()),
            key,
        })
    }

    /// Sign the claims into a compact JWT.
    ///
    /// # Errors
    /// Returns an error when encoding fails (e.g. key/method mismatch).
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, JwtError> {
        encode(&self.header, claims, &self.key).map_err(|err| JwtError::Sign(err.to_string()))
    }
}

/// Verifies session tokens under a fixed method, trying the current key and
/// then the previous key when one is configured.
pub struct Verifier {
    keys: Vec<DecodingKey>,
    validation: Validation,
    method: SigningMethod,
}

impl Verifier {
    /// Load the verification key from a file. HS* methods treat the file
    /// bytes as the shared secret; RS* methods parse a PEM-encoded RSA
    /// public key.
    ///
    /// # Errors
    /// Returns an error when the file is unreadable or the key is invalid.
    pub fn from_key_file(method: SigningMethod, path: impl AsRef<Path>) -> Result<Self, JwtError> {
        let data = read_key_file(path.as_ref())?;
        Self::from_key_data(method, &data)
    }

    /// Build a verifier from in-memory key material.
    ///
    /// # Errors
    /// Returns an error when an RS* key is not valid PEM.
    pub fn from_key_data(method: SigningMethod, data: &[u8]) -> Result<Self, JwtError> {
        let mut validation = Validation::new(method.algorithm());
        validation.set_issuer(&[ISSUER]);
        validation.validate_nbf = true;
        validation.leeway = 0;
        validation.required_spec_claims =
            ["exp", "nbf", "iss"].iter().map(ToString::to_string).collect();

        Ok(Self {
            keys: vec![decoding_key(method, data)?],
            validation,
            method,
        })
    }

    /// Add the previous signing key so tokens issued before a rotation keep
    /// verifying until they expire.
    ///
    /// # Errors
    /// Returns an error when the file is unreadable or the key is invalid.
    pub fn with_old_key_file(mut self, path: impl AsRef<Path>) -> Result<Self, JwtError> {
        let data = read_key_file(path.as_ref())?;
        self.keys.push(decoding_key(self.method, &data)?);
        Ok(self)
    }

    /// Verify a token and return its claims. No claims are returned on any
    /// failure.
    ///
    /// # Errors
    /// Rejects parse failures, signature mismatches, unexpected signing
    /// methods, a wrong issuer, missing temporal claims, and expired tokens.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let mut last_err = JwtError::InvalidSignature;
        for key in &self.keys {
            match decode::<SessionClaims>(token, key, &self.validation) {
                Ok(data) => return Ok(data.claims),
                Err(err) => last_err = map_decode_error(&err),
            }
        }
        Err(last_err)
    }
}

fn decoding_key(method: SigningMethod, data: &[u8]) -> Result<DecodingKey, JwtError> {
    if method.is_rsa() {
        DecodingKey::from_rsa_pem(data).map_err(JwtError::InvalidKey)
    } else {
        Ok(DecodingKey::from_secret(data))
    }
}

fn read_key_file(path: &Path) -> Result<Vec<u8>, JwtError> {
    fs::read(path).map_err(|source| JwtError::KeyFile {
        path: path.display().to_string(),
        source,
    })
}

fn map_decode_error(err: &jsonwebtoken::errors::Error) -> JwtError {
    use jsonwebtoken::errors::ErrorKind;

    match err.kind() {
        ErrorKind::ExpiredSignature => JwtError::Expired,
        ErrorKind::ImmatureSignature => JwtError::Immature,
        ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => JwtError::MethodMismatch,
        ErrorKind::InvalidSignature => JwtError::InvalidSignature,
        ErrorKind::MissingRequiredClaim(claim) => JwtError::MissingClaim(claim.clone()),
        _ => JwtError::Parse(err.to_string()),
    }
}
