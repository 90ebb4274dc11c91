//! Bearer tokens for the gate and resident apps.
//!
//! Tokens are HS256 JWTs whose subject is the opaque `usuario_id`. The role
//! travels in the claims for log correlation only; every request resolves
//! the principal again, so a role change applies on the next call.

use axs_core::roles::Role;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 60;

/// Claims carried by an access token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// `usuario_id` of the principal.
    pub sub: String,
    pub rol: String,
    pub exp: i64,
    pub iat: i64,
    /// Token id (UUID v4).
    pub jti: String,
}

/// Signing secret and token lifetime.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    /// Minutes an access token stays valid (default: 60).
    pub access_token_expiry_mins: i64,
}

impl JwtConfig {
    /// Load from environment variables.
    ///
    /// | Env Var                  | Required | Default |
    /// |--------------------------|----------|---------|
    /// | `JWT_SECRET`             | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS` | no       | `60`    |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is missing or empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let access_token_expiry_mins = std::env::var("JWT_ACCESS_EXPIRY_MINS")
            .ok()
            .map(|v| {
                v.parse::<i64>()
                    .expect("JWT_ACCESS_EXPIRY_MINS must be a valid i64")
            })
            .unwrap_or(DEFAULT_ACCESS_EXPIRY_MINS);

        Self {
            secret,
            access_token_expiry_mins,
        }
    }

    /// Token lifetime in seconds, as reported to clients.
    pub fn expires_in_secs(&self) -> i64 {
        self.access_token_expiry_mins * 60
    }

    /// Sign an access token for `usuario_id`.
    pub fn issue_access_token(
        &self,
        usuario_id: &str,
        rol: Role,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let iat = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: usuario_id.to_string(),
            rol: rol.as_str().to_string(),
            exp: iat + self.expires_in_secs(),
            iat,
            jti: Uuid::new_v4().to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Check signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(secret: &str) -> JwtConfig {
        JwtConfig {
            secret: secret.to_string(),
            access_token_expiry_mins: 15,
        }
    }

    #[test]
    fn issued_token_verifies_with_the_same_secret() {
        let jwt = config("test-secret-that-is-long-enough-for-hmac");
        let token = jwt.issue_access_token("USR-abc", Role::Guardia).unwrap();

        let claims = jwt.verify(&token).unwrap();
        assert_eq!(claims.sub, "USR-abc");
        assert_eq!(claims.rol, "GUARDIA");
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert!(!claims.jti.is_empty());
    }

    #[test]
    fn expired_token_is_rejected() {
        let jwt = config("test-secret-that-is-long-enough-for-hmac");
        // Past the default 60 s leeway.
        let now = chrono::Utc::now().timestamp();
        let stale = Claims {
            sub: "USR-1".to_string(),
            rol: "RESIDENTE".to_string(),
            exp: now - 300,
            iat: now - 1200,
            jti: "stale".to_string(),
        };
        let token = encode(
            &Header::default(),
            &stale,
            &EncodingKey::from_secret(jwt.secret.as_bytes()),
        )
        .unwrap();

        assert!(jwt.verify(&token).is_err());
    }

    #[test]
    fn token_from_another_secret_is_rejected() {
        let token = config("secret-a")
            .issue_access_token("USR-1", Role::MspAdmin)
            .unwrap();
        assert!(config("secret-b").verify(&token).is_err());
    }
}
