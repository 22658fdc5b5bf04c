use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use runway_common::RunwayError;
use serde::{Deserialize, Serialize};

/// Claims carried by a user session token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_guest: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

/// Verifies user tokens and worker secrets. The two secrets are independent.
pub struct Authenticator {
    decoding_key: DecodingKey,
    validation: Validation,
    worker_secret: String,
}

impl Authenticator {
    pub fn new(jwt_secret: &str, worker_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // `exp` is checked when present but not required
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
            worker_secret: worker_secret.to_string(),
        }
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, RunwayError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            RunwayError::Unauthorized
        })?;
        if data.claims.user_id.is_empty() {
            return Err(RunwayError::Unauthorized);
        }
        Ok(data.claims)
    }

    pub fn verify_worker_secret(&self, secret: &str) -> bool {
        constant_time_eq(secret.as_bytes(), self.worker_secret.as_bytes())
    }
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, claims: &Claims) -> String {
    use jsonwebtoken::{encode, EncodingKey, Header};
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}
