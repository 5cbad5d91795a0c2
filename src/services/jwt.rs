use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::models::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    Expired,
    Invalid,
}

pub struct JwtService;

impl JwtService {
    pub fn generate_token(account_id: &ObjectId, role: Role) -> Result<String, jsonwebtoken::errors::Error> {
        Self::generate_with(account_id, role, &crate::config::Config::jwt_secret(), crate::config::Config::jwt_expiry())
    }

    pub fn generate_with(
        account_id: &ObjectId,
        role: Role,
        secret: &str,
        expiry_secs: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();

        let claims = Claims {
            sub: account_id.to_hex(),
            role,
            exp: now + expiry_secs,
            iat: now,
        };

        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
    }

    pub fn verify_token(token: &str) -> Result<Claims, TokenError> {
        Self::verify_with(token, &crate::config::Config::jwt_secret())
    }

    pub fn verify_with(token: &str, secret: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn token_round_trip_keeps_subject_and_role() {
        let id = ObjectId::new();
        let token = JwtService::generate_with(&id, Role::Provider, SECRET, 3600).unwrap();
        let claims = JwtService::verify_with(&token, SECRET).unwrap();
        assert_eq!(claims.sub, id.to_hex());
        assert_eq!(claims.role, Role::Provider);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn expired_and_foreign_tokens_are_distinguished() {
        let id = ObjectId::new();
        let expired = JwtService::generate_with(&id, Role::Customer, SECRET, -3600).unwrap();
        assert_eq!(JwtService::verify_with(&expired, SECRET).unwrap_err(), TokenError::Expired);

        let foreign = JwtService::generate_with(&id, Role::Customer, "other", 3600).unwrap();
        assert_eq!(JwtService::verify_with(&foreign, SECRET).unwrap_err(), TokenError::Invalid);
        assert_eq!(JwtService::verify_with("garbage", SECRET).unwrap_err(), TokenError::Invalid);
    }
}
