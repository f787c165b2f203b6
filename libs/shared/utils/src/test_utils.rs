use std::sync::Arc;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use base64::{Engine as _, engine::general_purpose};
use serde_json::json;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::{AuthContext, Role, User};

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn with_supabase_url(url: &str) -> Self {
        Self {
            supabase_url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            database_url: String::new(),
            database_max_connections: 1,
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            server_port: 0,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

impl TestUser {
    pub fn new(email: &str, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
        }
    }

    pub fn client(email: &str) -> Self {
        Self::new(email, Role::User)
    }

    pub fn counselor(email: &str) -> Self {
        Self::new(email, Role::Counselor)
    }

    pub fn admin(email: &str) -> Self {
        Self::new(email, Role::Admin)
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.id,
            email: Some(self.email.clone()),
            role: self.role,
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn context(&self) -> AuthContext {
        AuthContext {
            user_id: self.id,
            role: self.role,
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": user.id,
            "email": user.email,
            "role": user.role.to_string().to_lowercase(),
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn evidence_record_response(target_type: &str, target_id: Uuid, summary: &str) -> serde_json::Value {
        json!({
            "id": Uuid::new_v4(),
            "target_type": target_type,
            "target_id": target_id,
            "summary": summary,
            "status": "PENDING",
            "created_at": "2024-01-01T00:00:00Z"
        })
    }

    pub fn error_response(message: &str, code: &str) -> serde_json::Value {
        json!({
            "message": message,
            "code": code
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::validate_token;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert!(app_config.is_configured());
        assert!(!app_config.is_database_configured());
    }

    #[test]
    fn test_token_round_trips_through_validation() {
        let config = TestConfig::default();
        let counselor = TestUser::counselor("counselor@example.com");
        let token = JwtTestUtils::create_test_token(&counselor, &config.jwt_secret, Some(1));

        let user = validate_token(&token, &config.jwt_secret).expect("token should validate");
        assert_eq!(user.id, counselor.id);
        assert_eq!(user.role, Role::Counselor);
        assert_eq!(user.email.as_deref(), Some("counselor@example.com"));
    }

    #[test]
    fn test_rejects_expired_and_forged_tokens() {
        let config = TestConfig::default();
        let client = TestUser::client("client@example.com");

        let expired = JwtTestUtils::create_expired_token(&client, &config.jwt_secret);
        assert_eq!(validate_token(&expired, &config.jwt_secret).unwrap_err(), "Token expired");

        let forged = JwtTestUtils::create_invalid_signature_token(&client);
        assert_eq!(validate_token(&forged, &config.jwt_secret).unwrap_err(), "Invalid token signature");

        assert_eq!(
            validate_token("invalid.token", &config.jwt_secret).unwrap_err(),
            "Invalid token format"
        );
    }
}
