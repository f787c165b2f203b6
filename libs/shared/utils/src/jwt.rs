use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use chrono::{Utc, TimeZone};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::{JwtClaims, JwtHeader, Role, User};

type HmacSha256 = Hmac<Sha256>;

/// Validate an HS256 bearer token and resolve the acting user.
pub fn validate_token(token: &str, jwt_secret: &str) -> Result<User, String> {
    if jwt_secret.is_empty() {
        return Err("JWT secret is not set".to_string());
    }

    let mut parts = token.split('.');
    let (header_b64, claims_b64, signature_b64) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(header), Some(claims), Some(signature), None) => (header, claims, signature),
        _ => return Err("Invalid token format".to_string()),
    };

    let header: JwtHeader = URL_SAFE_NO_PAD
        .decode(header_b64)
        .ok()
        .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        .ok_or_else(|| "Invalid token header".to_string())?;
    if header.alg != "HS256" {
        debug!("Rejected token signed with {}", header.alg);
        return Err("Unsupported token algorithm".to_string());
    }

    let signature = URL_SAFE_NO_PAD.decode(signature_b64).map_err(|e| {
        debug!("Failed to decode signature: {}", e);
        "Invalid signature encoding".to_string()
    })?;

    let mut mac = HmacSha256::new_from_slice(jwt_secret.as_bytes())
        .map_err(|_| "Failed to create HMAC".to_string())?;
    mac.update(format!("{}.{}", header_b64, claims_b64).as_bytes());

    if mac.verify_slice(&signature).is_err() {
        debug!("Token signature verification failed");
        return Err("Invalid token signature".to_string());
    }

    let claims_json = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| "Invalid claims encoding".to_string())?;

    let claims: JwtClaims = serde_json::from_str(&claims_json).map_err(|e| {
        debug!("Failed to parse claims: {}", e);
        "Invalid claims format".to_string()
    })?;

    if let Some(exp) = claims.exp {
        let now = Utc::now().timestamp() as u64;
        if exp < now {
            debug!("Token expired at {} (now: {})", exp, now);
            return Err("Token expired".to_string());
        }
    }

    let id = Uuid::parse_str(&claims.sub).map_err(|_| {
        debug!("Token subject is not a UUID: {}", claims.sub);
        "Invalid token subject".to_string()
    })?;

    let role = resolve_role(&claims)?;

    let created_at = claims.iat
        .and_then(|timestamp| Utc.timestamp_opt(timestamp as i64, 0).single());

    let user = User {
        id,
        email: claims.email,
        role,
        metadata: claims.user_metadata,
        created_at,
    };

    debug!("Token validated successfully for user: {} ({})", user.id, user.role);
    Ok(user)
}

/// Application roles live in `app_metadata.role`. The top-level `role` claim
/// usually holds the Postgres role (`authenticated`), which maps to a client.
fn resolve_role(claims: &JwtClaims) -> Result<Role, String> {
    let app_role = claims
        .app_metadata
        .as_ref()
        .and_then(|metadata| metadata.get("role"))
        .and_then(|role| role.as_str());

    match app_role.or(claims.role.as_deref()) {
        None | Some("authenticated") | Some("anon") => Ok(Role::User),
        Some(role) => role.parse::<Role>(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(role: Option<&str>, app_metadata: Option<serde_json::Value>) -> JwtClaims {
        JwtClaims {
            sub: Uuid::new_v4().to_string(),
            exp: None,
            email: None,
            role: role.map(str::to_string),
            app_metadata,
            user_metadata: None,
            aud: Some("authenticated".to_string()),
            iat: None,
        }
    }

    #[test]
    fn test_app_metadata_role_wins_over_postgres_role() {
        let counselor = claims(Some("authenticated"), Some(json!({ "role": "COUNSELOR" })));
        assert_eq!(resolve_role(&counselor), Ok(Role::Counselor));

        let plain = claims(Some("authenticated"), None);
        assert_eq!(resolve_role(&plain), Ok(Role::User));
    }

    #[test]
    fn test_unknown_role_is_rejected() {
        let bogus = claims(Some("superuser"), None);
        assert!(resolve_role(&bogus).is_err());
    }
}
