use std::time::Duration;

use axum::http::HeaderMap;
use platen_core::error::AuthError;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::{AuthSubrequest, Config};

/// Who is on the other end of a request or connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User { id: Uuid, is_admin: bool },
    Printer { id: Uuid, serial_number: String },
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::User { is_admin: true, .. })
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            Principal::User { id, .. } => Some(*id),
            Principal::Printer { .. } => None,
        }
    }

    pub fn printer_id(&self) -> Option<Uuid> {
        match self {
            Principal::Printer { id, .. } => Some(*id),
            Principal::User { .. } => None,
        }
    }
}

/// Identity document carried by the trusted gateway header or as JWT claims.
#[derive(Debug, Deserialize)]
struct IdentityDoc {
    #[serde(rename = "type")]
    kind: String,
    id: Uuid,
    #[serde(default)]
    is_admin: Option<bool>,
    #[serde(default)]
    serial_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(rename = "type")]
    kind: String,
    id: Uuid,
    #[serde(default)]
    is_admin: Option<bool>,
    #[serde(default)]
    serial_number: Option<String>,
    #[serde(default)]
    iat: Option<u64>,
    #[allow(dead_code)]
    exp: u64,
}

fn principal_from_parts(
    kind: &str,
    id: Uuid,
    is_admin: Option<bool>,
    serial_number: Option<String>,
) -> Result<Principal, AuthError> {
    match kind {
        "user" => Ok(Principal::User {
            id,
            is_admin: is_admin.unwrap_or(false),
        }),
        "printer" => Ok(Principal::Printer {
            id,
            serial_number: serial_number
                .ok_or_else(|| AuthError::InvalidIdentity("printer identity without serial_number".to_string()))?,
        }),
        other => Err(AuthError::InvalidIdentity(format!(
            "unknown principal type {other:?}"
        ))),
    }
}

/// Maps a request to a `user | printer` principal. Order of precedence:
/// the configured identity header (trusted gateway), then a JWT bearer
/// token. The optional auth subrequest lets an external service veto a
/// bearer token.
pub struct IdentityProvider {
    header_name: String,
    decoding: Option<(jsonwebtoken::DecodingKey, jsonwebtoken::Algorithm)>,
    access_token_lifetime: Duration,
    subrequest: Option<AuthSubrequest>,
    http: reqwest::Client,
}

impl IdentityProvider {
    pub fn from_config(cfg: &Config) -> Result<IdentityProvider, AuthError> {
        let algorithm: jsonwebtoken::Algorithm = cfg
            .jwt_algorithm
            .parse()
            .map_err(|_| AuthError::InvalidIdentity(format!("unsupported jwt algorithm {:?}", cfg.jwt_algorithm)))?;

        let decoding = match algorithm {
            jsonwebtoken::Algorithm::HS256
            | jsonwebtoken::Algorithm::HS384
            | jsonwebtoken::Algorithm::HS512 => cfg
                .jwt_secret
                .as_ref()
                .map(|s| Ok((jsonwebtoken::DecodingKey::from_secret(s.as_bytes()), algorithm)))
                .transpose()?,
            _ => cfg
                .jwt_public_key
                .as_ref()
                .map(|pem| {
                    jsonwebtoken::DecodingKey::from_rsa_pem(pem.as_bytes())
                        .map(|k| (k, algorithm))
                        .map_err(|e| AuthError::InvalidIdentity(format!("bad jwt public key: {e}")))
                })
                .transpose()?,
        };

        Ok(IdentityProvider {
            header_name: cfg.identity_header.clone(),
            decoding,
            access_token_lifetime: cfg.access_token_lifetime,
            subrequest: cfg.auth_subrequest.clone(),
            http: reqwest::Client::new(),
        })
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> Result<Principal, AuthError> {
        if let Some(raw) = headers.get(self.header_name.as_str()) {
            let raw = raw
                .to_str()
                .map_err(|_| AuthError::InvalidIdentity("identity header is not valid UTF-8".to_string()))?;
            return self.principal_from_header(raw);
        }

        if let Some(token) = bearer_token(headers) {
            if let Some(sub) = &self.subrequest {
                self.validate_subrequest(sub, &token).await?;
            }
            return self.principal_from_jwt(&token);
        }

        Err(AuthError::MissingIdentity)
    }

    fn principal_from_header(&self, raw: &str) -> Result<Principal, AuthError> {
        let doc: IdentityDoc = serde_json::from_str(raw)
            .map_err(|e| AuthError::InvalidIdentity(format!("identity header: {e}")))?;
        principal_from_parts(&doc.kind, doc.id, doc.is_admin, doc.serial_number)
    }

    fn principal_from_jwt(&self, token: &str) -> Result<Principal, AuthError> {
        let Some((key, algorithm)) = &self.decoding else {
            return Err(AuthError::InvalidIdentity(
                "no jwt key configured".to_string(),
            ));
        };

        let validation = jsonwebtoken::Validation::new(*algorithm);
        let data = jsonwebtoken::decode::<Claims>(token, key, &validation)
            .map_err(|_| AuthError::AuthenticationFailed)?;

        // `exp` is enforced by the library; additionally cap token age at
        // the configured access-token lifetime when `iat` is present.
        if let Some(iat) = data.claims.iat {
            let now = time::OffsetDateTime::now_utc().unix_timestamp() as u64;
            if now.saturating_sub(iat) > self.access_token_lifetime.as_secs() {
                return Err(AuthError::AuthenticationFailed);
            }
        }

        principal_from_parts(
            &data.claims.kind,
            data.claims.id,
            data.claims.is_admin,
            data.claims.serial_number,
        )
    }

    async fn validate_subrequest(&self, sub: &AuthSubrequest, token: &str) -> Result<(), AuthError> {
        let url = format!("{}{}", sub.url.trim_end_matches('/'), sub.endpoint);
        let method: reqwest::Method = sub
            .method
            .parse()
            .map_err(|_| AuthError::InvalidIdentity(format!("bad subrequest method {:?}", sub.method)))?;

        let resp = self
            .http
            .request(method, url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|_| AuthError::AuthenticationFailed)?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(AuthError::AuthenticationFailed)
        }
    }
}

/// Resolve the printer behind a request. Printers usually present their
/// provisioning api key as the bearer token; a gateway-issued identity
/// (header or JWT) with a matching serial works as well.
pub async fn authenticate_printer(
    provider: &IdentityProvider,
    db: &sea_orm::DatabaseConnection,
    headers: &HeaderMap,
) -> Result<platen_db::entities::printers::Model, platen_core::Error> {
    if let Some(token) = bearer_token(headers) {
        let hash = crate::bootstrap::hash_api_key(&token);
        if let Some(printer) = crate::repo::printers::find_by_api_key_hash(db, &hash).await? {
            return Ok(printer);
        }
    }

    match provider.authenticate(headers).await? {
        Principal::Printer { id, serial_number } => {
            let printer = crate::repo::printers::find_by_id(db, id)
                .await?
                .filter(|p| p.serial == serial_number)
                .ok_or(AuthError::AuthenticationFailed)?;
            Ok(printer)
        }
        Principal::User { .. } => Err(AuthError::AuthenticationFailed.into()),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let rest = raw.trim().strip_prefix("Bearer ")?;
    let token = rest.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Duration;

    fn config_with_secret(secret: &str) -> Config {
        Config {
            database_url: "sqlite::memory:".to_string(),
            file_storage_dir: PathBuf::from("/tmp"),
            event_bus_queue: None,
            cors_allowed_origins: None,
            identity_header: "X-Identity".to_string(),
            auth_subrequest: None,
            jwt_public_key: None,
            jwt_secret: Some(secret.to_string()),
            jwt_algorithm: "HS256".to_string(),
            access_token_lifetime: Duration::from_secs(900),
            refresh_token_lifetime: Duration::from_secs(2_592_000),
            debug_level: 0,
            bind_addr: "127.0.0.1:8080".parse().unwrap(),
            write_timeout: Duration::from_secs(30),
            watchdog_interval: None,
            accel_redirect: false,
        }
    }

    #[tokio::test]
    async fn identity_header_user_is_decoded() {
        let provider = IdentityProvider::from_config(&config_with_secret("s")).unwrap();
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Identity",
            format!("{{\"type\":\"user\",\"id\":\"{id}\",\"is_admin\":true}}")
                .parse()
                .unwrap(),
        );
        let principal = provider.authenticate(&headers).await.unwrap();
        assert_eq!(principal, Principal::User { id, is_admin: true });
        assert!(principal.is_admin());
    }

    #[tokio::test]
    async fn printer_identity_requires_serial() {
        let provider = IdentityProvider::from_config(&config_with_secret("s")).unwrap();
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Identity",
            format!("{{\"type\":\"printer\",\"id\":\"{id}\"}}").parse().unwrap(),
        );
        let err = provider.authenticate(&headers).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidIdentity(_)));
    }

    #[tokio::test]
    async fn missing_identity_is_reported() {
        let provider = IdentityProvider::from_config(&config_with_secret("s")).unwrap();
        let err = provider.authenticate(&HeaderMap::new()).await.unwrap_err();
        assert_eq!(err, AuthError::MissingIdentity);
    }

    #[tokio::test]
    async fn hs256_round_trip() {
        let provider = IdentityProvider::from_config(&config_with_secret("test-secret")).unwrap();
        let id = Uuid::new_v4();
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as u64;
        let claims = serde_json::json!({
            "type": "printer",
            "id": id,
            "serial_number": "SN-1234",
            "iat": now,
            "exp": now + 600,
        });
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let principal = provider.authenticate(&headers).await.unwrap();
        assert_eq!(
            principal,
            Principal::Printer {
                id,
                serial_number: "SN-1234".to_string()
            }
        );
    }

    #[tokio::test]
    async fn tampered_token_fails() {
        let provider = IdentityProvider::from_config(&config_with_secret("right")).unwrap();
        let now = time::OffsetDateTime::now_utc().unix_timestamp() as u64;
        let claims = serde_json::json!({
            "type": "user",
            "id": Uuid::new_v4(),
            "exp": now + 600,
        });
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"wrong"),
        )
        .unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let err = provider.authenticate(&headers).await.unwrap_err();
        assert_eq!(err, AuthError::AuthenticationFailed);
    }
}
