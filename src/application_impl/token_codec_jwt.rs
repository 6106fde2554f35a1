use crate::application_port::{
    AccessToken, AuthError, RefreshToken, RefreshTokenData, TokenCodec, TokenVerifyResult,
};
use crate::domain_model::{FamilyId, UserId};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub signing_key: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AccessClaims {
    sub: String,
    #[serde(rename = "type")]
    typ: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RefreshClaims {
    sub: String,
    #[serde(rename = "type")]
    typ: String,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
    family_id: String,
}

fn encode_access(
    uid: UserId,
    jti: String,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.access_ttl;
    let claims = AccessClaims {
        sub: uid.0.to_string(),
        typ: TOKEN_TYPE_ACCESS.to_string(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti,
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn encode_refresh(
    uid: UserId,
    jti: String,
    family: FamilyId,
    cfg: &JwtConfig,
) -> Result<(String, DateTime<Utc>), AuthError> {
    let iat_dt = Utc::now();
    let exp_dt = iat_dt + cfg.refresh_ttl;
    let claims = RefreshClaims {
        sub: uid.0.to_string(),
        typ: TOKEN_TYPE_REFRESH.to_string(),
        exp: exp_dt.timestamp(),
        iat: iat_dt.timestamp(),
        iss: cfg.issuer.clone(),
        aud: cfg.audience.clone(),
        jti,
        family_id: family.0.to_string(),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(&cfg.signing_key),
    )
    .map_err(|e| AuthError::InternalError(e.to_string()))?;
    Ok((token, exp_dt))
}

fn validation(cfg: &JwtConfig) -> Validation {
    let mut v = Validation::new(Algorithm::HS256);
    v.validate_exp = true;
    v.set_audience(&[cfg.audience.clone()]);
    v.set_issuer(&[cfg.issuer.clone()]);
    v
}

fn decode_access(token: &str, cfg: &JwtConfig) -> Result<AccessClaims, AuthError> {
    let data = decode::<AccessClaims>(
        token,
        &DecodingKey::from_secret(&cfg.signing_key),
        &validation(cfg),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    })?;
    if data.claims.typ != TOKEN_TYPE_ACCESS {
        return Err(AuthError::TokenInvalid);
    }
    Ok(data.claims)
}

fn decode_refresh(token: &str, cfg: &JwtConfig) -> Result<RefreshClaims, AuthError> {
    let data = decode::<RefreshClaims>(
        token,
        &DecodingKey::from_secret(&cfg.signing_key),
        &validation(cfg),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenInvalid,
    })?;
    if data.claims.typ != TOKEN_TYPE_REFRESH {
        return Err(AuthError::TokenInvalid);
    }
    Ok(data.claims)
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    #[inline]
    fn gen_jti() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    #[inline]
    fn parse_user_id(sub: &str) -> Result<UserId, AuthError> {
        sub.parse::<UserId>().map_err(|_| AuthError::TokenInvalid)
    }

    #[inline]
    fn parse_family_id(raw: &str) -> Result<FamilyId, AuthError> {
        raw.parse::<FamilyId>().map_err(|_| AuthError::TokenInvalid)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_access_token(
        &self,
        user: UserId,
        jti: Option<String>,
    ) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        let jti = jti.unwrap_or_else(Self::gen_jti);
        let (token, exp_dt) = encode_access(user, jti, &self.cfg)?;
        Ok((AccessToken(token), exp_dt))
    }

    async fn issue_refresh_token(
        &self,
        user: UserId,
        jti: String,
        family: FamilyId,
    ) -> Result<(RefreshToken, DateTime<Utc>), AuthError> {
        let (token, exp_dt) = encode_refresh(user, jti, family, &self.cfg)?;
        Ok((RefreshToken(token), exp_dt))
    }

    async fn verify_access_token(
        &self,
        token: &AccessToken,
    ) -> Result<TokenVerifyResult, AuthError> {
        let claims = decode_access(&token.0, &self.cfg)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        Ok(TokenVerifyResult {
            user_id,
            jti: Some(claims.jti),
        })
    }

    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<RefreshTokenData, AuthError> {
        let claims = decode_refresh(&token.0, &self.cfg)?;
        let user_id = Self::parse_user_id(&claims.sub)?;
        let family_id = Self::parse_family_id(&claims.family_id)?;
        Ok(RefreshTokenData {
            user_id,
            jti: claims.jti,
            family_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cfg() -> JwtConfig {
        JwtConfig {
            issuer: "tessera.auth".to_string(),
            audience: "tessera-client".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            signing_key: b"test-signing-key".to_vec(),
        }
    }

    fn uid() -> UserId {
        UserId(uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn refresh_token_carries_jti_and_family() {
        let codec = JwtHs256Codec::new(test_cfg());
        let user = uid();
        let family = FamilyId(uuid::Uuid::new_v4());

        let (token, _) = codec
            .issue_refresh_token(user, "jti-1".to_string(), family)
            .await
            .unwrap();
        let data = codec.verify_refresh_token(&token).await.unwrap();

        assert_eq!(data.user_id, user);
        assert_eq!(data.jti, "jti-1");
        assert_eq!(data.family_id, family);
    }

    #[tokio::test]
    async fn access_token_rejected_as_refresh() {
        let codec = JwtHs256Codec::new(test_cfg());
        let (token, _) = codec.issue_access_token(uid(), None).await.unwrap();

        let err = codec
            .verify_refresh_token(&RefreshToken(token.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn refresh_token_rejected_as_access() {
        let codec = JwtHs256Codec::new(test_cfg());
        let family = FamilyId(uuid::Uuid::new_v4());
        let (token, _) = codec
            .issue_refresh_token(uid(), "jti-2".to_string(), family)
            .await
            .unwrap();

        let err = codec
            .verify_access_token(&AccessToken(token.0))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn wrong_issuer_rejected() {
        let codec = JwtHs256Codec::new(test_cfg());
        let mut other_cfg = test_cfg();
        other_cfg.issuer = "someone-else".to_string();
        let other = JwtHs256Codec::new(other_cfg);

        let family = FamilyId(uuid::Uuid::new_v4());
        let (token, _) = other
            .issue_refresh_token(uid(), "jti-3".to_string(), family)
            .await
            .unwrap();

        let err = codec.verify_refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn wrong_key_rejected() {
        let codec = JwtHs256Codec::new(test_cfg());
        let mut other_cfg = test_cfg();
        other_cfg.signing_key = b"a-different-key".to_vec();
        let other = JwtHs256Codec::new(other_cfg);

        let family = FamilyId(uuid::Uuid::new_v4());
        let (token, _) = other
            .issue_refresh_token(uid(), "jti-4".to_string(), family)
            .await
            .unwrap();

        let err = codec.verify_refresh_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
    }

    #[tokio::test]
    async fn expired_token_rejected() {
        let cfg = test_cfg();
        let codec = JwtHs256Codec::new(cfg.clone());

        // Hand-build claims past the validation leeway.
        let now = Utc::now().timestamp();
        let claims = RefreshClaims {
            sub: uid().0.to_string(),
            typ: TOKEN_TYPE_REFRESH.to_string(),
            exp: now - 600,
            iat: now - 1200,
            iss: cfg.issuer.clone(),
            aud: cfg.audience.clone(),
            jti: "jti-5".to_string(),
            family_id: uuid::Uuid::new_v4().to_string(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(&cfg.signing_key),
        )
        .unwrap();

        let err = codec
            .verify_refresh_token(&RefreshToken(token))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }
}
