use crate::domain_model::{FamilyId, FamilyRecord, RefreshRecord, UserId};
use crate::domain_port::{SessionStore, SessionStoreError};
use anyhow::anyhow;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

const CONSUME_REFRESH: &str = include_str!("consume_refresh.lua");

/// Redis-backed `SessionStore`.
///
/// Key layout under `prefix`: `refresh:{jti}`, `family:{family_id}` (JSON
/// values) and `sessions:{user_id}` (set of family ids). Multi-key writes
/// go through MULTI pipelines; the consume flag flips inside a Lua script
/// so two concurrent redeemers can never both win.
pub struct RedisSessionStore {
    conn: ConnectionManager,
    prefix: String,
    ttl_secs: u64,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, ttl: Duration) -> Self {
        RedisSessionStore {
            conn,
            prefix: prefix.into(),
            ttl_secs: ttl.as_secs(),
        }
    }

    fn refresh_key(&self, jti: &str) -> String {
        format!("{}:refresh:{}", self.prefix, jti)
    }

    fn family_key(&self, family: &FamilyId) -> String {
        format!("{}:family:{}", self.prefix, family)
    }

    fn sessions_key(&self, user: UserId) -> String {
        format!("{}:sessions:{}", self.prefix, user)
    }

    fn unavailable(e: RedisError) -> SessionStoreError {
        SessionStoreError::Unavailable(e.to_string())
    }

    fn encode<T: Serialize>(value: &T) -> Result<String, SessionStoreError> {
        serde_json::to_string(value).map_err(|e| SessionStoreError::InternalError(anyhow!(e)))
    }

    fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, SessionStoreError> {
        serde_json::from_str(raw).map_err(|e| SessionStoreError::InternalError(anyhow!(e)))
    }
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn create_family(
        &self,
        user: UserId,
        jti: &str,
        user_agent: &str,
    ) -> Result<FamilyId, SessionStoreError> {
        let family_id = FamilyId(Uuid::new_v4());
        let now = Utc::now();
        let family = FamilyRecord {
            user_id: user,
            current_jti: jti.to_string(),
            user_agent: user_agent.to_string(),
            created_at: now,
            last_active: now,
            blocked: false,
        };
        let record = RefreshRecord {
            user_id: user,
            family_id,
            user_agent: user_agent.to_string(),
            consumed: false,
        };

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(self.family_key(&family_id), Self::encode(&family)?, self.ttl_secs)
            .ignore()
            .sadd(self.sessions_key(user), family_id.to_string())
            .ignore()
            .expire(self.sessions_key(user), self.ttl_secs as i64)
            .ignore()
            .set_ex(self.refresh_key(jti), Self::encode(&record)?, self.ttl_secs)
            .ignore();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(family_id)
    }

    async fn get_refresh_record(
        &self,
        jti: &str,
    ) -> Result<Option<RefreshRecord>, SessionStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.refresh_key(jti))
            .await
            .map_err(Self::unavailable)?;
        raw.map(|s| Self::decode(&s)).transpose()
    }

    async fn get_family_record(
        &self,
        family: &FamilyId,
    ) -> Result<Option<FamilyRecord>, SessionStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.family_key(family))
            .await
            .map_err(Self::unavailable)?;
        raw.map(|s| Self::decode(&s)).transpose()
    }

    async fn try_consume(&self, jti: &str) -> Result<bool, SessionStoreError> {
        let mut conn = self.conn.clone();
        let script = Script::new(CONSUME_REFRESH);
        let consumed: i64 = script
            .key(self.refresh_key(jti))
            .arg(self.ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(Self::unavailable)?;
        Ok(consumed == 1)
    }

    async fn rotate_family(
        &self,
        family: &FamilyId,
        new_jti: &str,
    ) -> Result<(), SessionStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.family_key(family))
            .await
            .map_err(Self::unavailable)?;
        let Some(raw) = raw else {
            return Err(SessionStoreError::FamilyNotFound);
        };
        let mut record: FamilyRecord = Self::decode(&raw)?;
        record.current_jti = new_jti.to_string();
        record.last_active = Utc::now();

        let refresh = RefreshRecord {
            user_id: record.user_id,
            family_id: *family,
            user_agent: record.user_agent.clone(),
            consumed: false,
        };

        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(self.family_key(family), Self::encode(&record)?, self.ttl_secs)
            .ignore()
            .set_ex(self.refresh_key(new_jti), Self::encode(&refresh)?, self.ttl_secs)
            .ignore()
            .expire(self.sessions_key(record.user_id), self.ttl_secs as i64)
            .ignore();
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(())
    }

    async fn block_family(
        &self,
        family: &FamilyId,
        user: UserId,
    ) -> Result<(), SessionStoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .get(self.family_key(family))
            .await
            .map_err(Self::unavailable)?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .srem(self.sessions_key(user), family.to_string())
            .ignore();
        if let Some(raw) = raw {
            let mut record: FamilyRecord = Self::decode(&raw)?;
            record.blocked = true;
            pipe.set_ex(self.family_key(family), Self::encode(&record)?, self.ttl_secs)
                .ignore();
        }
        let _: () = pipe
            .query_async(&mut conn)
            .await
            .map_err(Self::unavailable)?;

        Ok(())
    }

    async fn list_sessions(
        &self,
        user: UserId,
    ) -> Result<Vec<(FamilyId, FamilyRecord)>, SessionStoreError> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn
            .smembers(self.sessions_key(user))
            .await
            .map_err(Self::unavailable)?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let ids = members
            .iter()
            .map(|raw| {
                raw.parse::<FamilyId>()
                    .map_err(|e| SessionStoreError::InternalError(anyhow!(e)))
            })
            .collect::<Result<Vec<FamilyId>, SessionStoreError>>()?;

        let mut pipe = redis::pipe();
        for id in &ids {
            pipe.get(self.family_key(id));
        }
        let raws: Vec<Option<String>> = pipe
            .query_async(&mut conn)
            .await
            .map_err(Self::unavailable)?;

        let mut sessions = Vec::with_capacity(ids.len());
        for (id, raw) in ids.into_iter().zip(raws) {
            // Expired families linger in the set until its own TTL fires.
            let Some(raw) = raw else { continue };
            sessions.push((id, Self::decode(&raw)?));
        }
        Ok(sessions)
    }
}
