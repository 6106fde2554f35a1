use crate::domain_model::{FamilyId, FamilyRecord, RefreshRecord, UserId};
use crate::domain_port::{SessionStore, SessionStoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    deadline: DateTime<Utc>,
}

impl<T: Clone> Expiring<T> {
    fn live(&self) -> Option<T> {
        (self.deadline > Utc::now()).then(|| self.value.clone())
    }
}

/// Single-process `SessionStore` over sharded maps. Implements the same
/// contract as the Redis store, TTL semantics included; per-key atomicity
/// comes from the shard lock held across `get_mut`.
pub struct MemorySessionStore {
    ttl: Duration,
    refresh: DashMap<String, Expiring<RefreshRecord>>,
    families: DashMap<FamilyId, Expiring<FamilyRecord>>,
    index: DashMap<UserId, HashSet<FamilyId>>,
}

impl MemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        MemorySessionStore {
            ttl,
            refresh: DashMap::new(),
            families: DashMap::new(),
            index: DashMap::new(),
        }
    }

    fn deadline(&self) -> DateTime<Utc> {
        Utc::now() + self.ttl
    }

    #[cfg(test)]
    pub(crate) fn evict_refresh(&self, jti: &str) {
        self.refresh.remove(jti);
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn create_family(
        &self,
        user: UserId,
        jti: &str,
        user_agent: &str,
    ) -> Result<FamilyId, SessionStoreError> {
        let family_id = FamilyId(Uuid::new_v4());
        let now = Utc::now();
        let deadline = self.deadline();

        self.families.insert(
            family_id,
            Expiring {
                value: FamilyRecord {
                    user_id: user,
                    current_jti: jti.to_string(),
                    user_agent: user_agent.to_string(),
                    created_at: now,
                    last_active: now,
                    blocked: false,
                },
                deadline,
            },
        );
        self.refresh.insert(
            jti.to_string(),
            Expiring {
                value: RefreshRecord {
                    user_id: user,
                    family_id,
                    user_agent: user_agent.to_string(),
                    consumed: false,
                },
                deadline,
            },
        );
        self.index
            .entry(user)
            .or_insert_with(HashSet::new)
            .insert(family_id);

        Ok(family_id)
    }

    async fn get_refresh_record(
        &self,
        jti: &str,
    ) -> Result<Option<RefreshRecord>, SessionStoreError> {
        Ok(self.refresh.get(jti).and_then(|entry| entry.live()))
    }

    async fn get_family_record(
        &self,
        family: &FamilyId,
    ) -> Result<Option<FamilyRecord>, SessionStoreError> {
        Ok(self.families.get(family).and_then(|entry| entry.live()))
    }

    async fn try_consume(&self, jti: &str) -> Result<bool, SessionStoreError> {
        let Some(mut entry) = self.refresh.get_mut(jti) else {
            return Ok(false);
        };
        if entry.deadline <= Utc::now() || entry.value.consumed {
            return Ok(false);
        }
        entry.value.consumed = true;
        Ok(true)
    }

    async fn rotate_family(
        &self,
        family: &FamilyId,
        new_jti: &str,
    ) -> Result<(), SessionStoreError> {
        let deadline = self.deadline();
        let (user_id, user_agent) = {
            let Some(mut entry) = self.families.get_mut(family) else {
                return Err(SessionStoreError::FamilyNotFound);
            };
            if entry.deadline <= Utc::now() {
                return Err(SessionStoreError::FamilyNotFound);
            }
            entry.value.current_jti = new_jti.to_string();
            entry.value.last_active = Utc::now();
            entry.deadline = deadline;
            (entry.value.user_id, entry.value.user_agent.clone())
        };

        self.refresh.insert(
            new_jti.to_string(),
            Expiring {
                value: RefreshRecord {
                    user_id,
                    family_id: *family,
                    user_agent,
                    consumed: false,
                },
                deadline,
            },
        );

        Ok(())
    }

    async fn block_family(
        &self,
        family: &FamilyId,
        user: UserId,
    ) -> Result<(), SessionStoreError> {
        if let Some(mut members) = self.index.get_mut(&user) {
            members.remove(family);
        }
        if let Some(mut entry) = self.families.get_mut(family) {
            entry.value.blocked = true;
            entry.deadline = self.deadline();
        }
        Ok(())
    }

    async fn list_sessions(
        &self,
        user: UserId,
    ) -> Result<Vec<(FamilyId, FamilyRecord)>, SessionStoreError> {
        let ids: Vec<FamilyId> = match self.index.get(&user) {
            Some(members) => members.iter().copied().collect(),
            None => return Ok(Vec::new()),
        };
        let mut sessions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.families.get(&id).and_then(|entry| entry.live()) {
                sessions.push((id, record));
            }
        }
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const AGENT: &str = "test-agent";

    fn user() -> UserId {
        UserId(Uuid::new_v4())
    }

    fn store() -> MemorySessionStore {
        MemorySessionStore::new(Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn consume_happens_at_most_once() {
        let store = store();
        store.create_family(user(), "jti-1", AGENT).await.unwrap();

        assert!(store.try_consume("jti-1").await.unwrap());
        assert!(!store.try_consume("jti-1").await.unwrap());
        assert!(!store.try_consume("unknown").await.unwrap());

        // The consumed record stays; its presence is the replay signal.
        let record = store.get_refresh_record("jti-1").await.unwrap().unwrap();
        assert!(record.consumed);
    }

    #[tokio::test]
    async fn concurrent_consume_has_a_single_winner() {
        let store = Arc::new(store());
        store.create_family(user(), "jti-race", AGENT).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(
                async move { store.try_consume("jti-race").await },
            ));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn rotate_points_family_at_new_jti() {
        let store = store();
        let owner = user();
        let family = store.create_family(owner, "jti-old", AGENT).await.unwrap();

        assert!(store.try_consume("jti-old").await.unwrap());
        store.rotate_family(&family, "jti-new").await.unwrap();

        let record = store.get_family_record(&family).await.unwrap().unwrap();
        assert_eq!(record.current_jti, "jti-new");
        assert!(record.last_active >= record.created_at);

        let fresh = store.get_refresh_record("jti-new").await.unwrap().unwrap();
        assert!(!fresh.consumed);
        assert_eq!(fresh.family_id, family);
        assert_eq!(fresh.user_agent, AGENT);

        // The rotated-away record is kept, not deleted.
        assert!(store.get_refresh_record("jti-old").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rotate_unknown_family_fails() {
        let store = store();
        let err = store
            .rotate_family(&FamilyId(Uuid::new_v4()), "jti-x")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionStoreError::FamilyNotFound));
    }

    #[tokio::test]
    async fn blocked_family_leaves_index_but_stays_queryable() {
        let store = store();
        let owner = user();
        let family = store.create_family(owner, "jti-b", AGENT).await.unwrap();

        store.block_family(&family, owner).await.unwrap();

        assert!(store.list_sessions(owner).await.unwrap().is_empty());
        let record = store.get_family_record(&family).await.unwrap().unwrap();
        assert!(record.blocked);

        // Blocking something already gone is a no-op, not an error.
        store
            .block_family(&FamilyId(Uuid::new_v4()), owner)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemorySessionStore::new(Duration::ZERO);
        let owner = user();
        let family = store.create_family(owner, "jti-ttl", AGENT).await.unwrap();

        assert!(store.get_refresh_record("jti-ttl").await.unwrap().is_none());
        assert!(store.get_family_record(&family).await.unwrap().is_none());
        assert!(store.list_sessions(owner).await.unwrap().is_empty());
        assert!(!store.try_consume("jti-ttl").await.unwrap());
    }
}
