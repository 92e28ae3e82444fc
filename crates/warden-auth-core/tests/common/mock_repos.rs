//! Mock repositories for testing

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;
use warden_db::{
    AuditRepository, CreateAuditEvent, DbError, DbResult, RolesAndPermissions, SessionRepository,
    UserRepository,
};
use warden_types::{
    ListSessionsParams, Session, SessionId, SessionInfo, SessionSortField, SortOrder, User, UserId,
};

/// In-memory user repository for testing
#[derive(Default, Clone)]
pub struct MockUserRepository {
    users: Arc<DashMap<UserId, User>>,
    grants: Arc<DashMap<UserId, RolesAndPermissions>>,
    /// (hash, used)
    recovery_codes: Arc<DashMap<UserId, Vec<(String, bool)>>>,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a test user directly
    pub fn insert_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    /// Give a user roles and permissions
    pub fn grant(&self, id: UserId, roles: &[&str], permissions: &[&str]) {
        self.grants.insert(
            id,
            RolesAndPermissions {
                roles: roles.iter().map(|s| s.to_string()).collect(),
                permissions: permissions.iter().map(|s| s.to_string()).collect(),
            },
        );
    }

    /// Current stored state of a user
    pub fn get(&self, id: UserId) -> Option<User> {
        self.users.get(&id).map(|r| r.value().clone())
    }

    /// Unused recovery code hashes of a user
    #[allow(dead_code)]
    pub fn unused_recovery_codes(&self, id: UserId) -> usize {
        self.recovery_codes
            .get(&id)
            .map(|codes| codes.iter().filter(|(_, used)| !used).count())
            .unwrap_or(0)
    }

    fn find_by(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .iter()
            .find(|r| pred(r.value()))
            .map(|r| r.value().clone())
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_id(&self, id: UserId) -> DbResult<Option<User>> {
        Ok(self.get(id))
    }

    async fn find_by_username(&self, username: &str) -> DbResult<Option<User>> {
        Ok(self.find_by(|u| u.username == username))
    }

    async fn find_by_email(&self, email: &str) -> DbResult<Option<User>> {
        Ok(self.find_by(|u| u.email.eq_ignore_ascii_case(email)))
    }

    async fn update(&self, user: &User) -> DbResult<()> {
        match self.users.get_mut(&user.id) {
            Some(mut stored) => {
                *stored = user.clone();
                Ok(())
            }
            None => Err(DbError::NotFound),
        }
    }

    async fn find_roles_and_permissions(&self, id: UserId) -> DbResult<RolesAndPermissions> {
        Ok(self.grants.get(&id).map(|r| r.value().clone()).unwrap_or_default())
    }

    async fn store_recovery_codes(&self, id: UserId, code_hashes: &[String]) -> DbResult<()> {
        self.recovery_codes
            .insert(id, code_hashes.iter().map(|h| (h.clone(), false)).collect());
        Ok(())
    }

    async fn use_recovery_code(&self, id: UserId, code_hash: &str) -> DbResult<bool> {
        let Some(mut codes) = self.recovery_codes.get_mut(&id) else {
            return Ok(false);
        };
        match codes.iter_mut().find(|(hash, used)| hash == code_hash && !used) {
            Some(entry) => {
                entry.1 = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_recovery_codes(&self, id: UserId) -> DbResult<()> {
        self.recovery_codes.remove(&id);
        Ok(())
    }
}

/// In-memory session repository for testing
#[derive(Default, Clone)]
pub struct MockSessionRepository {
    sessions: Arc<DashMap<SessionId, Session>>,
    /// Stands in for the create transaction
    tx: Arc<Mutex<()>>,
    users: MockUserRepository,
}

impl MockSessionRepository {
    /// Session store that joins listings against `users`
    pub fn new(users: MockUserRepository) -> Self {
        Self {
            users,
            ..Self::default()
        }
    }

    /// Insert a session directly for testing
    #[allow(dead_code)]
    pub fn insert_session(&self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    /// Non-revoked sessions of a user, expired or not
    pub fn unrevoked_for(&self, user_id: UserId) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|r| r.user_id == user_id && !r.is_revoked())
            .map(|r| r.value().clone())
            .collect()
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn create(&self, session: &Session) -> DbResult<()> {
        let _tx = self.tx.lock().unwrap();
        let now = Utc::now();
        for mut s in self.sessions.iter_mut() {
            if s.user_id == session.user_id && s.revoked_at.is_none() {
                s.revoked_at = Some(now);
            }
        }
        self.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: SessionId) -> DbResult<Option<Session>> {
        Ok(self.sessions.get(&id).map(|r| r.value().clone()))
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> DbResult<Option<Session>> {
        Ok(self
            .sessions
            .iter()
            .find(|r| r.refresh_token_hash == token_hash)
            .map(|r| r.value().clone()))
    }

    async fn find_active_by_user(&self, user_id: UserId) -> DbResult<Option<Session>> {
        Ok(self
            .sessions
            .iter()
            .filter(|r| r.user_id == user_id && r.is_active())
            .max_by_key(|r| r.created_at)
            .map(|r| r.value().clone()))
    }

    async fn rotate(
        &self,
        id: SessionId,
        expected_hash: &str,
        new_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> DbResult<bool> {
        let Some(mut s) = self.sessions.get_mut(&id) else {
            return Ok(false);
        };
        if s.refresh_token_hash != expected_hash || !s.is_active() {
            return Ok(false);
        }
        s.rotate(new_hash, expires_at);
        Ok(true)
    }

    async fn revoke(&self, id: SessionId) -> DbResult<()> {
        match self.sessions.get_mut(&id) {
            Some(mut s) => {
                s.revoke();
                Ok(())
            }
            None => Err(DbError::NotFound),
        }
    }

    async fn revoke_by_token_hash(&self, token_hash: &str) -> DbResult<()> {
        let mut found = false;
        for mut s in self.sessions.iter_mut() {
            if s.refresh_token_hash == token_hash {
                s.revoke();
                found = true;
            }
        }
        if found {
            Ok(())
        } else {
            Err(DbError::NotFound)
        }
    }

    async fn revoke_all_for_user(&self, user_id: UserId) -> DbResult<u64> {
        let mut count = 0;
        for mut s in self.sessions.iter_mut() {
            if s.user_id == user_id && !s.is_revoked() {
                s.revoke();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn list_active(&self, params: &ListSessionsParams) -> DbResult<(Vec<SessionInfo>, u64)> {
        let mut rows: Vec<SessionInfo> = self
            .sessions
            .iter()
            .filter(|r| r.is_active())
            .filter(|r| params.user_id.map_or(true, |u| r.user_id == u))
            .filter(|r| {
                params
                    .service_name
                    .as_ref()
                    .map_or(true, |svc| r.service_name.as_ref() == Some(svc))
            })
            .filter_map(|r| {
                let user = self.users.get(r.user_id)?;
                Some(SessionInfo {
                    session_id: r.id,
                    user_id: r.user_id,
                    username: user.username,
                    email: user.email,
                    device_info: r.device_info.clone(),
                    ip_address: r.ip_address.clone(),
                    service_name: r.service_name.clone(),
                    created_at: r.created_at,
                    expires_at: r.expires_at,
                })
            })
            .filter(|info| {
                params.search.as_ref().map_or(true, |q| {
                    let q = q.to_lowercase();
                    info.username.to_lowercase().contains(&q) || info.email.to_lowercase().contains(&q)
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            let ord = match params.sort_by {
                SessionSortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SessionSortField::ExpiresAt => a.expires_at.cmp(&b.expires_at),
                SessionSortField::Username => a.username.cmp(&b.username),
            };
            match params.sort_order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
        let total = rows.len() as u64;
        let page = rows
            .into_iter()
            .skip(params.offset() as usize)
            .take(params.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn cleanup_expired(&self) -> DbResult<u64> {
        let now = Utc::now();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|r| r.expires_at < now)
            .map(|r| r.id)
            .collect();
        let count = expired.len() as u64;
        for id in expired {
            self.sessions.remove(&id);
        }
        Ok(count)
    }
}

/// In-memory audit repository for testing
#[derive(Default, Clone)]
pub struct MockAuditRepository {
    events: Arc<DashMap<Uuid, CreateAuditEvent>>,
    failing: Arc<AtomicBool>,
}

impl MockAuditRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail
    #[allow(dead_code)]
    pub fn fail_writes(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    /// Event types recorded for a user
    #[allow(dead_code)]
    pub fn actions_for(&self, user_id: UserId) -> Vec<String> {
        let mut events: Vec<CreateAuditEvent> = self
            .events
            .iter()
            .filter(|r| r.user_id == Some(user_id))
            .map(|r| r.value().clone())
            .collect();
        events.sort_by_key(|e| e.performed_at);
        events.into_iter().map(|e| e.event_type).collect()
    }
}

#[async_trait]
impl AuditRepository for MockAuditRepository {
    async fn create(&self, event: CreateAuditEvent) -> DbResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        self.events.insert(event.id, event);
        Ok(())
    }
}
