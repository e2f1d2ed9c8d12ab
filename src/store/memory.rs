//! In-memory credential store for tests and single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;

use super::{CredentialStore, StoreError, StoreResult};
use crate::auth::models::{Client, Session, User};

type PairKey = (String, String);

#[derive(Default)]
struct State {
    clients: HashMap<String, Client>,
    users: HashMap<String, User>,
    sessions: HashMap<PairKey, Session>,
}

impl State {
    fn email_taken(&self, client_id: &str, email: &str, except_user: Option<&str>) -> bool {
        self.users.values().any(|u| {
            u.client_id == client_id && u.email == email && Some(u.user_id.as_str()) != except_user
        })
    }

    fn refresh_taken(&self, refresh_token: &str, except_pair: &PairKey) -> bool {
        self.sessions
            .iter()
            .any(|(key, s)| key != except_pair && s.refresh_token == refresh_token)
    }

    fn live_pair_for_refresh(&self, refresh_token: &str) -> Option<PairKey> {
        let now = Utc::now();
        self.sessions
            .iter()
            .find(|(_, s)| s.refresh_token == refresh_token && s.is_live_at(now))
            .map(|(key, _)| key.clone())
    }
}

/// Every operation runs under one lock, so composite checks are atomic.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    state: Mutex<State>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }
}

fn pair(user_id: &str, client_id: &str) -> PairKey {
    (user_id.to_string(), client_id.to_string())
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create_client(&self, client: &Client) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.clients.contains_key(&client.client_id) {
            return Err(StoreError::AlreadyExists);
        }
        state
            .clients
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }

    async fn client_by_id(&self, client_id: &str) -> StoreResult<Client> {
        self.state
            .lock()
            .clients
            .get(client_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn client_exists(&self, client_id: &str) -> StoreResult<bool> {
        Ok(self.state.lock().clients.contains_key(client_id))
    }

    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.clients.contains_key(&user.client_id) {
            return Err(StoreError::Backend("unknown client".to_string()));
        }
        if state.users.contains_key(&user.user_id)
            || state.email_taken(&user.client_id, &user.email, None)
        {
            return Err(StoreError::AlreadyExists);
        }
        state.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn user_by_email(&self, client_id: &str, email: &str) -> StoreResult<User> {
        self.state
            .lock()
            .users
            .values()
            .find(|u| u.client_id == client_id && u.email == email)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn user_by_id(&self, user_id: &str) -> StoreResult<User> {
        self.state
            .lock()
            .users
            .get(user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        let mut state = self.state.lock();
        if !state.users.contains_key(&user.user_id) {
            return Err(StoreError::NotFound);
        }
        if state.email_taken(&user.client_id, &user.email, Some(&user.user_id)) {
            return Err(StoreError::AlreadyExists);
        }
        state.users.insert(user.user_id.clone(), user.clone());
        Ok(())
    }

    async fn replace_password(
        &self,
        user_id: &str,
        password_hash: &str,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let user = state.users.get_mut(user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        user.updated_at = updated_at;

        let before = state.sessions.len();
        state.sessions.retain(|(uid, _), _| uid != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_user(&self, user_id: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        if state.users.remove(user_id).is_none() {
            return Err(StoreError::NotFound);
        }
        state.sessions.retain(|(uid, _), _| uid != user_id);
        Ok(())
    }

    async fn email_registered(&self, client_id: &str, email: &str) -> StoreResult<bool> {
        Ok(self.state.lock().email_taken(client_id, email, None))
    }

    async fn upsert_session(&self, session: &Session) -> StoreResult<()> {
        let mut state = self.state.lock();
        let key = pair(&session.user_id, &session.client_id);
        if state.refresh_taken(&session.refresh_token, &key) {
            return Err(StoreError::AlreadyExists);
        }
        let mut next = session.clone();
        if let Some(existing) = state.sessions.get(&key) {
            next.created_at = existing.created_at;
        }
        state.sessions.insert(key, next);
        Ok(())
    }

    async fn rotate_session(&self, old_refresh: &str, next: &Session) -> StoreResult<()> {
        let mut state = self.state.lock();
        let key = state
            .live_pair_for_refresh(old_refresh)
            .ok_or(StoreError::NotFound)?;
        if key != pair(&next.user_id, &next.client_id) {
            return Err(StoreError::NotFound);
        }
        if state.refresh_taken(&next.refresh_token, &key) {
            return Err(StoreError::AlreadyExists);
        }
        let mut rotated = next.clone();
        if let Some(existing) = state.sessions.get(&key) {
            rotated.created_at = existing.created_at;
        }
        state.sessions.insert(key, rotated);
        Ok(())
    }

    async fn session_for(&self, user_id: &str, client_id: &str) -> StoreResult<Session> {
        let now = Utc::now();
        self.state
            .lock()
            .sessions
            .get(&pair(user_id, client_id))
            .filter(|s| s.is_live_at(now))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn session_by_refresh(&self, refresh_token: &str) -> StoreResult<Session> {
        let state = self.state.lock();
        let key = state
            .live_pair_for_refresh(refresh_token)
            .ok_or(StoreError::NotFound)?;
        state.sessions.get(&key).cloned().ok_or(StoreError::NotFound)
    }

    async fn delete_session_by_refresh(&self, refresh_token: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state
            .sessions
            .retain(|_, s| s.refresh_token != refresh_token);
        if state.sessions.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_user_sessions(&self, user_id: &str) -> StoreResult<u64> {
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|(uid, _), _| uid != user_id);
        Ok((before - state.sessions.len()) as u64)
    }

    async fn delete_expired_sessions(&self) -> StoreResult<u64> {
        let now = Utc::now();
        let mut state = self.state.lock();
        let before = state.sessions.len();
        state.sessions.retain(|_, s| s.is_live_at(now));
        Ok((before - state.sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::contract;

    #[tokio::test]
    async fn test_clients_and_users() {
        contract::clients_and_users(&InMemoryCredentialStore::new()).await;
    }

    #[tokio::test]
    async fn test_one_session_per_pair() {
        let store = InMemoryCredentialStore::new();
        contract::one_session_per_pair(&store).await;
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_sessions_are_invisible() {
        contract::expired_sessions_are_invisible(&InMemoryCredentialStore::new()).await;
    }

    #[tokio::test]
    async fn test_rotation_is_single_use() {
        contract::rotation_is_single_use(&InMemoryCredentialStore::new()).await;
    }

    #[tokio::test]
    async fn test_password_replacement_revokes_sessions() {
        contract::password_replacement_revokes_sessions(&InMemoryCredentialStore::new()).await;
    }

    #[tokio::test]
    async fn test_deletions() {
        contract::deletions(&InMemoryCredentialStore::new()).await;
    }
}
