//! In-memory user store
//!
//! Two fixed accounts, keyed by their id string. Passwords are hashed at
//! startup with [`dioptra_common::api::hash_password`].

use std::collections::BTreeMap;

use dioptra_common::api::{hash_password, verify_password};
use dioptra_common::Result;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct User {
    pub id: u32,
    pub name: String,
    password_hash: String,
}

/// Public view returned by `/world`
#[derive(Debug, Serialize)]
pub struct UserView {
    pub name: String,
}

impl User {
    pub fn new(id: u32, name: &str, password: &str, iterations: u32) -> Result<Self> {
        Ok(Self {
            id,
            name: name.to_string(),
            password_hash: hash_password(password, iterations)?,
        })
    }

    pub fn view(&self) -> UserView {
        UserView {
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserStore {
    users: BTreeMap<String, User>,
}

impl UserStore {
    /// The two prototype accounts: `user`/`password` and `joe`/`hashed`
    pub fn seeded(iterations: u32) -> Result<Self> {
        let mut store = Self::default();
        store.insert(User::new(1, "user", "password", iterations)?);
        store.insert(User::new(2, "joe", "hashed", iterations)?);
        Ok(store)
    }

    pub fn insert(&mut self, user: User) {
        self.users.insert(user.id.to_string(), user);
    }

    /// Look a user up by the id carried in a token
    pub fn get(&self, id: &str) -> Option<&User> {
        self.users.get(id)
    }

    /// First user with this name, if the password matches
    pub fn authenticate(&self, name: &str, password: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.name == name)
            .filter(|u| verify_password(&u.password_hash, password))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_accounts() {
        let store = UserStore::seeded(1_000).unwrap();
        assert_eq!(store.get("1").map(|u| u.name.as_str()), Some("user"));
        assert_eq!(store.get("2").map(|u| u.name.as_str()), Some("joe"));
        assert!(store.get("3").is_none());
    }

    #[test]
    fn test_authenticate() {
        let store = UserStore::seeded(1_000).unwrap();
        assert_eq!(store.authenticate("joe", "hashed").map(|u| u.id), Some(2));
        assert!(store.authenticate("joe", "password").is_none());
        assert!(store.authenticate("guest", "").is_none());
    }

    #[test]
    fn test_passwords_are_not_stored_in_clear() {
        let user = User::new(9, "eve", "secret", 1_000).unwrap();
        assert!(user.password_hash.starts_with("pbkdf2:sha256:1000$"));
        assert!(!user.password_hash.contains("secret"));
    }
}
