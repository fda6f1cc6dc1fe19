use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::password::hash_password;
use crate::db::StoreError;
use crate::users::repo::UserStore;
use crate::users::repo_types::{NewUser, User};

/// `UserStore` over a map, with the same uniqueness rules as the `users` table.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserStore {
    pub fn len(&self) -> usize {
        self.users.read().unwrap().len()
    }

    fn update<F>(&self, id: Uuid, f: F) -> Option<User>
    where
        F: FnOnce(&mut User),
    {
        let mut users = self.users.write().unwrap();
        let user = users.get_mut(&id)?;
        f(user);
        user.updated_at = OffsetDateTime::now_utc();
        Some(user.clone())
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().unwrap().get(&id).cloned())
    }

    async fn find_by_username_or_email(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let users = self.users.read().unwrap();
        Ok(users
            .values()
            .find(|u| username == Some(u.username.as_str()) || email == Some(u.email.as_str()))
            .cloned())
    }

    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let password_hash = hash_password(&new.password)?;
        let mut users = self.users.write().unwrap();
        if users
            .values()
            .any(|u| u.username == new.username || u.email == new.email)
        {
            return Err(StoreError::Conflict(
                "User with email or username already exists".into(),
            ));
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            full_name: new.full_name,
            password_hash,
            avatar: new.avatar,
            cover_image: new.cover_image,
            refresh_token: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn set_refresh_token(&self, id: Uuid, token: Option<&str>) -> Result<(), StoreError> {
        self.update(id, |u| u.refresh_token = token.map(str::to_string));
        Ok(())
    }

    async fn set_password(&self, id: Uuid, plain: &str) -> Result<(), StoreError> {
        let password_hash = hash_password(plain)?;
        self.update(id, |u| u.password_hash = password_hash);
        Ok(())
    }

    async fn update_account(
        &self,
        id: Uuid,
        full_name: &str,
        email: &str,
    ) -> Result<Option<User>, StoreError> {
        let taken = self
            .users
            .read()
            .unwrap()
            .values()
            .any(|u| u.id != id && u.email == email);
        if taken {
            return Err(StoreError::Conflict("Email is already in use".into()));
        }
        Ok(self.update(id, |u| {
            u.full_name = full_name.to_string();
            u.email = email.to_string();
        }))
    }

    async fn set_avatar(&self, id: Uuid, url: &str) -> Result<Option<User>, StoreError> {
        Ok(self.update(id, |u| u.avatar = url.to_string()))
    }

    async fn set_cover_image(
        &self,
        id: Uuid,
        url: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.update(id, |u| u.cover_image = url.map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.into(),
            email: email.into(),
            full_name: "Test User".into(),
            password: "secret1".into(),
            avatar: "https://media.local/a.png".into(),
            cover_image: None,
        }
    }

    #[tokio::test]
    async fn create_hashes_password_and_enforces_uniqueness() {
        let store = InMemoryUserStore::default();
        let user = store.create(new_user("alice", "a@x.com")).await.unwrap();
        assert_ne!(user.password_hash, "secret1");
        assert!(user.is_password_correct("secret1").unwrap());

        let err = store.create(new_user("alice", "other@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        let err = store.create(new_user("bob", "a@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn lookup_matches_either_field() {
        let store = InMemoryUserStore::default();
        let user = store.create(new_user("alice", "a@x.com")).await.unwrap();

        let by_name = store.find_by_username_or_email(Some("alice"), None).await.unwrap();
        assert_eq!(by_name.map(|u| u.id), Some(user.id));
        let by_mail = store
            .find_by_username_or_email(Some("nobody"), Some("a@x.com"))
            .await
            .unwrap();
        assert_eq!(by_mail.map(|u| u.id), Some(user.id));
        assert!(store
            .find_by_username_or_email(None, None)
            .await
            .unwrap()
            .is_none());
    }
}
