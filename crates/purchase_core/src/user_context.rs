//! Which account a store transaction belongs to.
//!
//! Store transactions carry no user, so the initiating account is tracked
//! here: per product when a purchase is submitted, plus the most recent
//! initiator as a fallback for restorations and untracked transactions.

use std::collections::HashMap;

use shared::domain::{ProductId, UserGuid, UserRecord};
use tokio::sync::RwLock;

/// Host-side account store.
pub trait UserDirectory: Send + Sync {
    /// Known accounts; the first one is used when nobody has purchased yet.
    fn users(&self) -> Vec<UserRecord>;

    fn user(&self, user_guid: &UserGuid) -> Option<UserRecord> {
        self.users()
            .into_iter()
            .find(|user| &user.user_guid == user_guid)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    users: Vec<UserRecord>,
}

impl InMemoryUserDirectory {
    pub fn new(users: Vec<UserRecord>) -> Self {
        Self { users }
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn users(&self) -> Vec<UserRecord> {
        self.users.clone()
    }
}

#[derive(Debug, Default)]
pub struct UserContext {
    inner: RwLock<UserContextState>,
}

#[derive(Debug, Default)]
struct UserContextState {
    last_initiator: Option<UserGuid>,
    initiators: HashMap<ProductId, UserGuid>,
}

impl UserContext {
    pub async fn set_current(&self, user_guid: UserGuid) {
        self.inner.write().await.last_initiator = Some(user_guid);
    }

    pub async fn current(&self) -> Option<UserGuid> {
        self.inner.read().await.last_initiator.clone()
    }

    pub async fn record_initiator(&self, product_id: ProductId, user_guid: UserGuid) {
        self.inner
            .write()
            .await
            .initiators
            .insert(product_id, user_guid);
    }

    pub async fn clear_initiator(&self, product_id: &ProductId) -> Option<UserGuid> {
        self.inner.write().await.initiators.remove(product_id)
    }

    pub async fn initiator(&self, product_id: &ProductId) -> Option<UserGuid> {
        self.inner.read().await.initiators.get(product_id).cloned()
    }

    /// Initiator of `product_id`, else the last initiator, else the first
    /// known account. `None` when the chosen guid is not in `directory`.
    pub async fn resolve(
        &self,
        product_id: &ProductId,
        directory: &dyn UserDirectory,
    ) -> Option<UserRecord> {
        let user_guid = {
            let state = self.inner.read().await;
            state
                .initiators
                .get(product_id)
                .or(state.last_initiator.as_ref())
                .cloned()
        };

        match user_guid {
            Some(user_guid) => directory.user(&user_guid),
            None => directory.users().into_iter().next(),
        }
    }
}

#[cfg(test)]
#[path = "tests/user_context_tests.rs"]
mod tests;
