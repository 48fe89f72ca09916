//! Internal users keyed by the identity provider's subject id.
//!
//! The identity provider is only ever seen through [`UserIdentity`]: an
//! already-verified external id plus the profile fields it shares. Users are
//! created lazily on first contact or from the provider's lifecycle webhooks.
use sled::Transactional;
use tracing::{info, warn};

use crate::error::{Entity, MarketError, MarketResult};
use crate::store::{Store, TxResult, reject, tx_get, tx_get_ref, tx_put, tx_put_ref, tx_require};
use crate::types::{Role, TimeStamp};
use crate::utils::{USER_HRP, new_uuid_to_bech32};

const FALLBACK_DISPLAY_NAME: &str = "User";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub external_id: String,
    #[n(2)]
    pub role: Role,
    #[n(3)]
    pub display_name: String,
    #[n(4)]
    pub email: String,
    #[n(5)]
    pub created_at: TimeStamp,
    #[n(6)]
    pub updated_at: TimeStamp,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
    /// Sellers and admins may list items
    pub fn can_sell(&self) -> bool {
        matches!(self.role, Role::Seller | Role::Admin)
    }
}

/// Profile data the identity provider hands over for a subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserIdentity {
    pub external_id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserIdentity {
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Self::default()
        }
    }
    pub fn set_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
    pub fn set_name(mut self, first: impl Into<String>, last: impl Into<String>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = Some(last.into());
        self
    }

    fn email(&self) -> Option<&str> {
        self.email.as_deref().map(str::trim).filter(|e| !e.is_empty())
    }

    /// "First Last", either name alone, the email local part, then `fallback`.
    pub fn display_name(&self, fallback: Option<&str>) -> String {
        let first = self.first_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let last = self.last_name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let local_part = self
            .email()
            .and_then(|e| e.split('@').next())
            .filter(|p| !p.is_empty());

        match (first, last) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.to_string(),
            (None, None) => local_part
                .or(fallback)
                .unwrap_or(FALLBACK_DISPLAY_NAME)
                .to_string(),
        }
    }

    fn validate(&self) -> MarketResult<()> {
        if self.external_id.trim().is_empty() {
            return Err(MarketError::InvalidArgument("external id is empty".into()));
        }
        Ok(())
    }
}

/// What a provider webhook did to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Created(User),
    Updated(User),
    /// Duplicate delivery of a creation event
    AlreadyExists(User),
}

#[derive(Debug, Clone)]
pub struct IdentityDirectory {
    store: Store,
}

impl IdentityDirectory {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub fn get_user(&self, user_id: &str) -> MarketResult<User> {
        self.store.require(&self.store.users, Entity::User, user_id)
    }

    pub fn get_user_by_external_id(&self, external_id: &str) -> MarketResult<Option<User>> {
        match self.store.get_ref(&self.store.external_ids, external_id)? {
            Some(user_id) => self.store.get(&self.store.users, &user_id),
            None => Ok(None),
        }
    }

    /// Map an authenticated subject to its internal user.
    pub fn resolve_caller(&self, external_id: Option<&str>) -> MarketResult<User> {
        let external_id = external_id
            .filter(|id| !id.trim().is_empty())
            .ok_or(MarketError::Unauthenticated)?;

        self.get_user_by_external_id(external_id)?
            .ok_or_else(|| MarketError::not_found(Entity::User, external_id))
    }

    /// Find the subject's user, creating a buyer on first contact.
    pub fn resolve_or_create(&self, identity: &UserIdentity) -> MarketResult<User> {
        if let Some(user) = self.get_user_by_external_id(&identity.external_id)? {
            return Ok(user);
        }
        let (user, _) = self.insert_user(identity, Role::Buyer)?;
        Ok(user)
    }

    /// Create a user with an explicit role, or set the role of an existing one.
    /// Used by seeding and administrative tooling, not by request handlers.
    pub fn provision(&self, identity: &UserIdentity, role: Role) -> MarketResult<User> {
        identity.validate()?;
        let (mut user, created) = self.insert_user(identity, role)?;
        if !created && user.role != role {
            user.role = role;
            user.updated_at = TimeStamp::now();
            self.store.put(&self.store.users, &user.id, &user)?;
            info!(user_id = %user.id, role = ?role, "user role provisioned");
        }
        Ok(user)
    }

    /// Provider "user created" event. Replays are a no-op.
    pub fn on_user_created(&self, identity: &UserIdentity) -> MarketResult<WebhookOutcome> {
        let (user, created) = self.insert_user(identity, Role::Buyer)?;
        if created {
            Ok(WebhookOutcome::Created(user))
        } else {
            warn!(external_id = %identity.external_id, "user already exists, skipping creation");
            Ok(WebhookOutcome::AlreadyExists(user))
        }
    }

    /// Provider "user updated" event. Creates the user when it was never seen.
    pub fn on_user_updated(&self, identity: &UserIdentity) -> MarketResult<WebhookOutcome> {
        identity.validate()?;

        let Some(existing) = self.get_user_by_external_id(&identity.external_id)? else {
            warn!(external_id = %identity.external_id, "updated user not found, creating instead");
            let (user, _) = self.insert_user(identity, Role::Buyer)?;
            return Ok(WebhookOutcome::Created(user));
        };

        let updated = self.store.users.transaction(|users| -> TxResult<User> {
            let mut user: User = tx_require(users, Entity::User, &existing.id)?;
            if let Some(email) = identity.email() {
                user.email = email.to_string();
            }
            user.display_name = identity.display_name(Some(&user.display_name));
            user.updated_at = TimeStamp::now();
            tx_put(users, &user.id, &user)?;
            Ok(user)
        })?;

        info!(user_id = %updated.id, "user profile updated");
        Ok(WebhookOutcome::Updated(updated))
    }

    /// Insert a user unless the external id is already mapped. Returns the stored
    /// user and whether it was created by this call.
    fn insert_user(&self, identity: &UserIdentity, role: Role) -> MarketResult<(User, bool)> {
        identity.validate()?;
        let user_id = new_uuid_to_bech32(USER_HRP)?;

        let store = &self.store;
        let result = (&store.users, &store.external_ids).transaction(
            |(users, external_ids)| -> TxResult<(User, bool)> {
                if let Some(existing_id) = tx_get_ref(external_ids, &identity.external_id)? {
                    let existing: User = tx_require(users, Entity::User, &existing_id)?;
                    return Ok((existing, false));
                }

                let Some(email) = identity.email() else {
                    return reject(MarketError::InvalidArgument(format!(
                        "no email address for {}",
                        identity.external_id
                    )));
                };

                let now = TimeStamp::now();
                let user = User {
                    id: user_id.clone(),
                    external_id: identity.external_id.clone(),
                    role,
                    display_name: identity.display_name(None),
                    email: email.to_string(),
                    created_at: now,
                    updated_at: now,
                };
                // ids are fresh uuid7s, a collision means corrupt state
                if tx_get::<User>(users, &user.id)?.is_some() {
                    return reject(MarketError::Internal(format!("user id {} reused", user.id)));
                }
                tx_put(users, &user.id, &user)?;
                tx_put_ref(external_ids, &user.external_id, &user.id)?;
                Ok((user, true))
            },
        )?;

        if result.1 {
            info!(user_id = %result.0.id, role = ?role, "user created");
        }
        Ok(result)
    }
}
