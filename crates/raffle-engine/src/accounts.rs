//! Accounts: login, superuser bootstrap and seller management
//!
//! Passwords are hashed before a unit of work is opened so that the write
//! lock is never held across Argon2.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use raffle_audit::AuditRecorder;
use raffle_core::config::MIN_PASSWORD_LEN;
use raffle_core::domain::{
    AllocationError, DomainError, Identity, Role, User, UserId, Username,
};
use raffle_core::ports::{
    IClock, IRaffleRepository, IUnitOfWork, SellerOrder, SellerStats, StoreError,
};

use crate::password::PasswordHasher;
use crate::sweeper::ExpirySweeper;
use crate::txn::{finish, log_rejection};

/// Login and account administration
#[derive(Clone)]
pub struct AccountService {
    repository: Arc<dyn IRaffleRepository>,
    clock: Arc<dyn IClock>,
    recorder: AuditRecorder,
    sweeper: ExpirySweeper,
    hasher: PasswordHasher,
}

impl AccountService {
    pub fn new(
        repository: Arc<dyn IRaffleRepository>,
        clock: Arc<dyn IClock>,
        recorder: AuditRecorder,
        sweeper: ExpirySweeper,
        hasher: PasswordHasher,
    ) -> Self {
        Self {
            repository,
            clock,
            recorder,
            sweeper,
            hasher,
        }
    }

    /// Check a username and password and return the caller's identity
    ///
    /// # Errors
    ///
    /// `Validation` if either field is blank; `InvalidCredentials` for an
    /// unknown user or a wrong password, without saying which.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Identity, AllocationError> {
        require_credentials(username, password)?;

        let Some(user) = self.repository.user_by_username(username.trim()).await? else {
            tracing::info!(username = username.trim(), "Login rejected");
            return Err(AllocationError::InvalidCredentials);
        };

        let valid = self.hasher.verify(password, &user.password_hash).map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Stored password hash is unusable");
            AllocationError::InvalidCredentials
        })?;
        if !valid {
            tracing::info!(username = %user.username, "Login rejected");
            return Err(AllocationError::InvalidCredentials);
        }

        tracing::debug!(user_id = %user.id, role = %user.role, "Login accepted");
        Ok(user.identity())
    }

    /// Create the first superuser if none exists yet
    ///
    /// # Returns
    ///
    /// The new superuser, or `None` when one already existed.
    ///
    /// # Errors
    ///
    /// `Validation` for a blank username or a short password.
    pub async fn bootstrap_superuser(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, AllocationError> {
        if self.repository.count_superusers().await? > 0 {
            tracing::debug!("Superuser already present, bootstrap skipped");
            return Ok(None);
        }

        let (username, password_hash) = self.prepare_account(username, password)?;
        let now = self.clock.now();

        let mut uow = self.repository.begin().await?;
        let body = self
            .bootstrap_in(uow.as_mut(), &username, &password_hash, now)
            .await;
        let created = finish("bootstrap_superuser", uow, body).await?;

        match &created {
            Some(user) => tracing::info!(
                user_id = %user.id,
                username = %user.username,
                "Bootstrapped superuser"
            ),
            None => tracing::debug!("Superuser already present, bootstrap skipped"),
        }
        Ok(created)
    }

    async fn bootstrap_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        username: &Username,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>, AllocationError> {
        if uow.count_superusers().await? > 0 {
            return Ok(None);
        }
        let user = uow
            .insert_user(username, password_hash, Role::Superuser, now)
            .await
            .map_err(username_conflict)?;
        self.recorder.superuser_bootstrapped(uow, &user).await?;
        Ok(Some(user))
    }

    /// Create a seller account
    ///
    /// # Errors
    ///
    /// `PermissionDenied` unless `actor` is a superuser, `Validation` for a
    /// blank username or a short password, `UsernameTaken` on a duplicate.
    pub async fn create_seller(
        &self,
        actor: &Identity,
        username: &str,
        password: &str,
    ) -> Result<User, AllocationError> {
        let result = self.create_seller_inner(actor, username, password).await;
        match &result {
            Ok(user) => tracing::info!(
                actor_id = %actor.user_id,
                seller_id = %user.id,
                username = %user.username,
                "Created seller"
            ),
            Err(e) => log_rejection("create_seller", actor.user_id, e),
        }
        result
    }

    async fn create_seller_inner(
        &self,
        actor: &Identity,
        username: &str,
        password: &str,
    ) -> Result<User, AllocationError> {
        actor.require_superuser()?;
        let (username, password_hash) = self.prepare_account(username, password)?;
        let now = self.clock.now();

        let mut uow = self.repository.begin().await?;
        let body = self
            .create_seller_in(uow.as_mut(), actor, &username, &password_hash, now)
            .await;
        finish("create_seller", uow, body).await
    }

    async fn create_seller_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor: &Identity,
        username: &Username,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<User, AllocationError> {
        let user = uow
            .insert_user(username, password_hash, Role::Seller, now)
            .await
            .map_err(username_conflict)?;
        self.recorder
            .seller_created(uow, actor.user_id, &user)
            .await?;
        Ok(user)
    }

    /// Delete a seller that owns no sales and no reservations
    ///
    /// Lapsed holds are swept first, and the holdings check runs in the same
    /// write transaction as the deletion.
    ///
    /// # Returns
    ///
    /// The deleted account
    ///
    /// # Errors
    ///
    /// `PermissionDenied` unless `actor` is a superuser, `NotFound` if no
    /// seller has `seller_id`, `SellerHasHoldings` if any sale or live
    /// reservation still belongs to the seller.
    pub async fn delete_seller(
        &self,
        actor: &Identity,
        seller_id: UserId,
    ) -> Result<User, AllocationError> {
        let result = match actor.require_superuser() {
            Err(e) => Err(e),
            Ok(()) => {
                let now = self.clock.now();
                match self.sweeper.sweep_at(now).await {
                    Ok(_) => match self.repository.begin().await {
                        Ok(mut uow) => {
                            let body =
                                self.delete_seller_in(uow.as_mut(), actor, seller_id, now).await;
                            finish("delete_seller", uow, body).await
                        }
                        Err(e) => Err(e.into()),
                    },
                    Err(e) => Err(e),
                }
            }
        };

        match &result {
            Ok(user) => tracing::info!(
                actor_id = %actor.user_id,
                seller_id = %user.id,
                username = %user.username,
                "Deleted seller"
            ),
            Err(e) => log_rejection("delete_seller", actor.user_id, e),
        }
        result
    }

    async fn delete_seller_in(
        &self,
        uow: &mut dyn IUnitOfWork,
        actor: &Identity,
        seller_id: UserId,
        now: DateTime<Utc>,
    ) -> Result<User, AllocationError> {
        self.sweeper.sweep_in(uow, now).await?;

        let seller = uow
            .user(seller_id)
            .await?
            .filter(|u| u.role == Role::Seller)
            .ok_or_else(|| AllocationError::NotFound("Seller".to_string()))?;

        let holdings = uow.holdings(seller_id).await?;
        if !holdings.is_empty() {
            return Err(AllocationError::SellerHasHoldings {
                sold: holdings.sold,
                reserved: holdings.reserved,
            });
        }

        uow.delete_user(seller_id).await?;
        self.recorder
            .seller_deleted(uow, actor.user_id, &seller)
            .await?;
        Ok(seller)
    }

    /// Sellers with their sold and reserved counts, ordered by username
    ///
    /// # Errors
    ///
    /// `PermissionDenied` unless `actor` is a superuser
    pub async fn list_sellers(&self, actor: &Identity) -> Result<Vec<SellerStats>, AllocationError> {
        actor.require_superuser()?;
        self.sweeper.sweep().await?;
        Ok(self.repository.seller_stats(SellerOrder::Username).await?)
    }

    fn prepare_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(Username, String), AllocationError> {
        require_credentials(username, password)?;
        let username = Username::new(username)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::WeakPassword {
                min: MIN_PASSWORD_LEN,
            }
            .into());
        }
        let password_hash = self.hasher.hash(password).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            AllocationError::store(e.to_string())
        })?;
        Ok((username, password_hash))
    }
}

fn require_credentials(username: &str, password: &str) -> Result<(), DomainError> {
    if username.trim().is_empty() || password.is_empty() {
        return Err(DomainError::ValidationFailed(
            "Username and password are required.".to_string(),
        ));
    }
    Ok(())
}

fn username_conflict(e: StoreError) -> AllocationError {
    match e {
        StoreError::Conflict(_) => AllocationError::UsernameTaken,
        other => other.into(),
    }
}
