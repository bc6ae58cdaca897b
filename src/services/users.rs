use crate::{
    auth,
    config::AppConfig,
    entities::{user, AccountRole, User, UserModel},
    errors::ServiceError,
    events::{Event, EventSender},
};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Account registration and login.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterInput {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub role: AccountRole,
}

/// Authenticated account plus a freshly issued bearer token.
#[derive(Debug)]
pub struct AuthenticatedAccount {
    pub user: UserModel,
    pub token: String,
}

impl UserService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    #[instrument(skip(self, input))]
    pub async fn register(&self, input: RegisterInput) -> Result<AuthenticatedAccount, ServiceError> {
        if input.name.trim().is_empty() {
            return Err(ServiceError::validation("name", "name must not be empty"));
        }
        if input.email.trim().is_empty() || !input.email.contains('@') {
            return Err(ServiceError::validation("email", "invalid email address"));
        }
        if input.password.len() < 8 {
            return Err(ServiceError::validation(
                "password",
                "password must be at least 8 characters",
            ));
        }

        let existing = User::find()
            .filter(user::Column::Email.eq(input.email.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(format!(
                "an account already exists for {}",
                input.email
            )));
        }

        let password_hash = hash_password(&input.password)?;
        let account = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            email: Set(input.email.trim().to_lowercase()),
            phone: Set(input.phone.trim().to_string()),
            password_hash: Set(password_hash),
            role: Set(input.role),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::UserRegistered(account.id))
            .await;
        info!(user_id = %account.id, role = %account.role, "account registered");

        let token = self.issue_token_for(&account)?;
        Ok(AuthenticatedAccount { user: account, token })
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthenticatedAccount, ServiceError> {
        let account = User::find()
            .filter(user::Column::Email.eq(email.trim().to_lowercase()))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::AuthError("invalid credentials".to_string()))?;

        verify_password(password, &account.password_hash)?;

        let token = self.issue_token_for(&account)?;
        Ok(AuthenticatedAccount { user: account, token })
    }

    fn issue_token_for(&self, account: &UserModel) -> Result<String, ServiceError> {
        auth::issue_token(
            &self.config.jwt_secret,
            account.id,
            account.role,
            self.config.jwt_expiration_secs,
        )
    }
}

fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::InternalError(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored_hash: &str) -> Result<(), ServiceError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| ServiceError::InternalError(format!("corrupt password hash: {e}")))?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ServiceError::AuthError("invalid credentials".to_string()))
}
