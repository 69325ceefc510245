//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        stats::UserProfile,
        user::{NewUser, RegisterUser, Role, UpdateUser, User, UserChanges, UserClaims, UserQuery},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Authenticate user by username and return a JWT token
    pub async fn authenticate(&self, username: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_username(username)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            tracing::debug!(username, "Login rejected");
            return Err(AppError::Authentication("Invalid username or password".to_string()));
        }

        let token = self.create_token_for_user(&user)?;
        tracing::info!(user_id = user.id, role = %user.role, "User logged in");
        Ok((token, user))
    }

    /// Issue a token for an already authenticated user
    pub fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        UserClaims::new(user, self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Self-registration. Always creates a student.
    pub async fn register(&self, request: RegisterUser) -> AppResult<User> {
        let user = self
            .repository
            .users
            .create(&NewUser {
                fullname: request.fullname,
                username: request.username,
                email: request.email,
                password_hash: self.hash_password(&request.password)?,
                role: Role::Student,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "Student registered");
        Ok(user)
    }

    /// Create the configured admin account unless its login is already taken
    pub async fn ensure_admin(&self) -> AppResult<Option<User>> {
        let (Some(login), Some(password)) = (
            self.config.bootstrap_admin_login.as_deref(),
            self.config.bootstrap_admin_password.as_deref(),
        ) else {
            return Ok(None);
        };

        if self.repository.users.get_by_username(login).await?.is_some() {
            return Ok(None);
        }

        let admin = self
            .repository
            .users
            .create(&NewUser {
                fullname: "Administrator".to_string(),
                username: login.to_string(),
                email: String::new(),
                password_hash: self.hash_password(password)?,
                role: Role::Admin,
            })
            .await?;

        tracing::info!(user_id = admin.id, username = %admin.username, "Bootstrap admin created");
        Ok(Some(admin))
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    }

    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// User with borrowing and fine totals
    pub async fn get_profile(&self, id: i32) -> AppResult<UserProfile> {
        let user = self.repository.users.get_by_id(id).await?;
        let counts = self.repository.loans.counts(Some(id), Utc::now()).await?;
        let total_fines = self.repository.fees.total(Some(id)).await?;

        Ok(UserProfile {
            user,
            total_borrowed: counts.total,
            currently_borrowed: counts.active,
            total_fines,
        })
    }

    pub async fn search_users(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.search(query).await
    }

    pub async fn update_user(&self, id: i32, update: UpdateUser) -> AppResult<User> {
        let changes = UserChanges {
            fullname: update.fullname,
            email: update.email,
            role: update.role,
        };
        let user = self.repository.users.update(id, &changes).await?;
        if let Some(role) = changes.role {
            tracing::info!(user_id = id, %role, "User role changed");
        }
        Ok(user)
    }

    pub async fn delete_user(&self, id: i32) -> AppResult<()> {
        self.repository.users.delete(id).await?;
        tracing::info!(user_id = id, "User deleted");
        Ok(())
    }
}
