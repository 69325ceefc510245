//! User model, JWT claims and the authorization gate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::AppError;

/// User role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

// Stored as text in the `role` column
impl sqlx::Type<Postgres> for Role {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for Role {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for Role {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Full user model from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub fullname: String,
    pub username: String,
    pub email: String,
    /// Hashed password (argon2)
    #[serde(skip_serializing, default)]
    pub password: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to insert a user; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub fullname: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Partial update applied to a user row
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserChanges {
    pub fullname: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

/// User query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserQuery {
    /// Matches full name, username or email
    pub q: Option<String>,
    pub role: Option<Role>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

/// Self-registration request; always creates a student
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterUser {
    #[validate(length(min = 1, message = "Full name is required"))]
    pub fullname: String,
    #[validate(length(min = 3, message = "Username must be at least 3 characters"))]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

/// Update user request. Students may only change their name and email.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUser {
    #[validate(length(min = 1, message = "Full name cannot be empty"))]
    pub fullname: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub role: Option<Role>,
}

/// JWT claims for authenticated users; the request-scoped auth context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub exp: i64,
    pub iat: i64,
}

/// What a caller must be to reach a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Any authenticated user
    Authenticated,
    /// The owner of the resource, or an admin
    Owner(i32),
    /// Admins only
    Admin,
}

impl UserClaims {
    pub fn new(user: &User, expiration_hours: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            exp: now + (expiration_hours as i64 * 3600),
            iat: now,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Single authorization gate. Call before touching any data.
    pub fn authorize(&self, access: Access) -> Result<(), AppError> {
        let allowed = match access {
            Access::Authenticated => true,
            Access::Owner(owner_id) => self.is_admin() || self.user_id == owner_id,
            Access::Admin => self.is_admin(),
        };

        if allowed {
            Ok(())
        } else {
            tracing::debug!(user_id = self.user_id, role = %self.role, ?access, "Access denied");
            Err(match access {
                Access::Admin => {
                    AppError::Authorization("Administrator privileges required".to_string())
                }
                _ => AppError::Authorization(
                    "You can only access your own account".to_string(),
                ),
            })
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        self.authorize(Access::Admin)
    }

    /// Resolve an optional target user id, defaulting to the caller, and check access to it
    pub fn acting_for(&self, user_id: Option<i32>) -> Result<i32, AppError> {
        let target = user_id.unwrap_or(self.user_id);
        self.authorize(Access::Owner(target))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(user_id: i32, role: Role) -> UserClaims {
        UserClaims {
            sub: format!("user{}", user_id),
            user_id,
            role,
            exp: Utc::now().timestamp() + 3600,
            iat: Utc::now().timestamp(),
        }
    }

    #[test]
    fn test_student_owns_only_itself() {
        let student = claims(7, Role::Student);
        assert!(student.authorize(Access::Authenticated).is_ok());
        assert!(student.authorize(Access::Owner(7)).is_ok());
        assert!(matches!(
            student.authorize(Access::Owner(8)),
            Err(AppError::Authorization(_))
        ));
        assert!(matches!(
            student.authorize(Access::Admin),
            Err(AppError::Authorization(_))
        ));
    }

    #[test]
    fn test_admin_reaches_everything() {
        let admin = claims(1, Role::Admin);
        assert!(admin.authorize(Access::Owner(42)).is_ok());
        assert!(admin.authorize(Access::Admin).is_ok());
    }

    #[test]
    fn test_acting_for_defaults_to_caller() {
        let student = claims(3, Role::Student);
        assert_eq!(student.acting_for(None).unwrap(), 3);
        assert_eq!(student.acting_for(Some(3)).unwrap(), 3);
        assert!(student.acting_for(Some(4)).is_err());

        let admin = claims(1, Role::Admin);
        assert_eq!(admin.acting_for(Some(4)).unwrap(), 4);
    }

    #[test]
    fn test_token_roundtrip_and_wrong_secret() {
        let original = claims(5, Role::Student);
        let token = original.create_token("secret").unwrap();

        let decoded = UserClaims::from_token(&token, "secret").unwrap();
        assert_eq!(decoded.user_id, 5);
        assert_eq!(decoded.role, Role::Student);

        assert!(UserClaims::from_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("Admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("student".parse::<Role>().unwrap(), Role::Student);
        assert!("librarian".parse::<Role>().is_err());
    }
}
