use lazy_static::lazy_static;
use regex::Regex;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{
    dto::{LoginRequest, LoginResponse, PublicUser, RegisterRequest},
    jwt::JwtKeys,
    password::{hash_password_blocking, verify_password_blocking},
    repo::UserStore,
    repo_types::{Role, User},
};
use crate::error::AuthError;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Creates an account. The admin role is only granted to addresses on
/// `admin_emails`; anyone else asking for it is refused.
pub async fn register_user(
    users: &dyn UserStore,
    admin_emails: &[String],
    req: RegisterRequest,
) -> Result<User, AuthError> {
    let email = normalize_email(&req.email);
    let username = req.username.trim().to_string();

    if username.is_empty() {
        return Err(AuthError::Validation("Username is required".into()));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AuthError::Validation("Invalid email".into()));
    }
    if req.password.is_empty() {
        return Err(AuthError::Validation("Password is required".into()));
    }
    if req.role == Role::Admin && !admin_emails.iter().any(|a| *a == email) {
        warn!(email = %email, "admin role requested by address not on the allowlist");
        return Err(AuthError::Forbidden);
    }

    if users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AuthError::DuplicateUser);
    }

    let user = User {
        id: Uuid::new_v4(),
        username,
        email,
        password_hash: hash_password_blocking(req.password).await?,
        role: req.role,
        created_at: OffsetDateTime::now_utc(),
    };

    // A concurrent registration may have won between the lookup and the insert.
    if !users.insert(&user).await? {
        warn!(email = %user.email, "email already registered");
        return Err(AuthError::DuplicateUser);
    }

    info!(user_id = %user.id, role = ?user.role, "user registered");
    Ok(user)
}

pub async fn login_user(
    users: &dyn UserStore,
    keys: &JwtKeys,
    req: LoginRequest,
) -> Result<LoginResponse, AuthError> {
    let email = normalize_email(&req.email);

    let Some(user) = users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AuthError::InvalidCredentials);
    };

    if !verify_password_blocking(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AuthError::InvalidCredentials);
    }

    let token = keys.sign(user.id, user.role)?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginResponse {
        token,
        user: PublicUser::from(&user),
    })
}
