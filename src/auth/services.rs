use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use super::{
    dto::{LoginForm, RegisterRequest},
    jwt::JwtKeys,
    password::{hash_password, verify_password},
    repo::UserStore,
    repo_types::NewUser,
};
use crate::error::AppError;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const PASSWORD_MIN: usize = 6;

/// Same message for unknown user and wrong password.
const BAD_CREDENTIALS: &str = "Incorrect username or password";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn validate_registration(req: &RegisterRequest) -> Result<(), AppError> {
    if !is_valid_email(&req.email) {
        return Err(AppError::BadRequest("Invalid email".into()));
    }
    let len = req.username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::BadRequest(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    if req.password.chars().count() < PASSWORD_MIN {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}

/// Registers a new user. Does not log the user in.
pub async fn register(store: &dyn UserStore, mut req: RegisterRequest) -> Result<(), AppError> {
    req.email = req.email.trim().to_lowercase();
    req.username = req.username.trim().to_string();
    validate_registration(&req)?;

    if store.find_by_username(&req.username).await?.is_some() {
        warn!(username = %req.username, "username already registered");
        return Err(AppError::Conflict("Username already registered".into()));
    }
    if store.find_by_email(&req.email).await?.is_some() {
        warn!(email = %req.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password = req.password;
    let hashed_password = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("join hash_password task")??;

    let user = store
        .insert(NewUser {
            username: req.username,
            email: req.email,
            hashed_password,
        })
        .await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(())
}

/// Verifies credentials and returns a freshly signed access token.
pub async fn login(
    store: &dyn UserStore,
    keys: &JwtKeys,
    form: LoginForm,
) -> Result<String, AppError> {
    let username = form.username.trim();
    let Some(user) = store.find_by_username(username).await? else {
        warn!(%username, "login unknown username");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    };

    let digest = user.hashed_password.clone();
    let password = form.password;
    let ok = tokio::task::spawn_blocking(move || verify_password(&password, &digest))
        .await
        .context("join verify_password task")?;

    if !ok {
        warn!(username = %user.username, "login invalid password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let token = keys.sign(&user.username)?;
    info!(username = %user.username, "user logged in");
    Ok(token)
}
