use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use crate::auth::codec::CredentialCodec;
use crate::auth::gate::CurrentUser;
use crate::db::User;
use crate::error::{AppError, AuthError};
use crate::AppState;
use tracing::{info, warn, error};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

impl RegisterRequest {
    fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;

        let username_len = self.username.chars().count();
        if !(3..=50).contains(&username_len) {
            return Err(AppError::ValidationError("username must be 3-50 characters".into()));
        }
        if !self.username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
            return Err(AppError::ValidationError(
                "username may only contain letters, digits, '_' and '.'".into(),
            ));
        }

        let password_len = self.password.chars().count();
        if !(8..=100).contains(&password_len) {
            return Err(AppError::ValidationError("password must be 8-100 characters".into()));
        }

        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.split('.').count() >= 2
                && domain.split('.').all(|label| !label.is_empty())
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::ValidationError("value is not a valid email address".into()))
    }
}

/// OAuth2 password-grant form; `username` carries the email address.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);
    req.validate()?;

    if state.accounts.email_or_username_taken(&req.email, &req.username).await? {
        warn!("Registration refused for email: {}: already registered", req.email);
        return Err(AppError::ValidationError("Email or username already registered".into()));
    }

    let hashed_password = CredentialCodec::hash_password(&req.password)
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    let user = User::new(req.email.clone(), req.username.clone(), hashed_password);

    match state.accounts.create_user(&user).await {
        Ok(user) => {
            info!("Registration successful for email: {}", user.email);
            Ok(HttpResponse::Created().json(user))
        }
        Err(e) => {
            error!("Registration failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

pub async fn login(
    form: web::Form<LoginForm>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", form.username);

    let user = state.accounts.find_user_by_email(&form.username).await?;
    let user = match user {
        Some(user) if CredentialCodec::verify_password(&form.password, &user.hashed_password) => user,
        _ => {
            warn!("Login failed for email: {}", form.username);
            return Err(AuthError::InvalidCredentials.into());
        }
    };

    let access_token = state
        .codec
        .issue_session_token(&user.email)
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    info!("Login successful for email: {}", user.email);
    Ok(HttpResponse::Ok().json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
    }))
}

/// Confirms the presented token is still good.
pub async fn session(current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "valid",
        "user_id": current.user().id,
    }))
}

pub async fn check_session(current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(current.into_user())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(email: &str, username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    #[test]
    fn test_valid_registration() {
        assert!(request("alice@example.com", "alice", "password123").validate().is_ok());
        assert!(request("a.b@mail.example.org", "a_b.c", "12345678").validate().is_ok());
    }

    #[test]
    fn test_invalid_email() {
        for email in ["", "alice", "alice@", "@example.com", "alice@example", "a@b@c.com", "al ice@example.com", "alice@example..com"] {
            assert!(
                matches!(request(email, "alice", "password123").validate(), Err(AppError::ValidationError(_))),
                "accepted {:?}",
                email
            );
        }
    }

    #[test]
    fn test_invalid_username_and_password() {
        assert!(request("alice@example.com", "al", "password123").validate().is_err());
        assert!(request("alice@example.com", "alice!", "password123").validate().is_err());
        assert!(request("alice@example.com", "alice", "short").validate().is_err());
        assert!(request("alice@example.com", "alice", &"x".repeat(101)).validate().is_err());
    }
}
