//! Profiles and the follow graph.

use actix_web::{web, HttpResponse};
use uuid::Uuid;
use crate::auth::CurrentUser;
use crate::db::{ProfileUpdate, User, UserPublic};
use crate::error::AppError;
use crate::AppState;
use tracing::info;

async fn find_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .accounts
        .find_user_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

fn public_list(users: Vec<User>) -> Vec<UserPublic> {
    users.into_iter().map(UserPublic::from).collect()
}

pub async fn get_me(current: CurrentUser) -> HttpResponse {
    HttpResponse::Ok().json(current.into_user())
}

pub async fn update_me(
    current: CurrentUser,
    update: web::Json<ProfileUpdate>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    if let Some(picture) = &update.profile_picture {
        crate::stories::validate_media_url(picture)?;
    }

    let user = state.accounts.update_profile(current.user().id, &update).await?;
    info!("Profile updated for {}", user.email);
    Ok(HttpResponse::Ok().json(user))
}

pub async fn get_user(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let user = find_user(&state, path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user.public()))
}

pub async fn follow(
    current: CurrentUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = find_user(&state, path.into_inner()).await?;
    let me = current.user();

    if target.id == me.id {
        return Err(AppError::Conflict("Cannot follow yourself".into()));
    }
    if state.accounts.is_following(me.id, target.id).await? {
        return Err(AppError::Conflict("Already following this user".into()));
    }

    state.accounts.follow(me.id, target.id).await?;
    info!("{} now follows {}", me.username, target.username);
    Ok(HttpResponse::Ok().json(target.public()))
}

pub async fn unfollow(
    current: CurrentUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let target = find_user(&state, path.into_inner()).await?;
    let me = current.user();

    if !state.accounts.is_following(me.id, target.id).await? {
        return Err(AppError::Conflict("Not following this user".into()));
    }

    state.accounts.unfollow(me.id, target.id).await?;
    info!("{} unfollowed {}", me.username, target.username);
    Ok(HttpResponse::Ok().json(target.public()))
}

pub async fn my_followers(
    current: CurrentUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let users = state.accounts.followers(current.user().id).await?;
    Ok(HttpResponse::Ok().json(public_list(users)))
}

pub async fn my_following(
    current: CurrentUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let users = state.accounts.following(current.user().id).await?;
    Ok(HttpResponse::Ok().json(public_list(users)))
}

/// Mounted under `/api/v1/users`. The `/me` routes come first so `me` is never
/// parsed as a user id.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/me", web::get().to(get_me))
        .route("/me", web::put().to(update_me))
        .route("/me/followers", web::get().to(my_followers))
        .route("/me/following", web::get().to(my_following))
        .route("/{user_id}", web::get().to(get_user))
        .route("/{user_id}/follow", web::post().to(follow))
        .route("/{user_id}/unfollow", web::delete().to(unfollow));
}
