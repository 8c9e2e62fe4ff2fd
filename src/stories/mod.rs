//! Stories: posting, the follow feed, likes and seen tracking.

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use url::Url;
use uuid::Uuid;
use crate::auth::CurrentUser;
use crate::db::{NewStory, Story, StoryWithSeenBy, UserPublic};
use crate::error::AppError;
use crate::AppState;
use tracing::{debug, info};

const MAX_PAGE_SIZE: i64 = 100;
const MAX_CAPTION_CHARS: usize = 2200;

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    MAX_PAGE_SIZE
}

impl FeedQuery {
    fn window(&self) -> Result<(i64, i64), AppError> {
        if self.skip < 0 || self.limit < 0 {
            return Err(AppError::ValidationError("skip and limit must not be negative".into()));
        }
        Ok((self.skip, self.limit.min(MAX_PAGE_SIZE)))
    }
}

/// Media must be an absolute http(s) URL.
pub fn validate_media_url(raw: &str) -> Result<(), AppError> {
    match Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(()),
        _ => Err(AppError::ValidationError(format!("invalid media URL: {}", raw))),
    }
}

fn validate_new_story(story: &NewStory) -> Result<(), AppError> {
    validate_media_url(&story.media_url)?;
    if let Some(caption) = &story.caption {
        if caption.chars().count() > MAX_CAPTION_CHARS {
            return Err(AppError::ValidationError(format!(
                "caption must be at most {} characters",
                MAX_CAPTION_CHARS
            )));
        }
    }
    Ok(())
}

async fn find_story(state: &AppState, id: Uuid) -> Result<Story, AppError> {
    state
        .stories
        .find_story(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Story not found".into()))
}

pub async fn create_story(
    current: CurrentUser,
    story: web::Json<NewStory>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    validate_new_story(&story)?;

    let created = state.stories.create_story(current.user().id, &story).await?;
    info!("Story {} created by {}", created.id, current.user().username);
    Ok(HttpResponse::Created().json(created))
}

pub async fn feed(
    current: CurrentUser,
    query: web::Query<FeedQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (skip, limit) = query.window()?;
    let stories = state.stories.feed(current.user().id, skip, limit).await?;
    Ok(HttpResponse::Ok().json(stories))
}

pub async fn my_stories(
    current: CurrentUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let stories = state.stories.stories_by_author(current.user().id).await?;
    Ok(HttpResponse::Ok().json(stories))
}

/// Returns the story with its viewers. Opening a story by yourself or by
/// someone you follow counts as seeing it.
pub async fn get_story(
    current: CurrentUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let story = find_story(&state, path.into_inner()).await?;
    let viewer = current.user();

    if !state.stories.has_seen(story.id, viewer.id).await? {
        let visible = story.user_id == viewer.id
            || state.accounts.is_following(viewer.id, story.user_id).await?;
        if visible {
            state.stories.mark_seen(story.id, viewer.id).await?;
            debug!("Story {} seen by {}", story.id, viewer.username);
        }
    }

    let seen_by = state
        .stories
        .seen_by(story.id)
        .await?
        .into_iter()
        .map(UserPublic::from)
        .collect();

    Ok(HttpResponse::Ok().json(StoryWithSeenBy { story, seen_by }))
}

pub async fn like_story(
    current: CurrentUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let story = find_story(&state, path.into_inner()).await?;
    let user = current.user();

    if state.stories.has_liked(story.id, user.id).await? {
        return Err(AppError::Conflict("Already liked this story".into()));
    }

    let story = state.stories.like(story.id, user.id).await?;
    info!("Story {} liked by {}", story.id, user.username);
    Ok(HttpResponse::Ok().json(story))
}

pub async fn unlike_story(
    current: CurrentUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let story = find_story(&state, path.into_inner()).await?;
    let user = current.user();

    if !state.stories.has_liked(story.id, user.id).await? {
        return Err(AppError::Conflict("Not liked this story".into()));
    }

    let story = state.stories.unlike(story.id, user.id).await?;
    info!("Story {} unliked by {}", story.id, user.username);
    Ok(HttpResponse::Ok().json(story))
}

pub async fn mark_seen(
    current: CurrentUser,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let story = find_story(&state, path.into_inner()).await?;
    state.stories.mark_seen(story.id, current.user().id).await?;
    Ok(HttpResponse::Ok().json(story))
}

/// Mounted under `/api/v1/stories`.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(create_story))
        .route("", web::get().to(feed))
        .route("/", web::post().to(create_story))
        .route("/", web::get().to(feed))
        .route("/me", web::get().to(my_stories))
        .route("/{story_id}", web::get().to(get_story))
        .route("/{story_id}/like", web::post().to(like_story))
        .route("/{story_id}/unlike", web::delete().to(unlike_story))
        .route("/{story_id}/seen", web::post().to(mark_seen));
}
