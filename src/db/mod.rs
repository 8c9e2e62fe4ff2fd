//! Database module
//!
//! Row types, the storage traits the rest of the server talks to, and the
//! PostgreSQL implementation behind them.

pub mod models;
pub mod operations;

pub use models::{NewStory, ProfileUpdate, Story, StoryWithSeenBy, User, UserPublic};
pub use operations::DbOperations;

use crate::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Accounts and the follow graph.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// True when either the email or the username already belongs to an account.
    async fn email_or_username_taken(&self, email: &str, username: &str) -> Result<bool>;

    async fn create_user(&self, user: &User) -> Result<User>;

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User>;

    async fn is_following(&self, follower: Uuid, followee: Uuid) -> Result<bool>;

    async fn follow(&self, follower: Uuid, followee: Uuid) -> Result<()>;

    async fn unfollow(&self, follower: Uuid, followee: Uuid) -> Result<()>;

    async fn followers(&self, id: Uuid) -> Result<Vec<User>>;

    async fn following(&self, id: Uuid) -> Result<Vec<User>>;
}

/// Stories, likes and views.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StoryStore: Send + Sync {
    async fn create_story(&self, author: Uuid, story: &NewStory) -> Result<Story>;

    /// Active stories by `viewer` and everyone `viewer` follows, newest first.
    async fn feed(&self, viewer: Uuid, skip: i64, limit: i64) -> Result<Vec<Story>>;

    /// Every story by `author`, active or not, newest first.
    async fn stories_by_author(&self, author: Uuid) -> Result<Vec<Story>>;

    async fn find_story(&self, id: Uuid) -> Result<Option<Story>>;

    async fn has_liked(&self, story: Uuid, user: Uuid) -> Result<bool>;

    /// Records the like and bumps `likes_count` atomically.
    async fn like(&self, story: Uuid, user: Uuid) -> Result<Story>;

    async fn unlike(&self, story: Uuid, user: Uuid) -> Result<Story>;

    async fn has_seen(&self, story: Uuid, user: Uuid) -> Result<bool>;

    async fn mark_seen(&self, story: Uuid, user: Uuid) -> Result<()>;

    async fn seen_by(&self, story: Uuid) -> Result<Vec<User>>;
}
