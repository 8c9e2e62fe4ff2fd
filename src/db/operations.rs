use crate::db::models::{NewStory, ProfileUpdate, Story, StoryRow, User};
use crate::db::{AccountStore, StoryStore};
use crate::error::{AppError, DatabaseError};
use crate::Result;
use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const USER_COLUMNS: &str =
    "id, email, username, hashed_password, fullname, bio, birthday, profile_picture, created_at, updated_at";

macro_rules! story_select {
    () => {
        r#"
        SELECT s.id, s.user_id, s.media_url, s.caption, s.is_active, s.likes_count,
               s.created_at, s.updated_at,
               u.username AS author_username, u.fullname AS author_fullname,
               u.bio AS author_bio, u.profile_picture AS author_profile_picture,
               u.created_at AS author_created_at
        FROM stories s
        JOIN users u ON u.id = s.user_id
        "#
    };
}

#[derive(Clone)]
pub struct DbOperations {
    pool: Arc<PgPool>,
}

impl DbOperations {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub async fn new_with_options(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await
            .map_err(|e| AppError::DatabaseError(DatabaseError::ConnectionError(e.to_string())))?;

        Ok(Self::new(Arc::new(pool)))
    }

    pub fn pool(&self) -> &PgPool {
        self.pool.as_ref()
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(self.pool()).await?;
        Ok(())
    }

    pub fn pool_status(&self) -> DbPoolStatus {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;

        DbPoolStatus {
            total_connections: size,
            active_connections: size.saturating_sub(idle),
            idle_connections: idle,
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn begin_transaction(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    async fn fetch_story<'e, E>(executor: E, id: Uuid) -> Result<Option<Story>>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let row = sqlx::query_as::<_, StoryRow>(concat!(story_select!(), " WHERE s.id = $1"))
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row.map(Story::from))
    }
}

#[async_trait]
impl AccountStore for DbOperations {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
            .bind(email)
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
            .bind(id)
            .fetch_optional(self.pool())
            .await?;

        Ok(user)
    }

    async fn email_or_username_taken(&self, email: &str, username: &str) -> Result<bool> {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 OR username = $2)",
        )
        .bind(email)
        .bind(username)
        .fetch_one(self.pool())
        .await?;

        Ok(taken)
    }

    async fn create_user(&self, user: &User) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, email, username, hashed_password, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(user.created_at)
        .fetch_one(self.pool())
        .await?;

        Ok(user)
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users SET
                fullname = COALESCE($2, fullname),
                bio = COALESCE($3, bio),
                birthday = COALESCE($4, birthday),
                profile_picture = COALESCE($5, profile_picture),
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            USER_COLUMNS
        ))
        .bind(id)
        .bind(&update.fullname)
        .bind(&update.bio)
        .bind(update.birthday)
        .bind(&update.profile_picture)
        .fetch_one(self.pool())
        .await?;

        Ok(user)
    }

    async fn is_following(&self, follower: Uuid, followee: Uuid) -> Result<bool> {
        let following: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM follows WHERE follower_id = $1 AND followee_id = $2)",
        )
        .bind(follower)
        .bind(followee)
        .fetch_one(self.pool())
        .await?;

        Ok(following)
    }

    async fn follow(&self, follower: Uuid, followee: Uuid) -> Result<()> {
        sqlx::query("INSERT INTO follows (follower_id, followee_id) VALUES ($1, $2)")
            .bind(follower)
            .bind(followee)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn unfollow(&self, follower: Uuid, followee: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM follows WHERE follower_id = $1 AND followee_id = $2")
            .bind(follower)
            .bind(followee)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    async fn followers(&self, id: Uuid) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.username, u.hashed_password, u.fullname, u.bio,
                   u.birthday, u.profile_picture, u.created_at, u.updated_at
            FROM follows f
            JOIN users u ON u.id = f.follower_id
            WHERE f.followee_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok(users)
    }

    async fn following(&self, id: Uuid) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.username, u.hashed_password, u.fullname, u.bio,
                   u.birthday, u.profile_picture, u.created_at, u.updated_at
            FROM follows f
            JOIN users u ON u.id = f.followee_id
            WHERE f.follower_id = $1
            ORDER BY f.created_at DESC
            "#,
        )
        .bind(id)
        .fetch_all(self.pool())
        .await?;

        Ok(users)
    }
}

#[async_trait]
impl StoryStore for DbOperations {
    async fn create_story(&self, author: Uuid, story: &NewStory) -> Result<Story> {
        let mut transaction = self.begin_transaction().await?;

        let id: Uuid = sqlx::query_scalar(
            r#"
            INSERT INTO stories (id, user_id, media_url, caption)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(author)
        .bind(&story.media_url)
        .bind(&story.caption)
        .fetch_one(&mut *transaction)
        .await?;

        let created = Self::fetch_story(&mut *transaction, id)
            .await?
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))?;

        transaction.commit().await?;
        Ok(created)
    }

    async fn feed(&self, viewer: Uuid, skip: i64, limit: i64) -> Result<Vec<Story>> {
        let rows = sqlx::query_as::<_, StoryRow>(concat!(
            story_select!(),
            r#"
            WHERE s.is_active
              AND (s.user_id = $1
                   OR s.user_id IN (SELECT followee_id FROM follows WHERE follower_id = $1))
            ORDER BY s.created_at DESC
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(viewer)
        .bind(skip)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Story::from).collect())
    }

    async fn stories_by_author(&self, author: Uuid) -> Result<Vec<Story>> {
        let rows = sqlx::query_as::<_, StoryRow>(concat!(
            story_select!(),
            " WHERE s.user_id = $1 ORDER BY s.created_at DESC"
        ))
        .bind(author)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Story::from).collect())
    }

    async fn find_story(&self, id: Uuid) -> Result<Option<Story>> {
        Self::fetch_story(self.pool(), id).await
    }

    async fn has_liked(&self, story: Uuid, user: Uuid) -> Result<bool> {
        let liked: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM story_likes WHERE story_id = $1 AND user_id = $2)",
        )
        .bind(story)
        .bind(user)
        .fetch_one(self.pool())
        .await?;

        Ok(liked)
    }

    async fn like(&self, story: Uuid, user: Uuid) -> Result<Story> {
        let mut transaction = self.begin_transaction().await?;

        sqlx::query("INSERT INTO story_likes (story_id, user_id) VALUES ($1, $2)")
            .bind(story)
            .bind(user)
            .execute(&mut *transaction)
            .await?;

        sqlx::query("UPDATE stories SET likes_count = likes_count + 1, updated_at = now() WHERE id = $1")
            .bind(story)
            .execute(&mut *transaction)
            .await?;

        let updated = Self::fetch_story(&mut *transaction, story)
            .await?
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))?;

        transaction.commit().await?;
        Ok(updated)
    }

    async fn unlike(&self, story: Uuid, user: Uuid) -> Result<Story> {
        let mut transaction = self.begin_transaction().await?;

        let removed = sqlx::query("DELETE FROM story_likes WHERE story_id = $1 AND user_id = $2")
            .bind(story)
            .bind(user)
            .execute(&mut *transaction)
            .await?
            .rows_affected();

        if removed > 0 {
            sqlx::query(
                "UPDATE stories SET likes_count = GREATEST(likes_count - 1, 0), updated_at = now() WHERE id = $1",
            )
            .bind(story)
            .execute(&mut *transaction)
            .await?;
        }

        let updated = Self::fetch_story(&mut *transaction, story)
            .await?
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))?;

        transaction.commit().await?;
        Ok(updated)
    }

    async fn has_seen(&self, story: Uuid, user: Uuid) -> Result<bool> {
        let seen: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM story_views WHERE story_id = $1 AND user_id = $2)",
        )
        .bind(story)
        .bind(user)
        .fetch_one(self.pool())
        .await?;

        Ok(seen)
    }

    async fn mark_seen(&self, story: Uuid, user: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO story_views (story_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(story)
        .bind(user)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn seen_by(&self, story: Uuid) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.username, u.hashed_password, u.fullname, u.bio,
                   u.birthday, u.profile_picture, u.created_at, u.updated_at
            FROM story_views v
            JOIN users u ON u.id = v.user_id
            WHERE v.story_id = $1
            ORDER BY v.seen_at
            "#,
        )
        .bind(story)
        .fetch_all(self.pool())
        .await?;

        Ok(users)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DbPoolStatus {
    pub total_connections: u32,
    pub active_connections: u32,
    pub idle_connections: u32,
}
