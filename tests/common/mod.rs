#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use stories_server::db::{NewStory, ProfileUpdate, Story, UserPublic};
use stories_server::error::DatabaseError;
use stories_server::{AccountStore, AppError, AppState, Settings, StoryStore, User};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoryRecord {
    id: Uuid,
    user_id: Uuid,
    media_url: String,
    caption: Option<String>,
    is_active: bool,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    follows: HashSet<(Uuid, Uuid)>,
    stories: Vec<StoryRecord>,
    likes: HashSet<(Uuid, Uuid)>,
    views: Vec<(Uuid, Uuid)>,
}

/// Storage double that keeps everything in memory.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn deactivate_story(&self, id: Uuid) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(story) = tables.stories.iter_mut().find(|s| s.id == id) {
            story.is_active = false;
        }
    }

    fn story(tables: &Tables, record: &StoryRecord) -> Story {
        let author = tables
            .users
            .iter()
            .find(|u| u.id == record.user_id)
            .expect("story author exists");
        Story {
            id: record.id,
            user_id: record.user_id,
            media_url: record.media_url.clone(),
            caption: record.caption.clone(),
            is_active: record.is_active,
            likes_count: tables.likes.iter().filter(|(s, _)| *s == record.id).count() as i32,
            created_at: record.created_at,
            updated_at: None,
            user: UserPublic::from(author),
        }
    }

    fn newest_first(tables: &Tables, mut records: Vec<&StoryRecord>) -> Vec<Story> {
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.into_iter().map(|r| Self::story(tables, r)).collect()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn email_or_username_taken(&self, email: &str, username: &str) -> Result<bool, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.users.iter().any(|u| u.email == email || u.username == username))
    }

    async fn create_user(&self, user: &User) -> Result<User, AppError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.email == user.email || u.username == user.username) {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }
        tables.users.push(user.clone());
        Ok(user.clone())
    }

    async fn update_profile(&self, id: Uuid, update: &ProfileUpdate) -> Result<User, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let user = tables
            .users
            .iter_mut()
            .find(|u| u.id == id)
            .ok_or(AppError::DatabaseError(DatabaseError::NotFound))?;
        update.apply(user);
        Ok(user.clone())
    }

    async fn is_following(&self, follower: Uuid, followee: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.lock().unwrap().follows.contains(&(follower, followee)))
    }

    async fn follow(&self, follower: Uuid, followee: Uuid) -> Result<(), AppError> {
        self.tables.lock().unwrap().follows.insert((follower, followee));
        Ok(())
    }

    async fn unfollow(&self, follower: Uuid, followee: Uuid) -> Result<(), AppError> {
        self.tables.lock().unwrap().follows.remove(&(follower, followee));
        Ok(())
    }

    async fn followers(&self, id: Uuid) -> Result<Vec<User>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .filter(|u| tables.follows.contains(&(u.id, id)))
            .cloned()
            .collect())
    }

    async fn following(&self, id: Uuid) -> Result<Vec<User>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .users
            .iter()
            .filter(|u| tables.follows.contains(&(id, u.id)))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl StoryStore for MemoryStore {
    async fn create_story(&self, author: Uuid, story: &NewStory) -> Result<Story, AppError> {
        let mut tables = self.tables.lock().unwrap();
        // Strictly increasing timestamps keep "newest first" deterministic.
        let created_at = tables
            .stories
            .last()
            .map(|s| s.created_at + Duration::milliseconds(1))
            .unwrap_or_else(Utc::now);
        let record = StoryRecord {
            id: Uuid::new_v4(),
            user_id: author,
            media_url: story.media_url.clone(),
            caption: story.caption.clone(),
            is_active: true,
            created_at,
        };
        tables.stories.push(record.clone());
        Ok(Self::story(&tables, &record))
    }

    async fn feed(&self, viewer: Uuid, skip: i64, limit: i64) -> Result<Vec<Story>, AppError> {
        let tables = self.tables.lock().unwrap();
        let visible = tables
            .stories
            .iter()
            .filter(|s| s.is_active)
            .filter(|s| s.user_id == viewer || tables.follows.contains(&(viewer, s.user_id)))
            .collect();
        Ok(Self::newest_first(&tables, visible)
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn stories_by_author(&self, author: Uuid) -> Result<Vec<Story>, AppError> {
        let tables = self.tables.lock().unwrap();
        let own = tables.stories.iter().filter(|s| s.user_id == author).collect();
        Ok(Self::newest_first(&tables, own))
    }

    async fn find_story(&self, id: Uuid) -> Result<Option<Story>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.stories.iter().find(|s| s.id == id).map(|r| Self::story(&tables, r)))
    }

    async fn has_liked(&self, story: Uuid, user: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.lock().unwrap().likes.contains(&(story, user)))
    }

    async fn like(&self, story: Uuid, user: Uuid) -> Result<Story, AppError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.likes.insert((story, user)) {
            return Err(AppError::DatabaseError(DatabaseError::Duplicate));
        }
        let record = tables.stories.iter().find(|s| s.id == story).cloned().expect("story exists");
        Ok(Self::story(&tables, &record))
    }

    async fn unlike(&self, story: Uuid, user: Uuid) -> Result<Story, AppError> {
        let mut tables = self.tables.lock().unwrap();
        tables.likes.remove(&(story, user));
        let record = tables.stories.iter().find(|s| s.id == story).cloned().expect("story exists");
        Ok(Self::story(&tables, &record))
    }

    async fn has_seen(&self, story: Uuid, user: Uuid) -> Result<bool, AppError> {
        Ok(self.tables.lock().unwrap().views.contains(&(story, user)))
    }

    async fn mark_seen(&self, story: Uuid, user: Uuid) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.views.contains(&(story, user)) {
            tables.views.push((story, user));
        }
        Ok(())
    }

    async fn seen_by(&self, story: Uuid) -> Result<Vec<User>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .views
            .iter()
            .filter(|(s, _)| *s == story)
            .filter_map(|(_, u)| tables.users.iter().find(|user| user.id == *u).cloned())
            .collect())
    }
}

pub fn test_state(store: Arc<MemoryStore>) -> AppState {
    let config = Settings::new_for_test().expect("Failed to load test config");
    AppState::with_stores(config, store.clone(), store).expect("Failed to build app state")
}

/// Stores a user directly, bypassing the HTTP layer.
pub async fn seed_user(store: &MemoryStore, email: &str, username: &str) -> User {
    let user = User::new(email.to_string(), username.to_string(), "unused".to_string());
    store.create_user(&user).await.expect("seed user")
}

pub fn bearer(state: &AppState, user: &User) -> (&'static str, String) {
    let token = state.codec.issue_session_token(&user.email).expect("issue token");
    ("Authorization", format!("Bearer {}", token))
}
