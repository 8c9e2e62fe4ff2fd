use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A registered account. The password hash never leaves the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub birthday: Option<DateTime<Utc>>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: String, username: String, hashed_password: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            hashed_password,
            fullname: None,
            bio: None,
            birthday: None,
            profile_picture: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    pub fn public(&self) -> UserPublic {
        UserPublic::from(self)
    }
}

/// What other users get to see of an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPublic {
    pub id: Uuid,
    pub username: String,
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserPublic {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            fullname: user.fullname.clone(),
            bio: user.bio.clone(),
            profile_picture: user.profile_picture.clone(),
            created_at: user.created_at,
        }
    }
}

impl From<User> for UserPublic {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            fullname: user.fullname,
            bio: user.bio,
            profile_picture: user.profile_picture,
            created_at: user.created_at,
        }
    }
}

/// Partial profile update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProfileUpdate {
    pub fullname: Option<String>,
    pub bio: Option<String>,
    pub birthday: Option<DateTime<Utc>>,
    pub profile_picture: Option<String>,
}

impl ProfileUpdate {
    pub fn apply(&self, user: &mut User) {
        if let Some(fullname) = &self.fullname {
            user.fullname = Some(fullname.clone());
        }
        if let Some(bio) = &self.bio {
            user.bio = Some(bio.clone());
        }
        if let Some(birthday) = self.birthday {
            user.birthday = Some(birthday);
        }
        if let Some(picture) = &self.profile_picture {
            user.profile_picture = Some(picture.clone());
        }
        user.updated_at = Some(Utc::now());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_url: String,
    pub caption: Option<String>,
    pub is_active: bool,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub user: UserPublic,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryWithSeenBy {
    #[serde(flatten)]
    pub story: Story,
    pub seen_by: Vec<UserPublic>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewStory {
    pub media_url: String,
    pub caption: Option<String>,
}

/// A story joined with its author, as read from the database.
#[derive(Debug, Clone, FromRow)]
pub struct StoryRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub media_url: String,
    pub caption: Option<String>,
    pub is_active: bool,
    pub likes_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub author_username: String,
    pub author_fullname: Option<String>,
    pub author_bio: Option<String>,
    pub author_profile_picture: Option<String>,
    pub author_created_at: DateTime<Utc>,
}

impl From<StoryRow> for Story {
    fn from(row: StoryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            media_url: row.media_url,
            caption: row.caption,
            is_active: row.is_active,
            likes_count: row.likes_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            user: UserPublic {
                id: row.user_id,
                username: row.author_username,
                fullname: row.author_fullname,
                bio: row.author_bio,
                profile_picture: row.author_profile_picture,
                created_at: row.author_created_at,
            },
        }
    }
}
