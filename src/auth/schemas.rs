use serde::{Deserialize, Serialize};

pub const COLLECTIONS_USERS: &str = "users";
pub const AUTH_COOKIE_NAME: &str = "SHOPWISE_AUTHENTICATION";

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthObject {
    pub cookie: String,
    #[serde(rename = "cookie-expire")]
    pub cookie_expire: String,
}

/// One entry in a user's accumulated tag profile. The count is incremented
/// every time the user interacts with a product carrying that tag; it is
/// never reset or pruned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserTag {
    pub name: String,
    pub count: i64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub salt: String,
    pub is_admin: bool,
    pub permanent_address: Option<String>,
    pub temporary_address: Option<String>,
    pub phone_number: Option<String>,
    pub auth: AuthObject,
    #[serde(default)]
    pub tags: Vec<UserTag>,
    pub created_at: u64,
}

impl User {
    /// The tag names, ignoring stored weights. Similarity always works on
    /// the plain set regardless of the weighted storage shape.
    pub fn tag_names(&self) -> Vec<String> {
        self.tags.iter().map(|tag| tag.name.clone()).collect()
    }
}

#[derive(Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            uid: user.uid.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            is_admin: user.is_admin,
        }
    }
}
