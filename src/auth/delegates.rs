use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};
use mongodb::{
    Collection,
    bson::{doc, to_bson},
};
use std::{
    sync::LazyLock,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

use super::schemas::{AuthObject, COLLECTIONS_USERS, User};
use crate::DB;

const COOKIE_LIFETIME_SECS: u64 = 15_552_000;

static ARGON2: LazyLock<Argon2> = LazyLock::new(Argon2::default);

#[inline]
fn is_valid_password(pwd: &str) -> bool {
    let len = pwd.len();
    if len < 8 || len > 32 {
        return false;
    }

    let (upper, lower, digit, symbol) =
        pwd.chars()
            .fold((false, false, false, false), |(u, l, d, s), c| {
                (
                    u || c.is_ascii_uppercase(),
                    l || c.is_ascii_lowercase(),
                    d || c.is_ascii_digit(),
                    s || !c.is_ascii_alphanumeric(),
                )
            });

    upper && lower && digit && symbol
}

pub async fn hash_password(password: String) -> Option<(String, String)> {
    if !is_valid_password(&password) {
        return None;
    }
    let salt = SaltString::generate(&mut OsRng);

    tokio::task::spawn_blocking(move || {
        ARGON2
            .hash_password(password.as_bytes(), &salt)
            .ok()
            .map(|hash| (hash.to_string(), salt.to_string()))
    })
    .await
    .ok()
    .flatten()
}

pub async fn verify_password(
    plaintext_password: String,
    salt: String,
    hashed_password: String,
) -> bool {
    tokio::task::spawn_blocking(move || {
        SaltString::from_b64(&salt)
            .ok()
            .and_then(|salt_string| {
                ARGON2
                    .hash_password(plaintext_password.as_bytes(), &salt_string)
                    .ok()
                    .map(|hash| hash.to_string() == hashed_password)
            })
            .unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

pub async fn generate_cookie(uid: String) -> Option<AuthObject> {
    let database = DB.get()?;
    let collection: Collection<User> = database.collection(COLLECTIONS_USERS);

    let expire = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs()
        + COOKIE_LIFETIME_SECS;

    let auth_object = AuthObject {
        cookie: Uuid::new_v4().to_string(),
        cookie_expire: expire.to_string(),
    };

    collection
        .update_one(
            doc! { "uid": uid },
            doc! { "$set": { "auth": to_bson(&auth_object).ok()? } },
        )
        .await
        .ok()?;

    Some(auth_object)
}

pub async fn kill_cookie(cookie: String) -> bool {
    let Some(database) = DB.get() else {
        return false;
    };
    let collection: Collection<User> = database.collection(COLLECTIONS_USERS);

    let auth_object = AuthObject {
        cookie: Uuid::new_v4().to_string(),
        cookie_expire: "0".to_string(),
    };

    let Some(auth_bson) = to_bson(&auth_object).ok() else {
        return false;
    };

    collection
        .update_one(
            doc! { "auth.cookie": cookie },
            doc! { "$set": { "auth": auth_bson } },
        )
        .await
        .is_ok()
}

pub async fn email_exists(email: &str) -> Option<bool> {
    let database = DB.get()?;
    let collection: Collection<User> = database.collection(COLLECTIONS_USERS);

    Some(
        collection
            .find_one(doc! { "email": email })
            .await
            .ok()
            .flatten()
            .is_some(),
    )
}

pub async fn retrieve_user_by_email(email: &str) -> Option<User> {
    let database = DB.get()?;
    let collection: Collection<User> = database.collection(COLLECTIONS_USERS);

    collection
        .find_one(doc! { "email": email })
        .await
        .ok()
        .flatten()
}

pub async fn retrieve_user_by_cookie(cookie: &str) -> Option<User> {
    let database = DB.get()?;
    let collection: Collection<User> = database.collection(COLLECTIONS_USERS);

    let user = collection
        .find_one(doc! { "auth.cookie": cookie })
        .await
        .ok()
        .flatten()?;

    let expire = user.auth.cookie_expire.parse::<u64>().ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();

    if expire > now {
        Some(user)
    } else {
        kill_cookie(cookie.to_string()).await;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::is_valid_password;

    #[test]
    fn password_rules() {
        assert!(is_valid_password("Str0ng!pass"));
        assert!(!is_valid_password("short1!"));
        assert!(!is_valid_password("alllowercase1!"));
        assert!(!is_valid_password("NoDigits!!"));
        assert!(!is_valid_password("NoSymbols123"));
    }
}
