use std::fmt;
use std::str::FromStr;

use log::error;
use uuid::Uuid;

use crate::site::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for SessionId {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::try_parse(s).map(Self).map_err(|_| ())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0.as_hyphenated())
    }
}

/// Salted one-way hash, run off the async workers.
pub async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();

    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| {
            error!("password hashing task failed: {e:?}");
            Error::Internal
        })?
        .map_err(|e| {
            error!("couldn't hash password: {e:?}");
            Error::Internal
        })
}

/// `false` for a mismatch and for a stored hash that can't be parsed.
pub async fn check_password(password: &str, pwhash: &str) -> Result<bool> {
    let password = password.to_string();
    let pwhash = pwhash.to_string();

    let checked = tokio::task::spawn_blocking(move || bcrypt::verify(password, &pwhash))
        .await
        .map_err(|e| {
            error!("password check task failed: {e:?}");
            Error::Internal
        })?;

    Ok(checked.unwrap_or_else(|e| {
        error!("unusable password hash: {e:?}");
        false
    }))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn session_id_from_cookie() {
        let id = SessionId::new();
        let parsed: SessionId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);

        assert!("not-a-session".parse::<SessionId>().is_err());
        assert!("".parse::<SessionId>().is_err());
    }

    #[tokio::test]
    async fn hashes_are_salted() {
        let a = hash_password("hunter2hunter2", 4)
            .await
            .unwrap();
        let b = hash_password("hunter2hunter2", 4).await.unwrap();

        assert_ne!(a, b);
        assert!(!a.contains("hunter2"));

        assert!(check_password("hunter2hunter2", &a).await.unwrap());
        assert!(check_password("hunter2hunter2", &b).await.unwrap());
        assert!(!check_password("hunter3hunter3", &a).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_never_matches() {
        assert!(!check_password("whatever", "plaintext?").await.unwrap());
        assert!(!check_password("", "").await.unwrap());
    }
}
