use base64_light::{base64_decode, base64_encode};
use cookie::Cookie;
use log::warn;
use serde::{Deserialize, Serialize};

pub const FLASH_COOKIE: &str = "flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Info,
    Warning,
    Dark,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Dark => "dark",
        }
    }
}

/// A one-shot message, shown on the page after the next redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub category: Category,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            category: Category::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            category: Category::Warning,
            message: message.into(),
        }
    }

    pub fn dark(message: impl Into<String>) -> Self {
        Self {
            category: Category::Dark,
            message: message.into(),
        }
    }
}

pub fn to_cookie(notices: &[Notice]) -> Option<Cookie<'static>> {
    if notices.is_empty() {
        return None;
    }

    let json = serde_json::to_string(notices)
        .map_err(|e| warn!("couldn't encode notices: {e:?}"))
        .ok()?;

    Some(
        Cookie::build((FLASH_COOKIE, base64_encode(&json)))
            .path("/")
            .http_only(true)
            .build(),
    )
}

/// Bad cookies are dropped, they only ever hold messages.
pub fn from_cookie(value: Option<&str>) -> Vec<Notice> {
    let Some(value) = value else {
        return vec![];
    };

    let base64 = value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b"+/=".contains(&b));
    if !base64 {
        warn!("ignoring flash cookie that isn't base64");
        return vec![];
    }

    let bytes = base64_decode(value);
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!("ignoring unreadable flash cookie: {e}");
        vec![]
    })
}

pub fn cleared() -> Cookie<'static> {
    let mut cookie = Cookie::build((FLASH_COOKIE, "")).path("/").build();
    cookie.make_removal();
    cookie
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn notices_survive_the_cookie() {
        let notices = vec![
            Notice::warning("Username must be between 3 and 16 characters."),
            Notice::info("quotes \" and ; semicolons"),
        ];

        let cookie = to_cookie(&notices).unwrap();
        assert_eq!(cookie.name(), FLASH_COOKIE);
        assert!(!cookie.value().contains(';'));

        assert_eq!(from_cookie(Some(cookie.value())), notices);
    }

    #[test]
    fn nothing_to_flash() {
        assert!(to_cookie(&[]).is_none());
        assert!(from_cookie(None).is_empty());
    }

    #[test]
    fn junk_is_ignored() {
        assert!(from_cookie(Some("not base64; at all")).is_empty());
        // "not json"
        assert!(from_cookie(Some("bm90IGpzb24=")).is_empty());
        assert!(from_cookie(Some("")).is_empty());
    }

    #[test]
    fn clearing_expires_the_cookie() {
        let cookie = cleared();
        assert_eq!(cookie.value(), "");
        assert_eq!(cookie.max_age(), Some(cookie::time::Duration::ZERO));
    }
}
