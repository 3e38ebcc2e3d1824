use std::{fmt, result, sync::Arc};

use log::{debug, error, info, warn};
use serde::Deserialize;
use warp::http;

use crate::auth::{self, SessionId};
use crate::backend::{Backend, CreateError, FindError};
use crate::flash::Notice;
use crate::sessions::{Session, Sessions};
use crate::time::Timestamp;
use crate::user::{NewUser, User};

pub const USERNAME_CHARS: std::ops::RangeInclusive<usize> = 3..=16;
pub const PASSWORD_MIN_CHARS: usize = 8;

pub struct Site {
    backend: Backend,
    sessions: Sessions,
    config: SiteConfig,
    // verified against when the username is unknown, so both failures cost the same
    decoy_hash: String,
}

#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub hash_cost: u32,
    pub session_secs: i64,
    pub remember_secs: i64,
}

/// A request that carries a live session. `ADMIN` is only ever `true` once
/// the user's admin flag has been checked.
pub struct SiteAuthed<const ADMIN: bool = false> {
    site: Arc<Site>,
    session_id: SessionId,
    session: Session,
    user: User,
}

#[derive(Debug, Deserialize, Default)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub remember: Option<String>,
}

pub enum LoginOutcome {
    Established(SiteAuthed),
    AlreadyLoggedIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    UsernameLength,
    UsernameCharacters,
    UsernameTaken,
    PasswordLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Internal,
    Validation(Vec<Violation>),
    InvalidCredentials,
    NotLoggedIn,
    AdminRequired,
    UnsupportedMethod,
    Forbidden,
}

pub type Result<T> = result::Result<T, Error>;

impl Into<http::StatusCode> for Error {
    fn into(self) -> http::StatusCode {
        match self {
            Self::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::Validation(_) | Self::UnsupportedMethod => http::StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::NotLoggedIn => http::StatusCode::UNAUTHORIZED,
            Self::AdminRequired | Self::Forbidden => http::StatusCode::FORBIDDEN,
        }
    }
}

impl warp::reject::Reject for Error {}

impl fmt::Display for Violation {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::UsernameLength => "Username must be between 3 and 16 characters.",
            Self::UsernameCharacters => {
                "Username may only contain letters, digits, '_' and '-'."
            }
            Self::UsernameTaken => "That username is already in use.",
            Self::PasswordLength => "Password must be at least 8 characters.",
        };
        fmt.write_str(msg)
    }
}

impl Error {
    /// What the visitor is told after being redirected.
    pub fn notices(&self) -> Vec<Notice> {
        match self {
            Self::Validation(violations) => violations
                .iter()
                .map(|v| Notice::warning(v.to_string()))
                .collect(),
            Self::InvalidCredentials => {
                vec![Notice::dark("Please check your login details and try again.")]
            }
            Self::NotLoggedIn => vec![Notice::warning(
                "You are not authorized to be there, you dirty dog!",
            )],
            Self::AdminRequired => vec![Notice::warning(
                "You need Admin permission to view that page.",
            )],
            Self::Internal | Self::UnsupportedMethod | Self::Forbidden => {
                vec![Notice::warning("Something went wrong!")]
            }
        }
    }
}

impl Site {
    pub async fn new(backend: Backend, config: SiteConfig) -> Result<Self> {
        let decoy = SessionId::new().to_string();
        let decoy_hash = auth::hash_password(&decoy, config.hash_cost).await?;

        Ok(Self {
            backend,
            sessions: Sessions::default(),
            config,
            decoy_hash,
        })
    }

    pub async fn signup(&self, form: &SignupForm) -> Result<User> {
        let SignupForm { username, password } = form;
        let mut violations = vec![];

        let username_len = username.chars().count();
        if !USERNAME_CHARS.contains(&username_len) {
            violations.push(Violation::UsernameLength);
        }

        let plain = username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !plain {
            violations.push(Violation::UsernameCharacters);
        } else if !username.is_empty() {
            match self.backend.find_user(username).await {
                Ok(_) => violations.push(Violation::UsernameTaken),
                Err(FindError::NotFound) => {}
                Err(e) => {
                    error!("couldn't check for existing user {username}: {e:?}");
                    return Err(Error::Internal);
                }
            }
        }

        if password.chars().count() < PASSWORD_MIN_CHARS {
            violations.push(Violation::PasswordLength);
        }

        if !violations.is_empty() {
            info!("signup for {username:?} rejected: {violations:?}");
            return Err(Error::Validation(violations));
        }

        let pwhash = auth::hash_password(password, self.config.hash_cost).await?;
        let new_user = NewUser {
            username: username.clone(),
            pwhash,
        };

        let user = self.backend.create_user(&new_user).await.map_err(|e| match e {
            // lost a race with another signup for the same name
            CreateError::Taken => Error::Validation(vec![Violation::UsernameTaken]),
            CreateError::Internal => {
                error!("couldn't create user {username}");
                Error::Internal
            }
        })?;

        info!(
            "{} signed up as user #{}{}",
            user.username,
            user.id,
            if user.is_admin { ", admin" } else { "" }
        );
        Ok(user)
    }

    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub async fn verify(&self, username: &str, password: &str) -> Result<User> {
        let user = match self.backend.find_user(username).await {
            Ok(user) => Some(user),
            Err(FindError::NotFound) => None,
            Err(e) => {
                error!("couldn't authenticate user {username}: {e:?}");
                return Err(Error::Internal);
            }
        };

        let pwhash = user.as_ref().map_or(&self.decoy_hash, |u| &u.pwhash);
        let matched = auth::check_password(password, pwhash).await?;

        match user {
            Some(user) if matched => Ok(user),
            Some(_) => {
                warn!("wrong password for user {username}");
                Err(Error::InvalidCredentials)
            }
            None => {
                warn!("rejecting non-existant user {username}");
                Err(Error::InvalidCredentials)
            }
        }
    }

    pub async fn login(
        self: &Arc<Self>,
        form: &LoginForm,
        current: Option<&SiteAuthed>,
    ) -> Result<LoginOutcome> {
        if let Some(current) = current {
            info!("{} login: already logged in", current.user.username);
            return Ok(LoginOutcome::AlreadyLoggedIn);
        }

        let user = self.verify(&form.username, &form.password).await?;
        let remember = form.remember.as_deref().is_some_and(|v| !v.is_empty());

        self.establish(user, remember).map(LoginOutcome::Established)
    }

    pub fn establish(self: &Arc<Self>, user: User, remember: bool) -> Result<SiteAuthed> {
        let now = now()?;
        let lifetime = if remember {
            self.config.remember_secs
        } else {
            self.config.session_secs
        };

        let session = Session {
            user_id: user.id,
            username: user.username.clone(),
            expires: now.after_secs(lifetime),
            persistent: remember,
        };
        let session_id = self.sessions.insert(session.clone(), now)?;

        info!(
            "{} login: new session, expires {}",
            user.username, session.expires
        );
        Ok(SiteAuthed {
            site: Arc::clone(self),
            session_id,
            session,
            user,
        })
    }

    /// The user behind a session, read fresh from the store.
    pub async fn authenticate(self: &Arc<Self>, session_id: SessionId) -> Result<SiteAuthed> {
        let now = now()?;

        let Some(session) = self.sessions.get(&session_id, now)? else {
            debug!("no live session {session_id}");
            return Err(Error::NotLoggedIn);
        };

        let user = self
            .backend
            .find_user(&session.username)
            .await
            .map_err(|e| match e {
                FindError::NotFound => {
                    warn!("session {session_id} names missing user {}", session.username);
                    Error::NotLoggedIn
                }
                FindError::Internal => {
                    error!("couldn't load user {} for session", session.username);
                    Error::Internal
                }
            })?;

        if user.id != session.user_id {
            warn!(
                "session {session_id} was for user #{}, {} is now #{}",
                session.user_id, user.username, user.id
            );
            return Err(Error::NotLoggedIn);
        }

        debug!("found {} by session", user.username);
        Ok(SiteAuthed {
            site: Arc::clone(self),
            session_id,
            session,
            user,
        })
    }

    pub fn config(&self) -> &SiteConfig {
        &self.config
    }
}

impl SiteAuthed {
    pub fn require_admin(self) -> Result<SiteAuthed<true>> {
        if self.user.is_admin {
            Ok(SiteAuthed {
                site: self.site,
                session_id: self.session_id,
                session: self.session,
                user: self.user,
            })
        } else {
            warn!("{} isn't an admin", self.user.username);
            Err(Error::AdminRequired)
        }
    }
}

impl<const ADMIN: bool> SiteAuthed<ADMIN> {
    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn logout(self) -> Result<()> {
        let username = &self.user.username;

        if self.site.sessions.remove(&self.session_id)? {
            info!("{username} logout");
        } else {
            debug!("{username} logout: session already gone");
        }
        Ok(())
    }
}

impl SiteAuthed<true> {
    pub async fn users(&self) -> Result<Vec<User>> {
        self.site.backend.users().await.map_err(|()| Error::Internal)
    }
}

impl<const ADMIN: bool> fmt::Debug for SiteAuthed<ADMIN> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("SiteAuthed")
            .field("admin", &ADMIN)
            .field("session_id", &self.session_id)
            .field("user", &self.user.username)
            .finish()
    }
}

fn now() -> Result<Timestamp> {
    Timestamp::now().map_err(|()| Error::Internal)
}
