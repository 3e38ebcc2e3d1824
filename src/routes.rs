use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use cookie::{time::Duration, Cookie, SameSite};
use log::{debug, warn};
use warp::http::{Method, StatusCode};
use warp::{Filter, Rejection, Reply};

use crate::auth::SessionId;
use crate::flash::{self, Notice, FLASH_COOKIE};
use crate::pages;
use crate::reply::Page;
use crate::site::{Error, LoginForm, LoginOutcome, SignupForm, Site, SiteAuthed};
use crate::sync::{ContentSync, SyncError};
use crate::user::User;

pub const SESSION_COOKIE: &str = "sessionid";

const FORM_LIMIT: u64 = 16 * 1024;

/// Everything a handler knows about who is asking.
pub struct Visitor<A = Option<SiteAuthed>> {
    pub authed: A,
    pub notices: Vec<Notice>,
}

impl Visitor {
    pub fn user(&self) -> Option<&User> {
        self.authed.as_ref().map(|authed| authed.user())
    }

    pub fn logged_in(self) -> Result<Visitor<SiteAuthed>, Error> {
        match self.authed {
            Some(authed) => Ok(Visitor {
                authed,
                notices: self.notices,
            }),
            None => Err(Error::NotLoggedIn),
        }
    }
}

impl Visitor<SiteAuthed> {
    pub fn admin(self) -> Result<Visitor<SiteAuthed<true>>, Error> {
        Ok(Visitor {
            authed: self.authed.require_admin()?,
            notices: self.notices,
        })
    }
}

fn with<T: Clone + Send + Sync>(t: T) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || t.clone())
}

pub fn visitor(site: Arc<Site>) -> impl Filter<Extract = (Visitor,), Error = Rejection> + Clone {
    warp::cookie::optional::<String>(SESSION_COOKIE)
        .and(warp::cookie::optional::<String>(FLASH_COOKIE))
        .and(with(site))
        .and_then(
            |session_id: Option<String>, flash: Option<String>, site: Arc<Site>| async move {
                let authed = match session_id.as_deref().map(SessionId::from_str) {
                    Some(Ok(id)) => match site.authenticate(id).await {
                        Ok(authed) => Some(authed),
                        Err(Error::NotLoggedIn) => None,
                        Err(e) => return Err(warp::reject::custom(e)),
                    },
                    Some(Err(())) => {
                        debug!("ignoring malformed session cookie");
                        None
                    }
                    None => None,
                };

                Ok(Visitor {
                    authed,
                    notices: flash::from_cookie(flash.as_deref()),
                })
            },
        )
}

pub fn logged_in(
    site: Arc<Site>,
) -> impl Filter<Extract = (Visitor<SiteAuthed>,), Error = Rejection> + Clone {
    visitor(site).and_then(|visitor: Visitor| async move {
        visitor.logged_in().map_err(warp::reject::custom)
    })
}

pub fn admin(
    site: Arc<Site>,
) -> impl Filter<Extract = (Visitor<SiteAuthed<true>>,), Error = Rejection> + Clone {
    logged_in(site).and_then(|visitor: Visitor<SiteAuthed>| async move {
        visitor.admin().map_err(warp::reject::custom)
    })
}

/// Refuses dotfiles and dot directories, which keeps `.git/` in the
/// checkout out of reach.
fn public_path() -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path::peek()
        .and_then(|path: warp::path::Peek| async move {
            let hidden = path.segments().any(|segment| {
                let segment = segment.to_ascii_lowercase();
                segment.starts_with('.') || segment.starts_with("%2e")
            });

            if hidden {
                warn!("refusing hidden path /site/{}", path.as_str());
                Err(warp::reject::not_found())
            } else {
                Ok(())
            }
        })
        .untuple_one()
}

pub fn routes(
    site: Arc<Site>,
    sync: Arc<ContentSync>,
    content_dir: PathBuf,
    secure: bool,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .and(visitor(Arc::clone(&site)))
        .map(index);

    let content = warp::path("site")
        .and(warp::get())
        .and(public_path())
        .and(warp::fs::dir(content_dir));

    let login_page = warp::path!("login")
        .and(warp::get())
        .and(visitor(Arc::clone(&site)))
        .map(login_page);

    let login = warp::path!("login")
        .and(warp::post())
        .and(visitor(Arc::clone(&site)))
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form())
        .and(with(Arc::clone(&site)))
        .and(with(secure))
        .and_then(login);

    let signup_page = warp::path!("signup")
        .and(warp::get())
        .and(visitor(Arc::clone(&site)))
        .map(signup_page);

    let signup = warp::path!("signup")
        .and(warp::post())
        .and(visitor(Arc::clone(&site)))
        .and(warp::body::content_length_limit(FORM_LIMIT))
        .and(warp::body::form())
        .and(with(Arc::clone(&site)))
        .and_then(signup);

    let logout = warp::path!("logout")
        .and(warp::get())
        .and(logged_in(Arc::clone(&site)))
        .and(with(secure))
        .and_then(logout);

    let admin_page = warp::path!("admin")
        .and(warp::get())
        .and(admin(site))
        .and_then(admin_page);

    let webhook = warp::path!("webhook")
        .and(warp::method())
        .and(warp::header::optional::<String>("x-webhook-token"))
        .and(with(sync))
        .and_then(webhook);

    index
        .or(content)
        .or(login_page)
        .or(login)
        .or(signup_page)
        .or(signup)
        .or(logout)
        .or(admin_page)
        .or(webhook)
        .recover(recover)
}

/// Redirect, keeping anything not yet shown.
fn bounce(to: &'static str, mut pending: Vec<Notice>, new: Vec<Notice>) -> Page {
    pending.extend(new);
    Page::redirect(to).flash(&pending)
}

fn session_cookie(authed: &SiteAuthed, site: &Site, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, authed.session_id().to_string()))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);

    if authed.session().persistent {
        cookie = cookie.max_age(Duration::seconds(site.config().remember_secs));
    }
    cookie.build()
}

fn cleared_session(secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build();
    cookie.make_removal();
    cookie
}

fn already_logged_in() -> Notice {
    Notice::info("You're already logged in, silly goose.")
}

fn index(visitor: Visitor) -> Page {
    Page::html(pages::landing(visitor.user(), &visitor.notices)).shown(&visitor.notices)
}

fn login_page(visitor: Visitor) -> Page {
    if visitor.authed.is_some() {
        return bounce("/", visitor.notices, vec![already_logged_in()]);
    }

    Page::html(pages::login(&visitor.notices)).shown(&visitor.notices)
}

async fn login(
    visitor: Visitor,
    form: LoginForm,
    site: Arc<Site>,
    secure: bool,
) -> Result<Page, Rejection> {
    let Visitor { authed, notices } = visitor;

    match site.login(&form, authed.as_ref()).await {
        Ok(LoginOutcome::Established(authed)) => {
            let cookie = session_cookie(&authed, &site, secure);
            Ok(bounce("/", notices, vec![]).cookie(cookie))
        }
        Ok(LoginOutcome::AlreadyLoggedIn) => Ok(bounce("/", notices, vec![already_logged_in()])),
        Err(Error::Internal) => Err(warp::reject::custom(Error::Internal)),
        Err(e) => Ok(bounce("/login", notices, e.notices())),
    }
}

fn signup_page(visitor: Visitor) -> Page {
    Page::html(pages::signup(visitor.user(), &visitor.notices)).shown(&visitor.notices)
}

async fn signup(visitor: Visitor, form: SignupForm, site: Arc<Site>) -> Result<Page, Rejection> {
    match site.signup(&form).await {
        Ok(user) => {
            let notice = if user.is_admin {
                Notice::info("Admin User successfully created!")
            } else {
                Notice::info("Account created, please log in.")
            };
            Ok(bounce("/login", visitor.notices, vec![notice]))
        }
        Err(Error::Internal) => Err(warp::reject::custom(Error::Internal)),
        Err(e) => Ok(bounce("/signup", visitor.notices, e.notices())),
    }
}

async fn logout(visitor: Visitor<SiteAuthed>, secure: bool) -> Result<Page, Rejection> {
    let Visitor { authed, notices } = visitor;
    authed.logout().map_err(warp::reject::custom)?;

    let page = bounce("/", notices, vec![Notice::info("You have been logged out.")]);
    Ok(page.cookie(cleared_session(secure)))
}

async fn admin_page(visitor: Visitor<SiteAuthed<true>>) -> Result<Page, Rejection> {
    let Visitor { authed, notices } = visitor;
    let users = authed.users().await.map_err(warp::reject::custom)?;

    Ok(Page::html(pages::admin(authed.user(), &users, &notices)).shown(&notices))
}

async fn webhook(
    method: Method,
    token: Option<String>,
    sync: Arc<ContentSync>,
) -> Result<impl Reply, Infallible> {
    let status: StatusCode = if method != Method::POST {
        warn!("webhook called with {method}");
        Error::UnsupportedMethod.into()
    } else if let Err(e) = sync.check_token(token.as_deref()) {
        e.into()
    } else {
        match sync.sync().await {
            Ok(()) => StatusCode::OK,
            Err(SyncError::TimedOut) => StatusCode::GATEWAY_TIMEOUT,
            Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };

    Ok(warp::reply::with_status(warp::reply(), status))
}

/// Everything that falls through ends up back home with a notice.
async fn recover(err: Rejection) -> Result<Page, Infallible> {
    let notices = if let Some(e) = err.find::<Error>() {
        debug!("rejected: {e:?}");
        e.notices()
    } else if err.is_not_found() {
        debug!("no route");
        Error::Internal.notices()
    } else {
        warn!("unhandled rejection: {err:?}");
        Error::Internal.notices()
    };

    Ok(Page::redirect("/").flash(&notices))
}
