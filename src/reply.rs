use cookie::Cookie;
use log::error;
use warp::http::{header, HeaderValue, StatusCode};
use warp::hyper::Body;
use warp::reply::{Reply, Response};

use crate::flash::{self, Notice};

/// A response that may set several cookies at once, which
/// `warp::reply::with_header` can't do.
pub struct Page {
    status: StatusCode,
    location: Option<&'static str>,
    html: Option<String>,
    cookies: Vec<Cookie<'static>>,
}

impl Page {
    pub fn html(html: String) -> Self {
        Self {
            status: StatusCode::OK,
            location: None,
            html: Some(html),
            cookies: vec![],
        }
    }

    pub fn redirect(location: &'static str) -> Self {
        Self {
            status: StatusCode::SEE_OTHER,
            location: Some(location),
            html: None,
            cookies: vec![],
        }
    }

    pub fn cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Queue notices for the next page.
    pub fn flash(self, notices: &[Notice]) -> Self {
        match flash::to_cookie(notices) {
            Some(cookie) => self.cookie(cookie),
            None => self,
        }
    }

    /// The notices on this page have been shown, don't show them again.
    pub fn shown(self, notices: &[Notice]) -> Self {
        if notices.is_empty() {
            self
        } else {
            self.cookie(flash::cleared())
        }
    }
}

impl Reply for Page {
    fn into_response(self) -> Response {
        let mut res = match self.html {
            Some(html) => warp::reply::html(html).into_response(),
            None => Response::new(Body::empty()),
        };
        *res.status_mut() = self.status;

        let headers = res.headers_mut();
        if let Some(location) = self.location {
            headers.insert(header::LOCATION, HeaderValue::from_static(location));
        }
        for cookie in self.cookies {
            match HeaderValue::from_str(&cookie.to_string()) {
                Ok(value) => {
                    headers.append(header::SET_COOKIE, value);
                }
                Err(e) => error!("unsendable cookie {}: {e}", cookie.name()),
            }
        }

        res
    }
}
