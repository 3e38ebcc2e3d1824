use std::fmt::Write;

use crate::flash::Notice;
use crate::user::User;

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn layout(title: &str, user: Option<&User>, notices: &[Notice], body: &str) -> String {
    let mut nav = String::from(r#"<a href="/">Home</a>"#);
    match user {
        Some(user) => {
            if user.is_admin {
                nav.push_str(r#" <a href="/admin">Admin</a>"#);
            }
            let _ = write!(
                nav,
                r#" <span class="user">{}</span> <a href="/logout">Log out</a>"#,
                escape(&user.username)
            );
        }
        None => nav.push_str(r#" <a href="/login">Log in</a> <a href="/signup">Sign up</a>"#),
    }

    let mut flashes = String::new();
    for notice in notices {
        let _ = write!(
            flashes,
            r#"<div class="alert alert-{}">{}</div>"#,
            notice.category.as_str(),
            escape(&notice.message)
        );
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>{title}</title></head>
<body>
<nav>{nav}</nav>
{flashes}
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape(title),
    )
}

pub fn landing(user: Option<&User>, notices: &[Notice]) -> String {
    let greeting = match user {
        Some(user) => format!("<p>Welcome back, {}.</p>", escape(&user.username)),
        None => String::from("<p>Welcome.</p>"),
    };

    let body = format!(
        r#"<h1>MainSite</h1>
{greeting}
<p><a href="/site/">Browse the site</a></p>"#
    );
    layout("MainSite", user, notices, &body)
}

pub fn login(notices: &[Notice]) -> String {
    let body = r#"<h1>Log in</h1>
<form method="post" action="/login">
<label>Username <input name="username" required></label>
<label>Password <input name="password" type="password" required></label>
<label><input name="remember" type="checkbox"> Remember me</label>
<button type="submit">Log in</button>
</form>"#;
    layout("Log in", None, notices, body)
}

pub fn signup(user: Option<&User>, notices: &[Notice]) -> String {
    let body = r#"<h1>Sign up</h1>
<form method="post" action="/signup">
<label>Username <input name="username" minlength="3" maxlength="16" required></label>
<label>Password <input name="password" type="password" minlength="8" required></label>
<button type="submit">Sign up</button>
</form>"#;
    layout("Sign up", user, notices, body)
}

pub fn admin(user: &User, users: &[User], notices: &[Notice]) -> String {
    let mut rows = String::new();
    for u in users {
        let _ = write!(
            rows,
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            u.id,
            escape(&u.username),
            if u.is_admin { "yes" } else { "no" }
        );
    }

    let body = format!(
        "<h1>Users</h1>
<table>
<tr><th>id</th><th>username</th><th>admin</th></tr>
{rows}</table>"
    );
    layout("Admin", Some(user), notices, &body)
}
