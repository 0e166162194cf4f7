//! Server-rendered views.
//!
//! One function per view, each producing escaped HTML inside a shared page
//! chrome. Treated as an opaque `render(view, data) -> bytes` collaborator
//! by the rest of the application.

use axum::response::Html;
use std::fmt::Write;

use crate::models::{Snippet, User};
use crate::snipshare::forms::FieldErrors;

/// Data every page needs for its chrome: nav state, the CSRF token for
/// embedded forms, and an optional one-shot flash message.
#[derive(Debug, Clone, Default)]
pub struct Chrome {
    pub authenticated: bool,
    pub csrf_token: String,
    pub flash: Option<String>,
}

pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn csrf_field(csrf_token: &str) -> String {
    format!(
        r#"<input type="hidden" name="csrf_token" value="{}">"#,
        escape(csrf_token)
    )
}

fn field_error(errors: &FieldErrors, field: &str) -> String {
    errors.get(field).map_or_else(String::new, |msg| {
        format!(r#"<label class="error">{}</label>"#, escape(msg))
    })
}

fn format_date(date: &chrono::DateTime<chrono::Utc>) -> String {
    date.format("%d %b %Y at %H:%M").to_string()
}

/// Wrap a view body in the page chrome.
#[must_use]
pub fn page(title: &str, chrome: &Chrome, main: &str) -> Html<String> {
    let nav_right = if chrome.authenticated {
        format!(
            concat!(
                r#"<a href="/snippet/create">Create snippet</a>"#,
                r#"<a href="/account/view">Account</a>"#,
                r#"<form action="/user/logout" method="POST">{}"#,
                r#"<button>Logout</button></form>"#
            ),
            csrf_field(&chrome.csrf_token)
        )
    } else {
        concat!(
            r#"<a href="/user/signup">Signup</a>"#,
            r#"<a href="/user/login">Login</a>"#
        )
        .to_string()
    };

    let flash = chrome.flash.as_ref().map_or_else(String::new, |msg| {
        format!(r#"<div class="flash">{}</div>"#, escape(msg))
    });

    Html(format!(
        concat!(
            "<!doctype html>\n",
            r#"<html lang="en"><head><meta charset="utf-8">"#,
            "<title>{title} - Snipshare</title>",
            r#"<link rel="stylesheet" href="/static/css/main.css">"#,
            "</head><body>",
            "<header><h1><a href=\"/\">Snipshare</a></h1></header>",
            r#"<nav><div><a href="/">Home</a><a href="/about">About</a></div>"#,
            "<div>{nav_right}</div></nav>",
            "<main>{flash}{main}</main>",
            "<footer>Powered by Snipshare</footer>",
            r#"<script src="/static/js/main.js"></script>"#,
            "</body></html>"
        ),
        title = escape(title),
        nav_right = nav_right,
        flash = flash,
        main = main,
    ))
}

#[must_use]
pub fn home_body(snippets: &[Snippet]) -> String {
    if snippets.is_empty() {
        return "<h2>Latest Snippets</h2><p>There's nothing to see here... yet!</p>".to_string();
    }

    let mut rows = String::new();
    for snippet in snippets {
        let _ = write!(
            rows,
            r#"<tr><td><a href="/snippet/view/{id}">{title}</a></td><td>{created}</td><td>#{id}</td></tr>"#,
            id = snippet.id,
            title = escape(&snippet.title),
            created = format_date(&snippet.created),
        );
    }

    format!(
        concat!(
            "<h2>Latest Snippets</h2>",
            "<table><tr><th>Title</th><th>Created</th><th>ID</th></tr>{}</table>"
        ),
        rows
    )
}

#[must_use]
pub fn about_body() -> String {
    concat!(
        "<h2>About</h2>",
        "<p>Snipshare is a place to share short snippets of text. ",
        "Snippets expire after a fixed time and anyone with the link can read them.</p>"
    )
    .to_string()
}

#[must_use]
pub fn snippet_body(snippet: &Snippet) -> String {
    format!(
        concat!(
            r#"<div class="snippet"><div class="metadata"><strong>{title}</strong>"#,
            "<span>#{id}</span></div>",
            "<pre><code>{content}</code></pre>",
            r#"<div class="metadata"><time>Created: {created}</time>"#,
            "<time>Expires: {expires}</time></div></div>"
        ),
        title = escape(&snippet.title),
        id = snippet.id,
        content = escape(&snippet.content),
        created = format_date(&snippet.created),
        expires = format_date(&snippet.expires),
    )
}

#[must_use]
pub fn snippet_form_body(
    csrf_token: &str,
    title: &str,
    content: &str,
    expires: i64,
    errors: &FieldErrors,
) -> String {
    let mut expires_options = String::new();
    for (days, label) in [(365i64, "One Year"), (7, "One Week"), (1, "One Day")] {
        let checked = if days == expires { " checked" } else { "" };
        let _ = write!(
            expires_options,
            r#"<label><input type="radio" name="expires" value="{days}"{checked}> {label}</label>"#,
        );
    }

    format!(
        concat!(
            "<h2>Create a New Snippet</h2>",
            r#"<form action="/snippet/create" method="POST">{csrf}"#,
            "<div>{title_error}<label>Title:</label>",
            r#"<input type="text" name="title" value="{title}"></div>"#,
            "<div>{content_error}<label>Content:</label>",
            "<textarea name=\"content\">{content}</textarea></div>",
            "<div>{expires_error}<label>Delete in:</label>{expires_options}</div>",
            r#"<div><input type="submit" value="Publish snippet"></div></form>"#
        ),
        csrf = csrf_field(csrf_token),
        title_error = field_error(errors, "title"),
        title = escape(title),
        content_error = field_error(errors, "content"),
        content = escape(content),
        expires_error = field_error(errors, "expires"),
        expires_options = expires_options,
    )
}

#[must_use]
pub fn signup_body(csrf_token: &str, name: &str, email: &str, errors: &FieldErrors) -> String {
    format!(
        concat!(
            "<h2>Signup</h2>",
            r#"<form action="/user/signup" method="POST" novalidate>{csrf}"#,
            "<div>{name_error}<label>Name:</label>",
            r#"<input type="text" name="name" value="{name}"></div>"#,
            "<div>{email_error}<label>Email:</label>",
            r#"<input type="email" name="email" value="{email}"></div>"#,
            "<div>{password_error}<label>Password:</label>",
            r#"<input type="password" name="password"></div>"#,
            r#"<div><input type="submit" value="Signup"></div></form>"#
        ),
        csrf = csrf_field(csrf_token),
        name_error = field_error(errors, "name"),
        name = escape(name),
        email_error = field_error(errors, "email"),
        email = escape(email),
        password_error = field_error(errors, "password"),
    )
}

#[must_use]
pub fn login_body(csrf_token: &str, email: &str, errors: &FieldErrors) -> String {
    let non_field: String = errors
        .non_field()
        .iter()
        .map(|msg| format!(r#"<div class="error">{}</div>"#, escape(msg)))
        .collect();

    format!(
        concat!(
            "<h2>Login</h2>",
            r#"<form action="/user/login" method="POST" novalidate>{csrf}{non_field}"#,
            "<div>{email_error}<label>Email:</label>",
            r#"<input type="email" name="email" value="{email}"></div>"#,
            "<div>{password_error}<label>Password:</label>",
            r#"<input type="password" name="password"></div>"#,
            r#"<div><input type="submit" value="Login"></div></form>"#
        ),
        csrf = csrf_field(csrf_token),
        non_field = non_field,
        email_error = field_error(errors, "email"),
        email = escape(email),
        password_error = field_error(errors, "password"),
    )
}

#[must_use]
pub fn account_body(user: &User) -> String {
    format!(
        concat!(
            "<h2>Your Account</h2>",
            "<table>",
            "<tr><th>Name</th><td>{name}</td></tr>",
            "<tr><th>Email</th><td>{email}</td></tr>",
            "<tr><th>Joined</th><td>{joined}</td></tr>",
            r#"<tr><th>Password</th><td><a href="/account/password/update">Change password</a></td></tr>"#,
            "</table>"
        ),
        name = escape(&user.name),
        email = escape(&user.email),
        joined = format_date(&user.created),
    )
}

#[must_use]
pub fn password_form_body(csrf_token: &str, errors: &FieldErrors) -> String {
    format!(
        concat!(
            "<h2>Change Password</h2>",
            r#"<form action="/account/password/update" method="POST" novalidate>{csrf}"#,
            "<div>{current_error}<label>Current password:</label>",
            r#"<input type="password" name="current_password"></div>"#,
            "<div>{new_error}<label>New password:</label>",
            r#"<input type="password" name="new_password"></div>"#,
            "<div>{confirm_error}<label>Confirm new password:</label>",
            r#"<input type="password" name="confirm_password"></div>"#,
            r#"<div><input type="submit" value="Change password"></div></form>"#
        ),
        csrf = csrf_field(csrf_token),
        current_error = field_error(errors, "current_password"),
        new_error = field_error(errors, "new_password"),
        confirm_error = field_error(errors, "confirm_password"),
    )
}

#[must_use]
pub fn not_found_body() -> String {
    "<h2>Page Not Found</h2><p>Sorry, we couldn't find what you were looking for.</p>".to_string()
}

#[must_use]
pub fn server_error_body() -> String {
    "<h2>Internal Server Error</h2><p>Sorry, something went wrong.</p>".to_string()
}

#[must_use]
pub fn forbidden_body() -> String {
    "<h2>Forbidden</h2><p>The request could not be validated. Go back and try again.</p>"
        .to_string()
}
