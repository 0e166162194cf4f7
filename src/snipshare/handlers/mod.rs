pub mod account;
pub mod pages;
pub mod snippets;
pub mod users;

use crate::snipshare::{
    middleware::AuthContext,
    render::Chrome,
    session::{Session, KEY_FLASH},
};

/// Per-request page chrome: nav state, CSRF token for embedded forms, and
/// the flash message (popped, so it only shows once).
pub(crate) fn chrome(session: &Session, auth: AuthContext) -> Chrome {
    Chrome {
        authenticated: auth.is_authenticated(),
        csrf_token: session.csrf_token(),
        flash: session.pop_string(KEY_FLASH),
    }
}
