//! Route table and the login guard in front of it.

use crate::session::SessionManager;
use chatcore::types::ChatId;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Chats,
    Chat(ChatId),
    NewChat,
    NewGroup,
    Login,
}

impl Route {
    /// Parses a path such as `/chat/42`. Unknown paths yield `None`.
    pub fn parse(path: &str) -> Option<Route> {
        let segments: Vec<&str> = path
            .trim()
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        match segments.as_slice() {
            ["chats"] => Some(Route::Chats),
            ["chat", id] => Some(Route::Chat((*id).to_string())),
            ["new-chat"] => Some(Route::NewChat),
            ["new-group"] => Some(Route::NewGroup),
            ["login"] => Some(Route::Login),
            _ => None,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Chats => "/chats".to_string(),
            Route::Chat(id) => format!("/chat/{id}"),
            Route::NewChat => "/new-chat".to_string(),
            Route::NewGroup => "/new-group".to_string(),
            Route::Login => "/login".to_string(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        !matches!(self, Route::Login)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(Route),
    Redirect(Route),
}

impl Navigation {
    /// The route that ends up on screen.
    pub fn route(&self) -> &Route {
        match self {
            Navigation::Render(route) | Navigation::Redirect(route) => route,
        }
    }
}

/// Decides where a navigation to `route` lands.
pub fn guard(route: Route, logged_in: bool) -> Navigation {
    match route {
        Route::Login if logged_in => Navigation::Redirect(Route::Chats),
        route if route.requires_auth() && !logged_in => Navigation::Redirect(Route::Login),
        route => Navigation::Render(route),
    }
}

/// Resolves a raw path against the current session.
pub fn navigate(path: &str, session: &SessionManager) -> Navigation {
    let logged_in = session.is_logged_in();
    match Route::parse(path) {
        Some(route) => guard(route, logged_in),
        None => Navigation::Redirect(guard(Route::Chats, logged_in).route().clone()),
    }
}
