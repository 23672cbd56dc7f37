use std::sync::Mutex;

use uuid::Uuid;

use crate::error::{AppError, Result};

/// The signed-in identity the auth provider hands us. The access token is
/// attached to every backend call; the user id scopes per-viewer queries
/// such as "my vote".
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub access_token: String,
}

/// Current session as delivered by the auth provider's sign-in /
/// token-refresh callbacks. The provider itself (issuance, refresh,
/// redirects) lives outside this crate.
#[derive(Debug, Default)]
pub struct AuthState {
    session: Mutex<Option<Session>>,
}

impl AuthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(session: Session) -> Self {
        Self {
            session: Mutex::new(Some(session)),
        }
    }

    pub fn set_session(&self, session: Session) {
        *self.session.lock().unwrap() = Some(session);
    }

    pub fn clear(&self) {
        *self.session.lock().unwrap() = None;
    }

    pub fn current(&self) -> Result<Session> {
        self.session
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AppError::Authentication("Not signed in".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_fails_when_signed_out() {
        let auth = AuthState::new();
        assert!(matches!(auth.current(), Err(AppError::Authentication(_))));
    }

    #[test]
    fn current_returns_latest_session() {
        let auth = AuthState::new();
        let user_id = Uuid::new_v4();
        auth.set_session(Session {
            user_id,
            access_token: "token".to_string(),
        });

        assert_eq!(auth.current().unwrap().user_id, user_id);

        auth.clear();
        assert!(auth.current().is_err());
    }
}
