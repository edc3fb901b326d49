use uuid::Uuid;

use crate::client::Backend;
use crate::dto::auth_dto::SessionResponse;
use crate::error::Result;
use crate::models::profile::Profile;

/// The signed-in user, passed explicitly to whatever needs it.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    session: Option<SessionResponse>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start of a session, with the response from sign-in or sign-up.
    pub fn initialize(&mut self, session: SessionResponse) {
        tracing::info!(profile_id = %session.profile.id, "session started");
        self.session = Some(session);
    }

    /// Adopt a rotated token and reload the profile it belongs to. The
    /// backend is switched to the new token first; on failure it goes back
    /// to the old one.
    pub async fn refresh(&mut self, backend: &dyn Backend, access_token: String) -> Result<()> {
        backend.set_token(Some(access_token.clone()));
        let profile = match backend.current_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                backend.set_token(self.access_token().map(str::to_string));
                return Err(e);
            }
        };
        match self.session.as_mut() {
            Some(session) => {
                session.access_token = access_token;
                session.profile = profile;
            }
            None => {
                self.session = Some(SessionResponse {
                    access_token,
                    token_type: "Bearer".to_string(),
                    expires_in: 0,
                    profile,
                })
            }
        }
        Ok(())
    }

    pub fn teardown(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::info!(profile_id = %session.profile.id, "session ended");
        }
    }

    pub fn current_profile(&self) -> Option<&Profile> {
        self.session.as_ref().map(|s| &s.profile)
    }

    pub fn profile_id(&self) -> Option<Uuid> {
        self.current_profile().map(|p| p.id)
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.access_token.as_str())
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}
