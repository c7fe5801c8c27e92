use secrecy::{ExposeSecret as _, SecretString};
use url::Url;

use super::client::{Client, RegisterRequest, User};
use super::store::{SessionStore, TOKEN_KEY, USER_KEY};
use crate::Result;
use crate::error::Error;

/// The signed-in user and token, passed explicitly to whatever needs them.
///
/// State is read from the [`SessionStore`] once in [`Self::load`] and written back by
/// [`Self::login`], [`Self::logout`] and [`Self::save`]. Operations that talk to the API report
/// success as a `bool` and keep the failure message in [`Self::last_error`].
#[derive(Debug)]
pub struct SessionContext<S: SessionStore> {
    store: S,
    token: Option<SecretString>,
    user: Option<User>,
    last_error: Option<String>,
}

impl<S: SessionStore> SessionContext<S> {
    /// Restores the session persisted in `store`. A user record that no longer parses is removed.
    pub fn load(mut store: S) -> Self {
        let token = store.get(TOKEN_KEY).map(SecretString::from);
        let user = store
            .get(USER_KEY)
            .and_then(|raw| match serde_json::from_str::<User>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "Discarding unreadable persisted user");
                    #[cfg(not(feature = "tracing"))]
                    let _ = &e;
                    None
                }
            });

        if user.is_none()
            && let Err(e) = store.remove(USER_KEY)
        {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Unable to remove persisted user");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }

        Self {
            store,
            token,
            user,
            last_error: None,
        }
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn token(&self) -> Option<&SecretString> {
        self.token.as_ref()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn register(
        &mut self,
        client: &Client,
        username: &str,
        password: &str,
        nickname: &str,
    ) -> bool {
        self.last_error = None;
        let request = RegisterRequest::new(username, password, nickname);

        match client.register(&request).await {
            Ok(()) => true,
            Err(e) => {
                self.last_error = Some(failure_message(&e));
                false
            }
        }
    }

    /// Logs in and persists the token and user on success.
    pub async fn login(&mut self, client: &Client, username: &str, password: &str) -> bool {
        self.last_error = None;

        let data = match client.login(username, password).await {
            Ok(data) => data,
            Err(e) => {
                self.last_error = Some(failure_message(&e));
                return false;
            }
        };

        let previous_user = self.user.replace(User::from(&data));
        let previous_token = self.token.replace(SecretString::from(data.token));

        if let Err(e) = self.save() {
            #[cfg(feature = "tracing")]
            tracing::warn!(error = %e, "Unable to persist session");
            self.user = previous_user;
            self.token = previous_token;
            // A partial write may have reached the store already
            if let Err(restore) = self.save() {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %restore, "Unable to restore persisted session");
                #[cfg(not(feature = "tracing"))]
                let _ = &restore;
            }
            self.last_error = Some(e.to_string());
            return false;
        }
        true
    }

    /// Forgets the session in memory and in the store.
    pub fn logout(&mut self) -> Result<()> {
        self.token = None;
        self.user = None;
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USER_KEY)
    }

    /// Writes the current token and user to the store.
    pub fn save(&mut self) -> Result<()> {
        match &self.token {
            Some(token) => self
                .store
                .set(TOKEN_KEY, token.expose_secret().to_owned())?,
            None => self.store.remove(TOKEN_KEY)?,
        }
        match &self.user {
            Some(user) => self.store.set(USER_KEY, serde_json::to_string(user)?),
            None => self.store.remove(USER_KEY),
        }
    }

    /// `{ws_base}/editor/{doc_id}?token=..&username=..` for the signed-in user.
    pub fn editor_url(&self, ws_base: &str, doc_id: &str) -> Result<Url> {
        let (Some(token), Some(user)) = (&self.token, &self.user) else {
            return Err(Error::validation("not logged in"));
        };

        let mut url = Url::parse(ws_base)?;
        url.path_segments_mut()
            .map_err(|()| Error::validation(format!("{ws_base} cannot be a base URL")))?
            .pop_if_empty()
            .push("editor")
            .push(doc_id);
        url.query_pairs_mut()
            .append_pair("token", token.expose_secret())
            .append_pair("username", &user.username);

        Ok(url)
    }
}

/// The API's own message for rejected requests, the full error otherwise.
fn failure_message(error: &Error) -> String {
    error
        .downcast_ref::<crate::error::Status>()
        .map_or_else(|| error.to_string(), |status| status.message.clone())
}
