use anyhow::Result;
use async_trait::async_trait;
use client_core::IdentityProvider;
use reqwest::{Client, StatusCode};
use shared::{
    domain::Principal,
    error::{ApiException, ErrorCode},
    protocol::{SignInRequest, SignInResponse},
};
use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::BackendConfig;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

struct AuthSession {
    id_token: String,
}

/// Email/password identity against the hosted auth endpoint. Identity
/// changes observed through this provider (sign-in, sign-out) are fanned out
/// to `subscribe_changes` listeners.
pub struct RestIdentityProvider {
    http: Client,
    config: BackendConfig,
    session: Mutex<Option<AuthSession>>,
    changes: broadcast::Sender<Option<Principal>>,
}

impl RestIdentityProvider {
    pub fn new(http: Client, config: BackendConfig) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            http,
            config,
            session: Mutex::new(None),
            changes,
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Principal> {
        let response = self
            .http
            .post(self.config.http_url("/auth/sign_in"))
            .json(&SignInRequest {
                email: email.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // The backend's own message may leak account existence; callers
            // only ever see the generic mapping.
            return Err(ApiException::new(ErrorCode::Unauthorized, "credentials rejected").into());
        }

        let body: SignInResponse = response.error_for_status()?.json().await?;
        let principal = Principal {
            id: body.user_id,
            email: body.email,
        };
        *self.session.lock().await = Some(AuthSession {
            id_token: body.id_token,
        });
        info!(user_id = %principal.id, "backend: sign-in accepted");
        let _ = self.changes.send(Some(principal.clone()));
        Ok(principal)
    }

    async fn sign_out(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            self.http
                .post(self.config.http_url("/auth/sign_out"))
                .bearer_auth(&session.id_token)
                .send()
                .await?
                .error_for_status()?;
        }
        let _ = self.changes.send(None);
        info!("backend: signed out");
        Ok(())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<Option<Principal>> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/identity_tests.rs"]
mod tests;
