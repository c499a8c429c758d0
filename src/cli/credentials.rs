//! Interactive credential prompt for terminal sessions.

use crate::error::SyncError;
use crate::sync::{CredentialProvider, Credentials, EnvCredentials};
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Environment credentials first, otherwise ask once per process on the terminal.
#[derive(Default)]
pub struct PromptCredentials {
    answered: Mutex<Option<Credentials>>,
}

impl PromptCredentials {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialProvider for PromptCredentials {
    async fn credentials(&self, remote_url: &str) -> Result<Option<Credentials>, SyncError> {
        if let Some(creds) = EnvCredentials.credentials(remote_url).await? {
            return Ok(Some(creds));
        }
        let mut answered = self.answered.lock().await;
        if let Some(creds) = answered.as_ref() {
            return Ok(Some(creds.clone()));
        }

        let prompt_url = remote_url.to_string();
        let creds = tokio::task::spawn_blocking(move || -> Result<Credentials, dialoguer::Error> {
            use dialoguer::{Input, Password};
            let username: String = Input::new()
                .with_prompt(format!("Username for {}", prompt_url))
                .interact_text()?;
            let password = Password::new().with_prompt("Password").interact()?;
            Ok(Credentials::new(username, password))
        })
        .await
        .map_err(|e| SyncError::Worker(e.to_string()))?
        .map_err(|e| SyncError::AuthenticationFailed(format!("Failed to get user input: {}", e)))?;

        *answered = Some(creds.clone());
        Ok(Some(creds))
    }

    fn provider_name(&self) -> &str {
        "prompt"
    }
}
