use anyhow::Result;
use tracing::{debug, error, info};

use crate::notice::{Notice, Notifier};

/// Persistent string key-value storage for the credential fields.
pub(crate) trait SettingsStore {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Interactive source of credential values. `None` means the user cancelled.
pub(crate) trait Prompter {
    fn prompt(&mut self, message: &str, default: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CredentialField {
    ServerAddress,
    ApiKey,
    UserId,
}

impl CredentialField {
    /// Acquisition order.
    pub(crate) const ALL: [Self; 3] = [Self::ServerAddress, Self::ApiKey, Self::UserId];

    pub(crate) fn key(self) -> &'static str {
        match self {
            Self::ServerAddress => "server_address",
            Self::ApiKey => "api_key",
            Self::UserId => "user_id",
        }
    }

    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::ServerAddress => "Server address",
            Self::ApiKey => "API key",
            Self::UserId => "User ID",
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Self::ServerAddress => {
                "Enter your Jellyfin server address (e.g. http://192.168.1.1:8096)"
            }
            Self::ApiKey => "Enter your Jellyfin API key (Dashboard -> API Keys)",
            Self::UserId => "Enter your Jellyfin user ID (Dashboard -> Users -> select user)",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Credentials {
    pub(crate) server_address: Option<String>,
    pub(crate) api_key: Option<String>,
    pub(crate) user_id: Option<String>,
}

impl Credentials {
    pub(crate) fn get(&self, field: CredentialField) -> Option<&str> {
        match field {
            CredentialField::ServerAddress => self.server_address.as_deref(),
            CredentialField::ApiKey => self.api_key.as_deref(),
            CredentialField::UserId => self.user_id.as_deref(),
        }
    }

    fn set(&mut self, field: CredentialField, value: String) {
        let slot = match field {
            CredentialField::ServerAddress => &mut self.server_address,
            CredentialField::ApiKey => &mut self.api_key,
            CredentialField::UserId => &mut self.user_id,
        };
        *slot = Some(value);
    }

    pub(crate) fn is_complete(&self) -> bool {
        CredentialField::ALL
            .iter()
            .all(|field| self.get(*field).is_some())
    }
}

pub(crate) struct CredentialStore {
    store: Box<dyn SettingsStore>,
    current: Credentials,
    origin: Option<String>,
}

impl CredentialStore {
    /// Read the persisted fields. `origin` (the page's own address) is only
    /// offered as the default answer when no server address is stored.
    pub(crate) fn load(store: Box<dyn SettingsStore>, origin: Option<String>) -> Self {
        let mut credentials = Self {
            store,
            current: Credentials::default(),
            origin,
        };
        credentials.reload();
        credentials
    }

    pub(crate) fn reload(&mut self) {
        let mut current = Credentials::default();
        for field in CredentialField::ALL {
            match self.store.get(field.key()) {
                Ok(Some(value)) if !value.is_empty() => current.set(field, value),
                Ok(_) => debug!(field = field.key(), "credential not stored"),
                Err(err) => error!(field = field.key(), "failed to read credential: {err:#}"),
            }
        }
        self.current = current;
    }

    pub(crate) fn current(&self) -> &Credentials {
        &self.current
    }

    /// Make sure all three fields are present, prompting when they are not or
    /// when `force_prompt` is set. Returns `false` if the user cancelled any
    /// prompt; fields accepted before the cancellation stay persisted.
    pub(crate) fn ensure(
        &mut self,
        force_prompt: bool,
        prompter: &mut dyn Prompter,
        notifier: &mut dyn Notifier,
    ) -> bool {
        if !force_prompt {
            self.reload();
            if self.current.is_complete() {
                return true;
            }
        }
        info!(force_prompt, "acquiring API credentials");

        for field in CredentialField::ALL {
            let default = match (field, self.current.get(field)) {
                (_, Some(value)) => value.to_string(),
                (CredentialField::ServerAddress, None) => self.origin.clone().unwrap_or_default(),
                (_, None) => String::new(),
            };

            let answer = prompter
                .prompt(field.prompt(), &default)
                .map(|answer| normalize_answer(field, &answer))
                .filter(|answer| !answer.is_empty());
            let Some(value) = answer else {
                info!(field = field.key(), "credential prompt cancelled");
                notifier.notify(Notice::CredentialRequired(field));
                return false;
            };

            if let Err(err) = self.store.set(field.key(), &value) {
                error!(field = field.key(), "failed to persist credential: {err:#}");
                notifier.notify(Notice::CredentialsNotSaved);
                return false;
            }
            self.current.set(field, value);
        }

        info!("API credentials stored");
        true
    }
}

fn normalize_answer(field: CredentialField, answer: &str) -> String {
    let trimmed = answer.trim();
    match field {
        CredentialField::ServerAddress => trimmed.trim_end_matches('/').to_string(),
        _ => trimmed.to_string(),
    }
}
