// src/core/registry.rs

//! The multi-environment registry (spec §4.7): one `Client` per mobile key
//! (the primary plus each secondary environment), all sharing a single user
//! under one reader-writer lock (spec §5's "shared-context lock"), with
//! truly independent per-environment event buffers (an explicitly decided
//! Open Question — see DESIGN.md).

use crate::config::ClientConfig;
use crate::core::client::Client;
use crate::core::errors::FlagsError;
use crate::core::event_buffer::{DefaultEventBuffer, EventBuffer};
use crate::core::persistence::Persistence;
use crate::core::transport::Transport;
use crate::core::transport::http::HttpTransport;
use crate::core::user::User;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Owns every environment's `Client` plus the user shared across all of
/// them. Grounded on `LDi_makeclient`/`LDClientInit`'s construction of the
/// primary and secondary clients in `client.c`, and on
/// `ReplicationManager`'s DashMap-keyed-by-name registry shape.
pub struct ClientRegistry {
    config: Arc<ClientConfig>,
    shared_user: Arc<RwLock<User>>,
    clients: DashMap<String, Arc<Client>>,
}

impl ClientRegistry {
    /// Builds one `HttpTransport`-backed `Client` per mobile key (primary
    /// plus every entry in `secondary_mobile_keys`), each with its own
    /// `DefaultEventBuffer` but sharing `persistence` and the user lock.
    pub fn start(config: ClientConfig, persistence: Arc<dyn Persistence>) -> Result<Arc<Self>, FlagsError> {
        let config = Arc::new(config);
        let shared_user = Arc::new(RwLock::new(User::anonymous()));
        let clients = DashMap::new();

        let mut environments = vec![(crate::PRIMARY_ENVIRONMENT_NAME.to_string(), config.mobile_key.clone())];
        environments.extend(
            config
                .secondary_mobile_keys
                .iter()
                .map(|(name, key)| (name.clone(), key.clone())),
        );

        let registry = Arc::new(Self {
            config: config.clone(),
            shared_user,
            clients,
        });

        for (environment_name, mobile_key) in environments {
            registry.spawn_client(environment_name, mobile_key, persistence.clone())?;
        }

        Ok(registry)
    }

    fn spawn_client(
        &self,
        environment_name: String,
        mobile_key: String,
        persistence: Arc<dyn Persistence>,
    ) -> Result<(), FlagsError> {
        let transport = HttpTransport::new(
            &self.config.stream_base_url,
            &self.config.polling_base_url,
            &self.config.events_base_url,
            mobile_key,
        )
        .map_err(|e| FlagsError::InvalidConfig(e.to_string()))?;

        let client = Client::spawn(
            environment_name.clone(),
            self.config.clone(),
            self.shared_user.clone(),
            Arc::new(transport) as Arc<dyn Transport>,
            persistence,
            Arc::new(DefaultEventBuffer::new()) as Arc<dyn EventBuffer>,
        );
        self.clients.insert(environment_name, client);
        Ok(())
    }

    pub fn client(&self, environment_name: &str) -> Option<Arc<Client>> {
        self.clients.get(environment_name).map(|entry| entry.clone())
    }

    pub fn primary(&self) -> Result<Arc<Client>, FlagsError> {
        self.client(crate::PRIMARY_ENVIRONMENT_NAME)
            .ok_or_else(|| FlagsError::UnknownEnvironment(crate::PRIMARY_ENVIRONMENT_NAME.to_string()))
    }

    pub fn environment_names(&self) -> Vec<String> {
        self.clients.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Mirrors `LDClientSetOffline` applied to every environment at once.
    pub fn set_offline(&self) {
        for entry in self.clients.iter() {
            entry.value().set_offline();
        }
    }

    /// Mirrors `LDClientSetOnline`: every client transitions back to
    /// Initializing and resumes its workers' normal schedule.
    pub fn set_online(&self) {
        for entry in self.clients.iter() {
            entry.value().set_online();
        }
    }

    /// Replaces the shared user, then re-identifies every environment's
    /// client against it (spec §4.1/§4.7), matching `LDClientIdentify`
    /// iterating the client list under the shared lock.
    pub async fn identify(&self, user: User) {
        *self.shared_user.write().await = user;
        for entry in self.clients.iter() {
            entry.value().identify_locally().await;
        }
    }

    /// Signals every environment's event worker without waiting, matching
    /// `LDClientFlush` applied across the registry.
    pub fn flush(&self) {
        for entry in self.clients.iter() {
            entry.value().flush();
        }
    }

    /// Closes every environment's client (including joining its three
    /// worker tasks) and drops them from the registry, mirroring
    /// `clientCloseIsolated` invoked once per environment from
    /// `LDClientClose`.
    pub async fn close(&self) {
        let names: Vec<String> = self.environment_names();
        for name in names {
            if let Some((_, client)) = self.clients.remove(&name) {
                client.close().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::persistence::FilePersistence;

    #[tokio::test]
    async fn start_creates_primary_and_secondary_clients() {
        let mut config = ClientConfig::for_mobile_key("primary-key");
        config.offline = true;
        config
            .secondary_mobile_keys
            .insert("staging".to_string(), "staging-key".to_string());

        let dir = tempfile::tempdir().unwrap();
        let persistence = Arc::new(FilePersistence::new(dir.into_path()));
        let registry = ClientRegistry::start(config, persistence).unwrap();

        assert!(registry.client(crate::PRIMARY_ENVIRONMENT_NAME).is_some());
        assert!(registry.client("staging").is_some());
        assert!(registry.client("missing").is_none());

        registry.close().await;
        assert!(registry.environment_names().is_empty());
    }
}
