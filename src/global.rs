use std::path::PathBuf;
use std::sync::Arc;

use parse_display::Display;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::RwLock;

mod event;
pub use event::*;

use crate::{
    bridge::{
        discover_bridges, register_user, Bridge, BridgeError, DiscoveredBridge, DummyBridge,
        HttpBridge, RegisteredUser,
    },
    models::{Config, ConfigError},
    reconciler::{GroupLocks, Reconciler},
};

#[derive(Debug, Error)]
pub enum GlobalError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Where group requests are sent
#[derive(Display, Clone)]
pub enum Backend {
    #[display("http")]
    Http,
    #[display("dummy")]
    Dummy(Arc<DummyBridge>),
}

#[derive(Clone)]
pub struct Global(Arc<RwLock<GlobalData>>);

impl Global {
    pub async fn read_config<T>(&self, f: impl FnOnce(&Config) -> T) -> T {
        let data = self.0.read().await;
        f(&data.config)
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.0.read().await.event_tx.subscribe()
    }

    pub async fn publish(&self, event: Event) {
        // No receivers is not an error, there may just be no client connected
        if let Ok(count) = self.0.read().await.event_tx.send(event) {
            trace!(count, "published event");
        }
    }

    /// Bridge to send group requests to
    ///
    /// The same bridge, and so the same connection pool, is returned until the
    /// bridge configuration changes.
    pub async fn bridge(&self) -> Result<Arc<dyn Bridge>, BridgeError> {
        if let Some(bridge) = &self.0.read().await.bridge {
            return Ok(bridge.clone());
        }

        let mut data = self.0.write().await;
        if let Some(bridge) = &data.bridge {
            return Ok(bridge.clone());
        }

        let bridge = data.build_bridge()?;
        data.bridge = Some(bridge.clone());
        Ok(bridge)
    }

    pub async fn reconciler(&self) -> Result<Reconciler<Arc<dyn Bridge>>, BridgeError> {
        let reconciler = Reconciler::new(self.bridge().await?);

        let data = self.0.read().await;
        Ok(if data.config.web.serialize_group_updates {
            reconciler.with_group_locks(data.locks.clone())
        } else {
            reconciler
        })
    }

    /// Look for bridges and remember the first one found
    #[instrument(skip(self))]
    pub async fn discover(&self) -> Result<Vec<DiscoveredBridge>, GlobalError> {
        let (backend, timeout) = {
            let data = self.0.read().await;
            (data.backend.clone(), data.config.bridge.timeout())
        };

        let bridges = match backend {
            Backend::Http => discover_bridges(timeout).await?,
            Backend::Dummy(dummy) => vec![dummy.discovered()],
        };

        let first = bridges.first().ok_or(BridgeError::NoBridgeFound)?;
        info!(address = %first.address, "using bridge");

        self.0
            .write()
            .await
            .update_config(|config| config.bridge.ip = Some(first.address.clone()))
            .await?;

        Ok(bridges)
    }

    /// Register a new user on the configured bridge and remember it
    ///
    /// Fails with [BridgeError::LinkButtonNotPressed] unless the bridge button was
    /// pressed recently.
    #[instrument(skip(self))]
    pub async fn register(&self) -> Result<RegisteredUser, GlobalError> {
        let (backend, address, device_type, timeout) = {
            let data = self.0.read().await;
            let config = &data.config.bridge;

            (
                data.backend.clone(),
                config.ip.clone().ok_or(BridgeError::NotConfigured)?,
                config.device_type.clone(),
                config.timeout(),
            )
        };

        let user = match backend {
            Backend::Http => register_user(&address, &device_type, timeout).await?,
            Backend::Dummy(dummy) => dummy.register(),
        };

        self.0
            .write()
            .await
            .update_config(|config| config.bridge.username = Some(user.username.clone()))
            .await?;

        Ok(user)
    }

    #[instrument(skip(self))]
    pub async fn clear_bridge_config(&self) -> Result<(), GlobalError> {
        self.0
            .write()
            .await
            .update_config(|config| config.bridge.clear())
            .await?;

        info!("cleared bridge configuration");
        Ok(())
    }
}

pub struct GlobalData {
    config: Config,
    /// File the configuration is saved to on change, if any
    config_path: Option<PathBuf>,
    backend: Backend,
    /// Built from `config` on first use
    bridge: Option<Arc<dyn Bridge>>,
    event_tx: broadcast::Sender<Event>,
    locks: GroupLocks,
}

impl GlobalData {
    pub fn new(config: &Config) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            config: config.clone(),
            config_path: None,
            backend: Backend::Http,
            bridge: None,
            event_tx,
            locks: GroupLocks::new(),
        }
    }

    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Send group requests to `dummy`, which is considered registered already
    pub fn with_dummy_bridge(mut self, dummy: Arc<DummyBridge>) -> Self {
        let bridge = &mut self.config.bridge;
        bridge.ip = Some(dummy.discovered().address);
        bridge.username = Some(dummy.register().username);

        self.backend = Backend::Dummy(dummy);
        self
    }

    pub fn wrap(self) -> Global {
        info!(backend = %self.backend, "initialized global state");
        Global(Arc::new(RwLock::new(self)))
    }

    fn build_bridge(&self) -> Result<Arc<dyn Bridge>, BridgeError> {
        let config = &self.config.bridge;

        match (&self.backend, &config.ip, &config.username) {
            (Backend::Dummy(dummy), Some(_), Some(_)) => Ok(dummy.clone()),
            (Backend::Http, Some(ip), Some(username)) => {
                Ok(Arc::new(HttpBridge::new(ip, username, config.timeout())?))
            }
            _ => Err(BridgeError::NotConfigured),
        }
    }

    /// Apply `f` to the configuration and save it
    ///
    /// If saving fails, the configuration is left unchanged.
    async fn update_config(&mut self, f: impl FnOnce(&mut Config)) -> Result<(), ConfigError> {
        let mut config = self.config.clone();
        f(&mut config);

        if let Some(path) = &self.config_path {
            config.save_file(path).await?;
        }

        self.config = config;
        self.bridge = None;
        Ok(())
    }
}
