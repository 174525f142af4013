//! Wiring of the session machinery for one CLI invocation.
//!
//! Exactly one store, gateway client and scheduler are created here and
//! shared by every command.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, warn};

use gatekeep_core::storage::{
    AuthCookieJar, CredentialStorage, FileStorage, KeyringStorage, MemoryStorage,
};
use gatekeep_core::{
    AuthClient, AuthGateway, Authenticator, Config, Environment, RefreshScheduler, RouteGuard,
    SessionStore, StorageBackend,
};

pub struct App {
    pub config: Config,
    pub env: Environment,
    pub store: Arc<SessionStore>,
    pub auth: Authenticator,
    pub scheduler: RefreshScheduler,
    pub guard: RouteGuard,
    /// Process-lifetime flags, e.g. the login redirect override
    pub transient: Arc<MemoryStorage>,
}

impl App {
    /// Build the app and restore any stored session
    pub fn new() -> Result<Self> {
        let config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        let env = Environment::from_env();

        let storage: Arc<dyn CredentialStorage> = match config.storage {
            StorageBackend::File => Arc::new(FileStorage::new(config.data_dir()?)),
            StorageBackend::Keyring if KeyringStorage::is_durable() => Arc::new(KeyringStorage::new()),
            StorageBackend::Keyring => {
                warn!("No native keychain on this platform, storing credentials in a file");
                Arc::new(FileStorage::new(config.data_dir()?))
            }
        };
        debug!(backend = ?config.storage, "Credential storage configured");

        let cookies = Arc::new(AuthCookieJar::new());
        let store = Arc::new(SessionStore::new(storage, cookies.clone()));
        if config.auto_login.is_some() {
            store.set_auto_login(config.auto_login);
        }

        let base_url = config.api_base_url(&env);
        debug!(%base_url, "Auth service configured");
        let gateway: Arc<dyn AuthGateway> = Arc::new(AuthClient::new(&base_url, cookies)?);

        let auth = Authenticator::new(store.clone(), gateway.clone());
        let scheduler = RefreshScheduler::new(store.clone(), gateway, env.refresh_interval());
        let transient = Arc::new(MemoryStorage::new());
        let guard = RouteGuard::new(store.clone(), transient.clone(), env.auto_login_enabled);

        match auth.restore() {
            Ok(restored) => debug!(restored, "Session restore finished"),
            Err(e) => warn!(error = %e, "Failed to restore session from storage"),
        }

        Ok(Self {
            config,
            env,
            store,
            auth,
            scheduler,
            guard,
            transient,
        })
    }
}
