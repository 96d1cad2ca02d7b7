//! HandlerSpec - what a backend registers: settings profile plus its Loader and/or Manager constructor

use crate::core::Coin;
use crate::error::{CoinError, CoinResult};
use crate::handler::{BuildLoader, BuildManager, Loader, Manager};
use crate::settings::{ResolvedSettings, SettingsProfile};
use std::fmt;
use std::sync::Arc;

pub type LoaderCtor = Arc<dyn Fn(&ResolvedSettings, Vec<Coin>) -> CoinResult<Box<dyn Loader>> + Send + Sync>;
pub type ManagerCtor = Arc<dyn Fn(&ResolvedSettings, Coin) -> CoinResult<Box<dyn Manager>> + Send + Sync>;

#[derive(Clone)]
pub struct HandlerSpec {
    profile: SettingsProfile,
    description: Option<String>,
    coins: Vec<Coin>,
    pub(crate) loader: Option<LoaderCtor>,
    pub(crate) manager: Option<ManagerCtor>,
}

impl HandlerSpec {
    pub fn new(profile: SettingsProfile) -> Self {
        Self { profile, description: None, coins: Vec::new(), loader: None, manager: None }
    }

    pub fn loader<L: BuildLoader>(mut self) -> Self {
        self.loader = Some(Arc::new(|settings: &ResolvedSettings, coins: Vec<Coin>| -> CoinResult<Box<dyn Loader>> {
            Ok(Box::new(L::build(settings, coins)?))
        }));
        self
    }

    pub fn manager<M: BuildManager>(mut self) -> Self {
        self.manager = Some(Arc::new(|settings: &ResolvedSettings, coin: Coin| -> CoinResult<Box<dyn Manager>> {
            Ok(Box::new(M::build(settings, coin)?))
        }));
        self
    }

    pub fn loader_fn<F>(mut self, ctor: F) -> Self
    where F: Fn(&ResolvedSettings, Vec<Coin>) -> CoinResult<Box<dyn Loader>> + Send + Sync + 'static {
        self.loader = Some(Arc::new(ctor));
        self
    }

    pub fn manager_fn<F>(mut self, ctor: F) -> Self
    where F: Fn(&ResolvedSettings, Coin) -> CoinResult<Box<dyn Manager>> + Send + Sync + 'static {
        self.manager = Some(Arc::new(ctor));
        self
    }

    pub fn with_description(mut self, d: impl Into<String>) -> Self { self.description = Some(d.into()); self }

    /// Coins attached at registration time.
    pub fn with_coins(mut self, coins: Vec<Coin>) -> Self { self.coins = coins; self }

    pub fn profile(&self) -> &SettingsProfile { &self.profile }
    pub fn description(&self) -> Option<&str> { self.description.as_deref() }
    pub fn has_loader(&self) -> bool { self.loader.is_some() }
    pub fn has_manager(&self) -> bool { self.manager.is_some() }

    pub(crate) fn take_coins(&mut self) -> Vec<Coin> { std::mem::take(&mut self.coins) }

    pub(crate) fn validate(&self, name: &str) -> CoinResult<()> {
        if name.trim().is_empty() { return Err(CoinError::config("handler name must not be empty")); }
        if !self.has_loader() && !self.has_manager() {
            return Err(CoinError::config(format!("handler {} provides neither a loader nor a manager", name)));
        }
        Ok(())
    }
}

impl fmt::Debug for HandlerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerSpec")
            .field("domain", &self.profile.domain())
            .field("loader", &self.has_loader())
            .field("manager", &self.has_manager())
            .finish()
    }
}
