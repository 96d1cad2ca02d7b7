//! Registry - backend names to handler constructors, symbols to their owning backend
//!
//! Populated explicitly: [`HandlerRegistry::register_handler`], then
//! [`HandlerRegistry::enable_handler`] and [`HandlerRegistry::add_handler_coin`].
//! Lookups resolve a symbol to exactly one enabled backend and construct a fresh
//! handler each call. Only the resolution table (symbol owners, resolved settings)
//! is cached; any mutation or [`HandlerRegistry::reload_handlers`] drops it.
//!
//! Constructors run after the lock is released. A panic while the lock is held
//! (a poisoned mutex) is recovered: the state is taken back and the cache dropped.

mod spec;

pub use spec::{HandlerSpec, LoaderCtor, ManagerCtor};

use crate::core::Coin;
use crate::error::{CoinError, CoinResult};
use crate::handler::{Loader, Manager};
use crate::settings::{CoinSettings, HandlerSettings, ResolvedSettings, SettingsResolver, SymbolSettings};
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

static GLOBAL: Lazy<HandlerRegistry> = Lazy::new(HandlerRegistry::new);

pub struct HandlerRegistry {
    inner: Mutex<RegistryInner>,
}

struct HandlerEntry {
    spec: HandlerSpec,
    enabled: bool,
    coins: Vec<Coin>,
    /// `configure_handler` options, applied to every coin of the handler
    options: Map<String, Value>,
}

#[derive(Default)]
struct Resolution {
    /// symbol -> enabled handlers claiming it
    owners: BTreeMap<String, Vec<String>>,
    /// (handler, symbol) -> flattened settings
    settings: HashMap<(String, String), CoinSettings>,
}

struct RegistryInner {
    handlers: BTreeMap<String, HandlerEntry>,
    settings: HandlerSettings,
    overrides: SymbolSettings,
    cache: Option<Resolution>,
}

impl Default for HandlerRegistry {
    fn default() -> Self { Self::new() }
}

impl HandlerRegistry {
    pub fn new() -> Self { Self::with_settings(HandlerSettings::new()) }

    pub fn with_settings(settings: HandlerSettings) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                handlers: BTreeMap::new(),
                settings,
                overrides: SymbolSettings::new(),
                cache: None,
            }),
        }
    }

    /// Process-wide registry, created empty on first use and never reset implicitly.
    pub fn global() -> &'static HandlerRegistry { &GLOBAL }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("registry lock poisoned by a panicking caller, recovering");
            let mut inner = poisoned.into_inner();
            inner.invalidate();
            self.inner.clear_poison();
            inner
        })
    }

    // ---- Registration ----

    /// Add or replace a backend. Replacing keeps its enabled state and coins.
    pub fn register_handler(&self, name: &str, mut spec: HandlerSpec) -> CoinResult<()> {
        spec.validate(name)?;
        let initial = spec.take_coins();
        let mut inner = self.lock();
        let entry = inner.handlers.entry(name.to_string())
            .or_insert_with(|| HandlerEntry { spec: spec.clone(), enabled: false, coins: Vec::new(), options: Map::new() });
        entry.spec = spec;
        for coin in initial { upsert_coin(&mut entry.coins, coin); }
        tracing::info!(
            handler = name,
            loader = entry.spec.has_loader(),
            manager = entry.spec.has_manager(),
            coins = entry.coins.len(),
            "registered handler"
        );
        inner.invalidate();
        Ok(())
    }

    pub fn enable_handler<I, S>(&self, names: I) -> CoinResult<()>
    where I: IntoIterator<Item = S>, S: AsRef<str> {
        self.set_enabled(names, true)
    }

    pub fn disable_handler<I, S>(&self, names: I) -> CoinResult<()>
    where I: IntoIterator<Item = S>, S: AsRef<str> {
        self.set_enabled(names, false)
    }

    fn set_enabled<I, S>(&self, names: I, enabled: bool) -> CoinResult<()>
    where I: IntoIterator<Item = S>, S: AsRef<str> {
        let names: Vec<String> = names.into_iter().map(|n| n.as_ref().to_string()).collect();
        let mut inner = self.lock();
        // all-or-nothing: reject before touching any entry
        if let Some(unknown) = names.iter().find(|n| !inner.handlers.contains_key(n.as_str())) {
            return Err(CoinError::UnknownHandler(unknown.clone()));
        }
        for name in &names {
            if let Some(entry) = inner.handlers.get_mut(name) {
                if entry.enabled != enabled {
                    entry.enabled = enabled;
                    tracing::info!(handler = name.as_str(), enabled, "handler state changed");
                }
            }
        }
        inner.invalidate();
        Ok(())
    }

    /// Associate a coin with a backend. A coin with the same `symbol` is replaced.
    pub fn add_handler_coin(&self, name: &str, coin: Coin) -> CoinResult<()> {
        let mut inner = self.lock();
        let entry = inner.handlers.get_mut(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        tracing::debug!(handler = name, symbol = coin.symbol(), symbol_id = coin.symbol_id(), "adding coin");
        upsert_coin(&mut entry.coins, coin);
        inner.invalidate();
        Ok(())
    }

    pub fn remove_handler_coin(&self, name: &str, symbol: &str) -> CoinResult<bool> {
        let mut inner = self.lock();
        let entry = inner.handlers.get_mut(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        let before = entry.coins.len();
        entry.coins.retain(|c| c.symbol() != symbol);
        let removed = entry.coins.len() != before;
        inner.invalidate();
        Ok(removed)
    }

    /// Merge per-symbol options, last write wins per key. `options` must be a JSON object.
    pub fn configure_coin(&self, symbol: &str, options: Value) -> CoinResult<()> {
        let options = as_mapping(symbol, options)?;
        let mut inner = self.lock();
        let slot = inner.overrides.entry(symbol.to_string()).or_default();
        for (k, v) in options { slot.insert(k, v); }
        tracing::debug!(symbol, keys = slot.len(), "configured coin");
        inner.invalidate();
        Ok(())
    }

    pub fn coin_options(&self, symbol: &str) -> CoinResult<Map<String, Value>> {
        Ok(self.lock().overrides.get(symbol).cloned().unwrap_or_default())
    }

    /// Merge handler-wide options, last write wins per key. They sit just above the
    /// profile defaults, so caller settings and coin options still override them.
    pub fn configure_handler(&self, name: &str, options: Value) -> CoinResult<()> {
        let options = as_mapping(name, options)?;
        let mut inner = self.lock();
        let entry = inner.handlers.get_mut(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        for (k, v) in options { entry.options.insert(k, v); }
        tracing::debug!(handler = name, keys = entry.options.len(), "configured handler");
        inner.invalidate();
        Ok(())
    }

    pub fn handler_options(&self, name: &str) -> CoinResult<Map<String, Value>> {
        let inner = self.lock();
        let entry = inner.handlers.get(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        Ok(entry.options.clone())
    }

    /// Replace the caller settings mapping wholesale.
    pub fn set_settings(&self, settings: HandlerSettings) -> CoinResult<()> {
        let mut inner = self.lock();
        inner.settings = settings;
        inner.invalidate();
        Ok(())
    }

    pub fn settings(&self) -> CoinResult<HandlerSettings> { Ok(self.lock().settings.clone()) }

    /// Drop the cached resolution table. Registrations, coins, and settings persist.
    pub fn reload_handlers(&self) -> CoinResult<()> {
        let mut inner = self.lock();
        inner.invalidate();
        tracing::info!(handlers = inner.handlers.len(), "reloaded handlers");
        Ok(())
    }

    // ---- Queries ----

    pub fn handler_has_coin(&self, name: &str, symbol_id: &str) -> CoinResult<bool> {
        let inner = self.lock();
        let entry = inner.handlers.get(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        Ok(entry.coins.iter().any(|c| c.symbol_id() == symbol_id))
    }

    pub fn handler_coins(&self, name: &str) -> CoinResult<Vec<Coin>> {
        let inner = self.lock();
        let entry = inner.handlers.get(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        Ok(entry.coins.clone())
    }

    pub fn enabled_handlers(&self) -> CoinResult<Vec<String>> {
        let inner = self.lock();
        Ok(inner.handlers.iter().filter(|(_, e)| e.enabled).map(|(n, _)| n.clone()).collect())
    }

    pub fn is_registered(&self, name: &str) -> CoinResult<bool> { Ok(self.lock().handlers.contains_key(name)) }

    /// `(symbol, handler)` for every coin of every enabled backend with a loader,
    /// ordered by symbol. A symbol claimed twice appears twice.
    pub fn loaders(&self) -> CoinResult<Vec<(String, String)>> {
        Ok(self.lock().claims(|spec| spec.has_loader()))
    }

    pub fn managers(&self) -> CoinResult<Vec<(String, String)>> {
        Ok(self.lock().claims(|spec| spec.has_manager()))
    }

    /// `Ok(false)` when nothing (or a backend without a loader) claims the symbol.
    pub fn has_loader(&self, symbol: &str) -> CoinResult<bool> {
        self.has_role(symbol, |spec| spec.has_loader())
    }

    pub fn has_manager(&self, symbol: &str) -> CoinResult<bool> {
        self.has_role(symbol, |spec| spec.has_manager())
    }

    fn has_role(&self, symbol: &str, role: impl Fn(&HandlerSpec) -> bool) -> CoinResult<bool> {
        let mut inner = self.lock();
        match inner.owner(symbol) {
            Ok(name) => Ok(inner.handlers.get(&name).map(|e| role(&e.spec)).unwrap_or(false)),
            Err(CoinError::NoHandler(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Settings the owning backend would receive for `symbol`.
    pub fn resolved_settings(&self, symbol: &str) -> CoinResult<CoinSettings> {
        let mut inner = self.lock();
        let name = inner.owner(symbol)?;
        let coin = inner.coin(&name, symbol)?;
        inner.coin_settings(&name, &coin)
    }

    // ---- Construction ----

    /// Fresh loader covering only `symbol`.
    pub fn get_loader(&self, symbol: &str) -> CoinResult<Box<dyn Loader>> {
        let mut inner = self.lock();
        let name = inner.owner(symbol)?;
        let ctor = inner.handlers.get(&name).and_then(|e| e.spec.loader.clone())
            .ok_or_else(|| CoinError::NoHandler(format!("{} (handler {} has no loader)", symbol, name)))?;
        let coin = inner.coin(&name, symbol)?;
        let settings = inner.resolve(&name, std::slice::from_ref(&coin))?;
        drop(inner);
        let loader = ctor(&settings, vec![coin])?;
        tracing::debug!(symbol, handler = name.as_str(), loader = loader.name(), "built loader");
        Ok(loader)
    }

    pub fn get_manager(&self, symbol: &str) -> CoinResult<Box<dyn Manager>> {
        let mut inner = self.lock();
        let name = inner.owner(symbol)?;
        let ctor = inner.handlers.get(&name).and_then(|e| e.spec.manager.clone())
            .ok_or_else(|| CoinError::NoHandler(format!("{} (handler {} has no manager)", symbol, name)))?;
        let coin = inner.coin(&name, symbol)?;
        let settings = inner.resolve(&name, std::slice::from_ref(&coin))?;
        drop(inner);
        let manager = ctor(&settings, coin)?;
        tracing::debug!(symbol, handler = name.as_str(), manager = manager.name(), "built manager");
        Ok(manager)
    }

    /// Fresh loader over every coin of an enabled backend.
    pub fn get_handler_loader(&self, name: &str) -> CoinResult<Box<dyn Loader>> {
        let mut inner = self.lock();
        let entry = inner.handlers.get(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        if !entry.enabled {
            return Err(CoinError::NoHandler(format!("handler {} is not enabled", name)));
        }
        let ctor = entry.spec.loader.clone()
            .ok_or_else(|| CoinError::NoHandler(format!("handler {} has no loader", name)))?;
        let coins = entry.coins.clone();
        inner.ensure_cache();
        let settings = inner.resolve(name, &coins)?;
        drop(inner);
        ctor(&settings, coins)
    }
}

impl RegistryInner {
    fn invalidate(&mut self) { self.cache = None; }

    fn ensure_cache(&mut self) {
        if self.cache.is_some() { return; }
        let mut owners: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, entry) in self.handlers.iter().filter(|(_, e)| e.enabled) {
            for coin in &entry.coins {
                owners.entry(coin.symbol().to_string()).or_default().push(name.clone());
            }
        }
        tracing::debug!(symbols = owners.len(), "built resolution table");
        self.cache = Some(Resolution { owners, settings: HashMap::new() });
    }

    fn claims(&self, role: impl Fn(&HandlerSpec) -> bool) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = self.handlers.iter()
            .filter(|(_, e)| e.enabled && role(&e.spec))
            .flat_map(|(name, e)| e.coins.iter().map(move |c| (c.symbol().to_string(), name.clone())))
            .collect();
        out.sort();
        out
    }

    /// The single enabled backend claiming `symbol`.
    fn owner(&mut self, symbol: &str) -> CoinResult<String> {
        self.ensure_cache();
        let claimers = self.cache.as_ref().and_then(|c| c.owners.get(symbol));
        match claimers.map(|v| v.as_slice()) {
            None | Some([]) => Err(CoinError::NoHandler(symbol.to_string())),
            Some([one]) => Ok(one.clone()),
            Some(many) => Err(CoinError::AmbiguousHandler { symbol: symbol.to_string(), handlers: many.to_vec() }),
        }
    }

    fn coin(&self, name: &str, symbol: &str) -> CoinResult<Coin> {
        self.handlers.get(name)
            .and_then(|e| e.coins.iter().find(|c| c.symbol() == symbol))
            .cloned()
            .ok_or_else(|| CoinError::NoHandler(symbol.to_string()))
    }

    fn coin_settings(&mut self, name: &str, coin: &Coin) -> CoinResult<CoinSettings> {
        let key = (name.to_string(), coin.symbol().to_string());
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.settings.get(&key)) {
            return Ok(hit.clone());
        }
        let entry = self.handlers.get(name).ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        let resolved = SettingsResolver::new(entry.spec.profile(), &self.settings)
            .with_handler_options(&entry.options)
            .with_overrides(&self.overrides)
            .resolve_coin(coin)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.settings.insert(key, resolved.clone());
        }
        Ok(resolved)
    }

    fn resolve(&mut self, name: &str, coins: &[Coin]) -> CoinResult<ResolvedSettings> {
        let domain = self.handlers.get(name)
            .map(|e| e.spec.profile().domain().to_string())
            .ok_or_else(|| CoinError::UnknownHandler(name.to_string()))?;
        let mut out = Vec::with_capacity(coins.len());
        for coin in coins { out.push(self.coin_settings(name, coin)?); }
        Ok(ResolvedSettings::from_coins(&domain, out))
    }
}

fn as_mapping(target: &str, options: Value) -> CoinResult<Map<String, Value>> {
    match options {
        Value::Object(map) => Ok(map),
        other => Err(CoinError::config(format!("options for {} must be a mapping, got {}", target, other))),
    }
}

fn upsert_coin(coins: &mut Vec<Coin>, coin: Coin) {
    match coins.iter_mut().find(|c| c.symbol() == coin.symbol()) {
        Some(existing) => *existing = coin,
        None => coins.push(coin),
    }
}
