use crate::{config::BorrowkitConfig, paths::BorrowkitPaths};
use eyre::Context as _;
use std::{fs, path::PathBuf};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

/// Apply environment variable overrides (endpoints and price feed credentials).
///
/// `lookup` is `std::env::var` in production; tests pass a map.
fn apply_env_overrides(cfg: &mut BorrowkitConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |var: &str| -> Option<String> {
        lookup(var)
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = get("BORROWKIT_RPC_URL") {
        cfg.rpc.url = v;
    }
    if let Some(v) = get("BORROWKIT_FALLBACK_RPC_URL") {
        cfg.rpc.fallback_url = Some(v);
    }
    if let Some(v) = get("BORROWKIT_PRICE_BASE_URL") {
        cfg.http.price_base_url = v;
    }
    if let Some(v) = get("BORROWKIT_PRICE_API_KEY") {
        cfg.http.price_api_key = Some(v);
    }
}

fn process_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

impl ConfigStore {
    pub fn new(paths: &BorrowkitPaths) -> Self {
        Self {
            path: paths.config_file(),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// A missing file yields defaults; nothing is written.
    pub fn load(&self) -> eyre::Result<BorrowkitConfig> {
        let mut cfg = self.load_file()?;
        apply_env_overrides(&mut cfg, process_env);
        Ok(cfg)
    }

    fn load_file(&self) -> eyre::Result<BorrowkitConfig> {
        if !self.path.exists() {
            return Ok(BorrowkitConfig::default());
        }
        let s = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        toml::from_str(&s).with_context(|| format!("parse {}", self.path.display()))
    }

    pub fn save(&self, cfg: &BorrowkitConfig) -> eyre::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let s = toml::to_string_pretty(cfg).context("serialize config.toml")?;
        fs::write(&self.path, s).with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}
