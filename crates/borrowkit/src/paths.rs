use directories::ProjectDirs;
use eyre::ContextCompat as _;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct BorrowkitPaths {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub log_file: PathBuf,
}

impl BorrowkitPaths {
    pub fn discover() -> eyre::Result<Self> {
        // Test/CI override knobs.
        let config_override = std::env::var("BORROWKIT_CONFIG_DIR").ok();
        let data_override = std::env::var("BORROWKIT_DATA_DIR").ok();
        if let Some(config_dir) = config_override.as_deref().filter(|s| !s.trim().is_empty()) {
            let config_dir = PathBuf::from(config_dir);
            let data_dir = data_override
                .filter(|s| !s.trim().is_empty())
                .map_or_else(|| config_dir.clone(), PathBuf::from);
            return Ok(Self::from_dirs(config_dir, data_dir));
        }

        // Linux: ~/.config/borrowkit, macOS: ~/Library/Application Support/borrowkit
        let proj =
            ProjectDirs::from("", "", "borrowkit").context("failed to resolve project dirs")?;
        Ok(Self::from_dirs(
            proj.config_dir().to_path_buf(),
            proj.data_dir().to_path_buf(),
        ))
    }

    pub fn from_dirs(config_dir: PathBuf, data_dir: PathBuf) -> Self {
        let log_file = data_dir.join("borrowkit.log.jsonl");
        Self {
            config_dir,
            data_dir,
            log_file,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }
}
