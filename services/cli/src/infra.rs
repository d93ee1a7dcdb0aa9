use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use decree_engine::config::AppConfig;
use decree_engine::error::AppError;
use decree_engine::rules::repository::IdGenerator;
use decree_engine::rules::{
    generator_for, AttributeService, MemoryRuleStore, RuleCatalog, SimulationEngine,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

pub(crate) type Ids = Box<dyn IdGenerator>;

/// Catalog snapshot loaded from disk together with the services bound to it.
pub(crate) struct Workspace {
    path: PathBuf,
    store: Arc<MemoryRuleStore>,
    pub(crate) attributes: AttributeService<MemoryRuleStore, Ids>,
    pub(crate) catalog: RuleCatalog<MemoryRuleStore, Ids>,
    pub(crate) simulation: SimulationEngine<MemoryRuleStore>,
}

impl Workspace {
    /// A missing snapshot file starts an empty catalog.
    pub(crate) fn open(config: &AppConfig, path_override: Option<&Path>) -> Result<Self, AppError> {
        let path = path_override
            .map(Path::to_path_buf)
            .unwrap_or_else(|| config.catalog.path.clone());
        let store = if path.exists() {
            debug!(path = %path.display(), "loading catalog snapshot");
            MemoryRuleStore::load(&path)?
        } else {
            info!(path = %path.display(), "catalog snapshot not found, starting empty");
            MemoryRuleStore::new()
        };

        let ids = Arc::new(generator_for(
            config.engine.id_strategy,
            store.highest_sequence()?,
        ));
        let store = Arc::new(store);
        Ok(Self {
            attributes: AttributeService::new(store.clone(), ids.clone()),
            catalog: RuleCatalog::new(store.clone(), ids),
            simulation: SimulationEngine::new(store.clone(), &config.engine),
            store,
            path,
        })
    }

    pub(crate) fn store(&self) -> &MemoryRuleStore {
        &self.store
    }

    pub(crate) fn save(&self) -> Result<(), AppError> {
        self.store.save(&self.path)?;
        debug!(path = %self.path.display(), "catalog snapshot written");
        Ok(())
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

/// `name=value` pairs for variable inputs.
pub(crate) fn parse_assignment(raw: &str) -> Result<(String, f64), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, found '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing variable name in '{raw}'"));
    }
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|err| format!("failed to parse '{value}' as a number ({err})"))?;
    Ok((name.to_string(), value))
}
