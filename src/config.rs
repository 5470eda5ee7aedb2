use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::table::Classification;

/// Which persistence backend the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Json,
    Supabase,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(StoreBackend::Json),
            "supabase" => Ok(StoreBackend::Supabase),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

/// How reconciliation reaches the external gene service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMode {
    /// Call the upstream gene API from this process
    Direct,
    /// Invoke the hosted `fetch-gene-data` function
    Function,
}

impl FromStr for LookupMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(LookupMode::Direct),
            "function" => Ok(LookupMode::Function),
            other => Err(format!("unknown lookup mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub store: StoreBackend,
    pub database_path: PathBuf,
    pub supabase_url: Option<String>,
    pub supabase_key: Option<String>,
    pub lookup: LookupMode,
    pub mygene_url: String,
    pub classification: Classification,
    pub session_ttl_secs: u64,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup, environment or otherwise.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            bind_addr: try_load(&lookup, "GENE_BIND_ADDR", "127.0.0.1")?,
            port: try_load(&lookup, "GENE_PORT", "3000")?,
            store: try_load(&lookup, "GENE_STORE", "json")?,
            database_path: try_load(&lookup, "GENE_DATABASE_PATH", "database/genes.json")?,
            supabase_url: lookup("SUPABASE_URL").map(|url| url.trim_end_matches('/').to_string()),
            supabase_key: lookup("SUPABASE_KEY"),
            lookup: try_load(&lookup, "GENE_LOOKUP", "direct")?,
            mygene_url: try_load::<String, _>(&lookup, "MYGENE_URL", "https://mygene.info/v3")?
                .trim_end_matches('/')
                .to_string(),
            classification: try_load(&lookup, "GENE_TABLE_CLASSIFICATION", "tags")?,
            session_ttl_secs: try_load(&lookup, "GENE_SESSION_TTL_SECS", "86400")?,
            static_dir: try_load(&lookup, "GENE_STATIC_DIR", "static")?,
        };

        let needs_supabase =
            config.store == StoreBackend::Supabase || config.lookup == LookupMode::Function;
        if needs_supabase && (config.supabase_url.is_none() || config.supabase_key.is_none()) {
            return Err(AppError::Config(
                "SUPABASE_URL and SUPABASE_KEY are required for the supabase store or function lookup"
                    .to_string(),
            ));
        }

        Ok(config)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Hosted project URL and key, both required together.
    pub fn supabase_credentials(&self) -> AppResult<(&str, &str)> {
        match (self.supabase_url.as_deref(), self.supabase_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => Err(AppError::Config(
                "SUPABASE_URL and SUPABASE_KEY must both be set".to_string(),
            )),
        }
    }
}

fn try_load<T, F>(lookup: &F, key: &str, default: &str) -> AppResult<T>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            AppError::Config(format!("invalid {key}: {e}"))
        })
}
