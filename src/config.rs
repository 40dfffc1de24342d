use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Where the dataset lives on disk and where download archives are staged.
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    pub root: PathBuf,
    pub source_dir: String,
    pub work_dir: PathBuf,
}

impl DatasetConfig {
    pub fn source_path(&self) -> PathBuf {
        self.root.join(&self.source_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub dataset: DatasetConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tidd-dataset".into()),
            audience: std::env::var("JWT_AUDIENCE")
                .unwrap_or_else(|_| "tidd-dataset-users".into()),
            ttl_minutes: parse_ttl_minutes(std::env::var("JWT_TTL_MINUTES").ok())?,
        };

        let root = PathBuf::from(std::env::var("DATASET_PATH").unwrap_or_else(|_| "./data".into()));
        let dataset = DatasetConfig {
            source_dir: std::env::var("DATASET_SOURCE")
                .unwrap_or_else(|_| "dataset_source".into()),
            work_dir: std::env::var("DATASET_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| root.clone()),
            root,
        };

        Ok(Self {
            database_url,
            jwt,
            dataset,
        })
    }
}

const DEFAULT_TTL_MINUTES: i64 = 30;

/// Unset means the default; anything else must be a positive whole number.
fn parse_ttl_minutes(raw: Option<String>) -> anyhow::Result<i64> {
    let Some(raw) = raw else {
        return Ok(DEFAULT_TTL_MINUTES);
    };
    let minutes = raw
        .trim()
        .parse::<i64>()
        .with_context(|| format!("JWT_TTL_MINUTES is not a number: {raw:?}"))?;
    anyhow::ensure!(minutes > 0, "JWT_TTL_MINUTES must be positive, got {minutes}");
    Ok(minutes)
}
