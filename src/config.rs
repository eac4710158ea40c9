// ABOUTME: Loads migration settings from a TOML file and merges CLI overrides
// ABOUTME: Resolves endpoint URLs and validates batch size, parallelism, and filters

use crate::filters::RelationFilter;
use crate::mysql::{extract_database_name, redact_password, validate_mysql_url};
use crate::schema::{ReadOptions, StatementErrorPolicy};
use crate::transfer::DEFAULT_BATCH_SIZE;
use crate::utils::validate_source_target_different;
use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use url::Url;

/// Contents of a migration config file; every section is optional
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub source: Option<EndpointConfig>,
    pub destination: Option<EndpointConfig>,
    #[serde(default)]
    pub transfer: TransferSection,
    #[serde(default)]
    pub schema: SchemaSection,
}

/// One server, either as a full URL or as separate fields
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

impl EndpointConfig {
    fn has_fields(&self) -> bool {
        self.host.is_some()
            || self.port.is_some()
            || self.user.is_some()
            || self.password.is_some()
            || self.database.is_some()
    }

    /// Build the connection URL; user and password are percent-encoded
    pub fn to_url(&self, section: &str) -> Result<String> {
        if let Some(url) = &self.url {
            if self.has_fields() {
                bail!(
                    "[{}] sets both 'url' and individual connection fields; use one or the other",
                    section
                );
            }
            return Ok(url.clone());
        }

        let host = self
            .host
            .as_deref()
            .ok_or_else(|| anyhow!("[{}] needs either 'url' or 'host'", section))?;

        let mut url = Url::parse(&format!("mysql://{}", host))
            .with_context(|| format!("Invalid host '{}' in [{}]", host, section))?;
        url.set_port(self.port)
            .map_err(|_| anyhow!("Cannot set port in [{}]", section))?;
        if let Some(user) = &self.user {
            url.set_username(user)
                .map_err(|_| anyhow!("Cannot set user in [{}]", section))?;
        }
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| anyhow!("Cannot set password in [{}]", section))?;
        }
        if let Some(database) = &self.database {
            url.set_path(&format!("/{}", database));
        }

        Ok(url.to_string())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferSection {
    pub batch_size: Option<usize>,
    pub parallel_tables: Option<usize>,
    /// Keep foreign key checks on in the destination session (off by default)
    pub foreign_key_checks: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    pub on_statement_error: Option<StatementErrorPolicy>,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

pub fn load_config_file(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("Failed to parse TOML config at {}", path.display()))
}

/// Values given on the command line; each one wins over the file
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub source: Option<String>,
    pub target: Option<String>,
    pub batch_size: Option<usize>,
    pub parallel_tables: Option<usize>,
    pub skip_failed_ddl: bool,
    pub include: Option<Vec<String>>,
    pub exclude: Option<Vec<String>>,
}

/// Fully resolved and validated settings for one run
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub source_url: String,
    pub target_url: String,
    pub batch_size: usize,
    pub parallel_tables: usize,
    pub foreign_key_checks: bool,
    pub read_options: ReadOptions,
}

impl MigrationConfig {
    pub fn resolve(file: FileConfig, overrides: ConfigOverrides) -> Result<Self> {
        let (source_url, read_options) = resolve_source(&file, &overrides)?;
        let target_url = match overrides.target {
            Some(url) => url,
            None => file
                .destination
                .as_ref()
                .map(|d| d.to_url("destination"))
                .transpose()?
                .ok_or_else(|| anyhow!("No target given; pass --target or set [destination]"))?,
        };

        validate_mysql_url(&target_url).context("Invalid target")?;
        if extract_database_name(&target_url).is_none() {
            bail!(
                "Target '{}' must name the destination schema",
                redact_password(&target_url)
            );
        }
        validate_source_target_different(&source_url, &target_url)?;

        let batch_size = overrides
            .batch_size
            .or(file.transfer.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("Batch size must be at least 1");
        }

        let parallel_tables = overrides
            .parallel_tables
            .or(file.transfer.parallel_tables)
            .unwrap_or(1);
        if parallel_tables == 0 {
            bail!("parallel_tables must be at least 1");
        }

        Ok(Self {
            source_url,
            target_url,
            batch_size,
            parallel_tables,
            foreign_key_checks: file.transfer.foreign_key_checks.unwrap_or(false),
            read_options,
        })
    }

    /// Schema named by the source URL
    pub fn source_schema(&self) -> Result<String> {
        extract_database_name(&self.source_url)
            .ok_or_else(|| anyhow!("Source URL does not name a schema"))
    }
}

/// Resolve the source URL and schema-read options alone
///
/// Used by commands that never touch a destination.
pub fn resolve_source(
    file: &FileConfig,
    overrides: &ConfigOverrides,
) -> Result<(String, ReadOptions)> {
    let source_url = match &overrides.source {
        Some(url) => url.clone(),
        None => file
            .source
            .as_ref()
            .map(|s| s.to_url("source"))
            .transpose()?
            .ok_or_else(|| anyhow!("No source given; pass --source or set [source]"))?,
    };

    validate_mysql_url(&source_url).context("Invalid source")?;
    if extract_database_name(&source_url).is_none() {
        bail!(
            "Source '{}' must name the schema to migrate",
            redact_password(&source_url)
        );
    }

    let on_statement_error = if overrides.skip_failed_ddl {
        StatementErrorPolicy::Skip
    } else {
        file.schema.on_statement_error.unwrap_or_default()
    };

    // Filters from the command line replace the file's filters as a pair
    let (include, exclude) = if overrides.include.is_some() || overrides.exclude.is_some() {
        (overrides.include.clone(), overrides.exclude.clone())
    } else {
        (file.schema.include.clone(), file.schema.exclude.clone())
    };
    let filter = RelationFilter::new(include, exclude)?;

    Ok((
        source_url,
        ReadOptions {
            on_statement_error,
            filter,
        },
    ))
}
