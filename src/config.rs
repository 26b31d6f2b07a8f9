use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::domain::{CfaPattern, FormatDescriptor, FormatTable, ImageKind, SampleType};
use crate::error::PhenoError;
use crate::labels::{LabelRule, LabelRules};
use crate::ledger::{DatasetInfo, RESERVED_IMAGE_FIELDS};

pub const DEFAULT_CONFIG_FILE: &str = "phenosync.json";
pub const DEFAULT_REMOTE_ROOT: &str = "/data/pgftp";
pub const DEFAULT_PORT: u16 = 5432;

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub hostname: String,
    pub database: String,
    pub experiment: String,
    pub timezone: String,
    #[serde(default)]
    pub dataformat: BTreeMap<String, FormatEntry>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub remote_root: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub transport: Option<TransportEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct FormatEntry {
    pub datatype: SampleType,
    pub imgtype: ImageKind,
    #[serde(rename = "bit-precision")]
    pub bit_precision: u32,
    #[serde(default)]
    pub bayer: Option<CfaPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportEntry {
    Scp {
        #[serde(default)]
        user: Option<String>,
    },
    Local {
        root: String,
    },
}

#[derive(Debug, Clone)]
pub struct CatalogConnection {
    pub hostname: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    Scp { user: String, host: String },
    Local { root: Utf8PathBuf },
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub connection: CatalogConnection,
    pub experiment: String,
    pub timezone: Tz,
    pub formats: FormatTable,
    pub label_rules: LabelRules,
    pub remote_root: String,
    pub transport: Transport,
}

impl ResolvedConfig {
    pub fn dataset_info(&self) -> DatasetInfo {
        DatasetInfo {
            hostname: self.connection.hostname.clone(),
            database: self.connection.database.clone(),
            experiment: self.experiment.clone(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, PhenoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Err(PhenoError::MissingConfig);
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| PhenoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| PhenoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, PhenoError> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|_| PhenoError::UnknownTimezone(config.timezone.clone()))?;

        let formats = config
            .dataformat
            .iter()
            .map(|(code, entry)| {
                let code: i32 = code.trim().parse().map_err(|_| {
                    PhenoError::InvalidConfig(format!("dataformat code is not an integer: {code}"))
                })?;
                let descriptor =
                    FormatDescriptor::new(entry.datatype, entry.imgtype, entry.bit_precision)?
                        .with_cfa(entry.bayer.unwrap_or_default());
                Ok((code, descriptor))
            })
            .collect::<Result<FormatTable, PhenoError>>()?;

        if let Some(field) = config
            .metadata
            .keys()
            .find(|field| RESERVED_IMAGE_FIELDS.contains(&field.as_str()))
        {
            return Err(PhenoError::InvalidPattern {
                field: field.clone(),
                message: "field name is reserved by the image record".to_string(),
            });
        }
        let label_rules = LabelRules::new(
            config
                .metadata
                .iter()
                .map(|(field, pattern)| LabelRule::new(field, pattern))
                .collect::<Result<Vec<_>, PhenoError>>()?,
        );

        let transport = match config.transport {
            None => Transport::Scp {
                user: "root".to_string(),
                host: config.hostname.clone(),
            },
            Some(TransportEntry::Scp { user }) => Transport::Scp {
                user: user.unwrap_or_else(|| "root".to_string()),
                host: config.hostname.clone(),
            },
            Some(TransportEntry::Local { root }) => Transport::Local {
                root: Utf8PathBuf::from(root),
            },
        };

        Ok(ResolvedConfig {
            connection: CatalogConnection {
                hostname: config.hostname,
                port: config.port.unwrap_or(DEFAULT_PORT),
                username: config.username,
                password: config.password,
                database: config.database,
            },
            experiment: config.experiment,
            timezone,
            formats,
            label_rules,
            remote_root: config
                .remote_root
                .unwrap_or_else(|| DEFAULT_REMOTE_ROOT.to_string()),
            transport,
        })
    }
}
