use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use locode::pip::BuildOptions;
use locode::scylla::ScyllaRegionSource;
use locode::sources::{CsvFileSource, GeoJsonFileSource, RegionStore};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub index: BuildOptions,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

fn default_listen() -> String {
    "0.0.0.0:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    GeoJson {
        path: PathBuf,
        #[serde(default = "default_identifier_property")]
        identifier_property: String,
    },
    Csv {
        path: PathBuf,
    },
    Scylla {
        uri: String,
        #[serde(default = "default_keyspace")]
        keyspace: String,
        #[serde(default = "default_table")]
        table: String,
    },
}

fn default_identifier_property() -> String {
    "locode".to_string()
}

fn default_keyspace() -> String {
    "locode".to_string()
}

fn default_table() -> String {
    "regions".to_string()
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        Ok(config)
    }
}

impl SourceConfig {
    /// Open the configured store. Connects eagerly for ScyllaDB.
    pub async fn open(&self) -> Result<RegionStore> {
        let store = match self {
            SourceConfig::GeoJson {
                path,
                identifier_property,
            } => RegionStore::GeoJson(GeoJsonFileSource::new(path, identifier_property)),
            SourceConfig::Csv { path } => RegionStore::Csv(CsvFileSource::new(path)),
            SourceConfig::Scylla {
                uri,
                keyspace,
                table,
            } => RegionStore::Scylla(
                ScyllaRegionSource::new(uri, keyspace, table)
                    .await
                    .context("Failed to open ScyllaDB region table")?,
            ),
        };
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locode::pip::{DuplicatePolicy, InvalidGeometryPolicy};

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
            [server]
            listen = "127.0.0.1:8080"

            [source]
            kind = "geojson"
            path = "data/regions.geojson"
            identifier_property = "unlocode"

            [index]
            on_invalid_geometry = "skip"
            on_duplicate = "keep_first"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen, "127.0.0.1:8080");
        match config.source {
            SourceConfig::GeoJson {
                path,
                identifier_property,
            } => {
                assert_eq!(path, PathBuf::from("data/regions.geojson"));
                assert_eq!(identifier_property, "unlocode");
            }
            other => panic!("unexpected source: {:?}", other),
        }
        assert_eq!(
            config.index.on_invalid_geometry,
            InvalidGeometryPolicy::Skip
        );
        assert_eq!(config.index.on_duplicate, DuplicatePolicy::KeepFirst);
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse(
            r#"
            [source]
            kind = "scylla"
            uri = "127.0.0.1:9042"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:3000");
        assert_eq!(config.index, BuildOptions::default());
        match config.source {
            SourceConfig::Scylla {
                keyspace, table, ..
            } => {
                assert_eq!(keyspace, "locode");
                assert_eq!(table, "regions");
            }
            other => panic!("unexpected source: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_source_kind() {
        assert!(Config::parse("[source]\nkind = \"postgres\"\n").is_err());
    }
}
