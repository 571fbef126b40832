//! Configuration management for Atlas services.
//!
//! Settings are loaded from (in priority order):
//! 1. Environment variables (`ATLAS_` prefix, `__` separator)
//! 2. Config file (`atlas.toml`)
//! 3. Defaults

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level Atlas settings.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub database: DatabaseSettings,

    /// Optional Neo4j mirror; when absent the local store is the only graph.
    #[serde(default)]
    pub neo4j: Option<Neo4jSettings>,

    #[serde(default)]
    pub scan: ScanSettings,

    #[serde(default)]
    pub certs: CertSettings,
}

/// Local SQLite store location.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Connection settings for the optional Neo4j mirror.
#[derive(Debug, Clone, Deserialize)]
pub struct Neo4jSettings {
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,
    #[serde(default = "default_neo4j_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

/// Scheduled discovery configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanSettings {
    /// Scheduler interval as duration text (e.g. "15m", "1h").
    #[serde(default = "default_scan_interval")]
    pub interval: String,

    /// The sources an aggregate ("all") scan iterates over.
    #[serde(default)]
    pub sources: Vec<SourceSettings>,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            interval: default_scan_interval(),
            sources: Vec::new(),
        }
    }
}

/// One configured discovery source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// Source kind: "terraform", "kubernetes", "k8s-live", "ansible".
    pub source: String,

    /// Paths handed to the parser (state files, manifest dirs, inventories).
    #[serde(default)]
    pub paths: Vec<String>,

    /// Pull state from the configured remote backend instead of `paths`.
    #[serde(default)]
    pub remote_state: bool,

    /// Terraform workspace for remote pulls.
    #[serde(default)]
    pub workspace: Option<String>,

    /// Helm chart to render before parsing.
    #[serde(default)]
    pub helm_chart: Option<String>,

    #[serde(default)]
    pub values_file: Option<String>,

    /// Kubeconfig for live-cluster pulls.
    #[serde(default)]
    pub kubeconfig: Option<String>,

    #[serde(default)]
    pub kube_context: Option<String>,

    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Ansible playbook directory.
    #[serde(default)]
    pub playbook_dir: Option<String>,
}

/// Certificate monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CertSettings {
    /// Probe interval as duration text.
    #[serde(default = "default_cert_interval")]
    pub interval: String,

    /// Webhook URL to deliver alerts to; alerts are dropped when absent.
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for CertSettings {
    fn default() -> Self {
        Self {
            interval: default_cert_interval(),
            webhook_url: None,
        }
    }
}

impl Settings {
    /// Load settings from `<file_prefix>.toml` and `ATLAS_*` environment
    /// variables, falling back to defaults when neither is present.
    pub fn load(file_prefix: &str) -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("ATLAS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(cfg.try_deserialize()?)
    }
}

fn default_db_path() -> String {
    "atlas.db".to_string()
}

fn default_neo4j_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_scan_interval() -> String {
    "1h".to_string()
}

fn default_cert_interval() -> String {
    "12h".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.database.path, "atlas.db");
        assert!(settings.neo4j.is_none());
        assert_eq!(settings.scan.interval, "1h");
        assert_eq!(settings.certs.interval, "12h");
        assert!(settings.scan.sources.is_empty());
    }

    #[test]
    fn deserializes_from_toml_fragment() {
        let toml = r#"
            [database]
            path = "/var/lib/atlas/graph.db"

            [neo4j]
            uri = "bolt://graph:7687"
            password = "s3cret"

            [scan]
            interval = "30m"

            [[scan.sources]]
            source = "terraform"
            paths = ["infra/prod.tfstate"]

            [[scan.sources]]
            source = "k8s-live"
            kube_context = "prod"
            namespaces = ["default", "ingress"]
        "#;

        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(settings.database.path, "/var/lib/atlas/graph.db");
        assert_eq!(settings.neo4j.as_ref().unwrap().user, "neo4j");
        assert_eq!(settings.scan.sources.len(), 2);
        assert_eq!(settings.scan.sources[1].namespaces, vec!["default", "ingress"]);
    }
}
