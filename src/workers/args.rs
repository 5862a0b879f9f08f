//! Command-line argument parsing and configuration.
//!
//! Supports:
//! - CLI arguments via clap
//! - TOML configuration file (`--config`, or `./config.toml` when present)
//! - Merging CLI with file config (CLI takes precedence)

use crate::core::config::DEFAULT_ICE_SERVERS;
use crate::core::connection::{CryptoConfig, EncryptionLevel};
use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Duolink - serverless two-party chat and file sharing over manually exchanged codes.
#[derive(Parser, Deserialize, Clone, Debug, Default)]
#[command(author, version, about)]
#[command(propagate_version = true)]
#[serde(default)]
pub struct Args {
    /// Path to a config file (TOML).
    #[clap(long)]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv).
    #[clap(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// How connection codes are protected: standard, personal or open.
    #[clap(short, long)]
    pub level: Option<EncryptionLevel>,

    /// Passphrase for the personal encryption level.
    #[clap(short, long)]
    pub passphrase: Option<String>,

    /// Request the microphone when negotiating.
    #[clap(long)]
    pub mic: bool,

    /// STUN/TURN server URL. Repeat for several servers.
    #[clap(long = "ice-server")]
    pub ice_servers: Vec<String>,

    /// Directory for logs. Defaults to ~/.duolink/
    #[clap(long)]
    pub data_dir: Option<PathBuf>,

    /// Where received files are written. Defaults to the current directory.
    #[clap(long)]
    pub download_dir: Option<PathBuf>,
}

impl Args {
    /// Load Args from CLI + TOML file (if it exists).
    /// CLI values override those from the file.
    pub fn load() -> anyhow::Result<Self> {
        let mut cli_args = Args::parse();

        cli_args.data_dir = cli_args.data_dir.map(Self::resolve_path);
        cli_args.download_dir = cli_args.download_dir.map(Self::resolve_path);

        let path = match &cli_args.config {
            Some(explicit) => Some(explicit.clone()),
            None => Some(PathBuf::from("config.toml")).filter(|p| p.exists()),
        };
        match path {
            Some(path) => {
                let file_args = Self::from_file(&path)?;
                Ok(Self::merge(file_args, cli_args))
            }
            None => Ok(cli_args),
        }
    }

    /// Resolve a potentially relative path to an absolute one.
    fn resolve_path(p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            p
        } else {
            std::env::current_dir().unwrap_or_default().join(p)
        }
    }

    /// Load args from a TOML file.
    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str::<Args>(content)?)
    }

    /// Merge file args with CLI args (CLI takes precedence).
    fn merge(mut file: Args, cli: Args) -> Args {
        if cli.verbose > 0 {
            file.verbose = cli.verbose;
        }
        if cli.level.is_some() {
            file.level = cli.level;
        }
        if cli.passphrase.is_some() {
            file.passphrase = cli.passphrase;
        }
        if cli.mic {
            file.mic = true;
        }
        if !cli.ice_servers.is_empty() {
            file.ice_servers = cli.ice_servers;
        }
        if cli.data_dir.is_some() {
            file.data_dir = cli.data_dir;
        }
        if cli.download_dir.is_some() {
            file.download_dir = cli.download_dir;
        }
        file.config = cli.config;
        file
    }

    pub fn crypto(&self) -> CryptoConfig {
        CryptoConfig::new(
            self.level.unwrap_or_default(),
            self.passphrase.clone().unwrap_or_default(),
        )
    }

    /// Configured ICE servers, or the public STUN defaults.
    pub fn ice_servers(&self) -> Vec<String> {
        if self.ice_servers.is_empty() {
            DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect()
        } else {
            self.ice_servers.clone()
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download_dir
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toml_fields() {
        let args = Args::from_toml(
            r#"
            verbose = 2
            level = "personal"
            passphrase = "xk92"
            ice_servers = ["stun:example.org:3478"]
            "#,
        )
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.level, Some(EncryptionLevel::Personal));
        assert_eq!(args.ice_servers(), vec!["stun:example.org:3478".to_string()]);
        assert!(!args.mic);
    }

    #[test]
    fn test_cli_wins() {
        let file = Args {
            verbose: 1,
            level: Some(EncryptionLevel::Open),
            passphrase: Some("file".into()),
            ice_servers: vec!["stun:file".into()],
            ..Default::default()
        };
        let cli = Args {
            level: Some(EncryptionLevel::Personal),
            passphrase: Some("cli".into()),
            mic: true,
            ..Default::default()
        };
        let merged = Args::merge(file, cli);
        assert_eq!(merged.verbose, 1);
        assert_eq!(merged.level, Some(EncryptionLevel::Personal));
        assert_eq!(merged.passphrase.as_deref(), Some("cli"));
        assert!(merged.mic);
        assert_eq!(merged.ice_servers, vec!["stun:file".to_string()]);
    }

    #[test]
    fn test_defaults() {
        let args = Args::default();
        assert_eq!(args.crypto().level, EncryptionLevel::Standard);
        assert_eq!(args.ice_servers().len(), DEFAULT_ICE_SERVERS.len());
    }

    #[test]
    fn test_unknown_level_rejected() {
        assert!(Args::from_toml(r#"level = "loud""#).is_err());
    }
}
