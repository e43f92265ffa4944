//! Configuration and settings for `nicplan`.
//!
//! This module consolidates CLI argument parsing and TOML configuration loading.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::Config as RawConfig;
use serde::Deserialize;

const DEFAULT_DRIVE_LABELS: [&str; 2] = ["CIDATA", "config-2"];
const DEFAULT_DOCUMENT_NAME: &str = "network-config";
const DEFAULT_TASK_NAME: &str = "nicplan";

/// nicplan - applies a cloud-init network-config document to local adapters
#[derive(Parser, Debug)]
#[command(name = "nicplan")]
#[command(about = "Applies a cloud-init network-config document to local adapters")]
pub struct Args {
    /// Path to the configuration file (TOML format)
    #[arg(short = 'c', long = "config", value_name = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Path to the network-config document. Skips config-drive discovery.
    #[arg(long, value_name = "DOCUMENT_PATH")]
    pub document: Option<PathBuf>,

    /// Log the commands instead of executing them.
    #[arg(long)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Register a scheduled task that re-applies the document at every boot.
    Install,
}

/// File-backed configuration for `nicplan`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Path to the log file.
    pub log_path: Option<PathBuf>,

    /// Volume labels that identify the config drive.
    pub drive_labels: Vec<String>,

    /// File name of the document at the root of the config drive.
    pub document_name: String,

    /// Name of the scheduled task created by `install`.
    pub task_name: String,
}

impl Config {
    /// Loads the configuration: built-in defaults, then the file at `path`
    /// if given, then `NICPLAN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = RawConfig::builder()
            .set_default("drive_labels", DEFAULT_DRIVE_LABELS.to_vec())?
            .set_default("document_name", DEFAULT_DOCUMENT_NAME)?
            .set_default("task_name", DEFAULT_TASK_NAME)?;
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let source = path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string());

        let settings = builder
            .add_source(
                config::Environment::with_prefix("NICPLAN")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("drive_labels"),
            )
            .build()
            .with_context(|| format!("Failed to load config from: {source}"))?;

        settings
            .try_deserialize()
            .with_context(|| format!("Failed to parse config: {source}"))
    }
}

/// Runtime settings for `nicplan`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub document: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
    pub dry_run: bool,
    pub config: Config,
}

impl Settings {
    pub fn from_args(args: &Args, config: Config) -> Self {
        Self {
            document: args.document.clone(),
            config_path: args.config.clone(),
            dry_run: args.dry_run,
            config,
        }
    }

    /// Arguments the boot task passes back to this binary. Paths are made
    /// absolute since the task does not start in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if a relative path cannot be made absolute.
    pub fn task_args(&self) -> Result<Vec<String>> {
        let mut args = Vec::new();
        for (flag, path) in [("--config", &self.config_path), ("--document", &self.document)] {
            if let Some(path) = path {
                let absolute = std::path::absolute(path)
                    .with_context(|| format!("Failed to resolve {}", path.display()))?;
                args.push(flag.to_string());
                args.push(absolute.display().to_string());
            }
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        ffi::OsString,
        io::Write,
        path::PathBuf,
        sync::{Mutex, OnceLock},
    };

    use clap::Parser;
    use tempfile::{Builder, NamedTempFile, tempdir};

    use super::{Args, Command, Config, Settings};

    const LOG_PATH_ENV_KEY: &str = "NICPLAN_LOG_PATH";
    const DRIVE_LABELS_ENV_KEY: &str = "NICPLAN_DRIVE_LABELS";

    fn env_lock() -> &'static Mutex<()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        env_lock()
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    struct EnvVarGuard {
        key: &'static str,
        original_value: Option<OsString>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let original_value = std::env::var_os(key);
            // Safety: tests mutate process environment under a global lock.
            unsafe { std::env::set_var(key, value) };
            Self {
                key,
                original_value,
            }
        }

        fn unset(key: &'static str) -> Self {
            let original_value = std::env::var_os(key);
            // Safety: tests mutate process environment under a global lock.
            unsafe { std::env::remove_var(key) };
            Self {
                key,
                original_value,
            }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original_value.take() {
                Some(value) => {
                    // Safety: restoration runs while holding the same global lock.
                    unsafe { std::env::set_var(self.key, value) };
                }
                None => {
                    // Safety: restoration runs while holding the same global lock.
                    unsafe { std::env::remove_var(self.key) };
                }
            }
        }
    }

    fn write_temp_config(contents: &str) -> NamedTempFile {
        let mut file = Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("Failed to create temp config file");
        write!(file, "{contents}").expect("Failed to write config file");
        file
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let _guard = lock_env();
        let _log = EnvVarGuard::unset(LOG_PATH_ENV_KEY);
        let _labels = EnvVarGuard::unset(DRIVE_LABELS_ENV_KEY);

        let config = Config::load(None).expect("Failed to load defaults");
        assert_eq!(config.log_path, None);
        assert_eq!(config.drive_labels, vec!["CIDATA", "config-2"]);
        assert_eq!(config.document_name, "network-config");
        assert_eq!(config.task_name, "nicplan");
    }

    #[test]
    fn load_reads_values_from_toml() {
        let _guard = lock_env();
        let _log = EnvVarGuard::unset(LOG_PATH_ENV_KEY);
        let _labels = EnvVarGuard::unset(DRIVE_LABELS_ENV_KEY);
        let file = write_temp_config(
            "log_path = \"C:/nicplan/nicplan.log\"\ndrive_labels = [\"NETCFG\"]\ndocument_name = \"net.yaml\"\n",
        );

        let config = Config::load(Some(file.path())).expect("Failed to load config");
        assert_eq!(config.log_path, Some(PathBuf::from("C:/nicplan/nicplan.log")));
        assert_eq!(config.drive_labels, vec!["NETCFG"]);
        assert_eq!(config.document_name, "net.yaml");
        assert_eq!(config.task_name, "nicplan");
    }

    #[test]
    fn load_uses_env_to_override_toml() {
        let _guard = lock_env();
        let _log = EnvVarGuard::set(LOG_PATH_ENV_KEY, "/tmp/nicplan-env.log");
        let _labels = EnvVarGuard::set(DRIVE_LABELS_ENV_KEY, "CIDATA,SEED");
        let file = write_temp_config("log_path = \"/tmp/nicplan-toml.log\"\n");

        let config = Config::load(Some(file.path())).expect("Failed to load config");
        assert_eq!(config.log_path, Some(PathBuf::from("/tmp/nicplan-env.log")));
        assert_eq!(config.drive_labels, vec!["CIDATA", "SEED"]);
    }

    #[test]
    fn load_fails_when_config_file_is_missing() {
        let _guard = lock_env();
        let _log = EnvVarGuard::unset(LOG_PATH_ENV_KEY);
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let missing_path = temp_dir.path().join("missing.toml");

        let err =
            Config::load(Some(&missing_path)).expect_err("Expected load to fail for missing file");
        assert!(
            err.to_string().contains("Failed to load config from"),
            "Unexpected error message: {err}"
        );
    }

    #[test]
    fn load_fails_when_config_value_type_is_invalid() {
        let _guard = lock_env();
        let _log = EnvVarGuard::unset(LOG_PATH_ENV_KEY);
        let file = write_temp_config("document_name = { nested = \"value\" }\n");

        let err = Config::load(Some(file.path()))
            .expect_err("Expected load to fail for invalid value type");
        assert!(
            err.to_string().contains("Failed to parse config"),
            "Unexpected error message: {err}"
        );
    }

    #[test]
    fn task_args_replay_explicit_paths() {
        let dir = tempdir().expect("Failed to create temp dir");
        let config_path = dir.path().join("nicplan.toml");
        let document_path = dir.path().join("network-config");
        let config_arg = config_path.display().to_string();
        let document_arg = document_path.display().to_string();
        let args = Args::parse_from([
            "nicplan",
            "--config",
            config_arg.as_str(),
            "--document",
            document_arg.as_str(),
            "--dry-run",
            "install",
        ]);
        assert_eq!(args.command, Some(Command::Install));

        let _guard = lock_env();
        let _log = EnvVarGuard::unset(LOG_PATH_ENV_KEY);
        let _labels = EnvVarGuard::unset(DRIVE_LABELS_ENV_KEY);
        let settings = Settings::from_args(
            &args,
            Config::load(None).expect("Failed to load defaults"),
        );
        assert!(settings.dry_run);
        assert_eq!(
            settings.task_args().expect("absolute paths should resolve"),
            vec![
                "--config".to_string(),
                config_arg,
                "--document".to_string(),
                document_arg,
            ]
        );
    }

    #[test]
    fn task_args_make_relative_paths_absolute() {
        let args = Args::parse_from([
            "nicplan",
            "--config",
            "nicplan.toml",
            "--document",
            "seed/network-config",
            "install",
        ]);
        let _guard = lock_env();
        let _log = EnvVarGuard::unset(LOG_PATH_ENV_KEY);
        let _labels = EnvVarGuard::unset(DRIVE_LABELS_ENV_KEY);
        let settings = Settings::from_args(
            &args,
            Config::load(None).expect("Failed to load defaults"),
        );

        let cwd = std::env::current_dir().expect("Failed to read current dir");
        let task_args = settings.task_args().expect("relative paths should resolve");
        assert_eq!(task_args[1], cwd.join("nicplan.toml").display().to_string());
        assert_eq!(
            task_args[3],
            cwd.join("seed").join("network-config").display().to_string()
        );
        assert!(PathBuf::from(&task_args[1]).is_absolute());
    }
}
