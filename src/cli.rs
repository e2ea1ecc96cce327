//! Command-line argument parsing for the chapters ETL job.
//!
//! Every flag can also be supplied through its environment variable; flags
//! win over the environment, which wins over the config file. Within each
//! of those layers a connection URL replaces the discrete `--db-*` settings.

use crate::config::{Config, DbConfig};
use crate::error::{EtlError, Result};
use clap::parser::ValueSource;
use clap::{CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Database argument ids, as clap derives them from the field names.
const DATABASE_ARGS: [&str; 6] = [
    "database_url",
    "db_host",
    "db_port",
    "db_name",
    "db_user",
    "db_password",
];

/// Loads university chapter locations from the feature service into Postgres.
#[derive(Parser, Debug)]
#[command(name = "chapters-etl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Region filter value (two-letter state code)
    #[arg(short = 's', long = "state", env = "STATE_FILTER", value_name = "CODE")]
    pub state: Option<String>,

    /// Feature service query endpoint
    #[arg(long, env = "API_BASE_URL", value_name = "URL")]
    pub api_url: Option<String>,

    /// Feature service request timeout in seconds
    #[arg(long = "timeout", env = "API_TIMEOUT_SECS", value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Postgres connection string (replaces the individual --db-* settings)
    #[arg(long, env = "DATABASE_URL", value_name = "URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Database host
    #[arg(long, env = "DB_HOST", value_name = "HOST")]
    pub db_host: Option<String>,

    /// Database port
    #[arg(long, env = "DB_PORT", value_name = "PORT")]
    pub db_port: Option<u16>,

    /// Database name
    #[arg(long, env = "DB_NAME", value_name = "NAME")]
    pub db_name: Option<String>,

    /// Database user
    #[arg(long, env = "DB_USER", value_name = "USER")]
    pub db_user: Option<String>,

    /// Database password
    #[arg(long, env = "DB_PASSWORD", hide = true, hide_env_values = true)]
    pub db_password: Option<String>,

    /// Config file path
    #[arg(short = 'c', long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Database args whose value came from the environment.
    #[arg(skip)]
    env_sourced: Vec<&'static str>,
}

impl Cli {
    /// Parses command-line arguments.
    pub fn parse_args() -> std::result::Result<Self, clap::Error> {
        Self::try_parse_args_from(std::env::args_os())
    }

    /// Parses the given arguments, remembering which database settings
    /// were read from environment variables.
    pub fn try_parse_args_from<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = Self::command().try_get_matches_from(args)?;
        let mut cli = Self::from_arg_matches(&matches)?;
        cli.env_sourced = DATABASE_ARGS
            .into_iter()
            .filter(|id| matches.value_source(id) == Some(ValueSource::EnvVariable))
            .collect();
        Ok(cli)
    }

    /// Returns the config file path to use.
    ///
    /// Uses the --config argument if provided, otherwise the default path.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(Config::default_path)
    }

    /// Loads the config file and layers flag/env overrides on top.
    ///
    /// An explicitly requested config file must exist; the default one is
    /// optional.
    pub fn resolve_config(&self) -> Result<Config> {
        let path = self.config_path();
        if self.config.is_some() && !path.exists() {
            return Err(EtlError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let mut config = Config::load_from_file(&path)?;
        self.apply_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies flag/env values over the given configuration.
    pub fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(state) = &self.state {
            config.api.state_filter = state.clone();
        }
        if let Some(url) = &self.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(timeout) = self.timeout_secs {
            config.api.timeout_secs = timeout;
        }

        self.apply_database_layer(&mut config.database, true)?;
        self.apply_database_layer(&mut config.database, false)
    }

    /// Applies the database settings from one source: the environment when
    /// `env_layer` is set, the command line otherwise.
    fn apply_database_layer(&self, db: &mut DbConfig, env_layer: bool) -> Result<()> {
        if let Some(url) = self.at_layer("database_url", &self.database_url, env_layer) {
            *db = DbConfig::from_connection_string(url)?;
            return Ok(());
        }

        if let Some(host) = self.at_layer("db_host", &self.db_host, env_layer) {
            db.host = host.clone();
        }
        if let Some(port) = self.at_layer("db_port", &self.db_port, env_layer) {
            db.port = *port;
        }
        if let Some(name) = self.at_layer("db_name", &self.db_name, env_layer) {
            db.name = name.clone();
        }
        if let Some(user) = self.at_layer("db_user", &self.db_user, env_layer) {
            db.user = user.clone();
        }
        if let Some(password) = self.at_layer("db_password", &self.db_password, env_layer) {
            db.password = password.clone();
        }

        Ok(())
    }

    fn at_layer<'v, T>(&self, id: &str, value: &'v Option<T>, env_layer: bool) -> Option<&'v T> {
        let from_env = self.env_sourced.iter().any(|sourced| *sourced == id);
        value.as_ref().filter(|_| from_env == env_layer)
    }
}
