use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use toolsmith_core::control::DEFAULT_KEEP_REPORTS;
use toolsmith_core::generation::ChatCompletionsConfig;
use toolsmith_core::modules::{DEFAULT_INTERPRETER, ModuleLayout};
use toolsmith_store::schema::{
    DEFAULT_MAX_RECORDS,
    DEFAULT_MODULE_EXTENSION,
    DEFAULT_STALENESS_MINUTES,
};

const DEFAULT_DB_ENDPOINT: &str = "surrealkv://toolsmith.db";
const DEFAULT_DB_NAMESPACE: &str = "toolsmith";
const DEFAULT_DB_NAME: &str = "toolsmith";
const DEFAULT_MODULE_DIR: &str = "generated";
const DEFAULT_REPORT_DIR: &str = "reports";
const DEFAULT_MCP_HTTP_ADDR: &str = "127.0.0.1:4020";
const DEFAULT_INGEST_ADDR: &str = "127.0.0.1:4010";
const DEFAULT_INGEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INGEST_MAX_BODY_BYTES: usize = 25 * 1024 * 1024;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 120;
const DEFAULT_GENERATOR_TIMEOUT_SECS: u64 = 300;

#[derive(Parser, Debug)]
#[command(name = "toolsmithd", version, about = "Toolsmith daemon.")]
struct CliArgs {
    #[arg(long, global = true, env = "TOOLSMITH_DB_ENDPOINT", default_value = DEFAULT_DB_ENDPOINT)]
    db_endpoint: String,

    #[arg(
        long,
        global = true,
        env = "TOOLSMITH_DB_NAMESPACE",
        default_value = DEFAULT_DB_NAMESPACE
    )]
    db_namespace: String,

    #[arg(long, global = true, env = "TOOLSMITH_DB_NAME", default_value = DEFAULT_DB_NAME)]
    db_name: String,

    #[arg(long, global = true, env = "TOOLSMITH_DB_USERNAME")]
    db_username: Option<String>,

    #[arg(long, global = true, env = "TOOLSMITH_DB_PASSWORD")]
    db_password: Option<String>,

    #[arg(long, global = true, env = "TOOLSMITH_MODULE_DIR", default_value = DEFAULT_MODULE_DIR)]
    module_dir: PathBuf,

    #[arg(
        long,
        global = true,
        env = "TOOLSMITH_MODULE_EXTENSION",
        default_value = DEFAULT_MODULE_EXTENSION
    )]
    module_extension: String,

    #[arg(long, global = true, env = "TOOLSMITH_INTERPRETER", default_value = DEFAULT_INTERPRETER)]
    interpreter: String,

    #[arg(
        long,
        global = true,
        env = "TOOLSMITH_INVOKE_TIMEOUT_SECS",
        default_value_t = DEFAULT_INVOKE_TIMEOUT_SECS
    )]
    invoke_timeout_secs: u64,

    #[command(flatten)]
    generator: GeneratorArgs,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Args, Debug, Default)]
struct GeneratorArgs {
    /// TOML file with `api_key`, `base_url`, `model` and `timeout_secs`.
    #[arg(long, global = true, env = "TOOLSMITH_GENERATOR_CONFIG")]
    generator_config: Option<PathBuf>,

    #[arg(long, global = true, env = "TOOLSMITH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, global = true, env = "TOOLSMITH_BASE_URL")]
    base_url: Option<String>,

    #[arg(long, global = true, env = "TOOLSMITH_MODEL")]
    model: Option<String>,

    #[arg(long, global = true, env = "TOOLSMITH_GENERATOR_TIMEOUT_SECS")]
    generator_timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Parse the documentation source and replace the stored interfaces.
    Ingest {
        #[arg(long, env = "TOOLSMITH_SOURCE")]
        source: Option<String>,

        /// Re-ingest on this interval instead of running once.
        #[arg(long, env = "TOOLSMITH_INGEST_EVERY_MINUTES")]
        every_minutes: Option<u64>,

        #[arg(
            long,
            env = "TOOLSMITH_FETCH_TIMEOUT_SECS",
            default_value_t = DEFAULT_FETCH_TIMEOUT_SECS
        )]
        fetch_timeout_secs: u64,
    },
    /// Generate modules and registry rows for stored interfaces.
    Synthesize {
        #[arg(long, env = "TOOLSMITH_MAX_RECORDS", default_value_t = DEFAULT_MAX_RECORDS)]
        max_records: usize,

        #[arg(
            long,
            env = "TOOLSMITH_STALENESS_MINUTES",
            default_value_t = DEFAULT_STALENESS_MINUTES
        )]
        staleness_minutes: u64,

        /// Ignore the staleness gate.
        #[arg(long, default_value_t = false)]
        force: bool,

        /// Seconds to wait between generator calls.
        #[arg(long, env = "TOOLSMITH_CALL_INTERVAL_SECS")]
        call_interval_secs: Option<u64>,
    },
    /// Serve the MCP tool catalog and the control HTTP surface.
    #[allow(clippy::struct_excessive_bools)]
    Serve {
        #[arg(
            long = "stdio",
            env = "TOOLSMITH_ENABLE_STDIO",
            default_value_t = false,
            value_parser = BoolishValueParser::new()
        )]
        enable_stdio: bool,

        #[arg(
            long,
            env = "TOOLSMITH_MCP_SERVE",
            default_value_t = true,
            value_parser = BoolishValueParser::new()
        )]
        mcp_serve: bool,

        #[arg(
            long,
            env = "TOOLSMITH_INGEST_SERVE",
            default_value_t = true,
            value_parser = BoolishValueParser::new()
        )]
        ingest_serve: bool,

        #[arg(long, env = "TOOLSMITH_MCP_HTTP_ADDR", default_value = DEFAULT_MCP_HTTP_ADDR)]
        mcp_http_addr: SocketAddr,

        #[arg(long, env = "TOOLSMITH_INGEST_ADDR", default_value = DEFAULT_INGEST_ADDR)]
        ingest_addr: SocketAddr,

        #[arg(
            long,
            env = "TOOLSMITH_INGEST_TIMEOUT_SECS",
            default_value_t = DEFAULT_INGEST_TIMEOUT_SECS
        )]
        ingest_timeout_secs: u64,

        #[arg(
            long,
            env = "TOOLSMITH_INGEST_MAX_BODY_BYTES",
            default_value_t = DEFAULT_INGEST_MAX_BODY_BYTES
        )]
        ingest_max_body_bytes: usize,

        #[arg(
            long,
            env = "TOOLSMITH_STALENESS_MINUTES",
            default_value_t = DEFAULT_STALENESS_MINUTES
        )]
        staleness_minutes: u64,
    },
    /// Run every registered module's self-test and write a report.
    Verify {
        #[arg(long, env = "TOOLSMITH_REPORT_DIR", default_value = DEFAULT_REPORT_DIR)]
        report_dir: PathBuf,

        #[arg(long, env = "TOOLSMITH_KEEP_REPORTS", default_value_t = DEFAULT_KEEP_REPORTS)]
        keep_reports: usize,
    },
    /// Print descriptor and module state for every known tool.
    Status {
        #[arg(
            long,
            env = "TOOLSMITH_STALENESS_MINUTES",
            default_value_t = DEFAULT_STALENESS_MINUTES
        )]
        staleness_minutes: u64,
    },
    /// Remove a tool from the registry.
    Delete {
        name: String,

        /// Also delete the generated module file.
        #[arg(long, default_value_t = false)]
        remove_module: bool,
    },
}

/// Connection settings for `SurrealDB`.
#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl DatabaseConfig {
    /// Embedded engines need no credentials.
    pub fn is_remote(&self) -> bool {
        ["ws://", "wss://", "http://", "https://"]
            .iter()
            .any(|scheme| self.endpoint.starts_with(scheme))
    }

    /// `mem://` keeps nothing once the process exits.
    pub fn is_ephemeral(&self) -> bool {
        self.endpoint.starts_with("mem://")
    }
}

/// Validated subcommand.
#[derive(Clone, Debug)]
pub enum Command {
    Ingest {
        source: String,
        every: Option<Duration>,
        fetch_timeout: Duration,
    },
    Synthesize {
        max_records: usize,
        staleness: Duration,
        force: bool,
        call_interval: Option<Duration>,
    },
    Serve(ServeConfig),
    Verify {
        report_dir: PathBuf,
        keep_reports: usize,
    },
    Status {
        staleness: Duration,
    },
    Delete {
        name: String,
        remove_module: bool,
    },
}

#[derive(Clone, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ServeConfig {
    pub enable_stdio: bool,
    pub mcp_serve: bool,
    pub ingest_serve: bool,
    pub mcp_http_addr: SocketAddr,
    pub ingest_addr: SocketAddr,
    pub ingest_timeout: Duration,
    pub ingest_max_body_bytes: usize,
    pub staleness: Duration,
}

/// Runtime configuration loaded from CLI arguments and environment variables.
#[derive(Clone, Debug)]
pub struct ToolsmithConfig {
    pub database: DatabaseConfig,
    pub module_dir: PathBuf,
    pub module_extension: String,
    pub interpreter: String,
    pub invoke_timeout: Duration,
    pub generator: ChatCompletionsConfig,
    pub command: Command,
}

#[derive(Debug)]
pub enum ConfigError {
    MissingSetting(&'static str),
    InvalidSetting { name: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSetting(name) => write!(f, "missing required setting: {name}"),
            Self::InvalidSetting { name, value } => {
                write!(f, "invalid {name} value: {value}")
            }
        }
    }
}

impl Error for ConfigError {}

/// Generator settings read from the optional TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeneratorFile {
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

impl GeneratorFile {
    fn parse(text: &str, path: &std::path::Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::InvalidSetting {
            name: "TOOLSMITH_GENERATOR_CONFIG",
            value: format!("{}: {err}", path.display()),
        })
    }
}

impl ToolsmithConfig {
    pub fn from_args() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();
        Self::try_from(args)
    }

    pub fn module_layout(&self) -> ModuleLayout {
        ModuleLayout::new(&self.module_dir, &self.module_extension)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn minutes(name: &'static str, value: u64) -> Result<Duration, ConfigError> {
    value
        .checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidSetting {
            name,
            value: value.to_string(),
        })
}

fn generator_config(args: GeneratorArgs) -> Result<ChatCompletionsConfig, ConfigError> {
    let file = match args.generator_config.as_deref() {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|err| ConfigError::InvalidSetting {
                name: "TOOLSMITH_GENERATOR_CONFIG",
                value: format!("{}: {err}", path.display()),
            })?;
            GeneratorFile::parse(&text, path)?
        }
        None => GeneratorFile::default(),
    };

    let mut config = ChatCompletionsConfig::default().with_timeout(Duration::from_secs(
        args.generator_timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_GENERATOR_TIMEOUT_SECS),
    ));
    if let Some(api_key) = non_blank(args.api_key).or_else(|| non_blank(file.api_key)) {
        config = config.with_api_key(api_key);
    }
    if let Some(base_url) = non_blank(args.base_url).or_else(|| non_blank(file.base_url)) {
        config = config.with_base_url(base_url);
    }
    if let Some(model) = non_blank(args.model).or_else(|| non_blank(file.model)) {
        config = config.with_model(model);
    }
    Ok(config)
}

impl DatabaseConfig {
    fn from_args(args: &mut CliArgs) -> Result<Self, ConfigError> {
        let database = Self {
            endpoint: args.db_endpoint.trim().to_string(),
            namespace: args.db_namespace.trim().to_string(),
            database: args.db_name.trim().to_string(),
            username: non_blank(args.db_username.take()),
            password: non_blank(args.db_password.take()),
        };

        if database.endpoint.is_empty() {
            return Err(ConfigError::MissingSetting("TOOLSMITH_DB_ENDPOINT"));
        }
        if database.namespace.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "TOOLSMITH_DB_NAMESPACE",
                value: args.db_namespace.clone(),
            });
        }
        if database.database.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "TOOLSMITH_DB_NAME",
                value: args.db_name.clone(),
            });
        }
        if database.is_remote() {
            if database.username.is_none() {
                return Err(ConfigError::MissingSetting("TOOLSMITH_DB_USERNAME"));
            }
            if database.password.is_none() {
                return Err(ConfigError::MissingSetting("TOOLSMITH_DB_PASSWORD"));
            }
        }
        Ok(database)
    }
}

impl TryFrom<CliCommand> for Command {
    type Error = ConfigError;

    fn try_from(command: CliCommand) -> Result<Self, Self::Error> {
        Ok(match command {
            CliCommand::Ingest {
                source,
                every_minutes,
                fetch_timeout_secs,
            } => Self::Ingest {
                source: non_blank(source).ok_or(ConfigError::MissingSetting("TOOLSMITH_SOURCE"))?,
                every: match every_minutes {
                    None => None,
                    Some(0) => {
                        return Err(ConfigError::InvalidSetting {
                            name: "TOOLSMITH_INGEST_EVERY_MINUTES",
                            value: "0".to_string(),
                        });
                    }
                    Some(value) => Some(minutes("TOOLSMITH_INGEST_EVERY_MINUTES", value)?),
                },
                fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            },
            CliCommand::Synthesize {
                max_records,
                staleness_minutes,
                force,
                call_interval_secs,
            } => Self::Synthesize {
                max_records,
                staleness: minutes("TOOLSMITH_STALENESS_MINUTES", staleness_minutes)?,
                force,
                call_interval: call_interval_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
            },
            CliCommand::Serve {
                enable_stdio,
                mcp_serve,
                ingest_serve,
                mcp_http_addr,
                ingest_addr,
                ingest_timeout_secs,
                ingest_max_body_bytes,
                staleness_minutes,
            } => Self::Serve(ServeConfig {
                enable_stdio,
                mcp_serve,
                ingest_serve,
                mcp_http_addr,
                ingest_addr,
                ingest_timeout: Duration::from_secs(ingest_timeout_secs),
                ingest_max_body_bytes,
                staleness: minutes("TOOLSMITH_STALENESS_MINUTES", staleness_minutes)?,
            }),
            CliCommand::Verify {
                report_dir,
                keep_reports,
            } => Self::Verify {
                report_dir,
                keep_reports,
            },
            CliCommand::Status { staleness_minutes } => Self::Status {
                staleness: minutes("TOOLSMITH_STALENESS_MINUTES", staleness_minutes)?,
            },
            CliCommand::Delete {
                name,
                remove_module,
            } => Self::Delete {
                name: non_blank(Some(name)).ok_or(ConfigError::MissingSetting("name"))?,
                remove_module,
            },
        })
    }
}

impl TryFrom<CliArgs> for ToolsmithConfig {
    type Error = ConfigError;

    fn try_from(mut args: CliArgs) -> Result<Self, Self::Error> {
        let database = DatabaseConfig::from_args(&mut args)?;

        let module_extension = args.module_extension.trim().trim_start_matches('.').to_string();
        if module_extension.is_empty() {
            return Err(ConfigError::InvalidSetting {
                name: "TOOLSMITH_MODULE_EXTENSION",
                value: args.module_extension,
            });
        }
        if args.interpreter.trim().is_empty() {
            return Err(ConfigError::MissingSetting("TOOLSMITH_INTERPRETER"));
        }
        if args.invoke_timeout_secs == 0 {
            return Err(ConfigError::InvalidSetting {
                name: "TOOLSMITH_INVOKE_TIMEOUT_SECS",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            database,
            module_dir: args.module_dir,
            module_extension,
            interpreter: args.interpreter.trim().to_string(),
            invoke_timeout: Duration::from_secs(args.invoke_timeout_secs),
            generator: generator_config(args.generator)?,
            command: Command::try_from(args.command)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::*;

    fn parse(argv: &[&str]) -> Result<ToolsmithConfig, ConfigError> {
        let args = CliArgs::try_parse_from(argv).expect("arguments should parse");
        ToolsmithConfig::try_from(args)
    }

    #[test]
    fn synthesize_defaults() {
        let config = parse(&["toolsmithd", "synthesize"]).expect("config should parse");

        assert_eq!(config.database.endpoint, DEFAULT_DB_ENDPOINT);
        assert!(config.database.endpoint.starts_with("surrealkv://"));
        assert!(!config.database.is_ephemeral());
        assert!(!config.database.is_remote());
        assert_eq!(config.module_extension, "py");
        assert_eq!(config.interpreter, "python3");
        let Command::Synthesize {
            max_records,
            staleness,
            force,
            call_interval,
        } = config.command
        else {
            panic!("expected synthesize");
        };
        assert_eq!(max_records, 10);
        assert_eq!(staleness, Duration::from_secs(30 * 60));
        assert!(!force);
        assert!(call_interval.is_none());
    }

    #[test]
    fn remote_database_requires_credentials() {
        let err = parse(&["toolsmithd", "--db-endpoint", "ws://127.0.0.1:8000", "status"])
            .expect_err("credentials are required");
        assert!(matches!(err, ConfigError::MissingSetting("TOOLSMITH_DB_USERNAME")));

        let config = parse(&[
            "toolsmithd",
            "--db-endpoint",
            "ws://127.0.0.1:8000",
            "--db-username",
            "root",
            "--db-password",
            "secret",
            "status",
        ])
        .expect("config should parse");
        assert!(config.database.is_remote());
    }

    #[test]
    fn embedded_file_database_needs_no_credentials() {
        let config = parse(&["toolsmithd", "--db-endpoint", "surrealkv://data/toolsmith", "status"])
            .expect("config should parse");
        assert!(!config.database.is_remote());
    }

    #[test]
    fn separate_runs_share_the_default_store() {
        let ingest =
            parse(&["toolsmithd", "ingest", "--source", "docs.md"]).expect("ingest config");
        let serve = parse(&["toolsmithd", "serve"]).expect("serve config");
        assert_eq!(ingest.database.endpoint, serve.database.endpoint);
        assert!(!serve.database.is_ephemeral());

        let memory =
            parse(&["toolsmithd", "--db-endpoint", "mem://", "status"]).expect("status config");
        assert!(memory.database.is_ephemeral());
    }

    #[test]
    fn ingest_requires_a_source() {
        let err =
            parse(&["toolsmithd", "ingest", "--source", "  "]).expect_err("source is required");
        assert!(matches!(err, ConfigError::MissingSetting("TOOLSMITH_SOURCE")));
    }

    #[test]
    fn ingest_rejects_zero_interval() {
        let err = parse(&["toolsmithd", "ingest", "--source", "docs.md", "--every-minutes", "0"])
            .expect_err("zero interval is invalid");
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }

    #[test]
    fn module_extension_drops_leading_dot() {
        let config = parse(&["toolsmithd", "--module-extension", ".py", "status"])
            .expect("config should parse");
        assert_eq!(config.module_extension, "py");
    }

    #[test]
    fn generator_file_fills_unset_flags() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "api_key = \"from-file\"\nmodel = \"file-model\"\ntimeout_secs = 60"
        )
        .expect("write config");
        let path = file.path().display().to_string();

        let config = parse(&[
            "toolsmithd",
            "--generator-config",
            &path,
            "--model",
            "flag-model",
            "synthesize",
        ])
        .expect("config should parse");

        assert_eq!(config.generator.api_key.as_deref(), Some("from-file"));
        assert_eq!(config.generator.model, "flag-model");
        assert_eq!(config.generator.timeout, Duration::from_secs(60));
    }

    #[test]
    fn unknown_generator_keys_are_rejected() {
        let err = GeneratorFile::parse("api_token = \"x\"", std::path::Path::new("gen.toml"))
            .expect_err("unknown key");
        assert!(matches!(err, ConfigError::InvalidSetting { .. }));
    }
}
