//! Configuration for the Simulo hub.
//!
//! Everything comes from environment variables with development
//! defaults:
//!
//! - `SIMULO_BIND_ADDR`       (default: "0.0.0.0")
//! - `PORT`                   (default: "3000")
//! - `SIMULO_MAX_CLIENTS`     (default: "1024")
//! - `SIMULO_CORS_ORIGIN`     (default: any origin)
//! - `SIMULO_WORK_DIR`        (default: "workdir")
//! - `SIMULO_TEMPLATE_DIR`    (default: "template")
//! - `SIMULO_CARGO`           (default: "cargo")
//! - `SIMULO_TARGET`          (default: "wasm32-unknown-unknown")
//! - `SIMULO_OBJECT_DIR`      (default: "objects")
//! - `SIMULO_OBJECT_BASE_URL` (default: "http://localhost:3000/objects")
//! - `SIMULO_OBJECT_SECRET`   (default: random per process)
//! - `SIMULO_IDENTITY_URL` / `SIMULO_IDENTITY_KEY` (default: seed tokens)
//! - `SIMULO_CODEGEN_URL`     (default: "https://api.groq.com/openai/v1")
//! - `SIMULO_CODEGEN_KEY`     (default: none, generation fails)
//! - `SIMULO_CODEGEN_MODEL`   (default: "moonshotai/kimi-k2-instruct")
//! - `SIMULO_SEED_FILE`       (default: empty store)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// IP address / interface to bind to (e.g. "0.0.0.0" or "127.0.0.1").
    pub bind_addr: String,

    /// HTTP port; the session socket is served on the same listener.
    pub port: u16,

    /// Maximum number of simultaneously open session sockets.
    pub max_clients: usize,

    /// Browser origin allowed to open sockets and call the HTTP API.
    pub cors_origin: Option<String>,

    pub toolchain: ToolchainConfig,
    pub objects: ObjectStoreConfig,
    pub identity: Option<IdentityConfig>,
    pub codegen: CodegenConfig,

    /// JSON seed for the in-memory project store.
    pub seed_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    /// Parent of all sandboxes.
    pub work_dir: PathBuf,

    /// Scaffold copied into every sandbox.
    pub template_dir: PathBuf,

    pub cargo: String,
    pub target: String,
}

#[derive(Debug, Clone)]
pub struct ObjectStoreConfig {
    pub root: PathBuf,
    pub base_url: String,
    pub secret: String,
}

#[derive(Debug, Clone)]
pub struct IdentityConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct CodegenConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub model: String,
}

impl Config {
    /// Construct a `Config` from environment variables, falling back
    /// to reasonable defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let bind_addr = env::var("SIMULO_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = read_env_or_default("PORT", 3000u16)?;
        let max_clients = read_env_or_default("SIMULO_MAX_CLIENTS", 1024usize)?;

        let toolchain = ToolchainConfig {
            work_dir: read_env_or_default("SIMULO_WORK_DIR", PathBuf::from("workdir"))?,
            template_dir: read_env_or_default("SIMULO_TEMPLATE_DIR", PathBuf::from("template"))?,
            cargo: env::var("SIMULO_CARGO").unwrap_or_else(|_| "cargo".to_string()),
            target: env::var("SIMULO_TARGET")
                .unwrap_or_else(|_| "wasm32-unknown-unknown".to_string()),
        };

        let objects = ObjectStoreConfig {
            root: read_env_or_default("SIMULO_OBJECT_DIR", PathBuf::from("objects"))?,
            base_url: env::var("SIMULO_OBJECT_BASE_URL")
                .unwrap_or_else(|_| format!("http://localhost:{}/objects", port)),
            secret: env::var("SIMULO_OBJECT_SECRET")
                .unwrap_or_else(|_| hex::encode(rand::random::<[u8; 32]>())),
        };

        let identity = match env::var("SIMULO_IDENTITY_URL") {
            Ok(url) => Some(IdentityConfig {
                url,
                api_key: env::var("SIMULO_IDENTITY_KEY")
                    .context("SIMULO_IDENTITY_KEY is required with SIMULO_IDENTITY_URL")?,
            }),
            Err(_) => None,
        };

        let codegen = CodegenConfig {
            url: env::var("SIMULO_CODEGEN_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            api_key: env::var("SIMULO_CODEGEN_KEY").ok(),
            model: env::var("SIMULO_CODEGEN_MODEL")
                .unwrap_or_else(|_| "moonshotai/kimi-k2-instruct".to_string()),
        };

        Ok(Config {
            bind_addr,
            port,
            max_clients,
            cors_origin: env::var("SIMULO_CORS_ORIGIN").ok(),
            toolchain,
            objects,
            identity,
            codegen,
            seed_file: env::var("SIMULO_SEED_FILE").ok().map(PathBuf::from),
        })
    }

    /// Convenience: `addr:port` socket string.
    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn read_env_or_default<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: {:?}", key, val)),
        Err(_) => Ok(default),
    }
}
