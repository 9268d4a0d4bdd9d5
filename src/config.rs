use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_COMPLETION_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BRIDGE_TIMEOUT_MS: u64 = 3_000;
const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_DATA_DIR: &str = ".promptbridge";
const DEFAULT_ORIGINS: &[&str] = &["popup", "content"];

/// Outbound completion call settings.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub endpoint: String,
    pub model: String,
    /// Sampling temperature, clamped to [0, 2].
    pub temperature: f64,
    /// Bound on the whole request, connect through body.
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            timeout: Duration::from_secs(DEFAULT_COMPLETION_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// How long a resolved credential is served from memory. Zero disables caching.
    pub cache_ttl: Duration,
    pub bridge_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            bridge_timeout: Duration::from_millis(DEFAULT_BRIDGE_TIMEOUT_MS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub completion: CompletionConfig,
    pub resolver: ResolverConfig,
    /// Directory holding the local credential file.
    pub data_dir: PathBuf,
    /// Native host executable. `None` leaves the bridge tier unavailable.
    pub native_host: Option<PathBuf>,
    /// UI contexts attached at startup.
    pub origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            resolver: ResolverConfig::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            native_host: None,
            origins: DEFAULT_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unset or unparsable values
    /// fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let temperature = parse_or(
            "OPENAI_TEMPERATURE",
            get("OPENAI_TEMPERATURE"),
            defaults.completion.temperature,
        );
        let temperature = if temperature.is_finite() {
            temperature.clamp(0.0, 2.0)
        } else {
            tracing::warn!("OPENAI_TEMPERATURE is not finite, using default");
            DEFAULT_TEMPERATURE
        };

        let completion = CompletionConfig {
            endpoint: get("OPENAI_API_URL").unwrap_or(defaults.completion.endpoint),
            model: get("OPENAI_MODEL").unwrap_or(defaults.completion.model),
            temperature,
            timeout: Duration::from_secs(parse_or(
                "PROMPTBRIDGE_COMPLETION_TIMEOUT_SECS",
                get("PROMPTBRIDGE_COMPLETION_TIMEOUT_SECS"),
                DEFAULT_COMPLETION_TIMEOUT_SECS,
            )),
        };

        let resolver = ResolverConfig {
            cache_ttl: Duration::from_secs(parse_or(
                "PROMPTBRIDGE_CACHE_TTL_SECS",
                get("PROMPTBRIDGE_CACHE_TTL_SECS"),
                DEFAULT_CACHE_TTL_SECS,
            )),
            bridge_timeout: Duration::from_millis(parse_or(
                "PROMPTBRIDGE_BRIDGE_TIMEOUT_MS",
                get("PROMPTBRIDGE_BRIDGE_TIMEOUT_MS"),
                DEFAULT_BRIDGE_TIMEOUT_MS,
            )),
        };

        let native_host = get("PROMPTBRIDGE_NATIVE_HOST").map(PathBuf::from);
        if native_host.is_none() {
            tracing::warn!("PROMPTBRIDGE_NATIVE_HOST not set, native credential host unavailable");
        }

        let origins = get("PROMPTBRIDGE_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.origins);

        Config {
            completion,
            resolver,
            data_dir: get("PROMPTBRIDGE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            native_host,
            origins,
        }
    }
}

fn parse_or<T: FromStr + Copy>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{name}={raw:?} is not valid, using default");
            default
        }),
    }
}

/// Load `.env` from the binary's directory (hosts are launched by the browser
/// with an arbitrary CWD). Falls back to the project root for development
/// builds, then to dotenvy's CWD search.
pub fn load_dotenv() {
    let Some(dir) = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|d| d.to_path_buf()))
    else {
        dotenvy::dotenv().ok();
        return;
    };

    let env_path = dir.join(".env");
    if env_path.exists() {
        dotenvy::from_path(&env_path).ok();
        return;
    }
    // target/<profile>/../../.env
    let project_root = dir.join("../../.env");
    if project_root.exists() {
        dotenvy::from_path(&project_root).ok();
    } else {
        dotenvy::dotenv().ok();
    }
}
