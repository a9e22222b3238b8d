use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub credentials_secret: Option<String>,
    pub rate_limit_requests: u32,
    pub rate_limit_window_ms: u64,
    pub rate_limit_sweep_secs: u64,
    pub openrouter_api_key: Option<String>,
    pub google_gemini_api_key: Option<String>,
    pub app_url: String,
    pub secure_cookies: bool,
    pub openrouter_base_url: String,
    pub gemini_base_url: String,
    pub upstream_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// 从任意键值来源构建配置，数值项缺失或无效时回退到默认值
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Config {
            server_host: non_blank("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            server_port: non_blank("SERVER_PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            api_base_uri: non_blank("API_BASE_URI").unwrap_or_else(|| "/api".into()),
            credentials_secret: non_blank("PMPRO_CREDENTIALS_SECRET"),
            rate_limit_requests: positive(non_blank("PMPRO_RATE_LIMIT_MAX"), 20),
            rate_limit_window_ms: positive(non_blank("PMPRO_RATE_LIMIT_WINDOW_MS"), 60_000),
            rate_limit_sweep_secs: positive(non_blank("RATE_LIMIT_SWEEP_SECS"), 60),
            openrouter_api_key: non_blank("OPENROUTER_API_KEY"),
            google_gemini_api_key: non_blank("GOOGLE_GEMINI_API_KEY"),
            app_url: non_blank("APP_URL").unwrap_or_else(|| "http://localhost:3000".into()),
            secure_cookies: non_blank("APP_ENV").is_some_and(|v| v == "production"),
            openrouter_base_url: non_blank("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| "https://openrouter.ai".into()),
            gemini_base_url: non_blank("GEMINI_BASE_URL")
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".into()),
            upstream_timeout_secs: positive(non_blank("UPSTREAM_TIMEOUT_SECS"), 60),
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_millis(self.rate_limit_window_ms)
    }

    pub fn rate_limit_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_sweep_secs)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

// 与 parseInt 一致：取前导数字部分，非正数视为未设置
fn positive<T>(raw: Option<String>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|v| {
        let digits: String = v
            .chars()
            .enumerate()
            .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
            .map(|(_, c)| c)
            .collect();
        digits.parse::<T>().ok()
    })
    .filter(|v| *v > T::default())
    .unwrap_or(default)
}
