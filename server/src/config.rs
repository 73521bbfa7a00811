use anyhow::Result;
use platform_authz::DeploymentMode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub mode: DeploymentMode,
    pub cors_allowed_origins: Vec<String>,
    pub otlp_endpoint: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mode: DeploymentMode::Development,
            cors_allowed_origins: Vec::new(),
            otlp_endpoint: None,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        let mode = parse_mode(std::env::var("APP_ENV").ok().as_deref());

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:8080".into())
            .split(',')
            .filter_map(|s| {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            })
            .collect::<Vec<_>>();

        let otlp_endpoint = std::env::var("OTLP_ENDPOINT")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Ok(Self {
            mode,
            cors_allowed_origins,
            otlp_endpoint,
        })
    }
}

fn parse_mode(raw: Option<&str>) -> DeploymentMode {
    match raw.map(str::trim) {
        Some(value) if value.eq_ignore_ascii_case("production") => DeploymentMode::Production,
        _ => DeploymentMode::Development,
    }
}
