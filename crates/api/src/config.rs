//! Application configuration loaded from environment variables.

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Base URLs of the four services an order touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUrls {
    pub cart: String,
    pub product: String,
    pub inventory: String,
    pub payment: String,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for text
/// - `DATABASE_URL`: Postgres order store; unset means in-memory
/// - `CART_SERVICE_URL`, `PRODUCT_SERVICE_URL`, `INVENTORY_SERVICE_URL`,
///   `PAYMENT_SERVICE_URL`: remote services; unless all four are set the
///   server runs against seeded in-memory services
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub cart_service_url: Option<String>,
    pub product_service_url: Option<String>,
    pub inventory_service_url: Option<String>,
    pub payment_service_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or_default(),
            database_url: non_empty_var("DATABASE_URL"),
            cart_service_url: non_empty_var("CART_SERVICE_URL"),
            product_service_url: non_empty_var("PRODUCT_SERVICE_URL"),
            inventory_service_url: non_empty_var("INVENTORY_SERVICE_URL"),
            payment_service_url: non_empty_var("PAYMENT_SERVICE_URL"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the remote service URLs if every one of them is configured.
    pub fn service_urls(&self) -> Option<ServiceUrls> {
        Some(ServiceUrls {
            cart: self.cart_service_url.clone()?,
            product: self.product_service_url.clone()?,
            inventory: self.inventory_service_url.clone()?,
            payment: self.payment_service_url.clone()?,
        })
    }

    /// Returns true if some, but not all, service URLs are set.
    pub fn has_partial_service_urls(&self) -> bool {
        let set = [
            &self.cart_service_url,
            &self.product_service_url,
            &self.inventory_service_url,
            &self.payment_service_url,
        ]
        .iter()
        .filter(|url| url.is_some())
        .count();
        set > 0 && set < 4
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            cart_service_url: None,
            product_service_url: None,
            inventory_service_url: None,
            payment_service_url: None,
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
