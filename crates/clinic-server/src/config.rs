//! Server Configuration
//!
//! Everything comes from the environment (after `.env` is loaded).

use clinic_billing::CheckoutRoutes;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub site_url: String,
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".into(),
            site_url: "http://localhost:3000".into(),
            static_dir: "static".into(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            site_url: env_or("SITE_URL", defaults.site_url),
            static_dir: env_or("STATIC_DIR", defaults.static_dir),
        }
    }

    pub fn routes(&self) -> CheckoutRoutes {
        CheckoutRoutes::from_site_url(&self.site_url)
    }
}

fn env_or(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}
