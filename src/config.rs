use std::str::FromStr;

use crate::engine::FailurePolicy;

/// Server settings, read from `SLOTGUARD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub password: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub tls_cert: Option<String>,
    pub tls_key: Option<String>,
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 5433,
            password: "slotguard".into(),
            max_connections: 256,
            metrics_port: None,
            tls_cert: None,
            tls_key: None,
            failure_policy: FailurePolicy::Strict,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let failure_policy = match lookup("SLOTGUARD_FETCH_FAILURE_POLICY") {
            Some(raw) => FailurePolicy::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!("{e}; using {:?}", defaults.failure_policy);
                defaults.failure_policy
            }),
            None => defaults.failure_policy,
        };

        Self {
            bind: lookup("SLOTGUARD_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "SLOTGUARD_PORT").unwrap_or(defaults.port),
            password: lookup("SLOTGUARD_PASSWORD").unwrap_or(defaults.password),
            max_connections: parse_var(&lookup, "SLOTGUARD_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            metrics_port: parse_var(&lookup, "SLOTGUARD_METRICS_PORT"),
            tls_cert: lookup("SLOTGUARD_TLS_CERT"),
            tls_key: lookup("SLOTGUARD_TLS_KEY"),
            failure_policy,
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
