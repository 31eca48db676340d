//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject mutually exclusive trust settings
//! - Validate value ranges (timeouts > 0, handler limits, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::EngineConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let client = &config.client;
    let server = &config.server;

    if !client.verify_ssl && client.ca_file.is_some() {
        errors.push(ValidationError::new(
            "client.ca_file",
            "either disable certificate validation with verify_ssl = false or supply ca_file, not both",
        ));
    }

    if client.keepalive_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "client.keepalive_timeout_secs",
            "must be greater than zero",
        ));
    }

    if client.connect_timeout_ms == Some(0) {
        errors.push(ValidationError::new(
            "client.connect_timeout_ms",
            "must be greater than zero when set",
        ));
    }

    if let Some(proxy) = &client.proxy {
        match url::Url::parse(&proxy.url) {
            Ok(url) if url.scheme() == "http" && url.host_str().is_some() => {}
            Ok(_) => errors.push(ValidationError::new(
                "client.proxy.url",
                "only http:// proxies are supported",
            )),
            Err(e) => errors.push(ValidationError::new("client.proxy.url", e.to_string())),
        }
        if proxy.password.is_some() && proxy.login.is_none() {
            errors.push(ValidationError::new(
                "client.proxy.password",
                "password given without login",
            ));
        }
    }

    if client.proxy.is_some() && client.unix_socket.is_some() {
        errors.push(ValidationError::new(
            "client.unix_socket",
            "cannot be combined with a proxy",
        ));
    }

    if server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "server.bind_address",
            format!("not a socket address: {}", server.bind_address),
        ));
    }

    if server.max_connections == 0 {
        errors.push(ValidationError::new(
            "server.max_connections",
            "must be greater than zero",
        ));
    }

    if server.max_concurrent_handlers == 0 {
        errors.push(ValidationError::new(
            "server.max_concurrent_handlers",
            "must be at least 1",
        ));
    }

    if server.keepalive_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "server.keepalive_timeout_secs",
            "must be greater than zero",
        ));
    }

    for (field, value) in [
        ("server.lingering_time_secs", Some(server.lingering_time_secs)),
        ("server.lingering_timeout_secs", Some(server.lingering_timeout_secs)),
        ("server.shutdown_timeout_secs", Some(server.shutdown_timeout_secs)),
        ("server.handler_timeout_secs", server.handler_timeout_secs),
    ] {
        if let Some(value) = value {
            if !value.is_finite() || value < 0.0 {
                errors.push(ValidationError::new(field, "must be a non-negative number"));
            }
        }
    }

    if server.max_line_size == 0 || server.max_field_size == 0 || server.max_headers == 0 {
        errors.push(ValidationError::new(
            "server.max_line_size",
            "header limits must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ProxyConfig;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&EngineConfig::default()).is_ok());
    }

    #[test]
    fn verify_disabled_with_ca_file_is_rejected() {
        let mut config = EngineConfig::default();
        config.client.verify_ssl = false;
        config.client.ca_file = Some("roots.pem".into());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "client.ca_file");
    }

    #[test]
    fn reports_every_problem() {
        let mut config = EngineConfig::default();
        config.client.proxy = Some(ProxyConfig {
            url: "https://proxy:3128".into(),
            login: None,
            password: None,
        });
        config.server.max_concurrent_handlers = 0;
        config.server.lingering_time_secs = f64::NAN;
        config.server.bind_address = "nowhere".into();

        let fields: Vec<_> = validate_config(&config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.field)
            .collect();
        assert!(fields.contains(&"client.proxy.url"));
        assert!(fields.contains(&"server.max_concurrent_handlers"));
        assert!(fields.contains(&"server.lingering_time_secs"));
        assert!(fields.contains(&"server.bind_address"));
    }
}
