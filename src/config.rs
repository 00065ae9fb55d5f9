//! Startup configuration, resolved from environment variables with
//! hard-coded defaults. A malformed override is a startup-fatal error
//! rather than a silently-ignored one.

use std::env;
use std::fmt;
use std::net::IpAddr;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 1234;
const DEFAULT_BACKLOG: u32 = 1024;

const BIND_ADDR_VAR: &str = "KEYSPACE_BIND_ADDR";
const PORT_VAR: &str = "KEYSPACE_PORT";
const BACKLOG_VAR: &str = "KEYSPACE_BACKLOG";

/// An environment override that couldn't be parsed.
#[derive(Debug)]
pub struct ConfigError {
    var: &'static str,
    value: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid value for {}: {:?}", self.var, self.value)
    }
}

impl std::error::Error for ConfigError {}

/// Resolved startup configuration for the server binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub backlog: u32,
}

impl Config {
    /// Resolves configuration from the process environment, falling back
    /// to defaults for any variable that isn't set.
    pub fn from_env() -> Result<Config, ConfigError> {
        let bind_addr = match env::var(BIND_ADDR_VAR) {
            Ok(value) => value.parse().map_err(|_| ConfigError {
                var: BIND_ADDR_VAR,
                value,
            })?,
            Err(_) => DEFAULT_BIND_ADDR.parse().expect("default bind address is valid"),
        };
        let port = match env::var(PORT_VAR) {
            Ok(value) => value.parse().map_err(|_| ConfigError { var: PORT_VAR, value })?,
            Err(_) => DEFAULT_PORT,
        };
        let backlog = match env::var(BACKLOG_VAR) {
            Ok(value) => value.parse().map_err(|_| ConfigError { var: BACKLOG_VAR, value })?,
            Err(_) => DEFAULT_BACKLOG,
        };
        Ok(Config { bind_addr, port, backlog })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_no_env_vars_are_set() {
        // This test assumes none of the KEYSPACE_* vars are set in the
        // test process; see `overrides_are_applied` for the override path.
        env::remove_var(BIND_ADDR_VAR);
        env::remove_var(PORT_VAR);
        env::remove_var(BACKLOG_VAR);
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_addr, DEFAULT_BIND_ADDR.parse::<IpAddr>().unwrap());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.backlog, DEFAULT_BACKLOG);
    }

    #[test]
    fn malformed_port_is_a_config_error() {
        env::set_var(PORT_VAR, "not-a-port");
        let result = Config::from_env();
        env::remove_var(PORT_VAR);
        assert!(result.is_err());
    }
}
