use std::env;

use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use sqlx::postgres::PgConnectOptions;

#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname shared by every downstream dependency.
    pub host: String,
    pub postgres_port: u16,
    pub redis_port: u16,
    pub ollama_port: u16,
    pub postgres_user: String,
    pub postgres_password: String,
    pub postgres_db: String,
    /// Empty disables Redis auth.
    pub redis_password: String,
    /// Container engine endpoint, e.g. "tcp://127.0.0.1:2375". None disables the container client.
    pub docker_host: Option<String>,
    pub api_port: u16,
    /// Comma-separated list of allowed CORS origins, or "*" for any.
    pub cors_origin: String,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| anyhow::anyhow!("{key} is required"))
}

fn required_port(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<u16> {
    let raw = required(lookup, key)?;
    raw.trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} must be a valid port, got {raw:?}"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        Ok(Self {
            host: required(&lookup, "ORCHESTRATOR_HOST")?,
            postgres_port: required_port(&lookup, "RESOURCE_PORTS_POSTGRES")?,
            redis_port: required_port(&lookup, "RESOURCE_PORTS_REDIS")?,
            ollama_port: required_port(&lookup, "RESOURCE_PORTS_OLLAMA")?,
            postgres_user: lookup("POSTGRES_USER").unwrap_or_else(|| "postgres".into()),
            postgres_password: lookup("POSTGRES_PASSWORD").unwrap_or_default(),
            postgres_db: lookup("POSTGRES_DB")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| "orchestrator".into()),
            redis_password: lookup("REDIS_PASSWORD").unwrap_or_default(),
            docker_host: lookup("DOCKER_HOST").filter(|v| !v.trim().is_empty()),
            api_port: required_port(&lookup, "API_PORT")?,
            cors_origin: lookup("CORS_ORIGIN").unwrap_or_else(|| "*".into()),
        })
    }

    /// Store connection options. Credentials are passed as fields, never spliced into a URL.
    pub fn pg_connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.postgres_port)
            .username(&self.postgres_user)
            .password(&self.postgres_password)
            .database(&self.postgres_db)
    }

    pub fn redis_connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.redis_port),
            redis: RedisConnectionInfo {
                password: (!self.redis_password.is_empty()).then(|| self.redis_password.clone()),
                ..Default::default()
            },
        }
    }

    pub fn ollama_url(&self) -> String {
        format!("http://{}:{}", self.host, self.ollama_port)
    }

    /// Container engine base URL; `tcp://` is rewritten to `http://`.
    pub fn docker_url(&self) -> Option<String> {
        self.docker_host.as_deref().map(|h| match h.strip_prefix("tcp://") {
            Some(rest) => format!("http://{rest}"),
            None => h.trim_end_matches('/').to_string(),
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("0.0.0.0:{}", self.api_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("ORCHESTRATOR_HOST", "db.internal"),
            ("RESOURCE_PORTS_POSTGRES", "5432"),
            ("RESOURCE_PORTS_REDIS", "6379"),
            ("RESOURCE_PORTS_OLLAMA", "11434"),
            ("API_PORT", "8080"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> anyhow::Result<Config> {
        Config::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn derives_urls_and_defaults() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.postgres_db, "orchestrator");
        let pg = config.pg_connect_options();
        assert_eq!(pg.get_host(), "db.internal");
        assert_eq!(pg.get_port(), 5432);
        assert_eq!(pg.get_username(), "postgres");
        assert_eq!(pg.get_database(), Some("orchestrator"));
        let redis = config.redis_connection_info();
        assert_eq!(
            redis.addr,
            ConnectionAddr::Tcp("db.internal".to_string(), 6379)
        );
        assert!(redis.redis.password.is_none());
        assert_eq!(config.ollama_url(), "http://db.internal:11434");
        assert_eq!(config.listen_addr(), "0.0.0.0:8080");
        assert!(config.docker_url().is_none());
    }

    #[test]
    fn redis_password_enables_auth() {
        let mut vars = base_env();
        vars.insert("REDIS_PASSWORD", "hunter2");
        vars.insert("DOCKER_HOST", "tcp://10.0.0.5:2375");
        let config = load(&vars).unwrap();
        assert_eq!(
            config.redis_connection_info().redis.password.as_deref(),
            Some("hunter2")
        );
        assert_eq!(config.docker_url().as_deref(), Some("http://10.0.0.5:2375"));
    }

    #[test]
    fn reserved_characters_in_passwords_stay_out_of_the_address() {
        let mut vars = base_env();
        vars.insert("POSTGRES_PASSWORD", "p@ss/w#rd");
        vars.insert("REDIS_PASSWORD", "r@d/is");
        let config = load(&vars).unwrap();

        let pg = config.pg_connect_options();
        assert_eq!(pg.get_host(), "db.internal");
        assert_eq!(pg.get_port(), 5432);
        assert_eq!(pg.get_database(), Some("orchestrator"));

        let redis = config.redis_connection_info();
        assert_eq!(
            redis.addr,
            ConnectionAddr::Tcp("db.internal".to_string(), 6379)
        );
        assert_eq!(redis.redis.password.as_deref(), Some("r@d/is"));
        assert_eq!(redis.redis.db, 0);
        assert!(redis::Client::open(redis).is_ok());
    }

    #[test]
    fn missing_required_key_names_it() {
        for key in [
            "ORCHESTRATOR_HOST",
            "RESOURCE_PORTS_POSTGRES",
            "RESOURCE_PORTS_REDIS",
            "RESOURCE_PORTS_OLLAMA",
            "API_PORT",
        ] {
            let mut vars = base_env();
            vars.remove(key);
            let err = load(&vars).unwrap_err();
            assert_eq!(err.to_string(), format!("{key} is required"));
        }
    }

    #[test]
    fn rejects_bad_port() {
        let mut vars = base_env();
        vars.insert("API_PORT", "http");
        assert!(load(&vars).is_err());
    }
}
