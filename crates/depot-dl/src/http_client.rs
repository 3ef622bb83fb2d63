use std::time::Duration;

use ureq::{Agent, Proxy};

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub user_agent: Option<String>,
    pub proxy: Option<Proxy>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: Some(concat!("depot/", env!("CARGO_PKG_VERSION")).into()),
            proxy: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Self {
        Self {
            user_agent: Some(user_agent.into()),
            proxy: Proxy::try_from_env(),
            timeout: Some(timeout),
        }
    }

    /// Builds an HTTP `Agent` configured from this `ClientConfig`.
    ///
    /// Status codes are never turned into errors; callers inspect them.
    pub fn build(&self) -> Agent {
        let mut config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .proxy(self.proxy.clone())
            .timeout_global(self.timeout);

        if let Some(user_agent) = &self.user_agent {
            config = config.user_agent(user_agent);
        }

        config.build().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = ClientConfig::default();
        assert!(config
            .user_agent
            .as_deref()
            .is_some_and(|ua| ua.starts_with("depot/")));
        assert!(config.proxy.is_none());
        assert!(config.timeout.is_none());
    }

    #[test]
    fn test_client_config_with_timeout() {
        let config = ClientConfig::new("depot-test", Duration::from_secs(30));
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        let _ = config.build().get("https://f-droid.org/repo/index-v2.json");
    }
}
