//! Operator configuration.
//!
//! Every value can be given as a command line flag or through the environment. The defaults
//! are the ones the operator ships with; [Config::default] returns them without looking at
//! the process environment, which is what the tests use.

use clap::Parser;

use crate::builders::resources::parse_quantity;
use crate::error::Result;

pub const DEFAULT_UPS_IMAGE: &str = "quay.io/aerogear/unifiedpush-configurable-container:2.3";
pub const DEFAULT_POSTGRES_IMAGE: &str = "docker.io/centos/postgresql-96-centos7:9.6";
pub const DEFAULT_OAUTH_PROXY_IMAGE: &str = "quay.io/openshift/origin-oauth-proxy:4.2.0";
pub const DEFAULT_BACKUP_IMAGE: &str = "quay.io/integreatly/backup-container:1.0.8";

/// Memory and cpu requests and limits a container gets unless the resource overrides them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefaults {
    pub memory_limit: String,
    pub memory_request: String,
    pub cpu_limit: String,
    pub cpu_request: String,
}

impl ResourceDefaults {
    fn new(memory_limit: &str, memory_request: &str, cpu_limit: &str, cpu_request: &str) -> Self {
        Self {
            memory_limit: memory_limit.to_owned(),
            memory_request: memory_request.to_owned(),
            cpu_limit: cpu_limit.to_owned(),
            cpu_request: cpu_request.to_owned(),
        }
    }

    fn quantities(&self) -> [&str; 4] {
        [
            &self.memory_limit,
            &self.memory_request,
            &self.cpu_limit,
            &self.cpu_request,
        ]
    }
}

/// UnifiedPush Kubernetes Operator
#[derive(Parser, Debug, Clone)]
#[command(name = "unifiedpush-operator")]
#[command(version, about = "Kubernetes Operator for UnifiedPush servers")]
pub struct Config {
    #[arg(long, env = "UPS_CONTAINER_NAME", default_value = "ups")]
    pub ups_container_name: String,
    #[arg(long, env = "POSTGRES_CONTAINER_NAME", default_value = "postgresql")]
    pub postgres_container_name: String,
    #[arg(long, env = "OAUTH_PROXY_CONTAINER_NAME", default_value = "ups-oauth-proxy")]
    pub oauth_proxy_container_name: String,

    #[arg(long, env = "UPS_IMAGE", default_value = DEFAULT_UPS_IMAGE)]
    pub ups_image: String,
    #[arg(long, env = "POSTGRES_IMAGE", default_value = DEFAULT_POSTGRES_IMAGE)]
    pub postgres_image: String,
    #[arg(long, env = "OAUTH_PROXY_IMAGE", default_value = DEFAULT_OAUTH_PROXY_IMAGE)]
    pub oauth_proxy_image: String,
    #[arg(long, env = "BACKUP_IMAGE", default_value = DEFAULT_BACKUP_IMAGE)]
    pub backup_image: String,

    #[arg(long, env = "UPS_MEMORY_LIMIT", default_value = "2Gi")]
    pub ups_memory_limit: String,
    #[arg(long, env = "UPS_MEMORY_REQUEST", default_value = "512Mi")]
    pub ups_memory_request: String,
    #[arg(long, env = "UPS_CPU_LIMIT", default_value = "1")]
    pub ups_cpu_limit: String,
    #[arg(long, env = "UPS_CPU_REQUEST", default_value = "500m")]
    pub ups_cpu_request: String,

    #[arg(long, env = "OAUTH_MEMORY_LIMIT", default_value = "64Mi")]
    pub oauth_memory_limit: String,
    #[arg(long, env = "OAUTH_MEMORY_REQUEST", default_value = "32Mi")]
    pub oauth_memory_request: String,
    #[arg(long, env = "OAUTH_CPU_LIMIT", default_value = "20m")]
    pub oauth_cpu_limit: String,
    #[arg(long, env = "OAUTH_CPU_REQUEST", default_value = "10m")]
    pub oauth_cpu_request: String,

    #[arg(long, env = "POSTGRES_MEMORY_LIMIT", default_value = "512Mi")]
    pub postgres_memory_limit: String,
    #[arg(long, env = "POSTGRES_MEMORY_REQUEST", default_value = "256Mi")]
    pub postgres_memory_request: String,
    #[arg(long, env = "POSTGRES_CPU_LIMIT", default_value = "1")]
    pub postgres_cpu_limit: String,
    #[arg(long, env = "POSTGRES_CPU_REQUEST", default_value = "250m")]
    pub postgres_cpu_request: String,

    /// Storage requested for the database volume unless the resource sets its own size
    #[arg(long, env = "POSTGRES_PVC_SIZE", default_value = "5Gi")]
    pub postgres_pvc_size: String,

    /// Namespaces to reconcile, comma separated (empty for all namespaces)
    #[arg(long, env = "SERVICE_NAMESPACE", value_delimiter = ',')]
    pub service_namespace: Vec<String>,

    /// Maximum number of resources reconciled at the same time
    #[arg(long, env = "MAX_CONCURRENT_RECONCILES", default_value_t = 4)]
    pub max_concurrent_reconciles: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ups_container_name: "ups".to_owned(),
            postgres_container_name: "postgresql".to_owned(),
            oauth_proxy_container_name: "ups-oauth-proxy".to_owned(),
            ups_image: DEFAULT_UPS_IMAGE.to_owned(),
            postgres_image: DEFAULT_POSTGRES_IMAGE.to_owned(),
            oauth_proxy_image: DEFAULT_OAUTH_PROXY_IMAGE.to_owned(),
            backup_image: DEFAULT_BACKUP_IMAGE.to_owned(),
            ups_memory_limit: "2Gi".to_owned(),
            ups_memory_request: "512Mi".to_owned(),
            ups_cpu_limit: "1".to_owned(),
            ups_cpu_request: "500m".to_owned(),
            oauth_memory_limit: "64Mi".to_owned(),
            oauth_memory_request: "32Mi".to_owned(),
            oauth_cpu_limit: "20m".to_owned(),
            oauth_cpu_request: "10m".to_owned(),
            postgres_memory_limit: "512Mi".to_owned(),
            postgres_memory_request: "256Mi".to_owned(),
            postgres_cpu_limit: "1".to_owned(),
            postgres_cpu_request: "250m".to_owned(),
            postgres_pvc_size: "5Gi".to_owned(),
            service_namespace: Vec::new(),
            max_concurrent_reconciles: 4,
        }
    }
}

impl Config {
    pub fn ups_resources(&self) -> ResourceDefaults {
        ResourceDefaults::new(
            &self.ups_memory_limit,
            &self.ups_memory_request,
            &self.ups_cpu_limit,
            &self.ups_cpu_request,
        )
    }

    pub fn oauth_resources(&self) -> ResourceDefaults {
        ResourceDefaults::new(
            &self.oauth_memory_limit,
            &self.oauth_memory_request,
            &self.oauth_cpu_limit,
            &self.oauth_cpu_request,
        )
    }

    pub fn postgres_resources(&self) -> ResourceDefaults {
        ResourceDefaults::new(
            &self.postgres_memory_limit,
            &self.postgres_memory_request,
            &self.postgres_cpu_limit,
            &self.postgres_cpu_request,
        )
    }

    /// The namespaces the operator is restricted to, or `None` when it watches all of them.
    pub fn namespaces(&self) -> Option<Vec<&str>> {
        let namespaces: Vec<&str> = self
            .service_namespace
            .iter()
            .map(|namespace| namespace.trim())
            .filter(|namespace| !namespace.is_empty())
            .collect();

        (!namespaces.is_empty()).then_some(namespaces)
    }

    pub fn watches(&self, namespace: &str) -> bool {
        self.namespaces()
            .is_none_or(|namespaces| namespaces.contains(&namespace))
    }

    /// Rejects default quantities that could never be applied to a container or volume.
    pub fn validate(&self) -> Result<()> {
        let defaults = [self.ups_resources(), self.oauth_resources(), self.postgres_resources()];
        for quantity in defaults.iter().flat_map(ResourceDefaults::quantities) {
            parse_quantity(quantity)?;
        }
        parse_quantity(&self.postgres_pvc_size)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use rstest::rstest;

    #[test]
    fn test_default_matches_cli_defaults() {
        // Given: A command line without any flags
        let parsed = Config::try_parse_from(["unifiedpush-operator"]).unwrap();

        // Then: It yields the same values as Config::default (unless the env overrides them)
        if std::env::vars().all(|(key, _)| !key.starts_with("UPS_") && !key.starts_with("POSTGRES_")) {
            assert_eq!(parsed.ups_image, Config::default().ups_image);
            assert_eq!(parsed.postgres_pvc_size, Config::default().postgres_pvc_size);
            assert_eq!(parsed.ups_resources(), Config::default().ups_resources());
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_default_quantity_is_rejected() {
        // Given: A malformed memory limit
        let config = Config {
            oauth_memory_limit: "64Mb".to_owned(),
            ..Config::default()
        };

        // When: Validating
        let result = config.validate();

        // Then: A configuration error is reported
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[rstest]
    #[case(vec![], "anything", true)]
    #[case(vec!["".to_owned()], "anything", true)]
    #[case(vec!["push".to_owned()], "push", true)]
    #[case(vec!["push".to_owned()], "other", false)]
    #[case(vec!["a".to_owned(), " push ".to_owned()], "push", true)]
    fn test_namespace_restriction(#[case] service_namespace: Vec<String>, #[case] namespace: &str, #[case] expected: bool) {
        // Given: A namespace restriction
        let config = Config {
            service_namespace,
            ..Config::default()
        };

        // Then: Only listed namespaces are watched, an empty list watches all
        assert_eq!(config.watches(namespace), expected);
    }
}
