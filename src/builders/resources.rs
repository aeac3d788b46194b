//! Container resource requirements and storage quantities.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::config::Config;
use crate::config::ResourceDefaults;
use crate::crd::UnifiedPushServer;
use crate::error::Error;
use crate::error::Result;

const MEMORY: &str = "memory";
const CPU: &str = "cpu";

const SUFFIXES: [&str; 15] = [
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P", "E",
];

/// Parses a Kubernetes quantity such as `512Mi`, `250m`, `1.5` or `1e3`.
pub fn parse_quantity(value: &str) -> Result<Quantity> {
    let invalid = || Error::Configuration(format!("quantity {value:?} is not valid"));

    let unsigned = value.strip_prefix(['+', '-']).unwrap_or(value);
    let number_len = unsigned
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(unsigned.len());
    let (number, suffix) = unsigned.split_at(number_len);

    let mut parts = number.split('.');
    let integer = parts.next().unwrap_or_default();
    let fraction = parts.next();
    if parts.next().is_some() || (integer.is_empty() && fraction.is_none_or(str::is_empty)) {
        return Err(invalid());
    }

    let valid_suffix = suffix.is_empty() || SUFFIXES.contains(&suffix) || is_exponent(suffix);
    if !valid_suffix {
        return Err(invalid());
    }

    Ok(Quantity(value.to_owned()))
}

fn is_exponent(suffix: &str) -> bool {
    let Some(exponent) = suffix.strip_prefix(['e', 'E']) else {
        return false;
    };
    let digits = exponent.strip_prefix(['+', '-']).unwrap_or(exponent);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Layers the overrides of a resource over the operator defaults, key by key.
///
/// Keys the defaults don't know about (e.g. `ephemeral-storage`) are kept. Every override must
/// parse as a quantity.
pub fn resource_requirements(
    overrides: Option<&ResourceRequirements>,
    defaults: &ResourceDefaults,
) -> Result<ResourceRequirements> {
    let limits = layer(
        overrides.and_then(|o| o.limits.as_ref()),
        [(MEMORY, &defaults.memory_limit), (CPU, &defaults.cpu_limit)],
    )?;
    let requests = layer(
        overrides.and_then(|o| o.requests.as_ref()),
        [(MEMORY, &defaults.memory_request), (CPU, &defaults.cpu_request)],
    )?;

    Ok(ResourceRequirements {
        limits: Some(limits),
        requests: Some(requests),
        ..Default::default()
    })
}

fn layer(
    overrides: Option<&BTreeMap<String, Quantity>>,
    defaults: [(&str, &String); 2],
) -> Result<BTreeMap<String, Quantity>> {
    let mut layered = overrides
        .into_iter()
        .flatten()
        .map(|(key, quantity)| parse_quantity(&quantity.0).map(|parsed| (key.clone(), parsed)))
        .collect::<Result<BTreeMap<_, _>>>()?;
    for (key, default) in defaults {
        if !layered.contains_key(key) {
            layered.insert(key.to_owned(), parse_quantity(default)?);
        }
    }

    Ok(layered)
}

pub fn ups_resources(server: &UnifiedPushServer, config: &Config) -> Result<ResourceRequirements> {
    resource_requirements(
        server.spec.unified_push_resource_requirements.as_ref(),
        &config.ups_resources(),
    )
}

pub fn oauth_proxy_resources(server: &UnifiedPushServer, config: &Config) -> Result<ResourceRequirements> {
    resource_requirements(server.spec.oauth_resource_requirements.as_ref(), &config.oauth_resources())
}

pub fn postgres_resources(server: &UnifiedPushServer, config: &Config) -> Result<ResourceRequirements> {
    resource_requirements(
        server.spec.postgres_resource_requirements.as_ref(),
        &config.postgres_resources(),
    )
}

/// Storage of the database volume: the resource's own size, else the operator default.
pub fn postgres_pvc_size(server: &UnifiedPushServer, config: &Config) -> Result<Quantity> {
    let size = server
        .spec
        .postgres_pvc_size
        .as_deref()
        .filter(|size| !size.is_empty())
        .unwrap_or(&config.postgres_pvc_size);

    parse_quantity(size)
}
