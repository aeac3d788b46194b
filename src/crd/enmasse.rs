//! AMQ Online (EnMasse) kinds backing the optional message broker.

use k8s_openapi::ByteString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// A tenant of the messaging infrastructure that hosts addresses and users.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[kube(
    group = "enmasse.io",
    version = "v1beta1",
    kind = "AddressSpace",
    namespaced,
    status = "AddressSpaceStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpaceSpec {
    #[serde(rename = "type")]
    pub type_: String,
    pub plan: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpaceStatus {
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub endpoint_statuses: Vec<EndpointStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EndpointStatus {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_host: Option<String>,
}

impl AddressSpace {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.is_ready)
    }

    /// In-cluster host of the named endpoint, once the broker has published it.
    pub fn endpoint_host(&self, endpoint: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .endpoint_statuses
            .iter()
            .find(|status| status.name == endpoint)
            .and_then(|status| status.service_host.as_deref())
    }
}

/// A queue or topic inside an address space.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[kube(
    group = "enmasse.io",
    version = "v1beta1",
    kind = "Address",
    plural = "addresses",
    namespaced,
    status = "AddressStatus",
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct AddressSpec {
    pub address: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub plan: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AddressStatus {
    #[serde(default)]
    pub is_ready: bool,
}

impl Address {
    pub fn is_ready(&self) -> bool {
        self.status.as_ref().is_some_and(|status| status.is_ready)
    }
}

/// Credentials and permissions of a client of an address space.
#[derive(CustomResource, Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[kube(
    group = "user.enmasse.io",
    version = "v1beta1",
    kind = "MessagingUser",
    namespaced,
    derive = "PartialEq",
    derive = "Default"
)]
#[serde(rename_all = "camelCase")]
pub struct MessagingUserSpec {
    pub username: String,
    pub authentication: UserAuthentication,
    #[serde(default)]
    pub authorization: Vec<UserAuthorization>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAuthentication {
    #[serde(rename = "type")]
    pub type_: String,
    /// Base64 encoded on the wire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "Option<String>")]
    pub password: Option<ByteString>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserAuthorization {
    pub addresses: Vec<String>,
    pub operations: Vec<String>,
}

impl MessagingUser {
    pub fn password(&self) -> Option<String> {
        let ByteString(bytes) = self.spec.authentication.password.as_ref()?;
        String::from_utf8(bytes.clone()).ok()
    }
}
