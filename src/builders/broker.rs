//! AMQ Online objects backing the push message pipeline.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::ResourceExt;

use super::child_name;
use super::labels;
use super::named_meta;
use super::object_meta;
use super::AMQ;
use crate::crd::Address;
use crate::crd::AddressSpace;
use crate::crd::AddressSpaceSpec;
use crate::crd::AddressSpec;
use crate::crd::MessagingUser;
use crate::crd::MessagingUserSpec;
use crate::crd::UnifiedPushServer;
use crate::crd::UserAuthentication;
use crate::crd::UserAuthorization;
use crate::error::Result;

/// Name of the address space; users and addresses are prefixed with it.
pub const ADDRESS_SPACE: &str = "ups";
pub const USERNAME: &str = "upsuser";
pub const MESSAGING_ENDPOINT: &str = "messaging";
pub const PORT: &str = "5672";

pub const PASSWORD_KEY: &str = "artemis-password";
pub const URL_KEY: &str = "artemis-url";

pub const QUEUES: [&str; 12] = [
    "APNsPushMessageQueue",
    "APNsTokenBatchQueue",
    "GCMPushMessageQueue",
    "GCMTokenBatchQueue",
    "WNSPushMessageQueue",
    "WNSTokenBatchQueue",
    "MetricsQueue",
    "TriggerMetricCollectionQueue",
    "TriggerVariantMetricCollectionQueue",
    "BatchLoadedQueue",
    "AllBatchesLoadedQueue",
    "FreeServiceSlotQueue",
];

pub const TOPICS: [&str; 2] = ["MetricsProcessingStartedTopic", "topic/APNSClient"];

pub fn messaging_user_name() -> String {
    format!("{ADDRESS_SPACE}.{USERNAME}")
}

/// `ups.<address>` lower cased, without the `topic/` prefix topics may carry.
pub fn address_name(address: &str) -> String {
    let address = address.strip_prefix("topic/").unwrap_or(address);
    format!("{ADDRESS_SPACE}.{}", address.to_lowercase())
}

pub fn address_space(server: &UnifiedPushServer) -> Result<AddressSpace> {
    Ok(AddressSpace {
        metadata: named_meta(server, ADDRESS_SPACE, labels(server, ADDRESS_SPACE))?,
        spec: AddressSpaceSpec {
            type_: "brokered".to_owned(),
            plan: "brokered-single-broker".to_owned(),
        },
        status: None,
    })
}

/// The broker user the server connects as, allowed to send and receive on every address.
pub fn messaging_user(server: &UnifiedPushServer, password: &str) -> Result<MessagingUser> {
    let name = messaging_user_name();
    Ok(MessagingUser {
        metadata: named_meta(server, &name, labels(server, &name))?,
        spec: MessagingUserSpec {
            username: USERNAME.to_owned(),
            authentication: UserAuthentication {
                type_: "password".to_owned(),
                password: Some(ByteString(password.as_bytes().to_vec())),
            },
            authorization: vec![UserAuthorization {
                addresses: vec!["*".to_owned()],
                operations: vec!["send".to_owned(), "recv".to_owned()],
            }],
        },
    })
}

/// Broker credentials in the shape the server env reads them.
pub fn broker_secret(server: &UnifiedPushServer, password: &str, url: &str) -> Result<Secret> {
    Ok(Secret {
        metadata: object_meta(server, AMQ)?,
        string_data: Some(BTreeMap::from([
            (PASSWORD_KEY.to_owned(), password.to_owned()),
            (URL_KEY.to_owned(), url.to_owned()),
        ])),
        ..Default::default()
    })
}

pub fn queue(server: &UnifiedPushServer, address: &str) -> Result<Address> {
    new_address(server, address, "queue", "brokered-queue")
}

pub fn topic(server: &UnifiedPushServer, address: &str) -> Result<Address> {
    new_address(server, address, "topic", "brokered-topic")
}

fn new_address(server: &UnifiedPushServer, address: &str, type_: &str, plan: &str) -> Result<Address> {
    Ok(Address {
        metadata: named_meta(
            server,
            &address_name(address),
            BTreeMap::from([("app".to_owned(), server.name_any())]),
        )?,
        spec: AddressSpec {
            address: address.to_owned(),
            type_: type_.to_owned(),
            plan: plan.to_owned(),
        },
        status: None,
    })
}

/// `<server>-amq`
pub fn secret_name(server: &UnifiedPushServer) -> String {
    child_name(server, AMQ)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builders::fixtures::server;
    use rstest::rstest;

    #[rstest]
    #[case("APNsPushMessageQueue", "ups.apnspushmessagequeue")]
    #[case("MetricsProcessingStartedTopic", "ups.metricsprocessingstartedtopic")]
    #[case("topic/APNSClient", "ups.apnsclient")]
    fn test_address_names(#[case] address: &str, #[case] expected: &str) {
        assert_eq!(address_name(address), expected);
    }

    #[test]
    fn test_queue_and_topic_plans() {
        let server = server("example", "push");

        let queue = queue(&server, "MetricsQueue").unwrap();
        let topic = topic(&server, "topic/APNSClient").unwrap();

        assert_eq!(queue.metadata.name.as_deref(), Some("ups.metricsqueue"));
        assert_eq!(queue.spec.plan, "brokered-queue");
        assert_eq!(topic.spec.address, "topic/APNSClient");
        assert_eq!(topic.spec.type_, "topic");
        assert_eq!(topic.metadata.labels.unwrap()["app"], "example");
    }

    #[test]
    fn test_messaging_user_round_trips_password() {
        let user = messaging_user(&server("example", "push"), "s3cret").unwrap();

        assert_eq!(user.metadata.name.as_deref(), Some("ups.upsuser"));
        assert_eq!(user.password().as_deref(), Some("s3cret"));
        assert_eq!(user.spec.authorization[0].operations, ["send", "recv"]);
    }

    #[test]
    fn test_broker_secret() {
        let secret = broker_secret(&server("example", "push"), "s3cret", "messaging.push.svc").unwrap();
        let data = secret.string_data.unwrap();

        assert_eq!(secret.metadata.name.as_deref(), Some("example-amq"));
        assert_eq!(data[PASSWORD_KEY], "s3cret");
        assert_eq!(data[URL_KEY], "messaging.push.svc");
    }

    #[test]
    fn test_catalogue_names_are_unique() {
        let mut names: Vec<String> = QUEUES.iter().chain(TOPICS.iter()).map(|a| address_name(a)).collect();
        names.sort();
        names.dedup();

        assert_eq!(names.len(), QUEUES.len() + TOPICS.len());
    }
}
