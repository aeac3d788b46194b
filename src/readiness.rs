//! Readiness of observed children.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;

use crate::crd::Route;
use crate::error::Error;
use crate::error::Result;
use crate::TryResource;

const ROUTE_ADMITTED: &str = "Admitted";
const DEPLOYMENT_REPLICA_FAILURE: &str = "ReplicaFailure";
const DEPLOYMENT_PROGRESSING: &str = "Progressing";
const CONDITION_TRUE: &str = "True";

/// A route is ready unless one of its routers has not admitted it.
pub fn is_route_ready(route: Option<&Route>) -> bool {
    let Some(route) = route else {
        return false;
    };

    route
        .status
        .iter()
        .flat_map(|status| &status.ingress)
        .flat_map(|ingress| &ingress.conditions)
        .filter(|condition| condition.type_ == ROUTE_ADMITTED)
        .all(|condition| condition.status == CONDITION_TRUE)
}

/// A deployment is ready unless it is still progressing; a replica failure is an error.
pub fn is_deployment_ready(deployment: Option<&Deployment>) -> Result<bool> {
    let Some(deployment) = deployment else {
        return Ok(false);
    };

    let conditions = deployment
        .status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .map(Vec::as_slice)
        .unwrap_or_default();

    if let Some(failure) = conditions
        .iter()
        .find(|condition| condition.type_ == DEPLOYMENT_REPLICA_FAILURE)
    {
        return Err(Error::ChildFailed {
            kind: "Deployment",
            name: deployment.try_name()?.to_owned(),
            reason: failure.reason.clone().unwrap_or_else(|| failure.status.clone()),
        });
    }

    Ok(!conditions
        .iter()
        .any(|condition| condition.type_ == DEPLOYMENT_PROGRESSING && condition.status != CONDITION_TRUE))
}

/// A job is ready once it succeeded exactly once.
pub fn is_job_ready(job: Option<&Job>) -> bool {
    job.and_then(|job| job.status.as_ref())
        .and_then(|status| status.succeeded)
        .is_some_and(|succeeded| succeeded == 1)
}
