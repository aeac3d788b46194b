use std::ops::ControlFlow;
use std::time::Duration;

use kube::runtime::controller::Action;

use super::Pass;
use super::Step;
use crate::builders::broker;
use crate::builders::generate_password;
use crate::crd::Address;
use crate::error::Error;
use crate::error::Result;
use crate::events::EmitEvent;
use crate::events::ServerEvent;
use crate::k8s::ManageObjects;
use crate::k8s::ProbeApi;

const REQUEUE_WAITING_FOR_ADDRESS_SPACE: Duration = Duration::from_secs(10);
const REQUEUE_WAITING_FOR_ADDRESSES: Duration = Duration::from_secs(5);

impl<M, E> Pass<'_, M, E>
where
    M: ManageObjects + ProbeApi,
    E: EmitEvent<ServerEvent>,
{
    /// The address space, broker user and addresses the server exchanges messages through.
    ///
    /// Nothing else is created until the address space is ready, and the pass does not go on
    /// before every address is.
    pub(super) async fn reconcile_broker(&mut self) -> Result<Step> {
        if !self.server.spec.use_message_broker {
            return Ok(ControlFlow::Continue(()));
        }

        let address_space = self
            .ensure(broker::ADDRESS_SPACE, |server, _| broker::address_space(server))
            .await?;
        let Some(space) = address_space.observed().filter(|space| space.is_ready()) else {
            tracing::info!(address_space = broker::ADDRESS_SPACE, "Waiting for the address space to become ready");
            return Ok(ControlFlow::Break(Action::requeue(REQUEUE_WAITING_FOR_ADDRESS_SPACE)));
        };
        let Some(host) = space.endpoint_host(broker::MESSAGING_ENDPOINT).map(str::to_owned) else {
            tracing::info!(
                address_space = broker::ADDRESS_SPACE,
                endpoint = broker::MESSAGING_ENDPOINT,
                "Waiting for the messaging endpoint"
            );
            return Ok(ControlFlow::Break(Action::requeue(REQUEUE_WAITING_FOR_ADDRESS_SPACE)));
        };

        let user_name = broker::messaging_user_name();
        let user = self
            .ensure(&user_name, |server, _| broker::messaging_user(server, &generate_password()))
            .await?;
        let password = user
            .object()
            .password()
            .ok_or_else(|| Error::UserInput(format!("MessagingUser {user_name} has no password")))?;

        let secret_name = broker::secret_name(&self.server);
        self.ensure(&secret_name, |server, _| broker::broker_secret(server, &password, &host))
            .await?;

        let mut pending = Vec::new();
        for queue in broker::QUEUES {
            let address = self
                .ensure(&broker::address_name(queue), |server, _| broker::queue(server, queue))
                .await?;
            if !address.observed().is_some_and(Address::is_ready) {
                pending.push(queue);
            }
        }
        for topic in broker::TOPICS {
            let address = self
                .ensure(&broker::address_name(topic), |server, _| broker::topic(server, topic))
                .await?;
            if !address.observed().is_some_and(Address::is_ready) {
                pending.push(topic);
            }
        }

        if !pending.is_empty() {
            tracing::info!(?pending, "Waiting for addresses to become ready");
            return Ok(ControlFlow::Break(Action::requeue(REQUEUE_WAITING_FOR_ADDRESSES)));
        }
        Ok(ControlFlow::Continue(()))
    }
}
