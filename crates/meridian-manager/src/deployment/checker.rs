//! Connection consistency checking for deploy requests.
//!
//! Before an instance is created, every outbound the descriptor marks as
//! required must be satisfied by the request, and every inbound named by a
//! requested connection must exist on its target instance. Target lookups
//! fan out concurrently, one task per distinct target, and the checker
//! waits for all of them before giving a verdict.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::warn;

use meridian_core::descriptor::OutboundNetworkInterface;
use meridian_core::instance::ConnectionRequest;
use meridian_core::{InstanceId, OrganizationId};

use crate::error::{ManagerError, ManagerResult};
use crate::store::ApplicationStore;

/// Verifies requested connections against stored instances.
#[derive(Clone)]
pub struct ConnectionChecker {
    store: Arc<dyn ApplicationStore>,
    call_timeout: Duration,
}

impl ConnectionChecker {
    /// Create a checker that resolves targets through the given store.
    pub fn new(store: Arc<dyn ApplicationStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Check a deploy request's connections.
    ///
    /// Required outbounds are verified sequentially first; target inbound
    /// lookups then run concurrently. When several targets fail, whichever
    /// failure is joined first is the one surfaced.
    pub async fn check(
        &self,
        organization_id: &OrganizationId,
        requested: &[ConnectionRequest],
        outbounds: &[OutboundNetworkInterface],
    ) -> ManagerResult<()> {
        for outbound in outbounds.iter().filter(|outbound| outbound.required) {
            let satisfied = requested
                .iter()
                .any(|connection| connection.outbound_name == outbound.name);
            if !satisfied {
                return Err(ManagerError::RequiredOutboundMissing {
                    name: outbound.name.clone(),
                });
            }
        }

        if requested.is_empty() {
            return Ok(());
        }

        let mut targets: HashMap<InstanceId, Vec<String>> = HashMap::new();
        for connection in requested {
            targets
                .entry(connection.target_instance_id.clone())
                .or_default()
                .push(connection.inbound_name.clone());
        }

        let mut lookups = JoinSet::new();
        for (target, inbounds) in targets {
            let store = Arc::clone(&self.store);
            let organization_id = organization_id.clone();
            let bound = self.call_timeout;
            lookups.spawn(async move {
                let verdict =
                    match tokio::time::timeout(bound, store.get_instance(&organization_id, &target))
                        .await
                    {
                        Ok(Ok(instance)) => inbounds
                            .iter()
                            .find(|inbound| !instance.has_inbound(inbound))
                            .map_or(Ok(()), |inbound| {
                                Err(ManagerError::InboundNotFound {
                                    instance_id: target.to_string(),
                                    inbound: inbound.clone(),
                                })
                            }),
                        Ok(Err(e)) => Err(e),
                        Err(_) => Err(ManagerError::Timeout {
                            operation: "target inbound lookup",
                        }),
                    };
                (target, verdict)
            });
        }

        // Barrier: every lookup is joined, even after a failure is seen.
        let mut failure = None;
        while let Some(joined) = lookups.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((target, Err(e))) => {
                    warn!(
                        app_instance_id = %target,
                        error = %e,
                        "connection target failed inbound check"
                    );
                    if failure.is_none() {
                        failure = Some(e);
                    }
                }
                Err(e) => {
                    if failure.is_none() {
                        failure = Some(ManagerError::internal(format!(
                            "inbound lookup task failed: {e}"
                        )));
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ConnectionChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionChecker").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use meridian_core::descriptor::InboundNetworkInterface;
    use meridian_core::AppDescriptor;

    use crate::store::test_fixtures::{deploy_request, sample_descriptor};
    use crate::store::MemoryStore;

    use super::*;

    fn checker(store: Arc<MemoryStore>) -> ConnectionChecker {
        ConnectionChecker::new(store, Duration::from_secs(5))
    }

    fn request_for(target: &InstanceId, inbound: &str) -> ConnectionRequest {
        ConnectionRequest {
            target_instance_id: target.clone(),
            inbound_name: inbound.to_string(),
            outbound_name: "out1".to_string(),
        }
    }

    async fn seeded_instance(
        store: &MemoryStore,
        descriptor: &AppDescriptor,
        name: &str,
    ) -> InstanceId {
        store
            .create_instance(&deploy_request(descriptor, name))
            .await
            .unwrap()
            .app_instance_id
    }

    #[tokio::test]
    async fn missing_required_outbound_fails_before_any_lookup() {
        let store = Arc::new(MemoryStore::new());
        let outbounds = vec![OutboundNetworkInterface {
            name: "out1".to_string(),
            required: true,
        }];

        let err = checker(Arc::clone(&store))
            .check(&OrganizationId::new("org-1"), &[], &outbounds)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::RequiredOutboundMissing { name } if name == "out1"
        ));
    }

    #[tokio::test]
    async fn no_required_outbounds_and_no_connections_passes() {
        let store = Arc::new(MemoryStore::new());
        checker(store)
            .check(&OrganizationId::new("org-1"), &[], &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_target_missing_an_inbound_fails_the_whole_check() {
        let store = Arc::new(MemoryStore::new());
        let mut full = sample_descriptor("org-1", "desc-full");
        full.inbound_net_interfaces = vec![
            InboundNetworkInterface {
                name: "metrics".to_string(),
            },
            InboundNetworkInterface {
                name: "events".to_string(),
            },
        ];
        let mut partial = sample_descriptor("org-1", "desc-partial");
        partial.inbound_net_interfaces = vec![InboundNetworkInterface {
            name: "metrics".to_string(),
        }];
        store.add_descriptor(full.clone()).await.unwrap();
        store.add_descriptor(partial.clone()).await.unwrap();

        let first = seeded_instance(&store, &full, "first").await;
        let second = seeded_instance(&store, &full, "second").await;
        let third = seeded_instance(&store, &partial, "third").await;

        let requested = vec![
            request_for(&first, "metrics"),
            request_for(&first, "events"),
            request_for(&second, "events"),
            request_for(&third, "events"),
        ];

        let err = checker(Arc::clone(&store))
            .check(&OrganizationId::new("org-1"), &requested, &[])
            .await
            .unwrap_err();
        match err {
            ManagerError::InboundNotFound {
                instance_id,
                inbound,
            } => {
                assert_eq!(instance_id, third.to_string());
                assert_eq!(inbound, "events");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn all_targets_exposing_their_inbounds_passes() {
        let store = Arc::new(MemoryStore::new());
        let descriptor = sample_descriptor("org-1", "desc-1");
        store.add_descriptor(descriptor.clone()).await.unwrap();
        let first = seeded_instance(&store, &descriptor, "first").await;
        let second = seeded_instance(&store, &descriptor, "second").await;

        let requested = vec![request_for(&first, "in1"), request_for(&second, "in1")];
        checker(store)
            .check(&OrganizationId::new("org-1"), &requested, &[])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_target_instance_reports_the_lookup_failure() {
        let store = Arc::new(MemoryStore::new());
        let missing = InstanceId::new("ghost");

        let err = checker(store)
            .check(
                &OrganizationId::new("org-1"),
                &[request_for(&missing, "in1")],
                &[],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ManagerError::InstanceNotFound(_)));
    }
}
