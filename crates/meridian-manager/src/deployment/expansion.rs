//! Instance expansion with resolved connections.
//!
//! Read APIs return instances enriched with their current inbound and
//! outbound connection lists. A connection-store failure degrades the
//! affected list to empty rather than failing the whole read.

use std::time::Duration;

use tracing::warn;

use meridian_core::AppInstance;

use crate::store::ConnectionStore;

/// Fill in an instance's resolved inbound and outbound connections.
pub async fn expand_instance(
    connections: &dyn ConnectionStore,
    call_timeout: Duration,
    instance: &mut AppInstance,
) {
    let inbound = tokio::time::timeout(
        call_timeout,
        connections.list_inbound_connections(&instance.organization_id, &instance.app_instance_id),
    )
    .await;
    instance.inbound_connections = match inbound {
        Ok(Ok(list)) => list,
        Ok(Err(e)) => {
            warn!(
                app_instance_id = %instance.app_instance_id,
                error = %e,
                "failed to list inbound connections, returning none"
            );
            Vec::new()
        }
        Err(_) => {
            warn!(
                app_instance_id = %instance.app_instance_id,
                "inbound connection list timed out, returning none"
            );
            Vec::new()
        }
    };

    let outbound = tokio::time::timeout(
        call_timeout,
        connections.list_outbound_connections(&instance.organization_id, &instance.app_instance_id),
    )
    .await;
    instance.outbound_connections = match outbound {
        Ok(Ok(list)) => list,
        Ok(Err(e)) => {
            warn!(
                app_instance_id = %instance.app_instance_id,
                error = %e,
                "failed to list outbound connections, returning none"
            );
            Vec::new()
        }
        Err(_) => {
            warn!(
                app_instance_id = %instance.app_instance_id,
                "outbound connection list timed out, returning none"
            );
            Vec::new()
        }
    };
}
