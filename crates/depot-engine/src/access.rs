use depot_core::{AccessChecker, CallerIdentity, Capability, DepotError, DepotResult, Visibility};

use crate::registry::Repository;
use std::sync::Arc;

/// Gate one operation on `repository`. Public repositories are readable by
/// anyone; everything else needs an identity the checker accepts.
pub async fn authorize(
    access: &dyn AccessChecker,
    repository: &Repository,
    identity: Option<&CallerIdentity>,
    capability: Capability,
) -> DepotResult<()> {
    if capability == Capability::Read && repository.visibility() == Visibility::Public {
        return Ok(());
    }

    let Some(identity) = identity else {
        tracing::debug!(
            repository = %repository.name(),
            capability = %capability,
            "Anonymous caller rejected"
        );
        return Err(DepotError::AccessDenied(format!(
            "{} access to '{}' requires credentials",
            capability,
            repository.name()
        )));
    };

    if access
        .check_access(identity, repository.name(), capability)
        .await
    {
        Ok(())
    } else {
        tracing::debug!(
            repository = %repository.name(),
            capability = %capability,
            "Access check refused"
        );
        Err(DepotError::AccessDenied(format!(
            "{} access to '{}' refused",
            capability,
            repository.name()
        )))
    }
}

/// Members of a group the caller may read. The group itself was authorized
/// already; a private member is dropped silently, as if it held nothing.
pub async fn readable_contributors(
    access: &dyn AccessChecker,
    requested: &Repository,
    contributors: &[Arc<Repository>],
    identity: Option<&CallerIdentity>,
) -> Vec<Arc<Repository>> {
    let mut readable = Vec::with_capacity(contributors.len());
    for contributor in contributors {
        if contributor.name() == requested.name()
            || authorize(access, contributor, identity, Capability::Read)
                .await
                .is_ok()
        {
            readable.push(contributor.clone());
        } else {
            tracing::debug!(
                group = %requested.name(),
                member = %contributor.name(),
                "Member hidden from caller"
            );
        }
    }
    readable
}
