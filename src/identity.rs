//! Host identity reconciliation.
//!
//! Maps the network identity of a machine to its Host record, registering
//! the host the first time it is seen. Existing records are returned as-is;
//! address changes are not written back.

use crate::error::{Error, Result};
use crate::model::{Host, NetworkIdentity};
use crate::store::MetadataStore;

/// Resolve `identity` to a Host, creating one if the name is unknown.
///
/// If another writer registers the same name between the lookup and the
/// insert, the store reports `DuplicateHost`; the record that writer created
/// is then returned instead.
pub fn resolve_host(store: &dyn MetadataStore, identity: &NetworkIdentity) -> Result<Host> {
    if identity.host_name.trim().is_empty() {
        return Err(Error::invalid("host name must not be empty"));
    }

    if let Some(host) = store.resolve_host_by_name(&identity.host_name)? {
        log::debug!("Host {} resolved to {}", identity.host_name, host.host_id);
        return Ok(host);
    }

    match store.create_host(&identity.host_name, &identity.ip_address, &identity.fqdn) {
        Ok(host) => Ok(host),
        Err(Error::DuplicateHost { name }) => store
            .resolve_host_by_name(&name)?
            .ok_or(Error::HostNotFound { name }),
        Err(e) => Err(e),
    }
}
