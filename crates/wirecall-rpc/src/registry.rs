use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RpcError, Result};
use crate::service::{MethodType, Service};

/// Why a `Service.Method` name could not be resolved.
///
/// The display text is what the caller sees in the response header.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("rpc server: service/method request ill-formed: {0}")]
    IllFormed(String),

    #[error("rpc server: can't find service {0}")]
    UnknownService(String),

    #[error("rpc server: can't find method {0}")]
    UnknownMethod(String),
}

/// Services by name.
///
/// Cheap to clone: services are shared, so a server can hand each connection
/// its own snapshot.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    services: HashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service. A second service with the same name is rejected.
    pub fn register(&mut self, service: Service) -> Result<()> {
        if self.services.contains_key(service.name()) {
            return Err(RpcError::DuplicateService(service.name().to_string()));
        }
        debug!(
            service = service.name(),
            methods = service.methods().count(),
            "registered service"
        );
        self.services
            .insert(service.name().to_string(), Arc::new(service));
        Ok(())
    }

    /// Resolve `Service.Method`. The service name is everything before the
    /// last dot.
    pub fn find(
        &self,
        service_method: &str,
    ) -> std::result::Result<(Arc<Service>, Arc<MethodType>), LookupError> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .ok_or_else(|| LookupError::IllFormed(service_method.to_string()))?;

        let service = self
            .services
            .get(service_name)
            .ok_or_else(|| LookupError::UnknownService(service_name.to_string()))?;
        let method = service
            .method(method_name)
            .ok_or_else(|| LookupError::UnknownMethod(method_name.to_string()))?;
        Ok((Arc::clone(service), Arc::clone(method)))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Service>> {
        self.services.get(name)
    }

    /// Registered services in name order.
    pub fn services(&self) -> Vec<Arc<Service>> {
        let mut services: Vec<_> = self.services.values().cloned().collect();
        services.sort_by(|a, b| a.name().cmp(b.name()));
        services
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
