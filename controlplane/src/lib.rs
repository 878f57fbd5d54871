/*
Copyright 2024 The Kubernetes Authors.

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

use std::{fmt, sync::Arc};

use k8s_openapi::api::{core::v1::Endpoints, networking::v1::Ingress};
use kube::{Client, Resource, ResourceExt};
use thiserror::Error;

pub use config::{Args, Config, ZoneDelegation};
pub use gslb_controller::controller as gslb_controller;
pub use resolver::{resolve_gslb_spec, resolve_operator_config};

pub mod backoff;
pub mod config;
pub mod consts;
pub mod crd;
pub mod delegation;
pub mod dnsendpoint_utils;
pub mod ensure;
pub mod gslb_controller;
pub mod ingress_utils;
pub mod mapper;
pub mod resolver;
pub mod status;
pub mod store;
mod traits;
mod utils;

#[cfg(test)]
mod test_utils;

use backoff::Backoff;
use crd::{DNSEndpoint, Gslb};
use delegation::{DnsProvider, EndpointDelegation, NoDelegation};
use store::{KubeStore, ObjectStore};

// Context for our reconciler
pub struct Context {
    /// Operator configuration, resolved once at startup.
    pub config: Config,
    pub gslbs: Arc<dyn ObjectStore<Gslb>>,
    pub ingresses: Arc<dyn ObjectStore<Ingress>>,
    pub dns_endpoints: Arc<dyn ObjectStore<DNSEndpoint>>,
    pub endpoints: Arc<dyn ObjectStore<Endpoints>>,
    /// Edge DNS zone delegation and its cleanup.
    pub dns_provider: Arc<dyn DnsProvider>,
    /// Per-key failure counters used by the error policy.
    pub backoff: Backoff,
}

impl Context {
    pub fn new(client: Client, config: Config) -> Self {
        let store = Arc::new(KubeStore::new(client));
        let ingresses: Arc<dyn ObjectStore<Ingress>> = store.clone();
        let dns_endpoints: Arc<dyn ObjectStore<DNSEndpoint>> = store.clone();

        let dns_provider: Arc<dyn DnsProvider> = match config.delegation {
            ZoneDelegation::None => Arc::new(NoDelegation),
            ZoneDelegation::DnsEndpoint => Arc::new(EndpointDelegation::new(
                config.clone(),
                ingresses.clone(),
                dns_endpoints.clone(),
            )),
        };

        Context {
            config,
            gslbs: store.clone(),
            ingresses,
            dns_endpoints,
            endpoints: store,
            dns_provider,
            backoff: Backoff::default(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("kube error: {0}")]
    KubeError(#[source] kube::Error),
    #[error("invalid configuration: `{0}`")]
    InvalidConfigError(String),
    #[error("error resolving gslb spec: `{0}`")]
    SpecResolutionError(String),
    #[error("error finalizing gslb: `{0}`")]
    FinalizerError(String),
    #[error("error configuring zone delegation: `{0}`")]
    DelegationError(String),
    #[error("object store error: `{0}`")]
    StoreError(String),
    #[error("error querying Gslb CRDs: `{0}`; are the CRDs installed?")]
    CRDNotFoundError(#[source] kube::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Identity of a Gslb, and the unit of work of the reconcile queue.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NamespacedName {
    pub name: String,
    pub namespace: String,
}

impl NamespacedName {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        NamespacedName {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn from_resource<K: Resource>(obj: &K) -> Result<Self> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or(Error::InvalidConfigError("invalid name".to_string()))?;
        let namespace = obj
            .namespace()
            .ok_or(Error::InvalidConfigError("invalid namespace".to_string()))?;
        Ok(NamespacedName { name, namespace })
    }
}

impl fmt::Display for NamespacedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
