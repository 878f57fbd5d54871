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

//! Delegation of the load balanced zone from the edge DNS zone.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use k8s_openapi::api::networking::v1::Ingress;
use kube::{ResourceExt, core::ObjectMeta, runtime::controller::Action};
use tracing::{debug, info, warn};

use crate::{
    consts::DELEGATION_FOR_LABEL,
    crd::{DNSEndpoint, DNSEndpointSpec, Endpoint, Gslb},
    ensure::{Flow, ensure_with},
    ingress_utils::ingress_ips,
    store::ObjectStore,
    *,
};

// Retry interval while the Gslb's Ingress waits for a load balancer address.
const WAIT_FOR_ADDRESS_REQUEUE: Duration = Duration::from_secs(5);

/// Configures and tears down the edge DNS state of a Gslb.
#[async_trait]
pub trait DnsProvider: Send + Sync {
    /// Makes the edge DNS zone delegate the load balanced zone to this cluster.
    async fn configure_zone_delegation(&self, gslb: &Gslb) -> Result<Flow>;

    /// Removes everything `configure_zone_delegation` created for the Gslb.
    async fn finalize(&self, gslb: &Gslb) -> Result<()>;
}

/// Provider for installations where delegation is managed outside of the controller.
pub struct NoDelegation;

#[async_trait]
impl DnsProvider for NoDelegation {
    async fn configure_zone_delegation(&self, _gslb: &Gslb) -> Result<Flow> {
        Ok(Flow::Continue)
    }

    async fn finalize(&self, _gslb: &Gslb) -> Result<()> {
        Ok(())
    }
}

/// Publishes NS and glue records for the load balanced zone as a DNSEndpoint.
///
/// The DNSEndpoint has no owner reference: it must outlive the Gslb until
/// [`DnsProvider::finalize`] removed it.
pub struct EndpointDelegation {
    config: Config,
    ingresses: Arc<dyn ObjectStore<Ingress>>,
    dns_endpoints: Arc<dyn ObjectStore<DNSEndpoint>>,
}

impl EndpointDelegation {
    pub fn new(
        config: Config,
        ingresses: Arc<dyn ObjectStore<Ingress>>,
        dns_endpoints: Arc<dyn ObjectStore<DNSEndpoint>>,
    ) -> Self {
        EndpointDelegation {
            config,
            ingresses,
            dns_endpoints,
        }
    }

    // Name of the nameserver of the cluster tagged `geo_tag` inside the edge DNS zone.
    fn nameserver(&self, geo_tag: &str) -> String {
        let zone_label = self
            .config
            .dns_zone
            .strip_suffix(&format!(".{}", self.config.edge_dns_zone))
            .unwrap_or(&self.config.dns_zone)
            .replace('.', "-");
        format!("gslb-ns-{geo_tag}-{zone_label}.{}", self.config.edge_dns_zone)
    }

    fn desired_delegation(&self, gslb: &Gslb, glue: Vec<String>) -> Result<DNSEndpoint> {
        let key = NamespacedName::from_resource(gslb)?;
        let ttl = Some(i64::from(gslb.spec.strategy.dns_ttl_seconds));

        let mut nameservers: Vec<String> = std::iter::once(&self.config.cluster_geo_tag)
            .chain(self.config.ext_clusters_geo_tags.iter())
            .map(|geo_tag| self.nameserver(geo_tag))
            .collect();
        nameservers.sort();

        let endpoints = vec![
            Endpoint {
                dns_name: self.config.dns_zone.clone(),
                targets: nameservers,
                record_type: "NS".to_string(),
                record_ttl: ttl,
                labels: BTreeMap::new(),
            },
            Endpoint {
                dns_name: self.nameserver(&self.config.cluster_geo_tag),
                targets: glue,
                record_type: "A".to_string(),
                record_ttl: ttl,
                labels: BTreeMap::new(),
            },
        ];

        Ok(DNSEndpoint {
            metadata: ObjectMeta {
                name: Some(delegation_name(&key.name)),
                namespace: Some(key.namespace),
                labels: Some(BTreeMap::from([(
                    DELEGATION_FOR_LABEL.to_string(),
                    key.name,
                )])),
                ..Default::default()
            },
            spec: DNSEndpointSpec { endpoints },
            status: None,
        })
    }
}

fn delegation_name(gslb_name: &str) -> String {
    format!("k8gb-ns-{gslb_name}")
}

fn is_delegation_for(dnsendpoint: &DNSEndpoint, gslb_name: &str) -> bool {
    dnsendpoint
        .labels()
        .get(DELEGATION_FOR_LABEL)
        .is_some_and(|owner| owner == gslb_name)
}

#[async_trait]
impl DnsProvider for EndpointDelegation {
    async fn configure_zone_delegation(&self, gslb: &Gslb) -> Result<Flow> {
        let key = NamespacedName::from_resource(gslb)?;
        let glue = self
            .ingresses
            .get(&key.namespace, &key.name)
            .await
            .map_err(|error| Error::DelegationError(error.to_string()))?
            .map(|ingress| ingress_ips(&ingress))
            .unwrap_or_default();
        if glue.is_empty() {
            info!(
                "ingress of gslb {key} has no load balancer address yet; \
                 delaying zone delegation"
            );
            return Ok(Flow::Stop(Action::requeue(WAIT_FOR_ADDRESS_REQUEUE)));
        }

        let desired = self.desired_delegation(gslb, glue)?;
        let owner = key.name.clone();
        ensure_with(&*self.dns_endpoints, desired, move |current| {
            is_delegation_for(current, &owner)
        })
        .await
        .map_err(|error| Error::DelegationError(error.to_string()))
    }

    async fn finalize(&self, gslb: &Gslb) -> Result<()> {
        let key = NamespacedName::from_resource(gslb)?;
        let name = delegation_name(&key.name);
        let current = self
            .dns_endpoints
            .get(&key.namespace, &name)
            .await
            .map_err(|error| Error::FinalizerError(error.to_string()))?;

        match current {
            Some(current) if is_delegation_for(&current, &key.name) => {
                debug!("removing zone delegation {}/{name}", key.namespace);
                self.dns_endpoints
                    .delete(&key.namespace, &name)
                    .await
                    .map_err(|error| Error::FinalizerError(error.to_string()))
            }
            Some(_) => {
                warn!(
                    "dnsendpoint {}/{name} does not belong to gslb {key}; leaving it in place",
                    key.namespace
                );
                Ok(())
            }
            None => Ok(()),
        }
    }
}
