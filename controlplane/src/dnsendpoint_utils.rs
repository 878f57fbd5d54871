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

use std::{collections::BTreeMap, fmt};

use k8s_openapi::api::core::v1::Endpoints;
use kube::{Resource, core::ObjectMeta};
use tracing::debug;

use crate::{
    consts::{FAILOVER_STRATEGY, LOCAL_TARGETS_PREFIX, ROUND_ROBIN_STRATEGY},
    crd::{DNSEndpoint, DNSEndpointSpec, Endpoint, Gslb},
    ingress_utils::ingress_ips,
    *,
};

/// Health of the backends serving an ingress host.
///
/// Variants are ordered from best to worst, so the health of a host is the
/// maximum over its backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServiceHealth {
    Healthy,
    Unhealthy,
    NotFound,
}

impl ServiceHealth {
    fn of(endpoints: Option<&Endpoints>) -> Self {
        let Some(endpoints) = endpoints else {
            return ServiceHealth::NotFound;
        };
        let has_addresses = endpoints
            .subsets
            .iter()
            .flatten()
            .any(|subset| subset.addresses.as_ref().is_some_and(|a| !a.is_empty()));
        if has_addresses {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Unhealthy
        }
    }
}

impl fmt::Display for ServiceHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceHealth::Healthy => "Healthy",
            ServiceHealth::Unhealthy => "Unhealthy",
            ServiceHealth::NotFound => "NotFound",
        };
        f.write_str(s)
    }
}

// Computes the health of every ingress host of the Gslb from the Endpoints of its backends.
pub async fn service_health(
    ctx: &Context,
    gslb: &Gslb,
) -> Result<BTreeMap<String, ServiceHealth>> {
    let key = NamespacedName::from_resource(gslb)?;
    let mut health = BTreeMap::new();

    for (host, services) in gslb.hosts() {
        let mut host_health = if services.is_empty() {
            ServiceHealth::NotFound
        } else {
            ServiceHealth::Healthy
        };
        for service in &services {
            let endpoints = ctx.endpoints.get(&key.namespace, service).await?;
            host_health = host_health.max(ServiceHealth::of(endpoints.as_ref()));
        }
        debug!("host {host} of gslb {key} is {host_health}");
        health.insert(host, host_health);
    }

    Ok(health)
}

// Returns true if this cluster should answer for the host itself, not only for its local targets.
fn serves_host(config: &Config, gslb: &Gslb) -> bool {
    let strategy = &gslb.spec.strategy;
    match strategy.type_.as_str() {
        ROUND_ROBIN_STRATEGY => true,
        FAILOVER_STRATEGY => {
            strategy.primary_geo_tag.as_deref() == Some(config.cluster_geo_tag.as_str())
        }
        _ => false,
    }
}

fn a_record(dns_name: String, targets: Vec<String>, ttl: u32) -> Endpoint {
    Endpoint {
        dns_name,
        targets,
        record_type: "A".to_string(),
        record_ttl: Some(i64::from(ttl)),
        labels: BTreeMap::new(),
    }
}

/// Builds the DNSEndpoint publishing the healthy hosts of a resolved Gslb.
///
/// Every healthy host gets a `localtargets-` record pointing at the load balancer
/// addresses of the Gslb's Ingress. The host record itself is only published when
/// the strategy lets this cluster serve it.
pub async fn desired_dns_endpoint(ctx: &Context, gslb: &Gslb) -> Result<DNSEndpoint> {
    let key = NamespacedName::from_resource(gslb)?;
    let owner_ref = gslb.controller_owner_ref(&()).ok_or(Error::InvalidConfigError(
        "gslb has no uid yet".to_string(),
    ))?;

    let targets = ctx
        .ingresses
        .get(&key.namespace, &key.name)
        .await?
        .map(|ingress| ingress_ips(&ingress))
        .unwrap_or_default();
    let ttl = gslb.spec.strategy.dns_ttl_seconds;
    let serves_host = serves_host(&ctx.config, gslb);

    let mut endpoints = vec![];
    if !targets.is_empty() {
        for (host, health) in service_health(ctx, gslb).await? {
            if health != ServiceHealth::Healthy {
                continue;
            }
            endpoints.push(a_record(
                format!("{LOCAL_TARGETS_PREFIX}{host}"),
                targets.clone(),
                ttl,
            ));
            if serves_host {
                endpoints.push(a_record(host, targets.clone(), ttl));
            }
        }
    }
    endpoints.sort_by(|a, b| a.dns_name.cmp(&b.dns_name));

    Ok(DNSEndpoint {
        metadata: ObjectMeta {
            name: Some(key.name),
            namespace: Some(key.namespace),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: DNSEndpointSpec { endpoints },
        status: None,
    })
}
