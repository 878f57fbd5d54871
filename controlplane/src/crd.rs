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

#![allow(clippy::upper_case_acronyms)]

use std::collections::BTreeMap;

use k8s_openapi::api::networking::v1::IngressSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Global load balancing intent for a set of ingress hosts.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema)]
#[kube(group = "k8gb.absa.oss", version = "v1beta1", kind = "Gslb", namespaced)]
#[kube(status = "GslbStatus")]
#[kube(printcolumn = r#"{"name":"strategy", "jsonPath": ".spec.strategy.type", "type": "string"}"#)]
#[kube(printcolumn = r#"{"name":"geotag", "jsonPath": ".status.geoTag", "type": "string"}"#)]
#[serde(rename_all = "camelCase")]
pub struct GslbSpec {
    /// Routing rules, materialized verbatim as the Gslb's Ingress.
    pub ingress: IngressSpec,
    pub strategy: Strategy,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    /// One of `roundRobin` or `failover`.
    #[serde(rename = "type")]
    pub type_: String,
    /// Geo tag of the cluster that serves traffic under the `failover` strategy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_geo_tag: Option<String>,
    /// TTL of published records. Zero means unset.
    #[serde(default)]
    pub dns_ttl_seconds: u32,
    /// Zero means unset.
    #[serde(default)]
    pub split_brain_threshold_seconds: u32,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GslbStatus {
    /// Health of the backends of each ingress host.
    #[serde(default)]
    pub service_health: BTreeMap<String, String>,
    /// Published DNS names and their targets.
    #[serde(default)]
    pub healthy_records: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub geo_tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<metav1::Condition>>,
}

/// Record set consumed by external-dns.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[kube(
    group = "externaldns.k8s.io",
    version = "v1alpha1",
    kind = "DNSEndpoint",
    namespaced
)]
#[kube(status = "DNSEndpointStatus")]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointSpec {
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub dns_name: String,
    #[serde(default)]
    pub targets: Vec<String>,
    pub record_type: String,
    #[serde(rename = "recordTTL", default, skip_serializing_if = "Option::is_none")]
    pub record_ttl: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DNSEndpointStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Gslb {
    /// Backend service names referenced by the embedded ingress rules, in rule order.
    pub fn backend_services(&self) -> impl Iterator<Item = &str> {
        self.spec
            .ingress
            .rules
            .iter()
            .flatten()
            .filter_map(|rule| rule.http.as_ref())
            .flat_map(|http| http.paths.iter())
            .filter_map(|path| path.backend.service.as_ref())
            .map(|service| service.name.as_str())
    }

    /// Ingress hosts together with the backend services that serve them.
    pub fn hosts(&self) -> Vec<(String, Vec<String>)> {
        let mut hosts: Vec<(String, Vec<String>)> = vec![];
        for rule in self.spec.ingress.rules.iter().flatten() {
            let Some(host) = rule.host.as_ref() else {
                continue;
            };
            let services = rule
                .http
                .iter()
                .flat_map(|http| http.paths.iter())
                .filter_map(|path| path.backend.service.as_ref())
                .map(|service| service.name.clone());

            match hosts.iter_mut().find(|(h, _)| h == host) {
                Some((_, existing)) => existing.extend(services),
                None => hosts.push((host.clone(), services.collect())),
            }
        }
        hosts
    }
}
