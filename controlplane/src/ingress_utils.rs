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

use std::collections::BTreeSet;

use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt, core::ObjectMeta};

use crate::{consts::LAST_APPLIED_ANNOTATION, crd::Gslb, *};

// Builds the Ingress that routes the Gslb's hosts in this cluster.
pub fn desired_ingress(gslb: &Gslb) -> Result<Ingress> {
    let key = NamespacedName::from_resource(gslb)?;
    let owner_ref = gslb.controller_owner_ref(&()).ok_or(Error::InvalidConfigError(
        "gslb has no uid yet".to_string(),
    ))?;

    let mut annotations = gslb.annotations().clone();
    annotations.remove(LAST_APPLIED_ANNOTATION);

    Ok(Ingress {
        metadata: ObjectMeta {
            name: Some(key.name),
            namespace: Some(key.namespace),
            annotations: (!annotations.is_empty()).then_some(annotations),
            owner_references: Some(vec![owner_ref]),
            ..Default::default()
        },
        spec: Some(gslb.spec.ingress.clone()),
        status: None,
    })
}

// Returns the load balancer IP addresses reported on the Ingress, sorted and deduplicated.
pub fn ingress_ips(ingress: &Ingress) -> Vec<String> {
    let ips: BTreeSet<String> = ingress
        .status
        .iter()
        .filter_map(|status| status.load_balancer.as_ref())
        .filter_map(|load_balancer| load_balancer.ingress.as_ref())
        .flatten()
        .filter_map(|lb_ingress| lb_ingress.ip.clone())
        .filter(|ip| !ip.is_empty())
        .collect();
    ips.into_iter().collect()
}
