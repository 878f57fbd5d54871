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

use std::collections::BTreeMap;

use chrono::Utc;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use kube::Resource;
use tracing::{debug, info};

use crate::{
    consts::{LOCAL_TARGETS_PREFIX, READY_CONDITION},
    crd::{Gslb, GslbStatus},
    dnsendpoint_utils::service_health,
    utils::set_condition,
    *,
};

// Published records of the Gslb's DNSEndpoint, without the per-cluster local targets.
async fn healthy_records(
    ctx: &Context,
    key: &NamespacedName,
) -> Result<BTreeMap<String, Vec<String>>> {
    let Some(dnsendpoint) = ctx.dns_endpoints.get(&key.namespace, &key.name).await? else {
        return Ok(BTreeMap::new());
    };
    Ok(dnsendpoint
        .spec
        .endpoints
        .into_iter()
        .filter(|endpoint| !endpoint.dns_name.starts_with(LOCAL_TARGETS_PREFIX))
        .map(|endpoint| (endpoint.dns_name, endpoint.targets))
        .collect())
}

fn ready_condition(gslb: &Gslb, status: &GslbStatus) -> metav1::Condition {
    let (state, reason, message) = if status.healthy_records.is_empty() {
        ("False", "NoHealthyRecords", "no healthy records are published")
    } else {
        ("True", "RecordsPublished", "healthy records are published")
    };
    metav1::Condition {
        last_transition_time: metav1::Time(Utc::now()),
        observed_generation: gslb.meta().generation,
        type_: READY_CONDITION.to_string(),
        status: state.to_string(),
        reason: reason.to_string(),
        message: message.to_string(),
    }
}

/// Computes the observed state of the Gslb and publishes it on its status subresource.
///
/// Nothing is written if the computed status equals the stored one.
pub async fn update_gslb_status(ctx: &Context, gslb: &Gslb) -> Result<()> {
    let key = NamespacedName::from_resource(gslb)?;

    let mut updated = gslb.clone();
    let status = updated.status.get_or_insert_with(Default::default);
    status.service_health = service_health(ctx, gslb)
        .await?
        .into_iter()
        .map(|(host, health)| (host, health.to_string()))
        .collect();
    status.healthy_records = healthy_records(ctx, &key).await?;
    status.geo_tag.clone_from(&ctx.config.cluster_geo_tag);
    let ready = ready_condition(gslb, status);
    set_condition(&mut updated, ready);

    if updated.status == gslb.status {
        debug!("status of gslb {key} is up to date");
        return Ok(());
    }

    let status = serde_json::to_value(updated.status.unwrap_or_default())
        .map_err(|error| Error::StoreError(error.to_string()))?;
    ctx.gslbs.patch_status(gslb, status).await?;
    info!("updated status of gslb {key}");
    Ok(())
}
