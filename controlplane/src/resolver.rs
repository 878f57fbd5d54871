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

use crate::{
    consts::{
        DEFAULT_DNS_TTL_SECONDS, DEFAULT_SPLIT_BRAIN_THRESHOLD_SECONDS, FAILOVER_STRATEGY,
        MAX_STRATEGY_SECONDS, ROUND_ROBIN_STRATEGY,
    },
    crd::Gslb,
    *,
};

// Validates the raw operator settings and turns them into the process wide Config.
pub fn resolve_operator_config(args: Args) -> Result<Config> {
    if args.reconcile_requeue_seconds == 0 {
        return Err(Error::InvalidConfigError(
            "reconcile requeue seconds must be a positive integer".to_string(),
        ));
    }
    if args.concurrency == 0 {
        return Err(Error::InvalidConfigError(
            "reconcile concurrency must be a positive integer".to_string(),
        ));
    }

    let cluster_geo_tag = args.cluster_geo_tag.trim().to_string();
    if cluster_geo_tag.is_empty() {
        return Err(Error::InvalidConfigError(
            "cluster geo tag must not be empty".to_string(),
        ));
    }

    let mut ext_clusters_geo_tags: Vec<String> = vec![];
    for tag in args.ext_clusters_geo_tags {
        let tag = tag.trim();
        if tag.is_empty() || ext_clusters_geo_tags.iter().any(|t| t == tag) {
            continue;
        }
        if tag == cluster_geo_tag {
            return Err(Error::InvalidConfigError(format!(
                "external geo tags must not contain the cluster geo tag {cluster_geo_tag}"
            )));
        }
        ext_clusters_geo_tags.push(tag.to_string());
    }

    let edge_dns_zone = normalize_zone(&args.edge_dns_zone);
    let dns_zone = normalize_zone(&args.dns_zone);
    if edge_dns_zone.is_empty() || dns_zone.is_empty() {
        return Err(Error::InvalidConfigError(
            "both the edge dns zone and the dns zone must be set".to_string(),
        ));
    }
    if !dns_zone.ends_with(&format!(".{edge_dns_zone}")) {
        return Err(Error::InvalidConfigError(format!(
            "dns zone {dns_zone} is not a subdomain of edge dns zone {edge_dns_zone}"
        )));
    }

    Ok(Config {
        reconcile_requeue_seconds: args.reconcile_requeue_seconds,
        cluster_geo_tag,
        ext_clusters_geo_tags,
        edge_dns_server: args.edge_dns_server.filter(|server| !server.trim().is_empty()),
        edge_dns_zone,
        dns_zone,
        delegation: args.delegation,
        concurrency: args.concurrency,
    })
}

// Applies strategy defaults to the Gslb in place and validates the result.
pub fn resolve_gslb_spec(config: &Config, gslb: &mut Gslb) -> Result<()> {
    let strategy = &mut gslb.spec.strategy;

    match strategy.type_.as_str() {
        ROUND_ROBIN_STRATEGY => {}
        FAILOVER_STRATEGY => {
            let primary = strategy
                .primary_geo_tag
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            if primary.is_empty() {
                return Err(Error::SpecResolutionError(
                    "strategy failover requires a primaryGeoTag".to_string(),
                ));
            }
            if primary != config.cluster_geo_tag
                && !config.ext_clusters_geo_tags.iter().any(|tag| *tag == primary)
            {
                return Err(Error::SpecResolutionError(format!(
                    "primaryGeoTag {primary} is not one of the known cluster geo tags"
                )));
            }
            strategy.primary_geo_tag = Some(primary);
        }
        other => {
            return Err(Error::SpecResolutionError(format!(
                "unsupported strategy type {other:?}; \
                 must be one of {ROUND_ROBIN_STRATEGY} or {FAILOVER_STRATEGY}"
            )));
        }
    }

    if strategy.dns_ttl_seconds == 0 {
        strategy.dns_ttl_seconds = DEFAULT_DNS_TTL_SECONDS;
    }
    if strategy.split_brain_threshold_seconds == 0 {
        strategy.split_brain_threshold_seconds = DEFAULT_SPLIT_BRAIN_THRESHOLD_SECONDS;
    }

    if strategy.dns_ttl_seconds > MAX_STRATEGY_SECONDS {
        return Err(Error::SpecResolutionError(format!(
            "dnsTtlSeconds {} exceeds {MAX_STRATEGY_SECONDS}",
            strategy.dns_ttl_seconds
        )));
    }
    if strategy.split_brain_threshold_seconds > MAX_STRATEGY_SECONDS {
        return Err(Error::SpecResolutionError(format!(
            "splitBrainThresholdSeconds {} exceeds {MAX_STRATEGY_SECONDS}",
            strategy.split_brain_threshold_seconds
        )));
    }
    if strategy.split_brain_threshold_seconds < 2 * strategy.dns_ttl_seconds {
        return Err(Error::SpecResolutionError(format!(
            "splitBrainThresholdSeconds {} must be at least twice dnsTtlSeconds {}",
            strategy.split_brain_threshold_seconds, strategy.dns_ttl_seconds
        )));
    }

    Ok(())
}

fn normalize_zone(zone: &str) -> String {
    zone.trim().trim_end_matches('.').to_lowercase()
}
