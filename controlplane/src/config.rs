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

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// How the load balanced DNS zone is delegated from the edge DNS zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ZoneDelegation {
    /// Delegation is managed outside of the controller.
    #[default]
    None,
    /// Publish NS and glue records as an external-dns DNSEndpoint.
    DnsEndpoint,
}

/// Raw operator settings, read from flags or the environment.
#[derive(Debug, Parser, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Seconds between steady state reconciliations of every Gslb.
    #[clap(long, env = "RECONCILE_REQUEUE_SECONDS", default_value_t = 30)]
    pub reconcile_requeue_seconds: u64,
    /// Geo tag of the cluster the controller runs in.
    #[clap(long, env = "CLUSTER_GEO_TAG")]
    pub cluster_geo_tag: String,
    /// Geo tags of the other clusters taking part in load balancing.
    #[clap(long, env = "EXT_GSLB_CLUSTERS_GEO_TAGS", value_delimiter = ',', default_value = "")]
    pub ext_clusters_geo_tags: Vec<String>,
    #[clap(long, env = "EDGE_DNS_SERVER")]
    pub edge_dns_server: Option<String>,
    /// Zone of the edge DNS authority the load balanced zone is delegated from.
    #[clap(long, env = "EDGE_DNS_ZONE")]
    pub edge_dns_zone: String,
    /// Load balanced zone, a subdomain of the edge DNS zone.
    #[clap(long, env = "DNS_ZONE")]
    pub dns_zone: String,
    #[clap(long, env = "ZONE_DELEGATION", value_enum, default_value_t = ZoneDelegation::None)]
    pub delegation: ZoneDelegation,
    /// Maximum number of Gslbs reconciled in parallel.
    #[clap(long, env = "RECONCILE_CONCURRENCY", default_value_t = 4)]
    pub concurrency: u16,
}

/// Validated operator configuration, immutable for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub reconcile_requeue_seconds: u64,
    pub cluster_geo_tag: String,
    pub ext_clusters_geo_tags: Vec<String>,
    pub edge_dns_server: Option<String>,
    pub edge_dns_zone: String,
    pub dns_zone: String,
    pub delegation: ZoneDelegation,
    pub concurrency: u16,
}

impl Config {
    pub fn requeue_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_requeue_seconds)
    }
}
