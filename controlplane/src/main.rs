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

use gslb_controlplane::*;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tracing::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = resolve_operator_config(args)?;
    info!(
        geo_tag = %config.cluster_geo_tag,
        dns_zone = %config.dns_zone,
        delegation = ?config.delegation,
        "starting gslb controller"
    );

    let client = Client::try_default()
        .await
        .context("failed to create kube Client")?;
    let ctx = Context::new(client.clone(), config);

    if let Err(error) = gslb_controller(client, ctx).await {
        error!("failed to start controller: {error:?}");
        std::process::exit(1);
    }
    Ok(())
}
