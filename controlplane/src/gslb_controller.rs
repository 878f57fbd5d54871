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

use std::{
    ops::Sub,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    consts::GSLB_FINALIZER,
    crd::{DNSEndpoint, Gslb},
    dnsendpoint_utils::desired_dns_endpoint,
    ensure::{Flow, ensure},
    ingress_utils::desired_ingress,
    mapper::gslb_for_endpoints,
    status::update_gslb_status,
    *,
};

use futures::StreamExt;
use k8s_openapi::api::{core::v1::Endpoints, networking::v1::Ingress};
use kube::{
    Client, ResourceExt,
    api::{Api, ListParams},
    runtime::{
        Controller,
        controller::{self, Action},
        reflector::ObjectRef,
        watcher,
    },
};
use tracing::{debug, info, warn};

// Used by the error policy if the failed object has no usable key.
const FALLBACK_REQUEUE: Duration = Duration::from_secs(5);

pub async fn reconcile(gslb: Arc<Gslb>, ctx: Arc<Context>) -> Result<Action> {
    let start = Instant::now();
    let key = NamespacedName::from_resource(gslb.as_ref())?;

    let action = reconcile_gslb(&key, &ctx).await?;
    ctx.backoff.reset(&key);

    let duration = Instant::now().sub(start);
    info!("finished reconciling gslb {key} in {:?} ms", duration.as_millis());
    Ok(action)
}

/// Runs one reconcile tick for the Gslb identified by `key`.
///
/// The Gslb is read fresh from the store, so a tick queued for an object that was
/// erased in the meantime ends without side effects.
pub async fn reconcile_gslb(key: &NamespacedName, ctx: &Context) -> Result<Action> {
    let Some(mut gslb) = ctx.gslbs.get(&key.namespace, &key.name).await? else {
        debug!("gslb {key} not found; nothing to reconcile");
        return Ok(Action::await_change());
    };

    if let Err(error) = resolve_gslb_spec(&ctx.config, &mut gslb) {
        warn!("invalid spec for gslb {key}: {error}");
        return Err(error);
    }

    if gslb.metadata.deletion_timestamp.is_some() {
        return finalize(key, ctx, &gslb).await;
    }

    if !gslb.finalizers().iter().any(|f| f == GSLB_FINALIZER) {
        let mut finalizers = gslb.finalizers().to_vec();
        finalizers.push(GSLB_FINALIZER.to_string());
        let patched = ctx.gslbs.patch_finalizers(&gslb, finalizers).await?;
        gslb.metadata = patched.metadata;
        debug!("added finalizer to gslb {key}");
    }

    let ingress = desired_ingress(&gslb)?;
    if let Flow::Stop(action) = ensure(&*ctx.ingresses, &gslb, ingress).await? {
        return Ok(action);
    }

    let dnsendpoint = desired_dns_endpoint(ctx, &gslb).await?;
    if let Flow::Stop(action) = ensure(&*ctx.dns_endpoints, &gslb, dnsendpoint).await? {
        return Ok(action);
    }

    if let Flow::Stop(action) = ctx.dns_provider.configure_zone_delegation(&gslb).await? {
        return Ok(action);
    }

    update_gslb_status(ctx, &gslb).await?;

    Ok(Action::requeue(ctx.config.requeue_interval()))
}

// Cleans up the edge DNS state of a deleting Gslb, then releases it to the API server.
async fn finalize(key: &NamespacedName, ctx: &Context, gslb: &Gslb) -> Result<Action> {
    if !gslb.finalizers().iter().any(|f| f == GSLB_FINALIZER) {
        debug!("gslb {key} is being deleted and holds no finalizer of ours");
        return Ok(Action::await_change());
    }

    if let Err(error) = ctx.dns_provider.finalize(gslb).await {
        warn!("failed to finalize gslb {key}: {error}");
        return Err(error);
    }

    let finalizers = gslb
        .finalizers()
        .iter()
        .filter(|f| *f != GSLB_FINALIZER)
        .cloned()
        .collect();
    ctx.gslbs.patch_finalizers(gslb, finalizers).await?;
    info!("finalized gslb {key}");
    Ok(Action::await_change())
}

/// Runs the Gslb controller until a termination signal is received.
///
/// The runtime queue never runs two reconciles for the same Gslb at once, and
/// requests arriving while one runs are coalesced into a single follow-up tick.
pub async fn controller(client: Client, ctx: Context) -> Result<()> {
    let gslbs = Api::<Gslb>::all(client.clone());
    gslbs
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    let dns_endpoints = Api::<DNSEndpoint>::all(client.clone());
    dns_endpoints
        .list(&ListParams::default().limit(1))
        .await
        .map_err(Error::CRDNotFoundError)?;

    let concurrency = ctx.config.concurrency;
    let gslb_controller = Controller::new(gslbs, watcher::Config::default().any_semantic());
    let snapshot = gslb_controller.store();

    gslb_controller
        .owns(Api::<Ingress>::all(client.clone()), watcher::Config::default())
        .owns(dns_endpoints, watcher::Config::default())
        .watches(
            Api::<Endpoints>::all(client),
            watcher::Config::default(),
            move |endpoints| {
                gslb_for_endpoints(&endpoints, &snapshot)
                    .map(|key| ObjectRef::new(&key.name).within(&key.namespace))
            },
        )
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, error_policy, Arc::new(ctx))
        .for_each(|result| async move {
            match result {
                Ok((gslb, _)) => debug!("reconciled {gslb}"),
                Err(error) => warn!("reconcile failed: {error}"),
            }
        })
        .await;

    Ok(())
}

fn error_policy(gslb: Arc<Gslb>, error: &Error, ctx: Arc<Context>) -> Action {
    let Ok(key) = NamespacedName::from_resource(gslb.as_ref()) else {
        warn!("reconcile failed: {:?}", error);
        return Action::requeue(FALLBACK_REQUEUE);
    };
    let delay = ctx.backoff.next_delay(&key);
    warn!("reconcile of gslb {key} failed, retrying in {delay:?}: {:?}", error);
    Action::requeue(delay)
}
