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

use k8s_openapi::api::networking::v1::Ingress;
use kube::{Resource, ResourceExt, runtime::controller::Action};
use tracing::{debug, info, warn};

use crate::{
    crd::{DNSEndpoint, Gslb},
    store::{ObjectStore, object_key},
    *,
};

// How long to back off from an object this controller refuses to take over.
const FOREIGN_OBJECT_REQUEUE: Duration = Duration::from_secs(300);

/// Outcome of a step of the reconcile tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    /// The step converged; run the next one.
    Continue,
    /// End the tick now with this action.
    Stop(Action),
}

/// Drift detection between a live derived object and its desired shape.
pub trait Converge {
    /// Returns true if `self` already has the desired shape.
    fn matches(&self, desired: &Self) -> bool;

    /// Copies the desired fields onto `self`, keeping server managed metadata.
    fn converge_to(&mut self, desired: &Self);
}

impl Converge for Ingress {
    fn matches(&self, desired: &Self) -> bool {
        self.spec == desired.spec
            && self.metadata.annotations == desired.metadata.annotations
            && self.metadata.owner_references == desired.metadata.owner_references
    }

    fn converge_to(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
        self.metadata
            .annotations
            .clone_from(&desired.metadata.annotations);
        self.metadata
            .owner_references
            .clone_from(&desired.metadata.owner_references);
    }
}

impl Converge for DNSEndpoint {
    fn matches(&self, desired: &Self) -> bool {
        self.spec == desired.spec
            && self.metadata.labels == desired.metadata.labels
            && self.metadata.owner_references == desired.metadata.owner_references
    }

    fn converge_to(&mut self, desired: &Self) {
        self.spec.clone_from(&desired.spec);
        self.metadata.labels.clone_from(&desired.metadata.labels);
        self.metadata
            .owner_references
            .clone_from(&desired.metadata.owner_references);
    }
}

// Returns true if `obj` carries a controller owner reference to `owner`.
pub fn is_controlled_by<K: Resource>(obj: &K, owner: &Gslb) -> bool {
    let Some(uid) = owner.uid() else {
        return false;
    };
    obj.owner_references()
        .iter()
        .any(|reference| reference.controller == Some(true) && reference.uid == uid)
}

/// Creates `desired` if it is absent, or updates the live object if it drifted.
///
/// Repeated calls with the same input write at most once. A live object that is not
/// controlled by `owner` is left untouched and the tick is stopped.
pub async fn ensure<K>(store: &dyn ObjectStore<K>, owner: &Gslb, desired: K) -> Result<Flow>
where
    K: Resource<DynamicType = ()> + Converge + Clone + Send + Sync,
{
    ensure_with(store, desired, |current| is_controlled_by(current, owner)).await
}

/// Like [`ensure`], with a custom check deciding whether the live object belongs to us.
pub async fn ensure_with<K>(
    store: &dyn ObjectStore<K>,
    desired: K,
    is_ours: impl Fn(&K) -> bool + Send,
) -> Result<Flow>
where
    K: Resource<DynamicType = ()> + Converge + Clone + Send + Sync,
{
    let kind = K::kind(&());
    let (namespace, name) = object_key(&desired)?;

    let Some(mut current) = store.get(&namespace, &name).await? else {
        info!("creating {kind} {namespace}/{name}");
        store.create(&desired).await?;
        return Ok(Flow::Continue);
    };

    if !is_ours(&current) {
        warn!(
            "{kind} {namespace}/{name} exists but is not managed by this controller; \
             leaving it untouched"
        );
        return Ok(Flow::Stop(Action::requeue(FOREIGN_OBJECT_REQUEUE)));
    }

    if current.matches(&desired) {
        debug!("{kind} {namespace}/{name} is up to date");
        return Ok(Flow::Continue);
    }

    info!("drift detected; updating {kind} {namespace}/{name}");
    current.converge_to(&desired);
    store.replace(&current).await?;
    Ok(Flow::Continue)
}
