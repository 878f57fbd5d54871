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

//! Namespaced read/write access to cluster objects.
//!
//! The reconciler only talks to the cluster through [`ObjectStore`], which keeps every
//! step of a tick testable against an in-memory store.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::{
    Client, Resource, ResourceExt,
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::json;
use tracing::debug;

use crate::{consts::GSLB_FIELD_MANAGER, utils::check_if_not_found_err, *};

#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// Reads an object, returning `None` if it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;

    async fn list(&self, namespace: &str) -> Result<Vec<K>>;

    async fn create(&self, obj: &K) -> Result<K>;

    /// Replaces an existing object. The write is rejected if `obj` carries a stale
    /// resource version.
    async fn replace(&self, obj: &K) -> Result<K>;

    /// Deletes an object. Deleting an object that does not exist is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;

    /// Overwrites the finalizers of `obj`, guarded by its resource version.
    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K>;

    /// Writes `status` through the status subresource.
    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<K>;
}

/// [`ObjectStore`] backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        KubeStore { client }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        K::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }
}

pub(crate) fn object_key<K: Resource>(obj: &K) -> Result<(String, String)> {
    let key = NamespacedName::from_resource(obj)?;
    Ok((key.namespace, key.name))
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.api::<K>(namespace)
            .get_opt(name)
            .await
            .map_err(Error::KubeError)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        let list = self
            .api::<K>(namespace)
            .list(&ListParams::default())
            .await
            .map_err(Error::KubeError)?;
        Ok(list.items)
    }

    async fn create(&self, obj: &K) -> Result<K> {
        let (namespace, _) = object_key(obj)?;
        self.api::<K>(&namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(Error::KubeError)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        let (namespace, name) = object_key(obj)?;
        self.api::<K>(&namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(Error::KubeError)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(error) if check_if_not_found_err(&error) => {
                debug!("{} {namespace}/{name} already deleted", K::kind(&()));
                Ok(())
            }
            Err(error) => Err(Error::KubeError(error)),
        }
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K> {
        let (namespace, name) = object_key(obj)?;
        // The resource version makes the merge patch fail with a conflict if the
        // finalizers were changed since `obj` was read.
        let patch = Patch::Merge(json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": obj.resource_version(),
            }
        }));
        self.api::<K>(&namespace)
            .patch(&name, &PatchParams::default(), &patch)
            .await
            .map_err(Error::KubeError)
    }

    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<K> {
        let (namespace, name) = object_key(obj)?;
        let patch = Patch::Apply(json!({
            "apiVersion": K::api_version(&()),
            "kind": K::kind(&()),
            "status": status,
        }));
        let params = PatchParams::apply(GSLB_FIELD_MANAGER).force();
        self.api::<K>(&namespace)
            .patch_status(&name, &params, &patch)
            .await
            .map_err(Error::KubeError)
    }
}
