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

use std::sync::Arc;

use k8s_openapi::api::core::v1::Endpoints;
use kube::{ResourceExt, runtime::reflector::Store};
use tracing::{debug, warn};

use crate::{crd::Gslb, *};

/// Read access to the Gslbs currently known to the controller.
pub trait GslbSnapshot {
    fn list_namespaced(&self, namespace: &str) -> Result<Vec<Arc<Gslb>>>;
}

impl GslbSnapshot for Store<Gslb> {
    fn list_namespaced(&self, namespace: &str) -> Result<Vec<Arc<Gslb>>> {
        Ok(self
            .state()
            .into_iter()
            .filter(|gslb| gslb.namespace().as_deref() == Some(namespace))
            .collect())
    }
}

// Finds the Gslb whose ingress rules route to the service backing these Endpoints.
//
// Candidates are visited in name order and the first match wins. A failing snapshot
// maps the event to nothing; the periodic requeue picks the change up later.
pub fn gslb_for_endpoints(
    endpoints: &Endpoints,
    snapshot: &impl GslbSnapshot,
) -> Option<NamespacedName> {
    let namespace = endpoints.namespace()?;
    let service = endpoints.name_any();

    let mut gslbs = match snapshot.list_namespaced(&namespace) {
        Ok(gslbs) => gslbs,
        Err(error) => {
            warn!("failed to list gslbs in {namespace} while mapping endpoints {service}: {error}");
            return None;
        }
    };
    gslbs.sort_by_key(|gslb| gslb.name_any());

    let gslb = gslbs
        .iter()
        .find(|gslb| gslb.backend_services().any(|backend| backend == service))?;
    let key = NamespacedName::new(namespace, gslb.name_any());
    debug!("endpoints {service} map to gslb {key}");
    Some(key)
}
