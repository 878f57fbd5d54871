//! In-memory collaborators and fixtures shared by the unit tests.

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset, Endpoints};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressLoadBalancerIngress,
    IngressLoadBalancerStatus, IngressRule, IngressServiceBackend, IngressSpec, IngressStatus,
    ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{Resource, ResourceExt, core::ObjectMeta};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    backoff::Backoff,
    crd::{Gslb, GslbSpec, Strategy},
    delegation::DnsProvider,
    ensure::Flow,
    store::{ObjectStore, object_key},
    *,
};

/// [`ObjectStore`] holding objects in memory, with write accounting and failure injection.
pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<(String, String), K>>,
    writes: AtomicUsize,
    next_version: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            writes: AtomicUsize::new(0),
            next_version: AtomicUsize::new(1),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource + Clone,
{
    /// Seeds an object without counting it as a write.
    pub fn insert(&self, mut obj: K) {
        let key = object_key(&obj).unwrap();
        if obj.meta().resource_version.is_none() {
            obj.meta_mut().resource_version = Some(self.bump_version());
        }
        self.objects.lock().unwrap().insert(key, obj);
    }

    pub fn fetch(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Marks an object for deletion the way the API server does for objects with finalizers.
    pub fn mark_deleted(&self, namespace: &str, name: &str) {
        let mut objects = self.objects.lock().unwrap();
        let key = (namespace.to_string(), name.to_string());
        if let Some(obj) = objects.get_mut(&key) {
            obj.meta_mut().deletion_timestamp = Some(Time(chrono::Utc::now()));
            if obj.finalizers().is_empty() {
                objects.remove(&key);
            }
        }
    }

    fn bump_version(&self) -> String {
        self.next_version.fetch_add(1, Ordering::SeqCst).to_string()
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreError("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreError("injected write failure".to_string()));
        }
        Ok(())
    }

    fn write(&self, mut obj: K, require_existing: bool) -> Result<K> {
        self.check_writes()?;
        let key = object_key(&obj)?;
        let mut objects = self.objects.lock().unwrap();
        match objects.get(&key) {
            Some(current) if !require_existing => {
                return Err(Error::StoreError(format!(
                    "{} already exists",
                    current.name_any()
                )));
            }
            Some(current) => {
                if obj.meta().resource_version.is_some()
                    && obj.meta().resource_version != current.meta().resource_version
                {
                    return Err(Error::StoreError(format!(
                        "conflict writing {}",
                        current.name_any()
                    )));
                }
            }
            None if require_existing => {
                return Err(Error::StoreError(format!("{} not found", key.1)));
            }
            None => {}
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        obj.meta_mut().resource_version = Some(self.bump_version());
        if obj.meta().deletion_timestamp.is_some() && obj.finalizers().is_empty() {
            objects.remove(&key);
        } else {
            objects.insert(key, obj.clone());
        }
        Ok(obj)
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        self.check_reads()?;
        Ok(self.fetch(namespace, name))
    }

    async fn list(&self, namespace: &str) -> Result<Vec<K>> {
        self.check_reads()?;
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, obj: &K) -> Result<K> {
        self.write(obj.clone(), false)
    }

    async fn replace(&self, obj: &K) -> Result<K> {
        self.write(obj.clone(), true)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_writes()?;
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_some() {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn patch_finalizers(&self, obj: &K, finalizers: Vec<String>) -> Result<K> {
        let (namespace, name) = object_key(obj)?;
        let mut current = self
            .fetch(&namespace, &name)
            .ok_or(Error::StoreError(format!("{name} not found")))?;
        if obj.meta().resource_version != current.meta().resource_version {
            return Err(Error::StoreError(format!("conflict patching {name}")));
        }
        current.meta_mut().finalizers = Some(finalizers);
        self.write(current, true)
    }

    async fn patch_status(&self, obj: &K, status: serde_json::Value) -> Result<K> {
        let (namespace, name) = object_key(obj)?;
        let current = self
            .fetch(&namespace, &name)
            .ok_or(Error::StoreError(format!("{name} not found")))?;
        let mut value = serde_json::to_value(&current)
            .map_err(|error| Error::StoreError(error.to_string()))?;
        value["status"] = status;
        let patched: K =
            serde_json::from_value(value).map_err(|error| Error::StoreError(error.to_string()))?;
        // status writes do not conflict with concurrent metadata changes
        let mut patched = patched;
        patched.meta_mut().resource_version = None;
        self.write(patched, true)
    }
}

/// [`DnsProvider`] that records its calls and can be told to fail or halt.
#[derive(Default)]
pub struct RecordingProvider {
    pub delegations: AtomicUsize,
    pub finalizations: AtomicUsize,
    pub fail_finalize: AtomicBool,
    pub halt: Mutex<Option<kube::runtime::controller::Action>>,
}

#[async_trait]
impl DnsProvider for RecordingProvider {
    async fn configure_zone_delegation(&self, _gslb: &Gslb) -> Result<Flow> {
        self.delegations.fetch_add(1, Ordering::SeqCst);
        Ok(match self.halt.lock().unwrap().clone() {
            Some(action) => Flow::Stop(action),
            None => Flow::Continue,
        })
    }

    async fn finalize(&self, _gslb: &Gslb) -> Result<()> {
        self.finalizations.fetch_add(1, Ordering::SeqCst);
        if self.fail_finalize.load(Ordering::SeqCst) {
            return Err(Error::FinalizerError("edge dns unavailable".to_string()));
        }
        Ok(())
    }
}

/// Stores behind a test [`Context`], kept around for inspection.
pub struct Harness {
    pub gslbs: Arc<MemoryStore<Gslb>>,
    pub ingresses: Arc<MemoryStore<Ingress>>,
    pub dns_endpoints: Arc<MemoryStore<crd::DNSEndpoint>>,
    pub endpoints: Arc<MemoryStore<Endpoints>>,
    pub provider: Arc<RecordingProvider>,
}

impl Harness {
    pub fn new() -> Self {
        Harness {
            gslbs: Arc::default(),
            ingresses: Arc::default(),
            dns_endpoints: Arc::default(),
            endpoints: Arc::default(),
            provider: Arc::default(),
        }
    }

    pub fn context(&self) -> Context {
        Context {
            config: config(),
            gslbs: self.gslbs.clone(),
            ingresses: self.ingresses.clone(),
            dns_endpoints: self.dns_endpoints.clone(),
            endpoints: self.endpoints.clone(),
            dns_provider: self.provider.clone(),
            backoff: Backoff::default(),
        }
    }
}

pub fn config() -> Config {
    Config {
        reconcile_requeue_seconds: 30,
        cluster_geo_tag: "eu".to_string(),
        ext_clusters_geo_tags: vec!["us".to_string()],
        edge_dns_server: None,
        edge_dns_zone: "example.com".to_string(),
        dns_zone: "cloud.example.com".to_string(),
        delegation: ZoneDelegation::None,
        concurrency: 4,
    }
}

fn path(service: &str) -> HTTPIngressPath {
    HTTPIngressPath {
        path: Some("/".to_string()),
        path_type: "Prefix".to_string(),
        backend: IngressBackend {
            service: Some(IngressServiceBackend {
                name: service.to_string(),
                port: Some(ServiceBackendPort {
                    number: Some(80),
                    ..Default::default()
                }),
            }),
            ..Default::default()
        },
    }
}

/// A round robin Gslb routing `app.cloud.example.com` to service `svc-a`.
pub fn gslb(namespace: &str, name: &str) -> Gslb {
    gslb_with_backend(namespace, name, "app.cloud.example.com", "svc-a")
}

pub fn gslb_with_backend(namespace: &str, name: &str, host: &str, service: &str) -> Gslb {
    let mut gslb = Gslb::new(
        name,
        GslbSpec {
            ingress: IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(host.to_string()),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![path(service)],
                    }),
                }]),
                ..Default::default()
            },
            strategy: Strategy {
                type_: "roundRobin".to_string(),
                ..Default::default()
            },
        },
    );
    gslb.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-{namespace}-{name}")),
        generation: Some(1),
        ..Default::default()
    };
    gslb
}

/// Endpoints of a backend service, healthy if `addresses` is not empty.
pub fn endpoints(namespace: &str, name: &str, addresses: &[&str]) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                addresses
                    .iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }]),
    }
}

/// Sets the load balancer addresses reported on an Ingress.
pub fn with_load_balancer(mut ingress: Ingress, ips: &[&str]) -> Ingress {
    ingress.status = Some(IngressStatus {
        load_balancer: Some(IngressLoadBalancerStatus {
            ingress: Some(
                ips.iter()
                    .map(|ip| IngressLoadBalancerIngress {
                        ip: Some(ip.to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }),
    });
    ingress
}
