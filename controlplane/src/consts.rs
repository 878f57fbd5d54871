// The finalizer used to gate edge DNS cleanup before a Gslb is erased.
pub const GSLB_FINALIZER: &str = "finalizer.k8gb.absa.oss";

// Field manager for server side apply patches.
pub const GSLB_FIELD_MANAGER: &str = "k8gb-controller";

// Label used to indicate which Gslb a zone delegation DNSEndpoint belongs to.
pub const DELEGATION_FOR_LABEL: &str = "k8gb.absa.oss/delegation-for";

// Prefix of the per-cluster records published next to every healthy host.
pub const LOCAL_TARGETS_PREFIX: &str = "localtargets-";

// Annotation written by kubectl that must not be propagated to derived objects.
pub const LAST_APPLIED_ANNOTATION: &str = "kubectl.kubernetes.io/last-applied-configuration";

// Condition type reported on the Gslb status.
pub const READY_CONDITION: &str = "Ready";

// Strategy types a Gslb may request.
pub const ROUND_ROBIN_STRATEGY: &str = "roundRobin";
pub const FAILOVER_STRATEGY: &str = "failover";

// Strategy defaults applied when the Gslb leaves them unset.
pub const DEFAULT_DNS_TTL_SECONDS: u32 = 30;
pub const DEFAULT_SPLIT_BRAIN_THRESHOLD_SECONDS: u32 = 300;
pub const MAX_STRATEGY_SECONDS: u32 = 3600;
