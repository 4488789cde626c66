//! Resource Catalog
//!
//! Every Kubernetes kind the server reads, addressed by group/version/plural. Tools and the
//! manifest loader resolve kinds through this catalog so that a GVR is spelled once.

use serde::Serialize;
use std::fmt;

/// Networking stack a resource kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    Core,
    GatewayApi,
    Istio,
    Kgateway,
    Calico,
    Kuma,
    Linkerd,
}

impl Provider {
    pub const ALL: [Provider; 7] = [
        Provider::Core,
        Provider::GatewayApi,
        Provider::Istio,
        Provider::Kgateway,
        Provider::Calico,
        Provider::Kuma,
        Provider::Linkerd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Core => "core",
            Provider::GatewayApi => "gateway-api",
            Provider::Istio => "istio",
            Provider::Kgateway => "kgateway",
            Provider::Calico => "calico",
            Provider::Kuma => "kuma",
            Provider::Linkerd => "linkerd",
        }
    }

    /// A kind whose presence proves the provider's CRDs are installed.
    pub fn probe_kind(&self) -> ResourceKind {
        match self {
            Provider::Core => ResourceKind::Service,
            Provider::GatewayApi => ResourceKind::GatewayClass,
            Provider::Istio => ResourceKind::VirtualService,
            Provider::Kgateway => ResourceKind::GatewayParameters,
            Provider::Calico => ResourceKind::CalicoIpPool,
            Provider::Kuma => ResourceKind::KumaMesh,
            Provider::Linkerd => ResourceKind::LinkerdServer,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

macro_rules! resource_kinds {
    ($( $variant:ident => ($group:expr, $version:expr, $kind:expr, $plural:expr, $namespaced:expr, $provider:ident, [$($alias:expr),*]) ),+ $(,)?) => {
        /// A Kubernetes resource kind known to the server.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum ResourceKind {
            $($variant),+
        }

        impl ResourceKind {
            pub const ALL: &'static [ResourceKind] = &[$(ResourceKind::$variant),+];

            pub fn group(&self) -> &'static str {
                match self { $(ResourceKind::$variant => $group),+ }
            }

            pub fn version(&self) -> &'static str {
                match self { $(ResourceKind::$variant => $version),+ }
            }

            pub fn kind(&self) -> &'static str {
                match self { $(ResourceKind::$variant => $kind),+ }
            }

            pub fn plural(&self) -> &'static str {
                match self { $(ResourceKind::$variant => $plural),+ }
            }

            pub fn namespaced(&self) -> bool {
                match self { $(ResourceKind::$variant => $namespaced),+ }
            }

            pub fn provider(&self) -> Provider {
                match self { $(ResourceKind::$variant => Provider::$provider),+ }
            }

            fn aliases(&self) -> &'static [&'static str] {
                match self { $(ResourceKind::$variant => &[$($alias),*]),+ }
            }
        }
    };
}

resource_kinds! {
    Service => ("", "v1", "Service", "services", true, Core, ["svc"]),
    Pod => ("", "v1", "Pod", "pods", true, Core, ["po"]),
    Namespace => ("", "v1", "Namespace", "namespaces", false, Core, ["ns"]),
    ConfigMap => ("", "v1", "ConfigMap", "configmaps", true, Core, ["cm"]),
    Node => ("", "v1", "Node", "nodes", false, Core, ["no"]),
    Endpoints => ("", "v1", "Endpoints", "endpoints", true, Core, ["ep"]),
    Secret => ("", "v1", "Secret", "secrets", true, Core, []),
    DaemonSet => ("apps", "v1", "DaemonSet", "daemonsets", true, Core, ["ds"]),
    Deployment => ("apps", "v1", "Deployment", "deployments", true, Core, ["deploy"]),
    NetworkPolicy => ("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies", true, Core, ["netpol"]),
    Ingress => ("networking.k8s.io", "v1", "Ingress", "ingresses", true, Core, ["ing"]),

    GatewayClass => ("gateway.networking.k8s.io", "v1", "GatewayClass", "gatewayclasses", false, GatewayApi, ["gc"]),
    Gateway => ("gateway.networking.k8s.io", "v1", "Gateway", "gateways", true, GatewayApi, ["gtw"]),
    HttpRoute => ("gateway.networking.k8s.io", "v1", "HTTPRoute", "httproutes", true, GatewayApi, []),
    GrpcRoute => ("gateway.networking.k8s.io", "v1", "GRPCRoute", "grpcroutes", true, GatewayApi, []),
    ReferenceGrant => ("gateway.networking.k8s.io", "v1beta1", "ReferenceGrant", "referencegrants", true, GatewayApi, ["refgrant"]),

    VirtualService => ("networking.istio.io", "v1", "VirtualService", "virtualservices", true, Istio, ["vs"]),
    DestinationRule => ("networking.istio.io", "v1", "DestinationRule", "destinationrules", true, Istio, ["dr"]),
    IstioGateway => ("networking.istio.io", "v1", "Gateway", "gateways", true, Istio, ["istio-gateway"]),
    ServiceEntry => ("networking.istio.io", "v1", "ServiceEntry", "serviceentries", true, Istio, ["se"]),
    Sidecar => ("networking.istio.io", "v1", "Sidecar", "sidecars", true, Istio, []),
    PeerAuthentication => ("security.istio.io", "v1", "PeerAuthentication", "peerauthentications", true, Istio, ["pa"]),
    AuthorizationPolicy => ("security.istio.io", "v1", "AuthorizationPolicy", "authorizationpolicies", true, Istio, ["ap"]),

    GatewayParameters => ("gateway.kgateway.dev", "v1alpha1", "GatewayParameters", "gatewayparameters", true, Kgateway, []),
    TrafficPolicy => ("gateway.kgateway.dev", "v1alpha1", "TrafficPolicy", "trafficpolicies", true, Kgateway, []),
    KgatewayBackend => ("gateway.kgateway.dev", "v1alpha1", "Backend", "backends", true, Kgateway, []),
    HttpListenerPolicy => ("gateway.kgateway.dev", "v1alpha1", "HTTPListenerPolicy", "httplistenerpolicies", true, Kgateway, []),
    DirectResponse => ("gateway.kgateway.dev", "v1alpha1", "DirectResponse", "directresponses", true, Kgateway, []),

    CalicoNetworkPolicy => ("projectcalico.org", "v3", "NetworkPolicy", "networkpolicies", true, Calico, ["calico-networkpolicy"]),
    CalicoGlobalNetworkPolicy => ("projectcalico.org", "v3", "GlobalNetworkPolicy", "globalnetworkpolicies", false, Calico, ["gnp"]),
    CalicoIpPool => ("projectcalico.org", "v3", "IPPool", "ippools", false, Calico, []),

    KumaMesh => ("kuma.io", "v1alpha1", "Mesh", "meshes", false, Kuma, []),
    MeshTrafficPermission => ("kuma.io", "v1alpha1", "MeshTrafficPermission", "meshtrafficpermissions", true, Kuma, ["mtp"]),
    MeshTimeout => ("kuma.io", "v1alpha1", "MeshTimeout", "meshtimeouts", true, Kuma, []),
    MeshRetry => ("kuma.io", "v1alpha1", "MeshRetry", "meshretries", true, Kuma, []),
    MeshCircuitBreaker => ("kuma.io", "v1alpha1", "MeshCircuitBreaker", "meshcircuitbreakers", true, Kuma, []),
    MeshHealthCheck => ("kuma.io", "v1alpha1", "MeshHealthCheck", "meshhealthchecks", true, Kuma, []),
    KumaDataplane => ("kuma.io", "v1alpha1", "Dataplane", "dataplanes", true, Kuma, []),

    LinkerdServer => ("policy.linkerd.io", "v1beta3", "Server", "servers", true, Linkerd, []),
    LinkerdServerAuthorization => ("policy.linkerd.io", "v1beta1", "ServerAuthorization", "serverauthorizations", true, Linkerd, ["saz"]),
    LinkerdAuthorizationPolicy => ("policy.linkerd.io", "v1alpha1", "AuthorizationPolicy", "authorizationpolicies", true, Linkerd, ["linkerd-authorizationpolicy"]),
    MeshTlsAuthentication => ("policy.linkerd.io", "v1alpha1", "MeshTLSAuthentication", "meshtlsauthentications", true, Linkerd, []),
}

impl ResourceKind {
    /// `apiVersion` as written in manifests (`v1`, `apps/v1`, `networking.istio.io/v1`).
    pub fn api_version(&self) -> String {
        if self.group().is_empty() {
            self.version().to_string()
        } else {
            format!("{}/{}", self.group(), self.version())
        }
    }

    /// Resolve a manifest's `apiVersion` + `kind`. Any version of a known group/kind maps to the
    /// catalog entry.
    pub fn from_api_version_kind(api_version: &str, kind: &str) -> Option<ResourceKind> {
        let group = match api_version.rsplit_once('/') {
            Some((group, _version)) => group,
            None => "",
        };
        Self::ALL.iter().copied().find(|k| k.group() == group && k.kind() == kind)
    }

    /// Resolve a user-supplied kind name: kind, plural or alias, case-insensitive. Kinds shared
    /// across groups (`Gateway`, `NetworkPolicy`, `AuthorizationPolicy`) resolve to the first
    /// catalog entry within the requested provider, or overall when no provider is given.
    pub fn lookup(name: &str, provider: Option<Provider>) -> Option<ResourceKind> {
        let wanted = name.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().filter(|k| provider.is_none_or(|p| k.provider() == p)).find(
            |k| {
                k.kind().eq_ignore_ascii_case(&wanted)
                    || k.plural() == wanted
                    || k.aliases().contains(&wanted.as_str())
            },
        )
    }

    /// All kinds of a provider.
    pub fn of_provider(provider: Provider) -> Vec<ResourceKind> {
        Self::ALL.iter().copied().filter(|k| k.provider() == provider).collect()
    }

    /// Whether this kind is served by a CustomResourceDefinition rather than the core API.
    pub fn is_custom(&self) -> bool {
        self.provider() != Provider::Core
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plural(), if self.group().is_empty() { "core" } else { self.group() })
    }
}
