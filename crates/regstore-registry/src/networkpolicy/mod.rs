//! The `networking.k8s.io/v1` `NetworkPolicy` kind and its registry.

pub mod registry;
pub mod types;

pub use registry::{network_policy_storage, new_registry, NetworkPolicyRegistry, NetworkPolicyStorage};
pub use types::{
    IpBlock, NetworkPolicy, NetworkPolicyEgressRule, NetworkPolicyIngressRule, NetworkPolicyList,
    NetworkPolicyPeer, NetworkPolicyPort, NetworkPolicySpec, PolicySelector, PolicyType, PortValue,
    Protocol, SelectorExpression,
};
