//! # Kubernetes Access
//!
//! Resource catalog, cluster readers (live and in-memory), selector evaluation and helpers for
//! reading unstructured objects.

pub mod client;
pub mod fields;
pub mod memory;
pub mod names;
pub mod resources;
pub mod selectors;

pub use client::{ClusterError, ClusterReader, KubeClusterReader};
pub use fields::ObjectExt;
pub use memory::{InMemoryCluster, ManifestError};
pub use resources::{Provider, ResourceKind};
pub use selectors::{CalicoSelector, LabelSelector, Labels};
