//! Submarine CRD Definitions
//!
//! Kubernetes Custom Resource Definitions used by the Submarine controller.

pub mod ingress_route;
pub mod submarine;

pub use ingress_route::*;
pub use submarine::*;
