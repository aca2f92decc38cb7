//! # Registries
//!
//! - **RegistryClient**: capability name to live [`ServiceEndpoint`], cached with
//!   bounded staleness over a pluggable [`DiscoveryBackend`]
//! - **WorkflowDefinitionRegistry**: immutable workflow definitions by `name@version`

pub mod client;
pub mod definitions;
pub mod discovery;
pub mod endpoint;
pub mod errors;

pub use client::{RegistryClient, RegistryStats};
pub use definitions::WorkflowDefinitionRegistry;
pub use discovery::{DiscoveryBackend, InMemoryDiscovery, MembershipEvent};
pub use endpoint::ServiceEndpoint;
pub use errors::{RegistryError, RegistryResult};
