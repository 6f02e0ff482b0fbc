//! Host Registry: self-identity, peer list, organization.

pub mod env;
pub mod persistence;
pub mod registry;
pub mod types;

pub use env::{HostEnvironment, SystemHostEnvironment};
pub use registry::{HostRegistry, Snapshot};
pub use types::{is_valid_organization_name, Host, HostType, HostsFile, Organization};
