//! Azure Resource Manager interaction.
//!
//! - [`auth`] - Bearer tokens from a service principal
//! - [`arm`] - REST client that follows long-running operations
//! - [`control_plane`] - The create/delete operations the sample needs

mod arm;
mod auth;
mod control_plane;

// Re-export public types and functions
pub use arm::ArmClient;
pub use auth::{ServicePrincipal, StaticToken, TokenSource};
pub use control_plane::{AzureControlPlane, ControlPlane};
