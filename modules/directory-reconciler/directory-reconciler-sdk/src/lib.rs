//! Directory Reconciler SDK
//!
//! This crate provides the contract between the reconciler and the remote
//! directory service:
//!
//! - [`ApplicationsClient`], [`UsersClient`], [`DomainsClient`],
//!   [`AccessPackageResourceRequestClient`] - Directory client traits
//! - [`Application`], [`User`], [`Domain`], [`AccessPackageResourceRequest`] - Wire records
//! - [`DirectoryError`] - Error returned by every client primitive
//! - [`ODataFilter`] - Single-field equality filter used by `list` calls
//!
//! ## Usage
//!
//! ```ignore
//! use directory_reconciler_sdk::{ODataFilter, UsersClient};
//!
//! let users = client.list(&ODataFilter::eq("userPrincipalName", "alice@example.com")).await?;
//! match client.get(&object_id).await {
//!     Err(e) if e.is_not_found() => { /* treat as absent */ }
//!     other => { /* ... */ }
//! }
//! ```

pub mod api;
pub mod error;
pub mod models;
pub mod odata;

// Re-export main types at crate root
pub use api::{
    AccessPackageResourceRequestClient, ApplicationsClient, DirectoryClients, DomainsClient,
    UsersClient,
};
pub use error::DirectoryError;
pub use models::{
    AccessPackageResource, AccessPackageResourceOriginSystem, AccessPackageResourceRequest,
    AccessPackageResourceRequestType, AccessPackageResourceType, AppRole, AppRoleAllowedMemberType,
    Application, ApplicationApi, ApplicationPatch, Domain, GroupMembershipClaim,
    ImplicitGrantSettings, OptionalClaim, OptionalClaims, PasswordCredential, PasswordProfile,
    PermissionScope, PermissionScopeType, RequiredResourceAccess, ResourceAccess,
    ResourceAccessType, SignInAudience, User, UserPatch, WebApplication,
};
pub use odata::ODataFilter;
