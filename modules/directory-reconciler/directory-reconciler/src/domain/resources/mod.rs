//! Per-resource adapters and read-only data sources.

pub mod access_package_resource_request;
pub mod application;
pub mod application_password;
pub mod domains;
pub mod user;
pub mod user_lookup;

pub use access_package_resource_request::{
    AccessPackageResourceRequestAdapter, AccessPackageResourceRequestRecord,
    AccessPackageResourceRequestSpec, AccessPackageResourceSpec,
};
pub use application::{
    AppRoleSpec, ApplicationAdapter, ApplicationRecord, ApplicationSpec, PermissionScopeSpec,
};
pub use application_password::{
    ApplicationPasswordAdapter, ApplicationPasswordRecord, ApplicationPasswordSpec,
};
pub use domains::{DomainInfo, DomainKind, DomainsDataSource, DomainsQuery, DomainsResult};
pub use user::{UserAdapter, UserRecord, UserSpec};
pub use user_lookup::{UserLookup, UserSelector};
