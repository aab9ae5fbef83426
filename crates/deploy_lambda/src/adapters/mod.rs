pub mod aws;
pub mod functions;
pub mod identity;
pub mod images;
#[cfg(any(test, feature = "test-helpers"))]
pub mod in_memory;
pub mod roles;

use self::functions::FunctionService;
use self::identity::IdentityService;
use self::images::ImageRegistry;
use self::roles::RoleService;

/// Every collaborator the deployment pipeline talks to.
pub trait ControlPlane: IdentityService + RoleService + FunctionService + ImageRegistry {}

impl<T> ControlPlane for T where T: IdentityService + RoleService + FunctionService + ImageRegistry {}
