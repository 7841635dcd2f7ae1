//! Role-based permission evaluation.
//!
//! A pure function over the operation, the resolved session user (passed
//! explicitly by the caller, never read from ambient state), the resource
//! owner, and the resource visibility. Roles are a closed enumeration with a
//! type-checked total order; see [`super::types::Role`].

use uuid::Uuid;

use super::types::{Role, User};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operation {
    Read,
    Create,
    Update,
    Delete,
    ManageUsers,
    ManageSystem,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Decision {
    pub granted: bool,
    pub reason: &'static str,
}

impl Decision {
    const fn grant(reason: &'static str) -> Self {
        Self {
            granted: true,
            reason,
        }
    }

    const fn deny(reason: &'static str) -> Self {
        Self {
            granted: false,
            reason,
        }
    }
}

/// Decide whether `user` may perform `operation` on a resource.
///
/// `user` is `None` for anonymous callers; `resource_owner` is `None` for
/// resources without an owner (e.g. system-wide pages).
#[must_use]
pub fn evaluate(
    operation: Operation,
    user: Option<&User>,
    resource_owner: Option<Uuid>,
    visibility: Visibility,
) -> Decision {
    // Public reads are always allowed, including for anonymous callers.
    if operation == Operation::Read && visibility == Visibility::Public {
        return Decision::grant("public resource");
    }

    let Some(user) = user else {
        return Decision::deny("authentication required");
    };

    if user.role == Role::Admin {
        return Decision::grant("admin");
    }

    let owns = resource_owner.is_some_and(|owner| owner == user.id);

    match operation {
        Operation::Read => {
            // Private resources: the owner, or editors and up.
            if owns {
                Decision::grant("resource owner")
            } else if user.role >= Role::Editor {
                Decision::grant("editor access")
            } else {
                Decision::deny("private resource")
            }
        }
        Operation::Create => {
            if user.role >= Role::Contributor {
                Decision::grant("contributor access")
            } else {
                Decision::deny("viewers cannot create")
            }
        }
        Operation::Update => {
            if owns && user.role >= Role::Contributor {
                Decision::grant("resource owner")
            } else if user.role >= Role::Editor {
                Decision::grant("editor access")
            } else {
                Decision::deny("cannot update others' resources")
            }
        }
        Operation::Delete => Decision::deny("delete requires admin"),
        Operation::ManageUsers | Operation::ManageSystem => {
            Decision::deny("management requires admin")
        }
    }
}
