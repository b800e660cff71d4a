/// Router Module Index
///
/// Organizes the routing logic into access-segregated modules. Each module's gate is
/// applied as a route layer in `create_router`, so a handler can never be mounted
/// without the check its module promises.

/// Routes accessible to everyone (anonymous, mostly read-only).
pub mod public;

/// Routes behind the Authentication Gate (`require_auth`).
pub mod authenticated;

/// Routes behind the Authentication Gate and the elevated-role gate (`require_admin`).
pub mod admin;
