//! Role resolution
//!
//! Two resolution models coexist, selected per resolution by [`select_mode`]
//! from the stored custom role definitions:
//!
//! - **Legacy**: a flat role graph where membership propagates upward through
//!   "is a member of" edges. Tokens look like `role:<name>`.
//! - **Custom**: space-scoped membership rows mapped through custom role
//!   definitions. Tokens look like `role:<Class>-<spaceId>-<read|write>` plus
//!   global `role:<Class>-<read|write>` fallbacks.

pub mod custom;
pub mod legacy;
pub mod mode;


pub use custom::CustomRoleEngine;
pub use legacy::LegacyRoleResolver;
pub use mode::{select_mode, RoleMode};
