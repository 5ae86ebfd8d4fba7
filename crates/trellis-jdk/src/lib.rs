//! Toolchain (JDK) model and platform path resolution.
//!
//! [`ToolchainRegistry`] holds the JDKs known to the engine and resolves a configured
//! identifier, falling back to the default toolchain when the identifier is unknown.
//! [`PlatformResolver`] turns the selected toolchain into boot-path entries and computes the
//! endorsed-override delta against the default platform.

mod platform;
mod toolchain;

pub use platform::{strip_default, PlatformResolver, ResolvedPlatform, StrippedBoot};
pub use toolchain::{JdkError, Toolchain, ToolchainRegistry, ToolchainSelection};
