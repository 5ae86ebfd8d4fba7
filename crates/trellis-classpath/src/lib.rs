//! Classpath views for a single Java project.
//!
//! A [`ProjectContext`] owns the current [`trellis_project::ProjectSnapshot`] and answers
//! queries for path views ([`ViewKind`]) of the main and test sources:
//!
//! - legacy views (`LegacyCompile`, `LegacyRuntime`, `LegacyBoot`) are the flat classpath
//!   built from dependencies, output directories and the toolchain boot path;
//! - module-aware views (`Compile`, `Runtime`, `Boot`, `ModulePath`, `ModuleRuntime`) split
//!   the legacy path into module path and classpath when the source root declares a module
//!   descriptor and the language level allows it;
//! - the `Endorsed` view lists override archives from the project's endorsed directory,
//!   identified by content hash.
//!
//! Views are computed lazily and memoized. Mutations to the project go through the context,
//! which swaps in a new snapshot and invalidates exactly the affected views plus everything
//! derived from them. Subscribers are notified after invalidation and re-query for the new
//! value.

mod background;
mod cache;
mod compute;
mod context;
mod graph;
mod identify;
pub mod modules;
mod mutation;
mod overlay;
mod resolver;
mod router;
mod selector;
mod snapshot;
mod subscription;
mod view;
mod watch;

pub use cache::ViewCache;
pub use context::{ProjectContext, ProjectContextBuilder, WeakProjectContext};
pub use graph::{GraphError, ViewGraph};
pub use identify::{ArtifactIndex, ContentHash, IndexError, LocalHashIndex};
pub use modules::{
    parse_module_declaration, ComposedPath, ModuleCandidate, ModuleComposition,
    ModuleDeclaration, ModuleOrigin, ModuleRequires,
};
pub use mutation::{DescriptorPersistence, MutationError, PersistError};
pub use overlay::{EndorsedOverlay, OverlayEntry, OverlayResolution};
pub use resolver::{
    ArtifactResolver, ClasspathScope, DependencyResolver, ResolvedPath, ResolverConfig,
};
pub use router::{affected_views, ChangeRouter};
pub use selector::{
    DescriptorProbe, FsDescriptorProbe, ModuleGate, ModuleSelector, SelectorMode, SelectorState,
};
pub use subscription::Subscription;
pub use view::{PathView, ViewKey, ViewKind};
pub use watch::WatchPlan;

#[cfg(feature = "watch-notify")]
pub use watch::{changes_from_event, NotifyDriver};
