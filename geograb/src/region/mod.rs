//! Region and service resolver.
//!
//! - [`Registry`]: the static catalog of regions, their services and the
//!   statewide services shared by all of them
//! - [`RegionDetector`]: which region the user's spatial context belongs to,
//!   with a [`Confidence`] level
//! - [`list_directory_children`]: browsable children of a directory service

mod detect;
mod directory;
mod lookup;
mod registry;

pub use detect::{
    Candidate, Confidence, DetectionContext, DetectionMethod, DetectionResult, RegionDetector,
    DEFAULT_MIN_OVERLAP,
};
pub use directory::{list_directory_children, ChildService};
pub use lookup::{match_layer_hint, resolve_layer_id};
pub use registry::{
    KnownLayer, LayerMatch, LayerTarget, Region, Registry, RegistryError, Service, ServiceEntry,
    ServiceKind, BUILTIN_REGISTRY,
};
