// navmesh - navigation meshes for bot movement
//
// A navigation mesh is a set of rectangular areas laid over the walkable
// floor of a world, linked by directed connections and ladders. This crate
// generates meshes by sampling a world through a `TraceOracle`, analyzes them
// for hiding spots and visibility, finds paths across them and stores them in
// the versioned binary .nav format.

pub mod analysis;
pub mod area;
pub mod config;
pub mod error;
pub mod file;
pub mod generate;
pub mod grid;
pub mod ladder;
pub mod math;
pub mod mesh;
pub mod node;
pub mod pathfind;
pub mod place;
pub mod trace;

pub use area::{AreaId, HidingSpot, HidingSpotFlags, HidingSpotId, NavArea, NavAttributes, NavConnect};
pub use config::NavConfig;
pub use error::{NavError, NavLoadStatus, NavResult};
pub use file::{NAV_CURRENT_VERSION, NAV_MAGIC};
pub use generate::{
    GenerationMode, GenerationObserver, GenerationState, GenerationStatus, LadderSpec, NavGenerator, NoopObserver,
    WalkableSeed,
};
pub use ladder::{LadderId, NavLadder};
pub use math::{LadderDirType, NavCornerType, NavDirType};
pub use mesh::{ConnectionIssue, NavMesh};
pub use pathfind::{
    NavTraverse, PathCost, PathGoal, PathOptions, PathResult, PathStep, ShortestPathCost, build_path,
};
pub use place::{Place, PlaceNames};
pub use trace::{BoxWorld, Solid, SolidKind, TraceMask, TraceOracle, TraceResult};
