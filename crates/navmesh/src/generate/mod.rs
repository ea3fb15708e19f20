// Navigation mesh generation.
//
// Generation is a resumable state machine. The host calls
// `NavGenerator::update` with a time budget; each call does as much work as
// fits and returns, so a game loop (or the navgen tool) stays responsive.
//
//   SampleWalkableSpace -> CreateAreasFromSamples -> FindHidingSpots
//   -> FindEncounterSpots -> FindSniperSpots -> ComputeMeshVisibility
//   -> FindEarliestOccupyTimes -> [FindLightIntensity] -> Custom
//   -> SaveNavMesh -> Complete

mod build;
mod connect;
mod fixup;
mod sample;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use glam::Vec3;
use tracing::{debug, error, info};

use crate::analysis;
use crate::area::AreaId;
use crate::config::NavConfig;
use crate::error::{NavError, NavResult};
use crate::math::{HALF_HUMAN_WIDTH, NavDirType, STEP_HEIGHT, add_direction_to_vector};
use crate::mesh::NavMesh;
use crate::node::{NodeGrid, NodeId};
use crate::trace::TraceOracle;

pub use fixup::adjust_obstacle_distances;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationState {
    SampleWalkableSpace,
    CreateAreasFromSamples,
    FindHidingSpots,
    FindEncounterSpots,
    FindSniperSpots,
    ComputeMeshVisibility,
    FindEarliestOccupyTimes,
    FindLightIntensity,
    Custom,
    SaveNavMesh,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    /// Throw the current mesh away and sample everything again
    Full,
    /// Keep existing areas and only add walkable space they don't cover
    Incremental,
    /// Remove the areas around the seeds and sample them again
    Simplify,
}

/// Starting point of the walkable-space sampler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalkableSeed {
    pub pos: Vec3,
    pub normal: Vec3,
    /// Team spawning here, used for earliest occupy times
    pub team: Option<usize>,
}

/// Ladder placed in the world before generation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LadderSpec {
    pub top: Vec3,
    pub bottom: Vec3,
    pub width: f32,
    pub dir: NavDirType,
}

/// Progress hooks for a generation run
pub trait GenerationObserver {
    fn on_state(&mut self, _state: GenerationState) {}

    fn on_progress(&mut self, _state: GenerationState, _done: usize, _total: usize) {}

    /// Runs during the `Custom` state until it returns true
    fn on_custom(&mut self, _mesh: &mut NavMesh) -> bool {
        true
    }
}

/// Observer that ignores every event
pub struct NoopObserver;

impl GenerationObserver for NoopObserver {}

pub struct NavGenerator {
    pub(crate) config: NavConfig,
    state: GenerationState,
    mode: GenerationMode,
    seeds: Vec<WalkableSeed>,
    ladders: Vec<LadderSpec>,
    output: Option<PathBuf>,

    // Sampling
    pub(crate) nodes: NodeGrid,
    seed_index: usize,
    current_node: Option<NodeId>,
    current_seed: Option<WalkableSeed>,

    // Analysis
    work: Vec<AreaId>,
    cursor: usize,
}

impl NavGenerator {
    pub fn new(config: NavConfig) -> Self {
        NavGenerator {
            config,
            state: GenerationState::Complete,
            mode: GenerationMode::Full,
            seeds: Vec::new(),
            ladders: Vec::new(),
            output: None,
            nodes: NodeGrid::new(),
            seed_index: 0,
            current_node: None,
            current_seed: None,
            work: Vec::new(),
            cursor: 0,
        }
    }

    pub fn config(&self) -> &NavConfig {
        &self.config
    }

    pub fn state(&self) -> GenerationState {
        self.state
    }

    pub fn is_generating(&self) -> bool {
        self.state != GenerationState::Complete
    }

    pub fn mode(&self) -> GenerationMode {
        self.mode
    }

    pub fn add_walkable_seed(&mut self, pos: Vec3, normal: Vec3, team: Option<usize>) {
        self.seeds.push(WalkableSeed { pos, normal, team });
    }

    pub fn seeds(&self) -> &[WalkableSeed] {
        &self.seeds
    }

    pub fn add_ladder(&mut self, ladder: LadderSpec) {
        self.ladders.push(ladder);
    }

    /// Save the finished mesh here during the `SaveNavMesh` state
    pub fn set_output(&mut self, path: impl Into<PathBuf>) {
        self.output = Some(path.into());
    }

    /// Sampled nodes of the current run
    pub fn nodes(&self) -> &NodeGrid {
        &self.nodes
    }

    /// Start a generation run
    pub fn begin(&mut self, mesh: &mut NavMesh, mode: GenerationMode) -> NavResult<()> {
        if self.is_generating() {
            return Err(NavError::GenerationInProgress);
        }
        match mode {
            GenerationMode::Full => mesh.clear(),
            GenerationMode::Simplify => self.remove_simplified_areas(mesh)?,
            GenerationMode::Incremental => {}
        }
        self.mode = mode;
        self.nodes.clear();
        self.seed_index = 0;
        self.current_node = None;
        self.current_seed = None;
        self.work.clear();
        self.cursor = 0;

        // Both ends of every ladder are walkable seeds
        for spec in &self.ladders {
            let id = mesh.create_ladder(spec.top, spec.bottom, spec.width, spec.dir);
            debug!("Created ladder #{}", id);
            let bottom = add_direction_to_vector(spec.bottom, spec.dir.opposite(), HALF_HUMAN_WIDTH);
            let top = add_direction_to_vector(spec.top, spec.dir, HALF_HUMAN_WIDTH);
            for pos in [bottom, top] {
                self.seeds.push(WalkableSeed {
                    pos: pos + Vec3::Z * STEP_HEIGHT,
                    normal: Vec3::Z,
                    team: None,
                });
            }
        }
        self.ladders.clear();

        info!(
            "Generating navigation mesh ({:?}, {} seeds)",
            mode,
            self.seeds.len()
        );
        self.state = GenerationState::SampleWalkableSpace;
        Ok(())
    }

    /// Simplify regenerates every area within range of a seed
    fn remove_simplified_areas(&self, mesh: &mut NavMesh) -> NavResult<()> {
        let range = self.config.nav_generate_incremental_range;
        let tolerance = self.config.nav_generate_incremental_tolerance;
        let doomed: Vec<AreaId> = mesh
            .areas()
            .filter(|area| {
                self.seeds.iter().any(|seed| {
                    let near = area.closest_point(seed.pos);
                    (near - seed.pos).truncate().length() <= range
                        && (tolerance <= 0.0 || (near.z - seed.pos.z).abs() <= tolerance)
                })
            })
            .map(|area| area.id())
            .collect();
        for id in &doomed {
            mesh.destroy_area(*id)?;
        }
        debug!("Removed {} areas to simplify", doomed.len());
        Ok(())
    }

    fn enter(&mut self, state: GenerationState, observer: &mut dyn GenerationObserver) {
        debug!("Generation state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.cursor = 0;
        observer.on_state(state);
    }

    /// Advance generation for at most `max_time`
    pub fn update(
        &mut self,
        mesh: &mut NavMesh,
        oracle: &dyn TraceOracle,
        observer: &mut dyn GenerationObserver,
        max_time: Duration,
    ) -> NavResult<GenerationStatus> {
        let started = Instant::now();
        let out_of_time = || started.elapsed() >= max_time;

        loop {
            match self.state {
                GenerationState::SampleWalkableSpace => {
                    loop {
                        if !self.sample_step(mesh, oracle) {
                            info!("Sampled {} walkable nodes", self.nodes.len());
                            self.enter(GenerationState::CreateAreasFromSamples, observer);
                            break;
                        }
                        if out_of_time() {
                            observer.on_progress(self.state, self.nodes.len(), 0);
                            return Ok(GenerationStatus::InProgress);
                        }
                    }
                }
                GenerationState::CreateAreasFromSamples => {
                    self.create_nav_areas_from_nodes(mesh, oracle)?;
                    if self.config.nav_quicksave {
                        self.enter(GenerationState::Custom, observer);
                    } else {
                        mesh.clear_hiding_spots();
                        self.work = mesh.area_ids();
                        self.enter(GenerationState::FindHidingSpots, observer);
                    }
                }
                GenerationState::FindHidingSpots => {
                    if self.for_each_work_area(mesh, observer, &out_of_time, |mesh, id| {
                        analysis::find_hiding_spots(mesh, oracle, id)
                    })? {
                        return Ok(GenerationStatus::InProgress);
                    }
                    info!("Found {} hiding spots", mesh.hiding_spot_count());
                    self.enter(GenerationState::FindEncounterSpots, observer);
                }
                GenerationState::FindEncounterSpots => {
                    let range = self.config.nav_max_view_distance;
                    if self.for_each_work_area(mesh, observer, &out_of_time, |mesh, id| {
                        analysis::compute_encounter_spots(mesh, oracle, id, range)
                    })? {
                        return Ok(GenerationStatus::InProgress);
                    }
                    self.enter(GenerationState::FindSniperSpots, observer);
                }
                GenerationState::FindSniperSpots => {
                    let range = self.config.nav_sniper_range;
                    if self.for_each_work_area(mesh, observer, &out_of_time, |mesh, id| {
                        analysis::classify_sniper_spots(mesh, oracle, id, range)
                    })? {
                        return Ok(GenerationStatus::InProgress);
                    }
                    self.enter(GenerationState::ComputeMeshVisibility, observer);
                }
                GenerationState::ComputeMeshVisibility => {
                    let range = self.config.nav_max_view_distance;
                    if self.for_each_work_area(mesh, observer, &out_of_time, |mesh, id| {
                        analysis::compute_visibility(mesh, oracle, id, range)
                    })? {
                        return Ok(GenerationStatus::InProgress);
                    }
                    let inherited = analysis::compress_visibility(mesh);
                    debug!("{} areas inherit their visibility from a neighbor", inherited);
                    self.enter(GenerationState::FindEarliestOccupyTimes, observer);
                }
                GenerationState::FindEarliestOccupyTimes => {
                    analysis::compute_earliest_occupy_times(mesh, &self.seeds);
                    if self.config.nav_compute_light_intensity {
                        self.enter(GenerationState::FindLightIntensity, observer);
                    } else {
                        mesh.set_analyzed(true);
                        self.enter(GenerationState::Custom, observer);
                    }
                }
                GenerationState::FindLightIntensity => {
                    if self.for_each_work_area(mesh, observer, &out_of_time, |mesh, id| {
                        analysis::compute_light_intensity(mesh, oracle, id)
                    })? {
                        return Ok(GenerationStatus::InProgress);
                    }
                    mesh.set_analyzed(true);
                    self.enter(GenerationState::Custom, observer);
                }
                GenerationState::Custom => {
                    if !observer.on_custom(mesh) {
                        return Ok(GenerationStatus::InProgress);
                    }
                    self.enter(GenerationState::SaveNavMesh, observer);
                }
                GenerationState::SaveNavMesh => {
                    if let Some(path) = &self.output {
                        match mesh.save(path) {
                            Ok(()) => info!("Navigation mesh saved to {}", path.display()),
                            Err(e) => error!("Could not save navigation mesh: {}", e),
                        }
                    }
                    self.nodes.clear();
                    self.work.clear();
                    info!("Navigation mesh generation complete: {} areas", mesh.area_count());
                    self.enter(GenerationState::Complete, observer);
                }
                GenerationState::Complete => return Ok(GenerationStatus::Complete),
            }

            if out_of_time() {
                return Ok(if self.state == GenerationState::Complete {
                    GenerationStatus::Complete
                } else {
                    GenerationStatus::InProgress
                });
            }
        }
    }

    /// Run to completion
    pub fn generate(
        &mut self,
        mesh: &mut NavMesh,
        oracle: &dyn TraceOracle,
        observer: &mut dyn GenerationObserver,
    ) -> NavResult<()> {
        if !self.is_generating() {
            self.begin(mesh, GenerationMode::Full)?;
        }
        while self.update(mesh, oracle, observer, Duration::from_millis(250))? == GenerationStatus::InProgress {}
        Ok(())
    }

    /// Run `f` over the remaining work areas. Returns true if the time budget
    /// ran out before the list was finished.
    fn for_each_work_area(
        &mut self,
        mesh: &mut NavMesh,
        observer: &mut dyn GenerationObserver,
        out_of_time: &dyn Fn() -> bool,
        mut f: impl FnMut(&mut NavMesh, AreaId) -> NavResult<()>,
    ) -> NavResult<bool> {
        while self.cursor < self.work.len() {
            let id = self.work[self.cursor];
            self.cursor += 1;
            if mesh.area(id).is_some() {
                f(mesh, id)?;
            }
            if out_of_time() && self.cursor < self.work.len() {
                observer.on_progress(self.state, self.cursor, self.work.len());
                return Ok(true);
            }
        }
        observer.on_progress(self.state, self.work.len(), self.work.len());
        Ok(false)
    }

    /// Turn the sampled nodes into connected, cleaned-up areas
    fn create_nav_areas_from_nodes(&mut self, mesh: &mut NavMesh, oracle: &dyn TraceOracle) -> NavResult<()> {
        let existing: Vec<AreaId> = mesh.area_ids();

        let built = self.build_areas(mesh)?;
        info!("Built {} areas from {} nodes", built, self.nodes.len());

        self.connect_generated_areas(mesh, oracle)?;
        if self.mode != GenerationMode::Full {
            connect::stitch_to_existing(mesh, &existing)?;
        }
        fixup::mark_player_clip_areas(mesh, oracle, &existing);
        fixup::mark_jump_areas(mesh, &self.config, &existing);

        let merges = fixup::merge_generated_areas(mesh, &self.config, &existing)?;
        debug!("Merged {} area pairs", merges);

        fixup::split_areas_under_overhangs(mesh, &existing)?;
        fixup::square_up_areas(mesh, &existing)?;
        fixup::mark_stair_areas(mesh, oracle, &existing);

        if self.config.nav_generate_fixup_jump_areas {
            let removed = fixup::remove_jump_areas(mesh, &existing)?;
            debug!("Removed {} jump areas", removed);
        }
        if self.config.nav_generate_fencetops {
            fixup::handle_obstacle_top_areas(mesh, &existing)?;
        }
        fixup::fixup_connections(mesh, &existing)?;
        mesh.connect_generated_ladders(oracle)?;

        info!(
            "Created {} areas ({} total, {} ladders)",
            mesh.area_count() - existing.len().min(mesh.area_count()),
            mesh.area_count(),
            mesh.ladder_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::NavAttributes;
    use crate::math::{DEATH_DROP, GENERATION_STEP_SIZE};
    use crate::trace::BoxWorld;

    fn quick_config() -> NavConfig {
        NavConfig { nav_quicksave: true, ..NavConfig::default() }
    }

    fn run(world: &BoxWorld, seeds: &[Vec3], config: NavConfig) -> NavMesh {
        let mut mesh = NavMesh::new();
        let mut generator = NavGenerator::new(config);
        for seed in seeds {
            generator.add_walkable_seed(*seed, Vec3::Z, Some(0));
        }
        generator.begin(&mut mesh, GenerationMode::Full).unwrap();
        generator.generate(&mut mesh, world, &mut NoopObserver).unwrap();
        mesh
    }

    #[test]
    fn flat_ground_becomes_one_square_area() {
        let world = BoxWorld::new()
            .with_box(Vec3::new(-125.0, -125.0, -16.0), Vec3::new(125.0, 125.0, 0.0));
        let mesh = run(&world, &[Vec3::ZERO], quick_config());

        assert_eq!(mesh.area_count(), 1);
        let area = mesh.areas().next().unwrap();
        assert_eq!(area.size_x(), 8.0 * GENERATION_STEP_SIZE);
        assert_eq!(area.size_y(), 8.0 * GENERATION_STEP_SIZE);
        assert!(!area.has_attributes(NavAttributes::JUMP | NavAttributes::CROUCH | NavAttributes::STAIRS));
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn death_drop_leaves_regions_unconnected() {
        let drop = DEATH_DROP + 1.0;
        let world = BoxWorld::new()
            .with_box(Vec3::new(-125.0, -125.0, drop - 16.0), Vec3::new(125.0, 125.0, drop))
            .with_box(Vec3::new(-125.0, -125.0, -16.0), Vec3::new(375.0, 125.0, 0.0));
        let mesh = run(
            &world,
            &[Vec3::new(0.0, 0.0, drop), Vec3::new(250.0, 0.0, 0.0)],
            quick_config(),
        );

        assert!(mesh.area_count() >= 2);
        for area in mesh.areas() {
            for (_, c) in area.all_connections() {
                let other = mesh.area(c.id).unwrap();
                assert!(
                    (area.center().z - other.center().z).abs() < 1.0,
                    "area #{} at z={} connects to #{} at z={}",
                    area.id(),
                    area.center().z,
                    other.id(),
                    other.center().z
                );
            }
        }
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn small_drop_is_one_way() {
        let world = BoxWorld::new()
            .with_box(Vec3::new(-125.0, -125.0, 84.0), Vec3::new(125.0, 125.0, 100.0))
            .with_box(Vec3::new(-125.0, -125.0, -16.0), Vec3::new(375.0, 125.0, 0.0));
        let mesh = run(&world, &[Vec3::new(0.0, 0.0, 100.0), Vec3::new(250.0, 0.0, 0.0)], quick_config());

        let high: Vec<_> = mesh.areas().filter(|a| a.center().z > 50.0).map(|a| a.id()).collect();
        let low: Vec<_> = mesh.areas().filter(|a| a.center().z < 50.0).map(|a| a.id()).collect();
        let down = high.iter().any(|h| low.iter().any(|l| mesh.area(*h).unwrap().is_connected(*l, None)));
        let up = low.iter().any(|l| high.iter().any(|h| mesh.area(*l).unwrap().is_connected(*h, None)));
        assert!(down);
        assert!(!up);
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn second_begin_while_running_fails() {
        let mut mesh = NavMesh::new();
        let mut generator = NavGenerator::new(quick_config());
        generator.add_walkable_seed(Vec3::ZERO, Vec3::Z, None);
        generator.begin(&mut mesh, GenerationMode::Full).unwrap();
        assert!(matches!(
            generator.begin(&mut mesh, GenerationMode::Full),
            Err(NavError::GenerationInProgress)
        ));
    }

    #[test]
    fn update_is_resumable() {
        let world = BoxWorld::new()
            .with_box(Vec3::new(-300.0, -300.0, -16.0), Vec3::new(300.0, 300.0, 0.0));
        let mut mesh = NavMesh::new();
        let mut generator = NavGenerator::new(NavConfig::default());
        generator.add_walkable_seed(Vec3::ZERO, Vec3::Z, Some(0));
        generator.begin(&mut mesh, GenerationMode::Full).unwrap();

        struct Recorder(Vec<GenerationState>);
        impl GenerationObserver for Recorder {
            fn on_state(&mut self, state: GenerationState) {
                self.0.push(state);
            }
        }
        let mut recorder = Recorder(Vec::new());
        let mut calls = 0;
        while generator.update(&mut mesh, &world, &mut recorder, Duration::ZERO).unwrap()
            == GenerationStatus::InProgress
        {
            calls += 1;
            assert!(calls < 100_000);
        }
        assert!(calls > 1);
        assert_eq!(recorder.0.first(), Some(&GenerationState::CreateAreasFromSamples));
        assert_eq!(recorder.0.last(), Some(&GenerationState::Complete));
        assert!(!recorder.0.contains(&GenerationState::FindLightIntensity));
        assert!(mesh.is_analyzed());
        assert!(mesh.area_count() >= 1);
    }

    #[test]
    fn incremental_keeps_existing_areas() {
        let world = BoxWorld::new()
            .with_box(Vec3::new(-125.0, -125.0, -16.0), Vec3::new(375.0, 125.0, 0.0));
        let mut mesh = NavMesh::new();
        let existing = mesh
            .create_area(
                Vec3::new(-100.0, -100.0, 0.0),
                Vec3::new(100.0, -100.0, 0.0),
                Vec3::new(100.0, 100.0, 0.0),
                Vec3::new(-100.0, 100.0, 0.0),
            )
            .unwrap();

        let mut generator = NavGenerator::new(quick_config());
        generator.add_walkable_seed(Vec3::new(250.0, 0.0, 0.0), Vec3::Z, None);
        generator.begin(&mut mesh, GenerationMode::Incremental).unwrap();
        generator.generate(&mut mesh, &world, &mut NoopObserver).unwrap();

        assert!(mesh.area(existing).is_some());
        assert!(mesh.area_count() > 1);
        for area in mesh.areas().filter(|a| a.id() != existing) {
            assert!(!area.is_overlapping_area(mesh.area(existing).unwrap()));
        }
        assert!(mesh.area(existing).unwrap().connection_count() > 0);
        assert!(mesh.validate_connections().is_empty());
    }
}
