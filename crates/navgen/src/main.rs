// navgen - navigation mesh tool
// Generates .nav files from world descriptions and inspects existing ones:
// - generate: sample a world and write its navigation mesh
// - info: summarize a .nav file
// - validate: check a .nav file for broken references
// - path: find a path between two positions

mod world;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use glam::Vec3;
use tracing::{debug, info, warn};

use nav_shared::config::get_config;
use nav_shared::log::{initialize_logging, map_log_level};
use nav_shared::{DEFAULT_CONFIG_FILE, ENV_PREFIX};
use navmesh::{
    GenerationMode, GenerationObserver, GenerationState, GenerationStatus, NavConfig, NavGenerator, NavLoadStatus,
    NavMesh, PathGoal, PathOptions, ShortestPathCost, build_path,
};

use world::WorldFile;

#[derive(Parser, Debug)]
#[command(name = "navgen")]
#[command(about = "Navigation mesh generator and inspector")]
#[command(version)]
struct Cli {
    /// Console log level override (0=Error, 1=Warn, 2=Info, 3=Debug, 4=Trace)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<i32>,

    /// Configuration file path
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a navigation mesh from a world description
    Generate(GenerateArgs),
    /// Print a summary of a .nav file
    Info(NavFileArgs),
    /// Check a .nav file for broken references
    Validate(NavFileArgs),
    /// Find a path between two positions
    Path(PathArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Mode {
    Full,
    Incremental,
    Simplify,
}

impl From<Mode> for GenerationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Full => GenerationMode::Full,
            Mode::Incremental => GenerationMode::Incremental,
            Mode::Simplify => GenerationMode::Simplify,
        }
    }
}

#[derive(Args, Debug)]
struct GenerateArgs {
    /// World description (JSON)
    #[arg(short = 'w', long = "world")]
    world: PathBuf,

    /// Output .nav file
    #[arg(short = 'o', long = "output")]
    output: PathBuf,

    #[arg(short = 'm', long = "mode", value_enum, default_value_t = Mode::Full)]
    mode: Mode,

    /// Existing mesh to extend (incremental and simplify modes)
    #[arg(short = 'i', long = "input")]
    input: Option<PathBuf>,

    /// Skip the analysis passes
    #[arg(long = "quick")]
    quick: bool,

    /// Time slice per generation update, in milliseconds
    #[arg(long = "slice", default_value_t = 100)]
    slice_ms: u64,
}

#[derive(Args, Debug)]
struct NavFileArgs {
    /// .nav file
    nav: PathBuf,
}

#[derive(Args, Debug)]
struct PathArgs {
    /// .nav file
    nav: PathBuf,

    /// Start position (format: X,Y,Z)
    #[arg(long = "from", value_parser = parse_vec3)]
    from: Vec3,

    /// Goal position (format: X,Y,Z)
    #[arg(long = "to", value_parser = parse_vec3)]
    to: Vec3,

    /// Give up on paths longer than this
    #[arg(long = "max-length")]
    max_length: Option<f32>,
}

fn parse_vec3(input: &str) -> Result<Vec3, String> {
    let parts: Vec<&str> = input.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err("Expected X,Y,Z".to_string());
    };
    let coord = |s: &str, axis: &str| s.parse::<f32>().map_err(|_| format!("Invalid {} coordinate", axis));
    Ok(Vec3::new(coord(x, "X")?, coord(y, "Y")?, coord(z, "Z")?))
}

/// Logs generation progress
struct ProgressLog;

impl GenerationObserver for ProgressLog {
    fn on_state(&mut self, state: GenerationState) {
        info!("Generation: {:?}", state);
    }

    fn on_progress(&mut self, state: GenerationState, done: usize, total: usize) {
        if total > 0 {
            debug!("{:?}: {}/{}", state, done, total);
        } else {
            debug!("{:?}: {} done", state, done);
        }
    }
}

/// Load the configuration file. A missing file is not fatal: every tunable
/// has a default.
fn load_config(path: &str) -> NavConfig {
    let mut config = get_config().lock();
    if !config.set_source(path, ENV_PREFIX) {
        debug!("No configuration file {}, using defaults", path);
    }
    NavConfig::from_config(&config)
}

fn init_logging(log_level: Option<i32>) {
    let log_dir = {
        let config = get_config().lock();
        let dir = config.get_string_default("LogsDir", "");
        if dir.is_empty() { None } else { Some(dir) }
    };
    let level = log_level.unwrap_or_else(|| get_config().lock().get_int_default("LogLevel", 2));
    initialize_logging(log_dir.as_deref(), map_log_level(level), Some("navgen.log"));
}

fn load_mesh(path: &Path) -> anyhow::Result<(NavMesh, NavLoadStatus)> {
    let mut mesh = NavMesh::new();
    let status = mesh.load(path).with_context(|| format!("loading {}", path.display()))?;
    if status == NavLoadStatus::CorruptData {
        warn!("{} contains broken references; they were dropped", path.display());
    }
    Ok((mesh, status))
}

fn run_generate(args: GenerateArgs, mut config: NavConfig) -> anyhow::Result<()> {
    let world = WorldFile::load(&args.world)?;
    if args.quick {
        config.nav_quicksave = true;
    }

    let mode = GenerationMode::from(args.mode);
    let mut mesh = NavMesh::new();
    match (&args.input, mode) {
        (Some(input), GenerationMode::Incremental | GenerationMode::Simplify) => {
            mesh = load_mesh(input)?.0;
        }
        (None, GenerationMode::Incremental | GenerationMode::Simplify) => {
            bail!("{:?} generation needs an existing mesh (--input)", mode);
        }
        (Some(_), GenerationMode::Full) => warn!("Ignoring --input for a full generation"),
        (None, GenerationMode::Full) => {}
    }

    let mut generator = NavGenerator::new(config);
    world.prime(&mut generator);
    generator.set_output(&args.output);
    generator.begin(&mut mesh, mode)?;

    let slice = Duration::from_millis(args.slice_ms.max(1));
    let mut observer = ProgressLog;
    while generator.update(&mut mesh, &world.world, &mut observer, slice)? == GenerationStatus::InProgress {}

    if !args.output.exists() {
        bail!("navigation mesh was not written to {}", args.output.display());
    }
    info!(
        "{}: {} areas, {} ladders, {} hiding spots",
        args.output.display(),
        mesh.area_count(),
        mesh.ladder_count(),
        mesh.hiding_spot_count()
    );
    Ok(())
}

fn run_info(args: NavFileArgs) -> anyhow::Result<()> {
    let (mesh, status) = load_mesh(&args.nav)?;
    let connections: usize = mesh.areas().map(|a| a.connection_count()).sum();
    let named = mesh.areas().filter(|a| a.place().is_defined()).count();
    println!("File:          {}", args.nav.display());
    println!("Status:        {:?}", status);
    println!("Analyzed:      {}", mesh.is_analyzed());
    println!("BSP size:      {}", mesh.bsp_size());
    println!("Areas:         {}", mesh.area_count());
    println!("Connections:   {}", connections);
    println!("Ladders:       {}", mesh.ladder_count());
    println!("Hiding spots:  {}", mesh.hiding_spot_count());
    println!("Places:        {} ({} areas named)", mesh.places.len(), named);
    Ok(())
}

fn run_validate(args: NavFileArgs) -> anyhow::Result<()> {
    let (mesh, status) = load_mesh(&args.nav)?;
    let issues = mesh.validate_connections();
    for issue in &issues {
        println!("{}", issue);
    }
    if status == NavLoadStatus::CorruptData || !issues.is_empty() {
        bail!("{} failed validation ({} connection issues)", args.nav.display(), issues.len());
    }
    println!("{}: {} areas OK", args.nav.display(), mesh.area_count());
    Ok(())
}

fn run_path(args: PathArgs) -> anyhow::Result<()> {
    let (mesh, _) = load_mesh(&args.nav)?;
    let Some(start) = mesh.get_nearest_nav_area(args.from, false, None) else {
        bail!("no area near {}", args.from);
    };
    let options = PathOptions { max_path_length: args.max_length, ..PathOptions::default() };
    let result = build_path(&mesh, start, PathGoal::Position(args.to), &mut ShortestPathCost, &options)?;

    for step in &result.steps {
        match step.how {
            Some(how) => println!("#{:<6} {:<24} {:8.1}", step.area, format!("{:?}", how), step.length_so_far),
            None => println!("#{:<6} {:<24} {:8.1}", step.area, "start", step.length_so_far),
        }
    }
    if !result.found {
        bail!("no path to {}; closest area is #{}", args.to, result.closest);
    }
    println!("Path length {:.1} over {} areas", result.length(), result.steps.len());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config);
    init_logging(cli.log_level);
    info!("navgen v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Generate(args) => run_generate(args, config),
        Command::Info(args) => run_info(args),
        Command::Validate(args) => run_validate(args),
        Command::Path(args) => run_path(args),
    }
}
