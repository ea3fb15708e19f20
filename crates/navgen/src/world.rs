// World description files.
//
// A world file is JSON: the solids of a `BoxWorld` plus the walkable seeds
// and ladders the generator starts from.
//
//   {
//     "solids": [{ "min": [-500, -500, -16], "max": [500, 500, 0] }],
//     "seeds": [{ "pos": [0, 0, 0], "team": 0 }],
//     "ladders": [{ "top": [..], "bottom": [..], "width": 32, "dir": "North" }]
//   }

use std::path::Path;

use anyhow::Context;
use glam::Vec3;
use serde::Deserialize;

use navmesh::{BoxWorld, LadderSpec, NavDirType, NavGenerator, WalkableSeed};

#[derive(Debug, Deserialize)]
pub struct SeedDef {
    pub pos: Vec3,
    #[serde(default = "up")]
    pub normal: Vec3,
    #[serde(default)]
    pub team: Option<usize>,
}

fn up() -> Vec3 {
    Vec3::Z
}

#[derive(Debug, Deserialize)]
pub struct LadderDef {
    pub top: Vec3,
    pub bottom: Vec3,
    #[serde(default = "default_ladder_width")]
    pub width: f32,
    pub dir: NavDirType,
}

fn default_ladder_width() -> f32 {
    32.0
}

#[derive(Debug, Deserialize)]
pub struct WorldFile {
    #[serde(flatten)]
    pub world: BoxWorld,
    #[serde(default)]
    pub seeds: Vec<SeedDef>,
    #[serde(default)]
    pub ladders: Vec<LadderDef>,
}

impl WorldFile {
    pub fn from_json_str(text: &str) -> anyhow::Result<Self> {
        let world: WorldFile = serde_json::from_str(text).context("invalid world description")?;
        if world.seeds.is_empty() && world.ladders.is_empty() {
            anyhow::bail!("world has no walkable seeds");
        }
        Ok(world)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("loading world {}", path.display()))
    }

    pub fn seeds(&self) -> impl Iterator<Item = WalkableSeed> + '_ {
        self.seeds.iter().map(|s| WalkableSeed { pos: s.pos, normal: s.normal, team: s.team })
    }

    /// Hand the seeds and ladders to a generator
    pub fn prime(&self, generator: &mut NavGenerator) {
        for seed in self.seeds() {
            generator.add_walkable_seed(seed.pos, seed.normal, seed.team);
        }
        for l in &self.ladders {
            generator.add_ladder(LadderSpec { top: l.top, bottom: l.bottom, width: l.width, dir: l.dir });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use navmesh::{NavConfig, SolidKind};

    const ARENA: &str = r#"{
        "solids": [
            { "min": [-250, -250, -16], "max": [250, 250, 0] },
            { "min": [-10, -10, 0], "max": [10, 10, 100], "kind": "player_clip" }
        ],
        "ambient_light": 0.5,
        "seeds": [{ "pos": [0, 0, 0], "team": 1 }],
        "ladders": [{ "top": [0, 300, 200], "bottom": [0, 300, 0], "dir": "South" }]
    }"#;

    #[test]
    fn reads_solids_seeds_and_ladders() {
        let file = WorldFile::from_json_str(ARENA).unwrap();
        assert_eq!(file.world.solids.len(), 2);
        assert_eq!(file.world.solids[0].kind, SolidKind::Solid);
        assert_eq!(file.world.solids[1].kind, SolidKind::PlayerClip);
        assert_eq!(file.world.ambient_light, 0.5);

        let seeds: Vec<_> = file.seeds().collect();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].normal, Vec3::Z);
        assert_eq!(seeds[0].team, Some(1));
        assert_eq!(file.ladders[0].width, 32.0);
        assert_eq!(file.ladders[0].dir, NavDirType::South);

        let mut generator = NavGenerator::new(NavConfig::default());
        file.prime(&mut generator);
        assert_eq!(generator.seeds().len(), 1);
    }

    #[test]
    fn rejects_worlds_without_seeds() {
        assert!(WorldFile::from_json_str(r#"{ "solids": [] }"#).is_err());
        assert!(WorldFile::from_json_str("not json").is_err());
    }
}
