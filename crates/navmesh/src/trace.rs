// Trace oracle: the collision queries the navigation system consumes.
//
// Generation and analysis never look at world geometry directly. They ask a
// `TraceOracle` to sweep boxes and rays through the world. A failed or
// blocked trace is an answer ("no edge that way"), never an error.
//
// `BoxWorld` is a self-contained oracle made of axis-aligned solid boxes. The
// navgen tool loads one from JSON and the tests build them in code.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which kinds of solids a trace collides with
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TraceMask: u32 {
        const SOLID       = 0x0000_0001;
        const PLAYER_CLIP = 0x0000_0002;
    }
}

bitflags! {
    /// Surface properties of whatever a trace hit
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct SurfaceFlags: u32 {
        const SKY = 0x0000_0004;
    }
}

/// Mask used for walkability and visibility traces
pub const MASK_NAV_SOLID: TraceMask = TraceMask::SOLID;

/// Result of a box or ray sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    /// Portion of the sweep completed before the first hit (1.0 = clear)
    pub fraction: f32,
    pub end_pos: Vec3,
    /// Surface normal at the hit, zero when clear
    pub normal: Vec3,
    /// The swept box started inside a solid
    pub start_solid: bool,
    pub surface: SurfaceFlags,
}

impl TraceResult {
    pub fn clear(end: Vec3) -> Self {
        TraceResult {
            fraction: 1.0,
            end_pos: end,
            normal: Vec3::ZERO,
            start_solid: false,
            surface: SurfaceFlags::empty(),
        }
    }

    pub fn did_hit(&self) -> bool {
        self.fraction < 1.0 || self.start_solid
    }
}

/// Collision queries provided by the host world
pub trait TraceOracle {
    /// Sweep the box `[mins, maxs]` (relative to the origin) from `start` to `end`
    fn trace_hull(&self, start: Vec3, end: Vec3, mins: Vec3, maxs: Vec3, mask: TraceMask)
    -> TraceResult;

    /// Sweep a ray from `start` to `end`
    fn trace_line(&self, start: Vec3, end: Vec3, mask: TraceMask) -> TraceResult {
        self.trace_hull(start, end, Vec3::ZERO, Vec3::ZERO, mask)
    }

    /// Light level at a position in [0, 1]; worlds without lighting are fully lit
    fn light_intensity(&self, _pos: Vec3) -> f32 {
        1.0
    }
}

/// What a `BoxWorld` solid is made of
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolidKind {
    #[default]
    Solid,
    /// Blocks players only; nav traces pass through it
    PlayerClip,
    /// Solid whose surface is sky
    Sky,
}

/// One axis-aligned box of a `BoxWorld`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Solid {
    pub min: Vec3,
    pub max: Vec3,
    #[serde(default)]
    pub kind: SolidKind,
}

impl Solid {
    fn contents(&self) -> TraceMask {
        match self.kind {
            SolidKind::Solid | SolidKind::Sky => TraceMask::SOLID,
            SolidKind::PlayerClip => TraceMask::PLAYER_CLIP,
        }
    }
}

/// Pull-back applied to hits so a trace starting from a hit position is not
/// embedded in the surface it stopped on
const HIT_EPSILON: f32 = 0.01;
const INSIDE_EPSILON: f32 = 0.001;

/// A world made of axis-aligned boxes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxWorld {
    #[serde(default)]
    pub solids: Vec<Solid>,
    /// Light level reported for every position
    #[serde(default = "default_light")]
    pub ambient_light: f32,
}

fn default_light() -> f32 {
    1.0
}

impl BoxWorld {
    pub fn new() -> Self {
        BoxWorld {
            solids: Vec::new(),
            ambient_light: 1.0,
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Add a solid box
    pub fn with_box(mut self, min: Vec3, max: Vec3) -> Self {
        self.solids.push(Solid {
            min,
            max,
            kind: SolidKind::Solid,
        });
        self
    }

    /// Add a box of a specific kind
    pub fn with_solid(mut self, min: Vec3, max: Vec3, kind: SolidKind) -> Self {
        self.solids.push(Solid { min, max, kind });
        self
    }

    fn sweep(solid: &Solid, start: Vec3, end: Vec3, mins: Vec3, maxs: Vec3) -> Option<Sweep> {
        // Minkowski-expand the solid by the swept box
        let lo = solid.min - maxs;
        let hi = solid.max - mins;

        let inside = (0..3).all(|a| start[a] > lo[a] + INSIDE_EPSILON && start[a] < hi[a] - INSIDE_EPSILON);
        if inside {
            return Some(Sweep::StartSolid);
        }

        let delta = end - start;
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;

        for a in 0..3 {
            let d = delta[a];
            if d.abs() < 1.0e-9 {
                if start[a] <= lo[a] + INSIDE_EPSILON || start[a] >= hi[a] - INSIDE_EPSILON {
                    return None;
                }
                continue;
            }
            let (mut t1, mut t2) = ((lo[a] - start[a]) / d, (hi[a] - start[a]) / d);
            if t1 > t2 {
                std::mem::swap(&mut t1, &mut t2);
            }
            if t1 > t_enter {
                t_enter = t1;
                normal = Vec3::ZERO;
                normal[a] = -d.signum();
            }
            t_exit = t_exit.min(t2);
        }

        if t_enter >= t_exit - 1.0e-6 || t_exit <= 1.0e-6 || t_enter > 1.0 || t_enter < -1.0e-6 {
            return None;
        }

        Some(Sweep::Hit {
            t: t_enter.max(0.0),
            normal,
        })
    }
}

enum Sweep {
    StartSolid,
    Hit { t: f32, normal: Vec3 },
}

impl TraceOracle for BoxWorld {
    fn trace_hull(
        &self,
        start: Vec3,
        end: Vec3,
        mins: Vec3,
        maxs: Vec3,
        mask: TraceMask,
    ) -> TraceResult {
        let mut best = TraceResult::clear(end);
        let mut best_t = f32::INFINITY;
        let length = (end - start).length();

        for solid in &self.solids {
            if !mask.intersects(solid.contents()) {
                continue;
            }
            let surface = if solid.kind == SolidKind::Sky {
                SurfaceFlags::SKY
            } else {
                SurfaceFlags::empty()
            };
            match Self::sweep(solid, start, end, mins, maxs) {
                Some(Sweep::StartSolid) => {
                    return TraceResult {
                        fraction: 0.0,
                        end_pos: start,
                        normal: Vec3::ZERO,
                        start_solid: true,
                        surface,
                    };
                }
                Some(Sweep::Hit { t, normal }) if t < best_t => {
                    best_t = t;
                    let pull_back = if length > 0.0 { HIT_EPSILON / length } else { 0.0 };
                    let fraction = (t - pull_back).max(0.0);
                    best = TraceResult {
                        fraction,
                        end_pos: start + (end - start) * fraction,
                        normal,
                        start_solid: false,
                        surface,
                    };
                }
                _ => {}
            }
        }

        best
    }

    fn light_intensity(&self, _pos: Vec3) -> f32 {
        self.ambient_light
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn floor() -> BoxWorld {
        BoxWorld::new().with_box(Vec3::new(-500.0, -500.0, -10.0), Vec3::new(500.0, 500.0, 0.0))
    }

    #[test]
    fn ray_hits_floor_from_above() {
        let world = floor();
        let tr = world.trace_line(Vec3::new(0.0, 0.0, 100.0), Vec3::new(0.0, 0.0, -100.0), MASK_NAV_SOLID);
        assert!(tr.did_hit());
        assert!(!tr.start_solid);
        assert!(tr.end_pos.z.abs() < 0.05);
        assert_eq!(tr.normal, Vec3::Z);
    }

    #[test]
    fn sliding_along_surface_is_clear() {
        let world = floor();
        let tr = world.trace_hull(
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(100.0, 0.0, 0.0),
            Vec3::new(-16.0, -16.0, 0.0),
            Vec3::new(16.0, 16.0, 50.0),
            MASK_NAV_SOLID,
        );
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn hull_stops_at_wall() {
        let world = floor().with_box(Vec3::new(50.0, -100.0, 0.0), Vec3::new(60.0, 100.0, 100.0));
        let tr = world.trace_hull(
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(100.0, 0.0, 1.0),
            Vec3::new(-16.0, -16.0, 0.0),
            Vec3::new(16.0, 16.0, 50.0),
            MASK_NAV_SOLID,
        );
        assert!(tr.fraction < 1.0);
        assert!((tr.end_pos.x - 34.0).abs() < 0.05);
        assert_eq!(tr.normal, Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn start_inside_is_start_solid() {
        let world = floor();
        let tr = world.trace_line(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 5.0), MASK_NAV_SOLID);
        assert!(tr.start_solid);
    }

    #[test]
    fn player_clip_ignored_by_solid_mask() {
        let world = BoxWorld::new().with_solid(
            Vec3::new(-10.0, -10.0, -10.0),
            Vec3::new(10.0, 10.0, 10.0),
            SolidKind::PlayerClip,
        );
        let tr = world.trace_line(Vec3::new(-50.0, 0.0, 0.0), Vec3::new(50.0, 0.0, 0.0), MASK_NAV_SOLID);
        assert_eq!(tr.fraction, 1.0);
        let tr = world.trace_line(Vec3::new(-50.0, 0.0, 0.0), Vec3::new(50.0, 0.0, 0.0), TraceMask::PLAYER_CLIP);
        assert!(tr.fraction < 1.0);
    }

    #[test]
    fn world_loads_from_json() {
        let world = BoxWorld::from_json_str(
            r#"{ "solids": [ { "min": [0, 0, -8], "max": [64, 64, 0] },
                              { "min": [0, 0, 500], "max": [64, 64, 508], "kind": "sky" } ] }"#,
        )
        .unwrap();
        assert_eq!(world.solids.len(), 2);
        assert_eq!(world.solids[1].kind, SolidKind::Sky);
        assert_eq!(world.ambient_light, 1.0);
    }
}
