// Generation and analysis tunables.

use nav_shared::config::Config;
use serde::{Deserialize, Serialize};

/// Named tunables read at generation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Minimum normal Z of walkable ground; steeper triangles mark an area JUMP
    pub nav_slope_limit: f32,
    /// Largest normal Z difference between an area's two triangles
    pub nav_slope_tolerance: f32,
    /// Largest area side, in generation steps
    pub nav_area_max_size: u32,
    /// Furthest a node may be sampled from its seed in incremental mode
    pub nav_generate_incremental_range: f32,
    /// Z window around the seed in incremental mode, 0 disables it
    pub nav_generate_incremental_tolerance: f32,
    pub nav_generate_fencetops: bool,
    pub nav_generate_fixup_jump_areas: bool,
    pub nav_max_view_distance: f32,
    pub nav_compute_light_intensity: bool,
    /// Skip the analysis states
    pub nav_quicksave: bool,
    pub nav_sniper_range: f32,
}

impl Default for NavConfig {
    fn default() -> Self {
        NavConfig {
            nav_slope_limit: 0.7,
            nav_slope_tolerance: 0.1,
            nav_area_max_size: 50,
            nav_generate_incremental_range: 2000.0,
            nav_generate_incremental_tolerance: 0.0,
            nav_generate_fencetops: true,
            nav_generate_fixup_jump_areas: true,
            nav_max_view_distance: 6000.0,
            nav_compute_light_intensity: false,
            nav_quicksave: false,
            nav_sniper_range: 1000.0,
        }
    }
}

impl NavConfig {
    /// Read tunables from a loaded configuration, falling back to defaults
    pub fn from_config(config: &Config) -> Self {
        let d = NavConfig::default();
        NavConfig {
            nav_slope_limit: config.get_float_default("nav_slope_limit", d.nav_slope_limit),
            nav_slope_tolerance: config.get_float_default("nav_slope_tolerance", d.nav_slope_tolerance),
            nav_area_max_size: config
                .get_int_default("nav_area_max_size", d.nav_area_max_size as i32)
                .max(1) as u32,
            nav_generate_incremental_range: config
                .get_float_default("nav_generate_incremental_range", d.nav_generate_incremental_range),
            nav_generate_incremental_tolerance: config.get_float_default(
                "nav_generate_incremental_tolerance",
                d.nav_generate_incremental_tolerance,
            ),
            nav_generate_fencetops: config
                .get_bool_default("nav_generate_fencetops", d.nav_generate_fencetops),
            nav_generate_fixup_jump_areas: config
                .get_bool_default("nav_generate_fixup_jump_areas", d.nav_generate_fixup_jump_areas),
            nav_max_view_distance: config
                .get_float_default("nav_max_view_distance", d.nav_max_view_distance),
            nav_compute_light_intensity: config
                .get_bool_default("nav_compute_light_intensity", d.nav_compute_light_intensity),
            nav_quicksave: config.get_bool_default("nav_quicksave", d.nav_quicksave),
            nav_sniper_range: config.get_float_default("nav_sniper_range", d.nav_sniper_range),
        }
    }
}
