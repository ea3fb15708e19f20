// Binary .nav files.
//
// Layout (little-endian), version 16:
//
//   u32 magic 0xFEEDFACE | u32 version | u32 sub version (v10+)
//   u32 bsp size (v4+) | u8 analyzed (v14+)
//   place directory (v5+): u16 count, count x (u16 len, name, 0), u8 has unnamed (v12+)
//   u32 area count, areas
//   u32 ladder count, ladders (v6+; v6 records carry a dangling flag byte)
//
// Every cross reference is an ID on disk. Loading parses the whole file
// first and only then resolves IDs against the new mesh; a dangling ID is
// logged and dropped, and the load reports `NavLoadStatus::CorruptData`.

use std::fs;
use std::path::Path;

use glam::Vec3;
use nav_shared::util::ByteBuffer;
use tracing::{debug, info, warn};

use crate::area::{
    AreaBindInfo, AreaId, HidingSpot, HidingSpotFlags, HidingSpotId, NavArea, NavAttributes, SpotEncounter,
    SpotOrder,
};
use crate::error::{NavError, NavLoadStatus, NavResult};
use crate::ladder::{LadderId, NavLadder};
use crate::math::{LadderDirType, MAX_NAV_TEAMS, NUM_CORNERS, NavCornerType, NavDirType};
use crate::mesh::NavMesh;
use crate::place::{Place, PlaceDirectory};

pub const NAV_MAGIC: u32 = 0xFEED_FACE;
pub const NAV_CURRENT_VERSION: u32 = 16;

/// Versions that add a field to the file
mod since {
    pub const HIDING_SPOT_IDS: u32 = 2;
    pub const ENCOUNTER_DIRS: u32 = 3;
    pub const BSP_SIZE: u32 = 4;
    pub const PLACES: u32 = 5;
    pub const LADDERS: u32 = 6;
    pub const AREA_LADDERS: u32 = 7;
    pub const OCCUPY_TIMES: u32 = 8;
    pub const WORD_ATTRIBUTES: u32 = 9;
    pub const SUB_VERSION: u32 = 10;
    pub const LIGHT: u32 = 11;
    pub const UNNAMED_FLAG: u32 = 12;
    pub const LONG_ATTRIBUTES: u32 = 13;
    pub const ANALYZED: u32 = 14;
    pub const NO_APPROACH_AREAS: u32 = 15;
    pub const VISIBILITY: u32 = 16;
}

/// The only version whose ladder records carry a dangling flag byte
const LADDER_DANGLING_FLAG_VERSION: u32 = 6;

/// Bytes of one pre-v3 encounter spot: position and parametric distance
const OLD_ENCOUNTER_SPOT_SIZE: usize = 4 * 4;

/// Bytes of one pre-v15 approach record: here, prev, how, next, how
const APPROACH_RECORD_SIZE: usize = 4 + 4 + 1 + 4 + 1;

trait ReadField<T> {
    fn field(self, what: &'static str) -> NavResult<T>;
}

impl<T> ReadField<T> for std::io::Result<T> {
    fn field(self, what: &'static str) -> NavResult<T> {
        self.map_err(|_| NavError::Truncated(what))
    }
}

fn read_vec3(buf: &mut ByteBuffer, what: &'static str) -> NavResult<Vec3> {
    Ok(Vec3::new(
        buf.read_f32().field(what)?,
        buf.read_f32().field(what)?,
        buf.read_f32().field(what)?,
    ))
}

fn write_vec3(buf: &mut ByteBuffer, v: Vec3) {
    buf.write_f32(v.x);
    buf.write_f32(v.y);
    buf.write_f32(v.z);
}

fn read_ids(buf: &mut ByteBuffer, what: &'static str) -> NavResult<Vec<u32>> {
    let count = buf.read_u32().field(what)?;
    (0..count).map(|_| buf.read_u32().field(what)).collect()
}

fn write_ids(buf: &mut ByteBuffer, ids: impl ExactSizeIterator<Item = u32>) {
    buf.write_u32(ids.len() as u32);
    for id in ids {
        buf.write_u32(id);
    }
}

fn order_to_byte(t: f32) -> u8 {
    (t.clamp(0.0, 1.0) * 255.0).round() as u8
}

// ---- Raw records ----

struct RawEncounter {
    from: u32,
    from_dir: u8,
    to: u32,
    to_dir: u8,
    spots: Vec<(u32, u8)>,
}

/// An area as read from disk, before its references are resolved
struct RawArea {
    id: u32,
    attributes: NavAttributes,
    nw: Vec3,
    se: Vec3,
    ne_z: f32,
    sw_z: f32,
    connect: [Vec<u32>; 4],
    spots: Vec<(Option<u32>, Vec3, HidingSpotFlags)>,
    encounters: Vec<RawEncounter>,
    place: u16,
    ladders: [Vec<u32>; 2],
    occupy: [f32; MAX_NAV_TEAMS],
    light: [f32; NUM_CORNERS],
    visible: Vec<(u32, u8)>,
    inherit: u32,
}

struct RawLadder {
    id: u32,
    width: f32,
    top: Vec3,
    bottom: Vec3,
    length: f32,
    dir: u32,
    /// Forward, left, right, behind, bottom
    areas: [u32; 5],
}

struct RawMesh {
    version: u32,
    sub_version: u32,
    bsp_size: u32,
    analyzed: bool,
    places: Vec<String>,
    areas: Vec<RawArea>,
    ladders: Vec<RawLadder>,
}

// ---- Reading ----

fn read_area(buf: &mut ByteBuffer, version: u32) -> NavResult<RawArea> {
    let id = buf.read_u32().field("area id")?;
    let attributes = if version < since::WORD_ATTRIBUTES {
        buf.read_u8().field("area attributes")? as u32
    } else if version < since::LONG_ATTRIBUTES {
        buf.read_u16().field("area attributes")? as u32
    } else {
        buf.read_u32().field("area attributes")?
    };
    let nw = read_vec3(buf, "area corners")?;
    let se = read_vec3(buf, "area corners")?;
    let ne_z = buf.read_f32().field("area corners")?;
    let sw_z = buf.read_f32().field("area corners")?;

    let mut connect: [Vec<u32>; 4] = Default::default();
    for list in connect.iter_mut() {
        *list = read_ids(buf, "area connections")?;
    }

    let spot_count = buf.read_u8().field("hiding spots")?;
    let mut spots = Vec::with_capacity(spot_count as usize);
    for _ in 0..spot_count {
        if version < since::HIDING_SPOT_IDS {
            spots.push((None, read_vec3(buf, "hiding spots")?, HidingSpotFlags::IN_COVER));
        } else {
            let spot_id = buf.read_u32().field("hiding spots")?;
            let pos = read_vec3(buf, "hiding spots")?;
            let flags = HidingSpotFlags::from_bits_retain(buf.read_u8().field("hiding spots")?);
            spots.push((Some(spot_id), pos, flags));
        }
    }

    if version < since::NO_APPROACH_AREAS {
        let count = buf.read_u8().field("approach areas")? as usize;
        buf.read_bytes(count * APPROACH_RECORD_SIZE).field("approach areas")?;
    }

    let encounter_count = buf.read_u32().field("encounter paths")?;
    let mut encounters = Vec::new();
    for _ in 0..encounter_count {
        if version < since::ENCOUNTER_DIRS {
            // from, to, path endpoints, then (position, t) per spot
            buf.read_bytes(4 + 4 + 24).field("encounter paths")?;
            let count = buf.read_u8().field("encounter paths")? as usize;
            buf.read_bytes(count * OLD_ENCOUNTER_SPOT_SIZE).field("encounter paths")?;
            continue;
        }
        let from = buf.read_u32().field("encounter paths")?;
        let from_dir = buf.read_u8().field("encounter paths")?;
        let to = buf.read_u32().field("encounter paths")?;
        let to_dir = buf.read_u8().field("encounter paths")?;
        let count = buf.read_u8().field("encounter spots")?;
        let mut spots = Vec::with_capacity(count as usize);
        for _ in 0..count {
            spots.push((buf.read_u32().field("encounter spots")?, buf.read_u8().field("encounter spots")?));
        }
        encounters.push(RawEncounter { from, from_dir, to, to_dir, spots });
    }

    let place = if version >= since::PLACES { buf.read_u16().field("area place")? } else { 0 };

    let mut ladders: [Vec<u32>; 2] = Default::default();
    if version >= since::AREA_LADDERS {
        for list in ladders.iter_mut() {
            *list = read_ids(buf, "area ladders")?;
        }
    }

    let mut occupy = [0.0; MAX_NAV_TEAMS];
    if version >= since::OCCUPY_TIMES {
        for t in occupy.iter_mut() {
            *t = buf.read_f32().field("occupy times")?;
        }
    }

    let mut light = [1.0; NUM_CORNERS];
    if version >= since::LIGHT {
        for l in light.iter_mut() {
            *l = buf.read_f32().field("light intensity")?;
        }
    }

    let mut visible = Vec::new();
    let mut inherit = 0;
    if version >= since::VISIBILITY {
        let count = buf.read_u32().field("visible areas")?;
        for _ in 0..count {
            visible.push((buf.read_u32().field("visible areas")?, buf.read_u8().field("visible areas")?));
        }
        inherit = buf.read_u32().field("visible areas")?;
    }

    Ok(RawArea {
        id,
        attributes: NavAttributes::from_bits_retain(attributes),
        nw,
        se,
        ne_z,
        sw_z,
        connect,
        spots,
        encounters,
        place,
        ladders,
        occupy,
        light,
        visible,
        inherit,
    })
}

fn read_ladder(buf: &mut ByteBuffer, version: u32) -> NavResult<RawLadder> {
    let id = buf.read_u32().field("ladder")?;
    let width = buf.read_f32().field("ladder")?;
    let top = read_vec3(buf, "ladder")?;
    let bottom = read_vec3(buf, "ladder")?;
    let length = buf.read_f32().field("ladder")?;
    let dir = buf.read_u32().field("ladder")?;
    if version == LADDER_DANGLING_FLAG_VERSION {
        // Recomputed from the connected areas
        buf.read_u8().field("ladder")?;
    }
    let mut areas = [0; 5];
    for a in areas.iter_mut() {
        *a = buf.read_u32().field("ladder areas")?;
    }
    Ok(RawLadder { id, width, top, bottom, length, dir, areas })
}

fn read_mesh(buf: &mut ByteBuffer) -> NavResult<RawMesh> {
    let magic = buf.read_u32().field("header")?;
    if magic != NAV_MAGIC {
        return Err(NavError::BadMagic(magic));
    }
    let version = buf.read_u32().field("header")?;
    if version > NAV_CURRENT_VERSION {
        return Err(NavError::BadVersion(version, NAV_CURRENT_VERSION));
    }
    let sub_version = if version >= since::SUB_VERSION { buf.read_u32().field("header")? } else { 0 };
    let bsp_size = if version >= since::BSP_SIZE { buf.read_u32().field("header")? } else { 0 };
    let analyzed = version >= since::ANALYZED && buf.read_u8().field("header")? != 0;

    let mut places = Vec::new();
    if version >= since::PLACES {
        let count = buf.read_u16().field("place directory")?;
        for _ in 0..count {
            places.push(buf.read_len_string().field("place directory")?);
        }
        if version >= since::UNNAMED_FLAG {
            buf.read_u8().field("place directory")?;
        }
    }

    let area_count = buf.read_u32().field("area count")?;
    let mut areas = Vec::new();
    for _ in 0..area_count {
        areas.push(read_area(buf, version)?);
    }

    let mut ladders = Vec::new();
    if version >= since::LADDERS {
        let count = buf.read_u32().field("ladder count")?;
        for _ in 0..count {
            ladders.push(read_ladder(buf, version)?);
        }
    }

    Ok(RawMesh { version, sub_version, bsp_size, analyzed, places, areas, ladders })
}

// ---- Writing ----

fn write_area(buf: &mut ByteBuffer, area: &NavArea, directory: &PlaceDirectory) {
    use NavCornerType::*;
    buf.write_u32(area.id().0);
    buf.write_u32(area.attributes.bits());
    write_vec3(buf, area.corner(NorthWest));
    write_vec3(buf, area.corner(SouthEast));
    buf.write_f32(area.corner(NorthEast).z);
    buf.write_f32(area.corner(SouthWest).z);

    for dir in NavDirType::ALL {
        write_ids(buf, area.connections(dir).iter().map(|c| c.id.0));
    }

    let spots = &area.hiding_spots()[..area.hiding_spots().len().min(u8::MAX as usize)];
    buf.write_u8(spots.len() as u8);
    for spot in spots {
        buf.write_u32(spot.id.0);
        write_vec3(buf, spot.pos);
        buf.write_u8(spot.flags.bits());
    }

    buf.write_u32(area.spot_encounters().len() as u32);
    for e in area.spot_encounters() {
        buf.write_u32(e.from.0);
        buf.write_u8(e.from_dir as u8);
        buf.write_u32(e.to.0);
        buf.write_u8(e.to_dir as u8);
        let orders = &e.spots[..e.spots.len().min(u8::MAX as usize)];
        buf.write_u8(orders.len() as u8);
        for order in orders {
            buf.write_u32(order.spot.0);
            buf.write_u8(order_to_byte(order.t));
        }
    }

    buf.write_u16(directory.place_to_index(area.place));

    for dir in [LadderDirType::Up, LadderDirType::Down] {
        write_ids(buf, area.ladders(dir).iter().map(|l| l.0));
    }
    for t in area.earliest_occupy_time {
        buf.write_f32(t);
    }
    for l in area.light_intensity {
        buf.write_f32(l);
    }

    write_ids_with_attributes(buf, area.potentially_visible());
    buf.write_u32(area.inherit_visibility_from().map_or(0, |a| a.0));
}

fn write_ids_with_attributes(buf: &mut ByteBuffer, list: &[AreaBindInfo]) {
    buf.write_u32(list.len() as u32);
    for v in list {
        buf.write_u32(v.id.0);
        buf.write_u8(v.attributes);
    }
}

fn write_ladder(buf: &mut ByteBuffer, ladder: &NavLadder) {
    buf.write_u32(ladder.id.0);
    buf.write_f32(ladder.width);
    write_vec3(buf, ladder.top);
    write_vec3(buf, ladder.bottom);
    buf.write_f32(ladder.length);
    buf.write_u32(ladder.dir as u32);
    for area in [
        ladder.top_forward_area,
        ladder.top_left_area,
        ladder.top_right_area,
        ladder.top_behind_area,
        ladder.bottom_area,
    ] {
        buf.write_u32(area.map_or(0, |a| a.0));
    }
}

impl NavMesh {
    /// Serialize the mesh in the current file version
    pub fn to_nav_bytes(&self) -> Vec<u8> {
        let mut directory = PlaceDirectory::new();
        for area in self.areas() {
            let place = if self.places.name(area.place).is_some() { area.place } else { Place::UNDEFINED };
            directory.add_place(place);
        }

        let mut buf = ByteBuffer::with_capacity(64 + self.area_count() * 128);
        buf.write_u32(NAV_MAGIC);
        buf.write_u32(NAV_CURRENT_VERSION);
        buf.write_u32(self.sub_version);
        buf.write_u32(self.bsp_size);
        buf.write_u8(self.is_analyzed as u8);

        buf.write_u16(directory.len() as u16);
        for place in directory.places() {
            buf.write_len_string(self.places.name(*place).unwrap_or_default());
        }
        buf.write_u8(directory.has_unnamed_areas() as u8);

        buf.write_u32(self.area_count() as u32);
        for area in self.areas() {
            write_area(&mut buf, area, &directory);
        }

        buf.write_u32(self.ladder_count() as u32);
        for ladder in self.ladders() {
            write_ladder(&mut buf, ladder);
        }
        buf.into_inner()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> NavResult<()> {
        let path = path.as_ref();
        fs::write(path, self.to_nav_bytes()).map_err(|e| NavError::io(path, e))?;
        debug!("Wrote {} areas and {} ladders to {}", self.area_count(), self.ladder_count(), path.display());
        Ok(())
    }

    /// Replace the mesh with the contents of a .nav file
    pub fn load(&mut self, path: impl AsRef<Path>) -> NavResult<NavLoadStatus> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|e| NavError::io(path, e))?;
        let status = self.load_from_bytes(data)?;
        info!(
            "Loaded navigation mesh {}: {} areas, {} ladders{}",
            path.display(),
            self.area_count(),
            self.ladder_count(),
            if status == NavLoadStatus::CorruptData { " (corrupt data dropped)" } else { "" }
        );
        Ok(status)
    }

    /// Replace the mesh with a serialized one. On error the mesh is left
    /// untouched.
    pub fn load_from_bytes(&mut self, data: Vec<u8>) -> NavResult<NavLoadStatus> {
        let mut buf = ByteBuffer::from_vec(data);
        let raw = read_mesh(&mut buf)?;
        if buf.remaining() > 0 {
            debug!("Ignoring {} trailing bytes in navigation file", buf.remaining());
        }
        self.clear();
        Ok(self.post_load(raw))
    }

    /// Build the mesh from raw records, resolving every ID reference
    fn post_load(&mut self, raw: RawMesh) -> NavLoadStatus {
        let mut corrupt = false;
        self.sub_version = raw.sub_version;
        self.bsp_size = raw.bsp_size;
        self.is_analyzed = raw.analyzed;

        let mut directory = PlaceDirectory::new();
        for name in &raw.places {
            directory.add_place(self.places.intern(name));
        }

        // Areas first, so every later reference can be checked
        let mut loaded = Vec::with_capacity(raw.areas.len());
        for r in &raw.areas {
            let id = AreaId(r.id);
            if id.0 == 0 || self.area(id).is_some() {
                warn!("Navigation file has a duplicate or invalid area ID #{}", id);
                corrupt = true;
                continue;
            }
            let mut area = match NavArea::from_extent(id, r.nw, r.se, r.ne_z, r.sw_z) {
                Ok(area) => area,
                Err(e) => {
                    warn!("Skipping area #{}: {}", id, e);
                    corrupt = true;
                    continue;
                }
            };
            area.attributes = r.attributes;
            area.earliest_occupy_time = r.occupy;
            area.light_intensity = r.light;
            area.place = directory.index_to_place(r.place).unwrap_or_else(|| {
                warn!("Area #{} has unknown place entry {}", id, r.place);
                corrupt = true;
                Place::UNDEFINED
            });
            area.hiding_spots = r
                .spots
                .iter()
                .filter_map(|(spot, pos, flags)| {
                    spot.map(|s| HidingSpot { id: HidingSpotId(s), pos: *pos, flags: *flags, area: id })
                })
                .collect();
            self.insert_area(area);
            for (spot, pos, flags) in &r.spots {
                if spot.is_none() && self.add_hiding_spot(id, *pos, *flags).is_err() {
                    corrupt = true;
                }
            }
            loaded.push(r);
        }

        for r in &raw.ladders {
            let Some(dir) = u8::try_from(r.dir).ok().and_then(NavDirType::from_u8) else {
                warn!("Ladder #{} has invalid direction {}", r.id, r.dir);
                corrupt = true;
                continue;
            };
            let mut ladder = NavLadder::new(LadderId(r.id), r.top, r.bottom, r.width, dir);
            ladder.length = r.length;
            let mut resolve = |raw_id: u32| {
                if raw_id == 0 {
                    return None;
                }
                let id = AreaId(raw_id);
                if self.area(id).is_none() {
                    warn!("Ladder #{} references missing area #{}", r.id, id);
                    corrupt = true;
                    return None;
                }
                Some(id)
            };
            ladder.top_forward_area = resolve(r.areas[0]);
            ladder.top_left_area = resolve(r.areas[1]);
            ladder.top_right_area = resolve(r.areas[2]);
            ladder.top_behind_area = resolve(r.areas[3]);
            ladder.bottom_area = resolve(r.areas[4]);
            self.insert_ladder(ladder);
        }

        for r in loaded {
            corrupt |= self.resolve_area(r);
        }
        self.rebuild_incoming_connections();

        if raw.version < NAV_CURRENT_VERSION {
            debug!("Upgraded navigation data from version {}", raw.version);
        }
        if corrupt { NavLoadStatus::CorruptData } else { NavLoadStatus::Ok }
    }

    /// Resolve the references of one loaded area. Returns true if any were dangling.
    fn resolve_area(&mut self, r: &RawArea) -> bool {
        let id = AreaId(r.id);
        let mut corrupt = false;
        let Some(area) = self.area(id) else { return true };
        let center = area.center();

        let mut links = Vec::new();
        for (dir, list) in NavDirType::ALL.into_iter().zip(&r.connect) {
            for &to in list {
                match self.area(AreaId(to)) {
                    Some(target) if target.id() != id => links.push((dir, target.id(), target.center().distance(center))),
                    _ => {
                        warn!("Area #{} connects to missing area #{}", id, to);
                        corrupt = true;
                    }
                }
            }
        }

        let mut ladders: [Vec<LadderId>; 2] = Default::default();
        for (slot, list) in ladders.iter_mut().zip(&r.ladders) {
            for &l in list {
                if self.ladder(LadderId(l)).is_some() {
                    slot.push(LadderId(l));
                } else {
                    warn!("Area #{} references missing ladder #{}", id, l);
                    corrupt = true;
                }
            }
        }

        let mut encounters = Vec::new();
        for e in &r.encounters {
            let (from, to) = (AreaId(e.from), AreaId(e.to));
            let dirs = NavDirType::from_u8(e.from_dir).zip(NavDirType::from_u8(e.to_dir));
            let (Some(from_area), Some(to_area), Some((from_dir, to_dir))) = (self.area(from), self.area(to), dirs)
            else {
                warn!("Area #{} has an encounter path with missing areas #{} -> #{}", id, from, to);
                corrupt = true;
                continue;
            };
            let mut spots = Vec::with_capacity(e.spots.len());
            for &(spot, t) in &e.spots {
                if self.hiding_spot(HidingSpotId(spot)).is_some() {
                    spots.push(SpotOrder { spot: HidingSpotId(spot), t: t as f32 / 255.0 });
                } else {
                    warn!("Area #{} encounter path references missing hiding spot {}", id, spot);
                    corrupt = true;
                }
            }
            encounters.push(SpotEncounter {
                from,
                from_dir,
                to,
                to_dir,
                path_from: area.compute_portal(from_area, from_dir).0,
                path_to: area.compute_portal(to_area, to_dir).0,
                spots,
            });
        }

        let mut visible = Vec::with_capacity(r.visible.len());
        for &(v, attributes) in &r.visible {
            if self.area(AreaId(v)).is_some() {
                visible.push(AreaBindInfo { id: AreaId(v), attributes });
            } else {
                warn!("Area #{} sees missing area #{}", id, v);
                corrupt = true;
            }
        }
        let inherit = match r.inherit {
            0 => None,
            v if self.area(AreaId(v)).is_some() => Some(AreaId(v)),
            v => {
                warn!("Area #{} inherits visibility from missing area #{}", id, v);
                corrupt = true;
                None
            }
        };

        if let Some(area) = self.area_mut(id) {
            for (dir, to, length) in links {
                area.connect_to(to, dir, length);
            }
            area.ladder = ladders;
            area.spot_encounters = encounters;
            area.potentially_visible = visible;
            area.inherit_visibility_from = inherit;
        }
        corrupt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::{COMPLETELY_VISIBLE, POTENTIALLY_VISIBLE};
    use crate::trace::BoxWorld;

    fn flat(mesh: &mut NavMesh, x0: f32, y0: f32, x1: f32, y1: f32, z: f32) -> AreaId {
        mesh.create_area(
            Vec3::new(x0, y0, z),
            Vec3::new(x1, y0, z),
            Vec3::new(x1, y1, z),
            Vec3::new(x0, y1, z),
        )
        .unwrap()
    }

    /// Three areas in a row, a ladder up to a fourth, and analysis data
    fn sample_mesh() -> NavMesh {
        let mut mesh = NavMesh::new();
        let a = flat(&mut mesh, 0.0, 0.0, 100.0, 100.0, 0.0);
        let b = flat(&mut mesh, 100.0, 0.0, 200.0, 100.0, 0.0);
        let c = flat(&mut mesh, 200.0, 0.0, 300.0, 100.0, -40.0);
        let roof = flat(&mut mesh, 0.0, 125.0, 100.0, 225.0, 200.0);
        mesh.connect_areas(a, b, NavDirType::East).unwrap();
        mesh.connect_areas(b, a, NavDirType::West).unwrap();
        mesh.connect_areas(b, c, NavDirType::East).unwrap();

        let ladder = mesh.create_ladder(
            Vec3::new(50.0, 110.0, 200.0),
            Vec3::new(50.0, 110.0, 0.0),
            32.0,
            NavDirType::South,
        );
        mesh.connect_generated_ladder(ladder, &BoxWorld::new()).unwrap();

        let charlie = mesh.places.intern("Charlie");
        let alpha = mesh.places.intern("Alpha");
        mesh.set_place(c, charlie).unwrap();
        mesh.set_place(a, alpha).unwrap();

        let spot = mesh
            .add_hiding_spot(a, Vec3::new(16.0, 16.0, 0.0), HidingSpotFlags::IN_COVER | HidingSpotFlags::GOOD_SNIPER_SPOT)
            .unwrap();
        let (from, to) = (mesh.area(a).unwrap().clone(), mesh.area(c).unwrap().clone());
        let middle = mesh.area_mut(b).unwrap();
        middle.spot_encounters.push(SpotEncounter {
            from: a,
            from_dir: NavDirType::West,
            to: c,
            to_dir: NavDirType::East,
            path_from: Vec3::ZERO,
            path_to: Vec3::ZERO,
            spots: vec![SpotOrder { spot, t: 128.0 / 255.0 }],
        });
        let (pf, pt) = (middle.compute_portal(&from, NavDirType::West).0, middle.compute_portal(&to, NavDirType::East).0);
        middle.spot_encounters[0].path_from = pf;
        middle.spot_encounters[0].path_to = pt;
        middle.earliest_occupy_time = [0.4, 3.5];
        middle.light_intensity = [0.1, 0.2, 0.3, 0.4];

        let seen = POTENTIALLY_VISIBLE | COMPLETELY_VISIBLE;
        mesh.area_mut(a).unwrap().potentially_visible =
            vec![AreaBindInfo { id: b, attributes: seen }, AreaBindInfo { id: c, attributes: POTENTIALLY_VISIBLE }];
        mesh.area_mut(b).unwrap().inherit_visibility_from = Some(a);

        mesh.set_analyzed(true);
        mesh.set_bsp_size(123_456);
        mesh
    }

    #[test]
    fn save_load_save_is_byte_identical() {
        let mesh = sample_mesh();
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.nav");
        let second = dir.path().join("second.nav");
        mesh.save(&first).unwrap();

        let mut loaded = NavMesh::new();
        assert_eq!(loaded.load(&first).unwrap(), NavLoadStatus::Ok);
        loaded.save(&second).unwrap();
        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

        assert_eq!(loaded.area_ids(), mesh.area_ids());
        for area in mesh.areas() {
            let other = loaded.area(area.id()).unwrap();
            assert_eq!(other.corners(), area.corners());
            assert_eq!(other.attributes, area.attributes);
            for dir in NavDirType::ALL {
                let ids = |a: &NavArea| a.connections(dir).iter().map(|c| c.id).collect::<Vec<_>>();
                assert_eq!(ids(other), ids(area));
                let incoming = |a: &NavArea| a.incoming_connections(dir).iter().map(|c| c.id).collect::<Vec<_>>();
                assert_eq!(incoming(other), incoming(area));
            }
            assert_eq!(other.hiding_spots(), area.hiding_spots());
            assert_eq!(other.spot_encounters(), area.spot_encounters());
            assert_eq!(other.potentially_visible(), area.potentially_visible());
            assert_eq!(other.inherit_visibility_from(), area.inherit_visibility_from());
            assert_eq!(loaded.place_name(area.id()), mesh.place_name(area.id()));
            for dir in [LadderDirType::Up, LadderDirType::Down] {
                assert_eq!(other.ladders(dir), area.ladders(dir));
            }
        }
        assert_eq!(loaded.ladders().collect::<Vec<_>>(), mesh.ladders().collect::<Vec<_>>());
        assert!(loaded.is_analyzed());
        assert_eq!(loaded.bsp_size(), 123_456);
        assert!(loaded.validate_connections().is_empty());
    }

    #[test]
    fn places_are_written_in_first_seen_order() {
        let mesh = sample_mesh();
        let mut loaded = NavMesh::new();
        loaded.load_from_bytes(mesh.to_nav_bytes()).unwrap();
        assert_eq!(mesh.places.name(Place(1)), Some("Charlie"));
        assert_eq!(loaded.places.name(Place(1)), Some("Alpha"));
        assert_eq!(loaded.places.name(Place(2)), Some("Charlie"));
    }

    fn header(buf: &mut ByteBuffer, version: u32) {
        buf.write_u32(NAV_MAGIC);
        buf.write_u32(version);
    }

    #[test]
    fn version_one_spots_are_in_cover() {
        let mut buf = ByteBuffer::new();
        header(&mut buf, 1);
        buf.write_u32(1);
        // area #7
        buf.write_u32(7);
        buf.write_u8(NavAttributes::CROUCH.bits() as u8);
        write_vec3(&mut buf, Vec3::new(0.0, 0.0, 0.0));
        write_vec3(&mut buf, Vec3::new(50.0, 50.0, 10.0));
        buf.write_f32(0.0);
        buf.write_f32(10.0);
        for _ in 0..4 {
            buf.write_u32(0);
        }
        buf.write_u8(2);
        write_vec3(&mut buf, Vec3::new(10.0, 10.0, 1.0));
        write_vec3(&mut buf, Vec3::new(40.0, 40.0, 9.0));
        buf.write_u8(0);
        buf.write_u32(0);

        let mut mesh = NavMesh::new();
        assert_eq!(mesh.load_from_bytes(buf.into_inner()).unwrap(), NavLoadStatus::Ok);
        let area = mesh.area(AreaId(7)).unwrap();
        assert!(area.has_attributes(NavAttributes::CROUCH));
        assert_eq!(area.hiding_spots().len(), 2);
        for spot in area.hiding_spots() {
            assert_eq!(spot.flags, HidingSpotFlags::IN_COVER);
            assert_eq!(mesh.hiding_spot(spot.id).map(|s| s.area), Some(AreaId(7)));
        }
        assert_eq!(area.light_intensity, [1.0; NUM_CORNERS]);
        assert_eq!(area.earliest_occupy_time, [0.0; MAX_NAV_TEAMS]);
        assert!(area.potentially_visible().is_empty());
        assert_eq!(mesh.ladder_count(), 0);
        assert!(!mesh.is_analyzed());

        // New areas never reuse a loaded ID
        let next = mesh
            .create_area(Vec3::new(50.0, 0.0, 0.0), Vec3::new(100.0, 0.0, 0.0), Vec3::new(100.0, 50.0, 0.0), Vec3::new(50.0, 50.0, 0.0))
            .unwrap();
        assert!(next > AreaId(7));
    }

    /// Id, one-byte attributes and corners of a flat 100x100 area at `x0`
    fn old_area_head(buf: &mut ByteBuffer, id: u32, x0: f32, z: f32) {
        buf.write_u32(id);
        buf.write_u8(0);
        write_vec3(buf, Vec3::new(x0, 0.0, z));
        write_vec3(buf, Vec3::new(x0 + 100.0, 100.0, z));
        buf.write_f32(z);
        buf.write_f32(z);
    }

    #[test]
    fn version_two_encounter_spots_are_skipped_whole() {
        let mut buf = ByteBuffer::new();
        header(&mut buf, 2);
        buf.write_u32(2);

        old_area_head(&mut buf, 1, 0.0, 0.0);
        buf.write_u32(0);
        buf.write_u32(1);
        buf.write_u32(2);
        buf.write_u32(0);
        buf.write_u32(0);
        buf.write_u8(1);
        buf.write_u32(4);
        write_vec3(&mut buf, Vec3::new(20.0, 20.0, 0.0));
        buf.write_u8(HidingSpotFlags::IN_COVER.bits());
        buf.write_u8(0);
        // one encounter path with two spots
        buf.write_u32(1);
        buf.write_u32(2);
        buf.write_u32(2);
        write_vec3(&mut buf, Vec3::new(0.0, 50.0, 0.0));
        write_vec3(&mut buf, Vec3::new(200.0, 50.0, 0.0));
        buf.write_u8(2);
        for t in [0.25, 0.75] {
            write_vec3(&mut buf, Vec3::new(20.0, 20.0, 0.0));
            buf.write_f32(t);
        }

        old_area_head(&mut buf, 2, 100.0, 0.0);
        for _ in 0..4 {
            buf.write_u32(0);
        }
        buf.write_u8(0);
        buf.write_u8(0);
        buf.write_u32(0);

        let mut mesh = NavMesh::new();
        assert_eq!(mesh.load_from_bytes(buf.into_inner()).unwrap(), NavLoadStatus::Ok);
        assert_eq!(mesh.area_count(), 2);
        let first = mesh.area(AreaId(1)).unwrap();
        assert!(first.is_connected(AreaId(2), Some(NavDirType::East)));
        assert_eq!(first.hiding_spots().len(), 1);
        assert!(first.spot_encounters().is_empty());
        let second = mesh.area(AreaId(2)).unwrap();
        assert_eq!(second.corner(NavCornerType::NorthWest), Vec3::new(100.0, 0.0, 0.0));
        assert_eq!(second.corner(NavCornerType::SouthEast), Vec3::new(200.0, 100.0, 0.0));
    }

    #[test]
    fn version_six_ladders_skip_the_dangling_flag() {
        let mut buf = ByteBuffer::new();
        header(&mut buf, 6);
        buf.write_u32(0);
        buf.write_u16(0);
        buf.write_u32(2);
        for (id, z) in [(1, 0.0), (2, 200.0)] {
            old_area_head(&mut buf, id, 0.0, z);
            for _ in 0..4 {
                buf.write_u32(0);
            }
            buf.write_u8(0);
            buf.write_u8(0);
            buf.write_u32(0);
            buf.write_u16(0);
        }

        buf.write_u32(1);
        buf.write_u32(3);
        buf.write_f32(32.0);
        write_vec3(&mut buf, Vec3::new(50.0, 110.0, 200.0));
        write_vec3(&mut buf, Vec3::new(50.0, 110.0, 0.0));
        buf.write_f32(200.0);
        buf.write_u32(NavDirType::South as u32);
        buf.write_u8(1);
        for area in [2, 0, 0, 0, 1] {
            buf.write_u32(area);
        }

        let mut mesh = NavMesh::new();
        assert_eq!(mesh.load_from_bytes(buf.into_inner()).unwrap(), NavLoadStatus::Ok);
        let ladder = mesh.ladder(LadderId(3)).unwrap();
        assert_eq!(ladder.dir, NavDirType::South);
        assert_eq!(ladder.length, 200.0);
        assert_eq!(ladder.top_forward_area, Some(AreaId(2)));
        assert_eq!(ladder.top_left_area, None);
        assert_eq!(ladder.bottom_area, Some(AreaId(1)));
    }

    #[test]
    fn dangling_references_are_dropped() {
        // Area #1 links to area #9, ladder #5 and place entry 4, none of which exist
        let mut buf = ByteBuffer::new();
        header(&mut buf, NAV_CURRENT_VERSION);
        buf.write_u32(0);
        buf.write_u32(0);
        buf.write_u8(0);
        buf.write_u16(0);
        buf.write_u8(1);
        buf.write_u32(1);
        buf.write_u32(1);
        buf.write_u32(0);
        write_vec3(&mut buf, Vec3::ZERO);
        write_vec3(&mut buf, Vec3::new(100.0, 100.0, 0.0));
        buf.write_f32(0.0);
        buf.write_f32(0.0);
        buf.write_u32(1);
        buf.write_u32(9);
        for _ in 0..3 {
            buf.write_u32(0);
        }
        buf.write_u8(0);
        buf.write_u32(0);
        buf.write_u16(4);
        buf.write_u32(1);
        buf.write_u32(5);
        buf.write_u32(0);
        for _ in 0..MAX_NAV_TEAMS + NUM_CORNERS {
            buf.write_f32(0.0);
        }
        buf.write_u32(1);
        buf.write_u32(9);
        buf.write_u8(POTENTIALLY_VISIBLE);
        buf.write_u32(9);
        buf.write_u32(0);

        let mut mesh = NavMesh::new();
        assert_eq!(mesh.load_from_bytes(buf.into_inner()).unwrap(), NavLoadStatus::CorruptData);
        let area = mesh.area(AreaId(1)).unwrap();
        assert_eq!(area.connection_count(), 0);
        assert!(area.ladders(LadderDirType::Up).is_empty());
        assert!(area.potentially_visible().is_empty());
        assert_eq!(area.inherit_visibility_from(), None);
        assert_eq!(area.place(), Place::UNDEFINED);
        assert!(mesh.validate_connections().is_empty());
    }

    #[test]
    fn bad_files_leave_the_mesh_alone() {
        let mesh = sample_mesh();
        let bytes = mesh.to_nav_bytes();

        let mut target = sample_mesh();
        let truncated = bytes[..bytes.len() - 10].to_vec();
        assert!(matches!(target.load_from_bytes(truncated), Err(NavError::Truncated(_))));
        assert_eq!(target.area_count(), mesh.area_count());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = 0;
        assert!(matches!(target.load_from_bytes(bad_magic), Err(NavError::BadMagic(_))));

        let mut newer = bytes;
        newer[4] = (NAV_CURRENT_VERSION + 1) as u8;
        assert!(matches!(
            target.load_from_bytes(newer),
            Err(NavError::BadVersion(v, NAV_CURRENT_VERSION)) if v == NAV_CURRENT_VERSION + 1
        ));

        let missing = tempfile::tempdir().unwrap().path().join("missing.nav");
        assert!(matches!(target.load(&missing), Err(NavError::Io { .. })));
        assert_eq!(target.area_count(), mesh.area_count());
    }
}
