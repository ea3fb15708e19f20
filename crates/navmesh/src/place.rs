// Named places and the per-file place directory.
//
// A `Place` is a handle into the mesh's place-name table. Files do not store
// those handles; they store a small directory of the names actually used and
// one u16 directory entry per area, with entry 0 meaning "no place".

use serde::{Deserialize, Serialize};

/// Handle to a place name. `Place::UNDEFINED` means no place assigned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Place(pub u32);

impl Place {
    pub const UNDEFINED: Place = Place(0);

    pub fn is_defined(self) -> bool {
        self != Place::UNDEFINED
    }
}

/// The mesh's table of known place names
#[derive(Debug, Clone, Default)]
pub struct PlaceNames {
    names: Vec<String>,
}

impl PlaceNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a name, registering it if unknown
    pub fn intern(&mut self, name: &str) -> Place {
        if let Some(place) = self.find(name) {
            return place;
        }
        self.names.push(name.to_string());
        Place(self.names.len() as u32)
    }

    pub fn find(&self, name: &str) -> Option<Place> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| Place(i as u32 + 1))
    }

    pub fn name(&self, place: Place) -> Option<&str> {
        if !place.is_defined() {
            return None;
        }
        self.names.get(place.0 as usize - 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Directory entry as stored in a file; 0 is "no place"
pub type PlaceEntry = u16;

/// Bijection between the places used by one file and their directory entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaceDirectory {
    places: Vec<Place>,
    has_unnamed_areas: bool,
}

impl PlaceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `place`, keeping first-seen order
    pub fn add_place(&mut self, place: Place) {
        if !place.is_defined() {
            self.has_unnamed_areas = true;
            return;
        }
        if !self.places.contains(&place) {
            self.places.push(place);
        }
    }

    pub fn is_known(&self, place: Place) -> bool {
        self.places.contains(&place)
    }

    pub fn place_to_index(&self, place: Place) -> PlaceEntry {
        if !place.is_defined() {
            return 0;
        }
        self.places
            .iter()
            .position(|&p| p == place)
            .map(|i| i as PlaceEntry + 1)
            .unwrap_or(0)
    }

    /// Resolve a directory entry. Out-of-range entries resolve to `None`.
    pub fn index_to_place(&self, entry: PlaceEntry) -> Option<Place> {
        if entry == 0 {
            return Some(Place::UNDEFINED);
        }
        self.places.get(entry as usize - 1).copied()
    }

    pub fn places(&self) -> &[Place] {
        &self.places
    }

    pub fn has_unnamed_areas(&self) -> bool {
        self.has_unnamed_areas
    }

    pub fn set_has_unnamed_areas(&mut self, value: bool) {
        self.has_unnamed_areas = value;
    }

    pub fn len(&self) -> usize {
        self.places.len()
    }

    pub fn is_empty(&self) -> bool {
        self.places.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_zero_is_no_place() {
        let dir = PlaceDirectory::new();
        assert_eq!(dir.index_to_place(0), Some(Place::UNDEFINED));
        assert_eq!(dir.place_to_index(Place::UNDEFINED), 0);
        assert_eq!(dir.index_to_place(3), None);
    }

    #[test]
    fn directory_keeps_first_seen_order() {
        let mut names = PlaceNames::new();
        let mid = names.intern("Middle");
        let ct = names.intern("CTSpawn");
        assert_eq!(names.intern("middle"), mid);

        let mut dir = PlaceDirectory::new();
        dir.add_place(ct);
        dir.add_place(Place::UNDEFINED);
        dir.add_place(mid);
        dir.add_place(ct);
        assert_eq!(dir.len(), 2);
        assert!(dir.has_unnamed_areas());
        assert_eq!(dir.place_to_index(ct), 1);
        assert_eq!(dir.place_to_index(mid), 2);
        assert_eq!(dir.index_to_place(2), Some(mid));
        assert_eq!(names.name(ct), Some("CTSpawn"));
    }
}
