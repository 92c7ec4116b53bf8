//! The per-hull navmesh set of a level, with hot swap from disk.
//!
//! One navmesh exists per hull kind. A hot swap frees every instance and
//! reloads all of them from the current files; hulls whose file is missing
//! stay empty and are reported without failing the rest. Query state keyed
//! to the old instances must re-attach, which the swap generation exposes.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tilenav_common::Result;
use tilenav_mesh::{
    load_nav_mesh, nav_mesh_file_name, save_nav_mesh, NavMesh, NavMeshKind, NAV_MESH_KIND_COUNT,
};

/// Callbacks wrapped around a hot swap.
pub trait HotSwapHooks {
    /// Runs before any instance is freed.
    fn on_swap_begin(&mut self) {}
    /// Runs after the reload completed.
    fn on_swap_end(&mut self) {}
}

/// No-op hooks.
impl HotSwapHooks for () {}

/// Outcome of a hot swap.
#[derive(Debug)]
pub struct SwapReport {
    /// Hull kinds whose set file was absent or unreadable.
    pub missing: Vec<NavMeshKind>,
    /// Swap generation after the reload; queries attached to an older
    /// generation must re-initialise.
    pub generation: u64,
}

/// All navmesh instances of one level.
pub struct NavMeshSet {
    dir: PathBuf,
    map_name: String,
    meshes: [Option<NavMesh>; NAV_MESH_KIND_COUNT],
    generation: u64,
}

impl NavMeshSet {
    /// Creates an empty set rooted at `dir` for `map_name`.
    pub fn new(dir: impl Into<PathBuf>, map_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            map_name: map_name.into(),
            meshes: Default::default(),
            generation: 0,
        }
    }

    /// The navmesh for a hull kind, when loaded.
    pub fn mesh(&self, kind: NavMeshKind) -> Option<&NavMesh> {
        self.meshes[kind as usize].as_ref()
    }

    pub fn mesh_mut(&mut self, kind: NavMeshKind) -> Option<&mut NavMesh> {
        self.meshes[kind as usize].as_mut()
    }

    /// Installs a freshly built navmesh into a slot.
    pub fn set_mesh(&mut self, kind: NavMeshKind, nav: NavMesh) {
        self.meshes[kind as usize] = Some(nav);
    }

    /// Bumped on every swap; stale query state compares against this.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether at least one hull loaded.
    pub fn any_loaded(&self) -> bool {
        self.meshes.iter().any(|m| m.is_some())
    }

    fn file_path(&self, kind: NavMeshKind) -> PathBuf {
        self.dir.join(nav_mesh_file_name(&self.map_name, kind))
    }

    /// Loads every hull from disk, leaving missing ones empty. Returns the
    /// kinds that failed to load.
    pub fn load_all(&mut self) -> Vec<NavMeshKind> {
        let mut missing = Vec::new();
        for kind in NavMeshKind::ALL {
            self.meshes[kind as usize] = match load_one(&self.file_path(kind)) {
                Some(nav) => Some(nav),
                None => {
                    missing.push(kind);
                    None
                }
            };
        }
        missing
    }

    /// Writes every loaded hull back to disk.
    pub fn save_all(&self) -> Result<()> {
        for kind in NavMeshKind::ALL {
            if let Some(nav) = &self.meshes[kind as usize] {
                let file = File::create(self.file_path(kind))?;
                let mut writer = BufWriter::new(file);
                save_nav_mesh(nav, &mut writer).map_err(tilenav_common::Error::from)?;
            }
        }
        Ok(())
    }

    /// Frees all instances and reloads them from the current files.
    ///
    /// Hulls without a file are reported missing but leave the others
    /// loaded and queryable.
    pub fn hot_swap(&mut self, hooks: &mut dyn HotSwapHooks) -> SwapReport {
        hooks.on_swap_begin();

        for slot in &mut self.meshes {
            *slot = None;
        }
        let missing = self.load_all();
        self.generation += 1;

        hooks.on_swap_end();

        SwapReport {
            missing,
            generation: self.generation,
        }
    }
}

fn load_one(path: &Path) -> Option<NavMesh> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    load_nav_mesh(&mut reader).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tilenav_mesh::NavMeshParams;

    struct CountingHooks {
        begin: usize,
        end: usize,
    }

    impl HotSwapHooks for CountingHooks {
        fn on_swap_begin(&mut self) {
            self.begin += 1;
        }
        fn on_swap_end(&mut self) {
            self.end += 1;
        }
    }

    fn empty_mesh() -> NavMesh {
        let params = NavMeshParams {
            orig: [0.0; 3],
            tile_width: 10.0,
            tile_height: 10.0,
            max_tiles: 4,
            max_polys: 16,
            ..Default::default()
        };
        NavMesh::new(&params).unwrap()
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tilenav-hotswap-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_hot_swap_reports_missing_hulls() {
        let dir = temp_dir("missing");
        let mut set = NavMeshSet::new(&dir, "mp_test");

        // Save four of the five hulls; medium stays absent.
        for kind in NavMeshKind::ALL {
            if kind != NavMeshKind::Medium {
                set.set_mesh(kind, empty_mesh());
            }
        }
        set.save_all().unwrap();

        let mut hooks = CountingHooks { begin: 0, end: 0 };
        let report = set.hot_swap(&mut hooks);

        assert_eq!(report.missing, vec![NavMeshKind::Medium]);
        assert_eq!(report.generation, 1);
        assert_eq!(hooks.begin, 1);
        assert_eq!(hooks.end, 1);

        // The other four reloaded and are queryable.
        for kind in NavMeshKind::ALL {
            if kind == NavMeshKind::Medium {
                assert!(set.mesh(kind).is_none());
            } else {
                assert!(set.mesh(kind).is_some(), "{} not loaded", kind.name());
            }
        }

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_generation_advances_per_swap() {
        let dir = temp_dir("generation");
        let mut set = NavMeshSet::new(&dir, "mp_empty");
        assert_eq!(set.generation(), 0);
        set.hot_swap(&mut ());
        set.hot_swap(&mut ());
        assert_eq!(set.generation(), 2);
        assert!(!set.any_loaded());
        std::fs::remove_dir_all(&dir).ok();
    }
}
