//! Navmesh set files: one file per hull per level, `<map>_<hull>.nm`.
//!
//! A set is the navmesh parameters, every live tile blob keyed by its tile
//! reference, and (when the mesh carries enough polygon groups) the traverse
//! tables. All fields are little-endian.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::navmesh::{NavMesh, NavMeshParams};
use crate::tile_data::serialize_tile;
use crate::traverse::NavMeshKind;
use crate::{PolyRef, Status, TileRef, MIN_POLY_GROUP_COUNT, TILE_FREE_DATA};

/// Set magic: 'M' 'S' 'E' 'T' packed high byte first.
pub const NAVMESH_SET_MAGIC: i32 =
    ((b'M' as i32) << 24) | ((b'S' as i32) << 16) | ((b'E' as i32) << 8) | (b'T' as i32);

/// The set version this build targets.
pub const NAVMESH_SET_VERSION: i32 = 8;

/// Set versions whose layout the reader understands.
pub const SUPPORTED_SET_VERSIONS: [i32; 4] = [5, 7, 8, 9];

/// Tile data version used by a given set version.
pub fn nav_mesh_version_for_set(set_version: i32) -> i32 {
    match set_version {
        5 => 5,
        7 => 7,
        9 => 9,
        _ => 8,
    }
}

/// File name of a set: `<map>_<hull>.nm`.
pub fn nav_mesh_file_name(map_name: &str, kind: NavMeshKind) -> String {
    format!("{}_{}.nm", map_name, kind.name())
}

fn write_params<W: Write>(w: &mut W, params: &NavMeshParams, version: i32) -> std::io::Result<()> {
    for v in params.orig {
        w.write_f32::<LittleEndian>(v)?;
    }
    w.write_f32::<LittleEndian>(params.tile_width)?;
    w.write_f32::<LittleEndian>(params.tile_height)?;
    w.write_i32::<LittleEndian>(params.max_tiles)?;
    w.write_i32::<LittleEndian>(params.max_polys)?;
    w.write_i32::<LittleEndian>(params.poly_group_count)?;
    w.write_i32::<LittleEndian>(params.traverse_table_size)?;
    w.write_i32::<LittleEndian>(params.traverse_table_count)?;
    if version >= 8 {
        w.write_i32::<LittleEndian>(params.magic_data_count)?;
    }
    Ok(())
}

fn read_params<R: Read>(r: &mut R, version: i32) -> std::io::Result<NavMeshParams> {
    let mut orig = [0.0f32; 3];
    for v in &mut orig {
        *v = r.read_f32::<LittleEndian>()?;
    }
    Ok(NavMeshParams {
        orig,
        tile_width: r.read_f32::<LittleEndian>()?,
        tile_height: r.read_f32::<LittleEndian>()?,
        max_tiles: r.read_i32::<LittleEndian>()?,
        max_polys: r.read_i32::<LittleEndian>()?,
        poly_group_count: r.read_i32::<LittleEndian>()?,
        traverse_table_size: r.read_i32::<LittleEndian>()?,
        traverse_table_count: r.read_i32::<LittleEndian>()?,
        magic_data_count: if version >= 8 {
            r.read_i32::<LittleEndian>()?
        } else {
            0
        },
    })
}

fn write_tile_ref<W: Write>(w: &mut W, r: TileRef) -> std::io::Result<()> {
    #[cfg(not(feature = "polyref64"))]
    w.write_u32::<LittleEndian>(r)?;
    #[cfg(feature = "polyref64")]
    w.write_u64::<LittleEndian>(r)?;
    Ok(())
}

fn read_tile_ref<R: Read>(r: &mut R) -> std::io::Result<TileRef> {
    #[cfg(not(feature = "polyref64"))]
    return r.read_u32::<LittleEndian>();
    #[cfg(feature = "polyref64")]
    return r.read_u64::<LittleEndian>();
}

/// Writes the whole navmesh as a set.
pub fn save_nav_mesh<W: Write>(nav: &NavMesh, w: &mut W) -> Result<(), Status> {
    let io_err = |_| Status::failure();

    // Count live tiles first; the header leads the file.
    let mut num_tiles = 0i32;
    for i in 0..nav.max_tiles() {
        if nav.tile(i).header.is_some() {
            num_tiles += 1;
        }
    }

    w.write_i32::<LittleEndian>(NAVMESH_SET_MAGIC).map_err(io_err)?;
    w.write_i32::<LittleEndian>(NAVMESH_SET_VERSION).map_err(io_err)?;
    w.write_i32::<LittleEndian>(num_tiles).map_err(io_err)?;
    write_params(w, nav.params(), NAVMESH_SET_VERSION).map_err(io_err)?;

    for i in 0..nav.max_tiles() {
        let tile = nav.tile(i);
        if tile.header.is_none() {
            continue;
        }
        // Serialise the tile's current state, links included.
        let blob = serialize_tile(tile)?;
        write_tile_ref(w, nav.tile_ref(i)).map_err(io_err)?;
        w.write_i32::<LittleEndian>(blob.len() as i32).map_err(io_err)?;
        w.write_all(&blob).map_err(io_err)?;
    }

    // Static pathing data only exists with enough poly groups.
    if nav.params().poly_group_count >= MIN_POLY_GROUP_COUNT {
        for table in nav.traverse_tables() {
            for &word in table {
                w.write_u32::<LittleEndian>(word).map_err(io_err)?;
            }
        }
    }

    Ok(())
}

/// Reads a navmesh set. Corruption (bad magic, unknown version, truncated
/// data) fails without side effects.
pub fn load_nav_mesh<R: Read>(r: &mut R) -> Result<NavMesh, Status> {
    let io_err = |_| Status::failure();

    let magic = r.read_i32::<LittleEndian>().map_err(io_err)?;
    if magic != NAVMESH_SET_MAGIC {
        return Err(Status::failure_detail(Status::WRONG_MAGIC));
    }
    let version = r.read_i32::<LittleEndian>().map_err(io_err)?;
    if !SUPPORTED_SET_VERSIONS.contains(&version) {
        return Err(Status::failure_detail(Status::WRONG_VERSION));
    }

    let num_tiles = r.read_i32::<LittleEndian>().map_err(io_err)?;
    let params = read_params(r, version).map_err(io_err)?;

    let mut nav = NavMesh::new(&params)?;

    for _ in 0..num_tiles {
        let tile_ref = read_tile_ref(r).map_err(io_err)?;
        let data_size = r.read_i32::<LittleEndian>().map_err(io_err)?;
        if tile_ref == 0 || data_size <= 0 {
            break;
        }
        let mut data = vec![0u8; data_size as usize];
        r.read_exact(&mut data).map_err(io_err)?;
        nav.add_tile(data, TILE_FREE_DATA, tile_ref as PolyRef)?;
    }

    // Legacy padding: one zeroed int per poly group.
    if version == 5 {
        for _ in 0..params.poly_group_count {
            r.read_i32::<LittleEndian>().map_err(io_err)?;
        }
    }

    if params.poly_group_count >= MIN_POLY_GROUP_COUNT {
        let words = (params.traverse_table_size / 4).max(0) as usize;
        let mut tables = Vec::with_capacity(params.traverse_table_count as usize);
        for _ in 0..params.traverse_table_count {
            let mut table = Vec::with_capacity(words);
            for _ in 0..words {
                table.push(r.read_u32::<LittleEndian>().map_err(io_err)?);
            }
            tables.push(table);
        }
        nav.set_traverse_tables(tables);
    }

    Ok(nav)
}
