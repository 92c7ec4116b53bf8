//! The tiled navigation mesh container.
//!
//! Tiles live in an arena indexed by small integers; polygon references pack
//! `(salt, tile index, poly index)` into one opaque integer whose bit widths
//! are derived at construction. The salt increments every time a tile slot is
//! recycled so dangling references fail validation instead of aliasing.

use std::collections::HashMap;

use crate::tile::{Link, MeshTile, PolyType};
use crate::tile_data::{parse_tile, serialize_tile};
use crate::{
    PolyFlags, PolyRef, Status, TileRef, EXT_LINK, NULL_LINK, OFFMESH_CON_BIDIR, TILE_FREE_DATA,
};
use tilenav_common::{
    calc_poly_center, closest_height_point_triangle, dist_pt_poly_edges_sqr, vdist_sqr, vlerp,
};

/// Half-extents used to ground off-mesh connection endpoints onto polygons.
const OFFMESH_GROUND_EXTENTS: [f32; 3] = [2.0, 2.0, 4.0];

/// Initialisation parameters; also serialised into the set file header.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct NavMeshParams {
    /// World-space origin of tile (0, 0). Tile x grows towards world -x.
    pub orig: [f32; 3],
    pub tile_width: f32,
    pub tile_height: f32,
    pub max_tiles: i32,
    pub max_polys: i32,
    /// Disjoint polygon group count, populated by table building.
    pub poly_group_count: i32,
    /// Bytes per traverse table.
    pub traverse_table_size: i32,
    /// Number of traverse tables.
    pub traverse_table_count: i32,
    /// Trailing opaque per-set records (set version >= 8).
    pub magic_data_count: i32,
}

/// A tiled navigation mesh.
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    orig: [f32; 3],
    tile_width: f32,
    tile_height: f32,
    max_tiles: u32,
    tile_count: i32,
    tiles: Vec<MeshTile>,
    next_free: Option<u32>,
    pos_lookup: HashMap<(i32, i32), Vec<u32>>,
    #[cfg(not(feature = "polyref64"))]
    salt_bits: u32,
    #[cfg(not(feature = "polyref64"))]
    tile_bits: u32,
    #[cfg(not(feature = "polyref64"))]
    poly_bits: u32,
    traverse_tables: Vec<Vec<u32>>,
}

impl NavMesh {
    /// Creates an empty navmesh for tiled use.
    pub fn new(params: &NavMeshParams) -> Result<Self, Status> {
        if params.tile_width <= 0.0 || params.tile_height <= 0.0 {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        if params.max_tiles <= 0 || params.max_polys <= 0 {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        if params.orig.iter().any(|v| !v.is_finite()) {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        #[cfg(not(feature = "polyref64"))]
        let (salt_bits, tile_bits, poly_bits) = {
            let tile_bits = tilenav_common::ilog2(tilenav_common::next_pow2(params.max_tiles as u32));
            let poly_bits = tilenav_common::ilog2(tilenav_common::next_pow2(params.max_polys as u32));
            if tile_bits + poly_bits > 31 {
                return Err(Status::failure_detail(Status::INVALID_PARAM));
            }
            (32 - tile_bits - poly_bits, tile_bits, poly_bits)
        };

        let max_tiles = params.max_tiles as u32;
        let mut tiles = Vec::with_capacity(max_tiles as usize);
        for i in 0..max_tiles {
            let mut tile = MeshTile {
                salt: 1,
                ..Default::default()
            };
            tile.next = if i + 1 < max_tiles { Some(i + 1) } else { None };
            tiles.push(tile);
        }

        Ok(Self {
            orig: params.orig,
            tile_width: params.tile_width,
            tile_height: params.tile_height,
            max_tiles,
            tile_count: 0,
            tiles,
            next_free: Some(0),
            pos_lookup: HashMap::new(),
            #[cfg(not(feature = "polyref64"))]
            salt_bits,
            #[cfg(not(feature = "polyref64"))]
            tile_bits,
            #[cfg(not(feature = "polyref64"))]
            poly_bits,
            traverse_tables: Vec::new(),
            params: params.clone(),
        })
    }

    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    pub fn max_tiles(&self) -> u32 {
        self.max_tiles
    }

    pub fn tile_count(&self) -> i32 {
        self.tile_count
    }

    // --- Reference encoding -------------------------------------------------

    #[cfg(not(feature = "polyref64"))]
    #[inline]
    pub fn encode_poly_id(&self, salt: u32, tile_index: u32, poly_index: u32) -> PolyRef {
        (salt << (self.poly_bits + self.tile_bits)) | (tile_index << self.poly_bits) | poly_index
    }

    #[cfg(feature = "polyref64")]
    #[inline]
    pub fn encode_poly_id(&self, salt: u32, tile_index: u32, poly_index: u32) -> PolyRef {
        ((salt as u64) << (crate::POLY_BITS_64 + crate::TILE_BITS_64))
            | ((tile_index as u64) << crate::POLY_BITS_64)
            | poly_index as u64
    }

    #[cfg(not(feature = "polyref64"))]
    #[inline]
    pub fn decode_poly_id(&self, r: PolyRef) -> (u32, u32, u32) {
        let salt_mask = (1u32 << self.salt_bits) - 1;
        let tile_mask = (1u32 << self.tile_bits) - 1;
        let poly_mask = (1u32 << self.poly_bits) - 1;
        (
            (r >> (self.poly_bits + self.tile_bits)) & salt_mask,
            (r >> self.poly_bits) & tile_mask,
            r & poly_mask,
        )
    }

    #[cfg(feature = "polyref64")]
    #[inline]
    pub fn decode_poly_id(&self, r: PolyRef) -> (u32, u32, u32) {
        let salt_mask = (1u64 << crate::SALT_BITS_64) - 1;
        let tile_mask = (1u64 << crate::TILE_BITS_64) - 1;
        let poly_mask = (1u64 << crate::POLY_BITS_64) - 1;
        (
            ((r >> (crate::POLY_BITS_64 + crate::TILE_BITS_64)) & salt_mask) as u32,
            ((r >> crate::POLY_BITS_64) & tile_mask) as u32,
            (r & poly_mask) as u32,
        )
    }

    #[inline]
    pub fn decode_poly_id_tile(&self, r: PolyRef) -> u32 {
        self.decode_poly_id(r).1
    }

    #[inline]
    pub fn decode_poly_id_poly(&self, r: PolyRef) -> u32 {
        self.decode_poly_id(r).2
    }

    #[inline]
    pub fn decode_poly_id_salt(&self, r: PolyRef) -> u32 {
        self.decode_poly_id(r).0
    }

    /// Reference of polygon 0 of a tile; or 0 when the tile is empty.
    pub fn poly_ref_base(&self, tile_index: u32) -> PolyRef {
        let tile = &self.tiles[tile_index as usize];
        if tile.header.is_none() {
            return 0;
        }
        self.encode_poly_id(tile.salt, tile_index, 0)
    }

    /// Reference of a tile.
    pub fn tile_ref(&self, tile_index: u32) -> TileRef {
        self.poly_ref_base(tile_index)
    }

    // --- Tile grid ----------------------------------------------------------

    /// Tile grid location of a world position. Tile x counts down from the
    /// origin's x.
    pub fn calc_tile_loc(&self, pos: &[f32]) -> (i32, i32) {
        let tx = ((self.orig[0] - pos[0]) / self.tile_width).floor() as i32;
        let ty = ((pos[1] - self.orig[1]) / self.tile_height).floor() as i32;
        (tx, ty)
    }

    /// Tile index at a grid location, if occupied.
    pub fn tile_index_at(&self, x: i32, y: i32, layer: i32) -> Option<u32> {
        self.pos_lookup.get(&(x, y)).and_then(|bucket| {
            bucket
                .iter()
                .copied()
                .find(|&i| {
                    self.tiles[i as usize]
                        .header
                        .as_ref()
                        .map(|h| h.layer == layer)
                        .unwrap_or(false)
                })
        })
    }

    /// All tile indices at a grid location (every layer).
    pub fn tile_indices_at(&self, x: i32, y: i32) -> Vec<u32> {
        self.pos_lookup.get(&(x, y)).cloned().unwrap_or_default()
    }

    /// Tile indices of neighbours touching `side` of grid cell `(x, y)`.
    pub fn neighbour_tile_indices(&self, x: i32, y: i32, side: u8) -> Vec<u32> {
        let (nx, ny) = match side {
            0 => (x + 1, y),
            1 => (x + 1, y + 1),
            2 => (x, y + 1),
            3 => (x - 1, y + 1),
            4 => (x - 1, y),
            5 => (x - 1, y - 1),
            6 => (x, y - 1),
            _ => (x + 1, y - 1),
        };
        self.tile_indices_at(nx, ny)
    }

    pub fn tile(&self, index: u32) -> &MeshTile {
        &self.tiles[index as usize]
    }

    pub(crate) fn tile_mut(&mut self, index: u32) -> &mut MeshTile {
        &mut self.tiles[index as usize]
    }

    pub fn tile_by_ref(&self, r: TileRef) -> Option<&MeshTile> {
        let (salt, it, _) = self.decode_poly_id(r);
        if it >= self.max_tiles {
            return None;
        }
        let tile = &self.tiles[it as usize];
        if tile.salt != salt || tile.header.is_none() {
            return None;
        }
        Some(tile)
    }

    /// Validates a polygon reference.
    pub fn is_valid_poly_ref(&self, r: PolyRef) -> bool {
        if r == 0 {
            return false;
        }
        let (salt, it, ip) = self.decode_poly_id(r);
        if it >= self.max_tiles {
            return false;
        }
        let tile = &self.tiles[it as usize];
        if tile.salt != salt {
            return false;
        }
        match &tile.header {
            Some(h) => (ip as i32) < h.poly_count,
            None => false,
        }
    }

    /// Resolves a polygon reference, validating the salt.
    pub fn get_tile_and_poly_by_ref(&self, r: PolyRef) -> Result<(u32, u32), Status> {
        if self.is_valid_poly_ref(r) {
            let (_, it, ip) = self.decode_poly_id(r);
            Ok((it, ip))
        } else {
            Err(Status::failure_detail(Status::INVALID_PARAM))
        }
    }

    /// Resolves a known-valid polygon reference without validation.
    pub fn get_tile_and_poly_by_ref_unchecked(&self, r: PolyRef) -> (u32, u32) {
        let (_, it, ip) = self.decode_poly_id(r);
        (it, ip)
    }

    // --- Poly state ---------------------------------------------------------

    pub fn set_poly_flags(&mut self, r: PolyRef, flags: PolyFlags) -> Result<(), Status> {
        let (it, ip) = self.get_tile_and_poly_by_ref(r)?;
        self.tiles[it as usize].polys[ip as usize].flags = flags;
        Ok(())
    }

    pub fn poly_flags(&self, r: PolyRef) -> Result<PolyFlags, Status> {
        let (it, ip) = self.get_tile_and_poly_by_ref(r)?;
        Ok(self.tiles[it as usize].polys[ip as usize].flags)
    }

    pub fn set_poly_area(&mut self, r: PolyRef, area: u8) -> Result<(), Status> {
        let (it, ip) = self.get_tile_and_poly_by_ref(r)?;
        self.tiles[it as usize].polys[ip as usize].set_area(area);
        Ok(())
    }

    pub fn poly_area(&self, r: PolyRef) -> Result<u8, Status> {
        let (it, ip) = self.get_tile_and_poly_by_ref(r)?;
        Ok(self.tiles[it as usize].polys[ip as usize].area())
    }

    // --- Traverse tables ----------------------------------------------------

    pub fn set_traverse_tables(&mut self, tables: Vec<Vec<u32>>) {
        self.traverse_tables = tables;
    }

    pub fn set_traverse_table(&mut self, index: usize, table: Vec<u32>) {
        if self.traverse_tables.len() <= index {
            self.traverse_tables.resize(index + 1, Vec::new());
        }
        self.traverse_tables[index] = table;
    }

    pub fn traverse_tables(&self) -> &[Vec<u32>] {
        &self.traverse_tables
    }

    pub fn set_poly_group_count(&mut self, count: i32) {
        self.params.poly_group_count = count;
    }

    pub fn poly_group_count(&self) -> i32 {
        self.params.poly_group_count
    }

    pub fn set_traverse_table_size(&mut self, size: i32) {
        self.params.traverse_table_size = size;
    }

    pub fn set_traverse_table_count(&mut self, count: i32) {
        self.params.traverse_table_count = count;
    }

    /// Static reachability: equal disjoint groups always reach; otherwise the
    /// traverse table for `table_index` decides.
    pub fn is_goal_poly_reachable(
        &self,
        from: PolyRef,
        goal: PolyRef,
        check_disjoint_groups_only: bool,
        table_index: i32,
    ) -> bool {
        let Ok((from_tile, from_poly)) = self.get_tile_and_poly_by_ref(from) else {
            return false;
        };
        let Ok((goal_tile, goal_poly)) = self.get_tile_and_poly_by_ref(goal) else {
            return false;
        };

        let g1 = self.tiles[from_tile as usize].polys[from_poly as usize].group_id;
        let g2 = self.tiles[goal_tile as usize].polys[goal_poly as usize].group_id;
        if g1 == crate::UNLINKED_POLY_GROUP || g2 == crate::UNLINKED_POLY_GROUP {
            return false;
        }
        if g1 == g2 {
            return true;
        }
        if check_disjoint_groups_only || table_index < 0 {
            return false;
        }

        let Some(table) = self.traverse_tables.get(table_index as usize) else {
            return false;
        };
        let count = self.params.poly_group_count;
        let cell = crate::calc_traverse_table_cell_index(count, g1, g2);
        table
            .get(cell as usize)
            .map(|&word| word & (1u32 << (g2 & 31)) != 0)
            .unwrap_or(false)
    }

    // --- Tile management ----------------------------------------------------

    /// Adds a serialised tile.
    ///
    /// With `last_ref` zero the tile lands in the next free slot; a non-zero
    /// `last_ref` restores the tile into its previous slot with its previous
    /// salt (used when reloading a saved set).
    pub fn add_tile(
        &mut self,
        data: Vec<u8>,
        flags: i32,
        last_ref: TileRef,
    ) -> Result<TileRef, Status> {
        let parsed = parse_tile(&data)?;
        let header = parsed
            .header
            .clone()
            .ok_or(Status::failure_detail(Status::INVALID_PARAM))?;

        // Location must be free.
        if self
            .tile_index_at(header.x, header.y, header.layer)
            .is_some()
        {
            return Err(Status::failure_detail(Status::ALREADY_OCCUPIED));
        }

        // Allocate the slot.
        let tile_index = if last_ref == 0 {
            match self.next_free {
                Some(i) => {
                    self.next_free = self.tiles[i as usize].next;
                    i
                }
                None => return Err(Status::failure_detail(Status::OUT_OF_MEMORY)),
            }
        } else {
            let target = self.decode_poly_id_tile(last_ref);
            if target >= self.max_tiles {
                return Err(Status::failure_detail(Status::OUT_OF_MEMORY));
            }
            // Unlink the slot from the free list.
            let mut prev: Option<u32> = None;
            let mut cur = self.next_free;
            while let Some(i) = cur {
                if i == target {
                    break;
                }
                prev = Some(i);
                cur = self.tiles[i as usize].next;
            }
            if cur != Some(target) {
                return Err(Status::failure_detail(Status::OUT_OF_MEMORY));
            }
            match prev {
                Some(p) => self.tiles[p as usize].next = self.tiles[target as usize].next,
                None => self.next_free = self.tiles[target as usize].next,
            }
            // Restore the salt the reference was minted with.
            self.tiles[target as usize].salt = self.decode_poly_id_salt(last_ref);
            target
        };

        let salt = self.tiles[tile_index as usize].salt;
        let had_live_links = parsed.polys.iter().any(|p| p.first_link != NULL_LINK);

        let tile = &mut self.tiles[tile_index as usize];
        let next = tile.next;
        *tile = parsed;
        tile.salt = salt;
        tile.next = next;
        tile.data = Some(data);
        tile.flags = flags;

        self.pos_lookup
            .entry((header.x, header.y))
            .or_default()
            .push(tile_index);
        self.tile_count += 1;

        // Freshly built tiles carry no links; wire the internal adjacency
        // and ground off-mesh starts. Tiles restored from a saved set keep
        // their persisted links (traverse links included).
        if !had_live_links {
            self.connect_int_links(tile_index);
            self.base_off_mesh_links(tile_index);
        }

        Ok(self.encode_poly_id(salt, tile_index, 0))
    }

    /// Removes a tile, handing back its blob unless the navmesh owns it.
    pub fn remove_tile(&mut self, r: TileRef) -> Result<Option<Vec<u8>>, Status> {
        if r == 0 {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        let (salt, tile_index, _) = self.decode_poly_id(r);
        if tile_index >= self.max_tiles {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }
        if self.tiles[tile_index as usize].salt != salt
            || self.tiles[tile_index as usize].header.is_none()
        {
            return Err(Status::failure_detail(Status::INVALID_PARAM));
        }

        let header = self.tiles[tile_index as usize]
            .header
            .clone()
            .ok_or(Status::failure_detail(Status::INVALID_PARAM))?;

        // Drop links in other tiles that point into this one.
        let mut affected: Vec<u32> = Vec::new();
        for side in 0..8u8 {
            affected.extend(self.neighbour_tile_indices(header.x, header.y, side));
        }
        affected.extend(
            self.tile_indices_at(header.x, header.y)
                .into_iter()
                .filter(|&i| i != tile_index),
        );
        // Traverse links can span further than the 8 neighbours.
        for i in 0..self.max_tiles {
            if self.tiles[i as usize].header.is_some() && !affected.contains(&i) && i != tile_index
            {
                affected.push(i);
            }
        }
        for other in affected {
            self.unconnect_links(other, tile_index);
        }

        // Remove from the position bucket.
        if let Some(bucket) = self.pos_lookup.get_mut(&(header.x, header.y)) {
            bucket.retain(|&i| i != tile_index);
            if bucket.is_empty() {
                self.pos_lookup.remove(&(header.x, header.y));
            }
        }

        let tile = &mut self.tiles[tile_index as usize];
        let owns_data = tile.flags & TILE_FREE_DATA != 0;
        let out = if owns_data {
            tile.data = None;
            None
        } else {
            // Hand back the tile's current state rather than the stale blob.
            tile.data = None;
            Some(serialize_tile(tile)?)
        };

        let salt_next = tile.salt;
        *tile = MeshTile::default();
        // Bump the salt so dangling references fault.
        #[cfg(not(feature = "polyref64"))]
        let salt_mask = (1u32 << self.salt_bits) - 1;
        #[cfg(feature = "polyref64")]
        let salt_mask = (1u32 << crate::SALT_BITS_64) - 1;
        let mut new_salt = (salt_next + 1) & salt_mask;
        if new_salt == 0 {
            new_salt = 1;
        }
        tile.salt = new_salt;
        tile.next = self.next_free;
        self.next_free = Some(tile_index);
        self.tile_count -= 1;

        Ok(out)
    }

    /// Removes every link in `tile_index` that targets `target_index`.
    fn unconnect_links(&mut self, tile_index: u32, target_index: u32) {
        if self.tiles[tile_index as usize].header.is_none() {
            return;
        }
        let poly_count = self.tiles[tile_index as usize].polys.len();
        for ip in 0..poly_count {
            let mut prev = NULL_LINK;
            let mut cur = self.tiles[tile_index as usize].polys[ip].first_link;
            while cur != NULL_LINK {
                let link = self.tiles[tile_index as usize].links[cur as usize];
                let next = link.next;
                if self.decode_poly_id_tile(link.target) == target_index {
                    if prev == NULL_LINK {
                        self.tiles[tile_index as usize].polys[ip].first_link = next;
                    } else {
                        self.tiles[tile_index as usize].links[prev as usize].next = next;
                    }
                    self.tiles[tile_index as usize].free_link(cur);
                } else {
                    prev = cur;
                }
                cur = next;
            }
        }
    }

    /// Connects a freshly added tile to its neighbours on all 8 sides.
    pub fn connect_tile(&mut self, r: TileRef) -> Result<(), Status> {
        let tile_index = {
            let (salt, it, _) = self.decode_poly_id(r);
            if it >= self.max_tiles || self.tiles[it as usize].salt != salt {
                return Err(Status::failure_detail(Status::INVALID_PARAM));
            }
            it
        };
        let header = self.tiles[tile_index as usize]
            .header
            .clone()
            .ok_or(Status::failure_detail(Status::INVALID_PARAM))?;

        for side in 0..8u8 {
            for nei in self.neighbour_tile_indices(header.x, header.y, side) {
                // Re-connecting a tile rebuilds its portals from scratch.
                self.unconnect_portal_links(tile_index, nei);
                self.unconnect_portal_links(nei, tile_index);
                self.connect_ext_links(tile_index, nei, side);
                self.connect_ext_links(nei, tile_index, opposite_side(side));
            }
        }
        self.connect_ext_off_mesh_links(tile_index);
        Ok(())
    }

    /// Removes the boundary portal links from `tile_index` into
    /// `target_index`, leaving traverse links untouched.
    fn unconnect_portal_links(&mut self, tile_index: u32, target_index: u32) {
        if self.tiles[tile_index as usize].header.is_none() {
            return;
        }
        let poly_count = self.tiles[tile_index as usize].polys.len();
        for ip in 0..poly_count {
            let mut prev = NULL_LINK;
            let mut cur = self.tiles[tile_index as usize].polys[ip].first_link;
            while cur != NULL_LINK {
                let link = self.tiles[tile_index as usize].links[cur as usize];
                let next = link.next;
                if link.side != 0xff
                    && !link.has_traverse_type()
                    && self.decode_poly_id_tile(link.target) == target_index
                {
                    if prev == NULL_LINK {
                        self.tiles[tile_index as usize].polys[ip].first_link = next;
                    } else {
                        self.tiles[tile_index as usize].links[prev as usize].next = next;
                    }
                    self.tiles[tile_index as usize].free_link(cur);
                } else {
                    prev = cur;
                }
                cur = next;
            }
        }
    }

    /// Builds the edge-adjacency links inside one tile.
    fn connect_int_links(&mut self, tile_index: u32) {
        let base = self.poly_ref_base(tile_index);
        let poly_count = self.tiles[tile_index as usize].polys.len();

        for ip in 0..poly_count {
            self.tiles[tile_index as usize].polys[ip].first_link = NULL_LINK;
            if self.tiles[tile_index as usize].polys[ip].poly_type() == PolyType::OffMeshConnection
            {
                continue;
            }

            // Build the chain backwards so it matches edge order when walked.
            let vert_count = self.tiles[tile_index as usize].polys[ip].vert_count as usize;
            for j in (0..vert_count).rev() {
                let nei = self.tiles[tile_index as usize].polys[ip].neis[j];
                if nei == 0 || nei & EXT_LINK != 0 {
                    continue;
                }
                let target = base | (nei as PolyRef - 1);
                let Some(idx) = self.tiles[tile_index as usize].alloc_link() else {
                    break;
                };
                let tile = &mut self.tiles[tile_index as usize];
                tile.links[idx as usize] = Link {
                    target,
                    edge: j as u8,
                    side: 0xff,
                    bmin: 0,
                    bmax: 0,
                    next: tile.polys[ip].first_link,
                    ..Default::default()
                };
                tile.polys[ip].first_link = idx;
            }
        }
    }

    /// Grounds off-mesh connection start points onto containing polygons and
    /// links them inside the tile.
    fn base_off_mesh_links(&mut self, tile_index: u32) {
        let base = self.poly_ref_base(tile_index);
        if self.tiles[tile_index as usize].header.is_none() {
            return;
        }

        for ci in 0..self.tiles[tile_index as usize].off_mesh_cons.len() {
            let con = self.tiles[tile_index as usize].off_mesh_cons[ci].clone();
            let con_poly = con.poly as usize;
            let start = [con.pos[0], con.pos[1], con.pos[2]];

            let Some((land_poly, nearest)) =
                self.find_nearest_poly_in_tile(tile_index, &start, &OFFMESH_GROUND_EXTENTS)
            else {
                continue;
            };
            // The endpoint must be inside the connection radius.
            let dx = nearest[0] - start[0];
            let dy = nearest[1] - start[1];
            if dx * dx + dy * dy > con.rad * con.rad {
                continue;
            }

            // Snap the connection polygon's start vertex onto the surface.
            let v0 = self.tiles[tile_index as usize].polys[con_poly].verts[0] as usize;
            self.tiles[tile_index as usize].verts[v0 * 3..v0 * 3 + 3].copy_from_slice(&nearest);

            // Connection polygon -> land polygon.
            let Some(idx) = self.tiles[tile_index as usize].alloc_link() else {
                continue;
            };
            {
                let tile = &mut self.tiles[tile_index as usize];
                tile.links[idx as usize] = Link {
                    target: base | land_poly as PolyRef,
                    edge: 0,
                    side: 0xff,
                    bmin: 0,
                    bmax: 0,
                    next: tile.polys[con_poly].first_link,
                    ..Default::default()
                };
                tile.polys[con_poly].first_link = idx;
            }

            // Land polygon -> connection polygon.
            if let Some(idx) = self.tiles[tile_index as usize].alloc_link() {
                let tile = &mut self.tiles[tile_index as usize];
                tile.links[idx as usize] = Link {
                    target: base | con_poly as PolyRef,
                    edge: 0xff,
                    side: 0xff,
                    bmin: 0,
                    bmax: 0,
                    next: tile.polys[land_poly as usize].first_link,
                    ..Default::default()
                };
                tile.polys[land_poly as usize].first_link = idx;
            }
        }
    }

    /// Links the far endpoints of this tile's off-mesh connections to their
    /// landing polygons, wherever those land.
    fn connect_ext_off_mesh_links(&mut self, tile_index: u32) {
        let base = self.poly_ref_base(tile_index);

        for ci in 0..self.tiles[tile_index as usize].off_mesh_cons.len() {
            let con = self.tiles[tile_index as usize].off_mesh_cons[ci].clone();
            let con_poly = con.poly as usize;
            let end = [con.pos[3], con.pos[4], con.pos[5]];

            let (tx, ty) = self.calc_tile_loc(&end);
            let mut landing: Option<(u32, u32, [f32; 3])> = None;
            for land_tile in self.tile_indices_at(tx, ty) {
                if let Some((poly, nearest)) =
                    self.find_nearest_poly_in_tile(land_tile, &end, &OFFMESH_GROUND_EXTENTS)
                {
                    landing = Some((land_tile, poly, nearest));
                    break;
                }
            }
            let Some((land_tile, land_poly, nearest)) = landing else {
                continue;
            };
            let dx = nearest[0] - end[0];
            let dy = nearest[1] - end[1];
            if dx * dx + dy * dy > con.rad * con.rad {
                continue;
            }

            // Snap the connection polygon's end vertex.
            let v1 = self.tiles[tile_index as usize].polys[con_poly].verts[1] as usize;
            self.tiles[tile_index as usize].verts[v1 * 3..v1 * 3 + 3].copy_from_slice(&nearest);

            let land_base = self.poly_ref_base(land_tile);

            // Connection polygon -> landing polygon.
            if let Some(idx) = self.tiles[tile_index as usize].alloc_link() {
                let tile = &mut self.tiles[tile_index as usize];
                tile.links[idx as usize] = Link {
                    target: land_base | land_poly as PolyRef,
                    edge: 1,
                    side: con.side,
                    bmin: 0,
                    bmax: 0,
                    next: tile.polys[con_poly].first_link,
                    ..Default::default()
                };
                tile.polys[con_poly].first_link = idx;
            }

            // Landing polygon -> connection polygon for two-way connections.
            if con.flags & OFFMESH_CON_BIDIR != 0 {
                if let Some(idx) = self.tiles[land_tile as usize].alloc_link() {
                    let tile = &mut self.tiles[land_tile as usize];
                    tile.links[idx as usize] = Link {
                        target: base | con_poly as PolyRef,
                        edge: 0xff,
                        side: opposite_side_or_none(con.side),
                        bmin: 0,
                        bmax: 0,
                        next: tile.polys[land_poly as usize].first_link,
                        ..Default::default()
                    };
                    tile.polys[land_poly as usize].first_link = idx;
                }
            }

            // Both endpoints grounded.
            let tile = &mut self.tiles[tile_index as usize];
            tile.polys[con_poly].flags |= PolyFlags::JUMP_LINKED;
        }
    }

    /// Builds portal links from `tile_index` into `target_index` across
    /// `side`.
    fn connect_ext_links(&mut self, tile_index: u32, target_index: u32, side: u8) {
        if self.tiles[tile_index as usize].header.is_none()
            || self.tiles[target_index as usize].header.is_none()
        {
            return;
        }
        let poly_count = self.tiles[tile_index as usize].polys.len();

        for ip in 0..poly_count {
            let vert_count = self.tiles[tile_index as usize].polys[ip].vert_count as usize;
            for j in 0..vert_count {
                let nei = self.tiles[tile_index as usize].polys[ip].neis[j];
                if nei & EXT_LINK == 0 {
                    continue;
                }
                let dir = (nei & 0xff) as u8;
                if dir != side {
                    continue;
                }

                let (va, vb) = {
                    let tile = &self.tiles[tile_index as usize];
                    let poly = &tile.polys[ip];
                    let a = poly.verts[j] as usize;
                    let b = poly.verts[(j + 1) % vert_count] as usize;
                    (
                        [
                            tile.verts[a * 3],
                            tile.verts[a * 3 + 1],
                            tile.verts[a * 3 + 2],
                        ],
                        [
                            tile.verts[b * 3],
                            tile.verts[b * 3 + 1],
                            tile.verts[b * 3 + 2],
                        ],
                    )
                };

                let connections =
                    self.find_connecting_polys(&va, &vb, target_index, opposite_side(side));

                for (target_poly, tmin, tmax) in connections {
                    let Some(idx) = self.tiles[tile_index as usize].alloc_link() else {
                        return;
                    };
                    let target_ref = self.poly_ref_base(target_index) | target_poly as PolyRef;
                    let tile = &mut self.tiles[tile_index as usize];
                    tile.links[idx as usize] = Link {
                        target: target_ref,
                        edge: j as u8,
                        side,
                        bmin: (tmin.clamp(0.0, 1.0) * 255.0).round() as u8,
                        bmax: (tmax.clamp(0.0, 1.0) * 255.0).round() as u8,
                        next: tile.polys[ip].first_link,
                        ..Default::default()
                    };
                    tile.polys[ip].first_link = idx;
                }
            }
        }
    }

    /// Finds polygons in `target_index` whose portal edges on `side` overlap
    /// the segment `va..vb`. Returns `(poly index, tmin, tmax)` per match.
    fn find_connecting_polys(
        &self,
        va: &[f32],
        vb: &[f32],
        target_index: u32,
        side: u8,
    ) -> Vec<(u32, f32, f32)> {
        let tile = &self.tiles[target_index as usize];
        let Some(header) = &tile.header else {
            return Vec::new();
        };

        let (amin, amax) = calc_slab_end_points(va, vb, side);
        let apos = slab_coord(va, side);
        // The BV quantisation factor is the reciprocal cell size; portal
        // planes must coincide within one cell.
        let cs = if header.bv_quant_factor > 0.0 {
            1.0 / header.bv_quant_factor
        } else {
            0.01
        };

        let mut out = Vec::new();
        for (ip, poly) in tile.polys.iter().enumerate() {
            let vert_count = poly.vert_count as usize;
            for j in 0..vert_count {
                if poly.neis[j] != EXT_LINK | side as u16 {
                    continue;
                }
                let a = poly.verts[j] as usize;
                let b = poly.verts[(j + 1) % vert_count] as usize;
                let wa = &tile.verts[a * 3..a * 3 + 3];
                let wb = &tile.verts[b * 3..b * 3 + 3];

                // Segments must lie on the same portal plane.
                let bpos = slab_coord(wa, side);
                if (apos - bpos).abs() > cs {
                    continue;
                }

                let (bmin, bmax) = calc_slab_end_points(wa, wb, side);
                if !overlap_slabs(&amin, &amax, &bmin, &bmax, 0.01, header.walkable_climb) {
                    continue;
                }

                // Parametrise the overlap on the shared axis.
                let lo = amin[0].max(bmin[0]);
                let hi = amax[0].min(bmax[0]);
                let denom = amax[0] - amin[0];
                let (tmin, tmax) = if denom.abs() > 1e-6 {
                    (
                        ((lo - amin[0]) / denom).clamp(0.0, 1.0),
                        ((hi - amin[0]) / denom).clamp(0.0, 1.0),
                    )
                } else {
                    (0.0, 1.0)
                };
                out.push((ip as u32, tmin, tmax));
                break;
            }
        }
        out
    }

    // --- Tile-local queries -------------------------------------------------

    /// Polygons in a tile whose bounds overlap the query box.
    pub fn query_polygons_in_tile(&self, tile_index: u32, qmin: &[f32], qmax: &[f32]) -> Vec<u32> {
        let tile = &self.tiles[tile_index as usize];
        let Some(header) = &tile.header else {
            return Vec::new();
        };
        let mut out = Vec::new();

        if !tile.bv_tree.is_empty() {
            // Quantised query against the BV tree.
            let qfac = header.bv_quant_factor;
            let clamp_q = |v: f32, lo: f32, hi: f32| (v.clamp(lo, hi) - lo) * qfac;
            let bmin = [
                clamp_q(qmin[0], header.bmin[0], header.bmax[0]) as u16,
                clamp_q(qmin[1], header.bmin[1], header.bmax[1]) as u16,
                clamp_q(qmin[2], header.bmin[2], header.bmax[2]) as u16,
            ];
            let bmax = [
                (clamp_q(qmax[0], header.bmin[0], header.bmax[0]) as u16) | 1,
                (clamp_q(qmax[1], header.bmin[1], header.bmax[1]) as u16) | 1,
                (clamp_q(qmax[2], header.bmin[2], header.bmax[2]) as u16) | 1,
            ];

            let mut i = 0usize;
            while i < tile.bv_tree.len() {
                let node = &tile.bv_tree[i];
                let overlap = bmin[0] <= node.bmax[0]
                    && bmax[0] >= node.bmin[0]
                    && bmin[1] <= node.bmax[1]
                    && bmax[1] >= node.bmin[1]
                    && bmin[2] <= node.bmax[2]
                    && bmax[2] >= node.bmin[2];
                let is_leaf = node.i >= 0;
                if is_leaf && overlap {
                    out.push(node.i as u32);
                }
                if overlap || is_leaf {
                    i += 1;
                } else {
                    i += (-node.i) as usize;
                }
            }
        } else {
            for (ip, poly) in tile.polys.iter().enumerate() {
                if poly.poly_type() == PolyType::OffMeshConnection {
                    continue;
                }
                let mut pmin = [f32::MAX; 3];
                let mut pmax = [f32::MIN; 3];
                for k in 0..poly.vert_count as usize {
                    let v = &tile.verts[poly.verts[k] as usize * 3..poly.verts[k] as usize * 3 + 3];
                    tilenav_common::vmin(&mut pmin, v);
                    tilenav_common::vmax(&mut pmax, v);
                }
                let overlap = qmin[0] <= pmax[0]
                    && qmax[0] >= pmin[0]
                    && qmin[1] <= pmax[1]
                    && qmax[1] >= pmin[1]
                    && qmin[2] <= pmax[2]
                    && qmax[2] >= pmin[2];
                if overlap {
                    out.push(ip as u32);
                }
            }
        }
        out
    }

    /// Nearest polygon in a tile to `center` within `half_extents`, plus the
    /// nearest point on it.
    pub fn find_nearest_poly_in_tile(
        &self,
        tile_index: u32,
        center: &[f32],
        half_extents: &[f32],
    ) -> Option<(u32, [f32; 3])> {
        let qmin = [
            center[0] - half_extents[0],
            center[1] - half_extents[1],
            center[2] - half_extents[2],
        ];
        let qmax = [
            center[0] + half_extents[0],
            center[1] + half_extents[1],
            center[2] + half_extents[2],
        ];

        let mut best: Option<(u32, [f32; 3])> = None;
        let mut best_d = f32::MAX;
        for ip in self.query_polygons_in_tile(tile_index, &qmin, &qmax) {
            let (closest, _over) = self.closest_point_on_poly(tile_index, ip, center);
            let d = vdist_sqr(center, &closest);
            if d < best_d {
                best_d = d;
                best = Some((ip, closest));
            }
        }
        best
    }

    /// Closest point on a polygon, preferring the detail surface. The flag
    /// reports whether the position projects inside the polygon.
    pub fn closest_point_on_poly(
        &self,
        tile_index: u32,
        poly_index: u32,
        pos: &[f32],
    ) -> ([f32; 3], bool) {
        let tile = &self.tiles[tile_index as usize];
        let poly = &tile.polys[poly_index as usize];

        if poly.poly_type() == PolyType::OffMeshConnection {
            let v0 = poly.verts[0] as usize;
            let v1 = poly.verts[1] as usize;
            let a = &tile.verts[v0 * 3..v0 * 3 + 3];
            let b = &tile.verts[v1 * 3..v1 * 3 + 3];
            let (_, t) = tilenav_common::dist_pt_seg_sqr_2d(pos, a, b);
            let mut closest = [0.0f32; 3];
            vlerp(&mut closest, a, b, t);
            return (closest, false);
        }

        // Flat polygon footprint.
        let nv = poly.vert_count as usize;
        let mut verts = [0.0f32; 6 * 3];
        for k in 0..nv {
            let v = &tile.verts[poly.verts[k] as usize * 3..poly.verts[k] as usize * 3 + 3];
            verts[k * 3..k * 3 + 3].copy_from_slice(v);
        }

        let mut ed = [0.0f32; 6];
        let mut et = [0.0f32; 6];
        let inside = dist_pt_poly_edges_sqr(pos, &verts[..nv * 3], nv, &mut ed, &mut et);

        if inside {
            let mut closest = [pos[0], pos[1], pos[2]];
            if let Some(h) = self.poly_height(tile_index, poly_index, pos) {
                closest[2] = h;
            }
            (closest, true)
        } else {
            // Snap to the nearest boundary edge.
            let mut dmin = ed[0];
            let mut imin = 0usize;
            for k in 1..nv {
                if ed[k] < dmin {
                    dmin = ed[k];
                    imin = k;
                }
            }
            let va = &verts[imin * 3..imin * 3 + 3];
            let vb = &verts[((imin + 1) % nv) * 3..((imin + 1) % nv) * 3 + 3];
            let mut closest = [0.0f32; 3];
            vlerp(&mut closest, va, vb, et[imin]);
            (closest, false)
        }
    }

    /// Height of the detail surface under `pos`, when the position projects
    /// onto the polygon.
    pub fn poly_height(&self, tile_index: u32, poly_index: u32, pos: &[f32]) -> Option<f32> {
        let tile = &self.tiles[tile_index as usize];
        let poly = &tile.polys[poly_index as usize];
        if poly.poly_type() == PolyType::OffMeshConnection {
            return None;
        }
        let detail = tile.detail_meshes.get(poly_index as usize)?;

        for t in 0..detail.tri_count as usize {
            let tri =
                &tile.detail_tris[(detail.tri_base as usize + t) * 4..(detail.tri_base as usize + t) * 4 + 3];
            let mut v = [[0.0f32; 3]; 3];
            for (k, vert) in v.iter_mut().enumerate() {
                let idx = tri[k] as usize;
                if idx < poly.vert_count as usize {
                    let src = poly.verts[idx] as usize;
                    vert.copy_from_slice(&tile.verts[src * 3..src * 3 + 3]);
                } else {
                    let src = detail.vert_base as usize + (idx - poly.vert_count as usize);
                    vert.copy_from_slice(&tile.detail_verts[src * 3..src * 3 + 3]);
                }
            }
            if let Some(h) = closest_height_point_triangle(pos, &v[0], &v[1], &v[2]) {
                return Some(h);
            }
        }
        None
    }

    /// Recomputes a polygon centre from its vertices.
    pub fn calc_poly_center_for(&self, tile_index: u32, poly_index: u32) -> [f32; 3] {
        let tile = &self.tiles[tile_index as usize];
        let poly = &tile.polys[poly_index as usize];
        let mut center = [0.0f32; 3];
        calc_poly_center(
            &mut center,
            &poly.verts[..poly.vert_count as usize],
            &tile.verts,
        );
        center
    }
}

/// Opposing side code (rotation by 4).
pub fn opposite_side(side: u8) -> u8 {
    (side + 4) & 0x7
}

fn opposite_side_or_none(side: u8) -> u8 {
    if side == 0xff {
        0xff
    } else {
        opposite_side(side)
    }
}

/// Portal-plane coordinate for a side.
fn slab_coord(v: &[f32], side: u8) -> f32 {
    if side == 0 || side == 4 {
        v[0]
    } else {
        v[1]
    }
}

/// Projects a portal edge onto `(axis, height)` slab space.
fn calc_slab_end_points(va: &[f32], vb: &[f32], side: u8) -> ([f32; 2], [f32; 2]) {
    let (a, b) = if side == 0 || side == 4 {
        ([va[1], va[2]], [vb[1], vb[2]])
    } else {
        ([va[0], va[2]], [vb[0], vb[2]])
    };
    if a[0] < b[0] {
        (a, b)
    } else {
        (b, a)
    }
}

fn overlap_slabs(amin: &[f32; 2], amax: &[f32; 2], bmin: &[f32; 2], bmax: &[f32; 2], px: f32, py: f32) -> bool {
    // Horizontal overlap first.
    let minx = (amin[0] + px).max(bmin[0] + px);
    let maxx = (amax[0] - px).min(bmax[0] - px);
    if minx > maxx {
        return false;
    }

    // Vertical proximity at the overlap interval ends.
    let ad = (amax[1] - amin[1]) / (amax[0] - amin[0]).max(1e-6);
    let ak = amin[1] - ad * amin[0];
    let bd = (bmax[1] - bmin[1]) / (bmax[0] - bmin[0]).max(1e-6);
    let bk = bmin[1] - bd * bmin[0];
    let aminy = ad * minx + ak;
    let amaxy = ad * maxx + ak;
    let bminy = bd * minx + bk;
    let bmaxy = bd * maxx + bk;
    let dmin = bminy - aminy;
    let dmax = bmaxy - amaxy;

    // Crossing slabs always touch.
    if dmin * dmax < 0.0 {
        return true;
    }

    // Parallel slabs touch when within climb distance.
    let thr = (py * 2.0) * (py * 2.0);
    dmin * dmin <= thr || dmax * dmax <= thr
}
