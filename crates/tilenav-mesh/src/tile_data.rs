//! Tile blob serialisation.
//!
//! A tile blob is the header followed by fixed-order sections, each starting
//! on a 4-byte boundary: polygons, poly map, vertices, links, detail meshes,
//! detail vertices, detail triangles, BV nodes, off-mesh connections, cells.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::tile::{
    BVNode, Link, MeshHeader, MeshTile, OffMeshConnection, Poly, PolyDetail, TileCell,
    MAX_VERTS_PER_POLY,
};
use crate::{PolyFlags, PolyRef, Status, NAVMESH_MAGIC, NAVMESH_VERSION};

type IoResult<T> = std::io::Result<T>;

/// Bytes reserved per cell after its live fields; observed zero upstream.
const CELL_RESERVED_BYTES: usize = 52;

fn write_pad<W: Write>(w: &mut W, written: usize) -> IoResult<usize> {
    let aligned = tilenav_common::align4(written);
    for _ in written..aligned {
        w.write_u8(0)?;
    }
    Ok(aligned)
}

fn skip_pad(cursor: &mut Cursor<&[u8]>) {
    let pos = cursor.position() as usize;
    cursor.set_position(tilenav_common::align4(pos) as u64);
}

fn write_ref<W: Write>(w: &mut W, r: PolyRef) -> IoResult<()> {
    #[cfg(not(feature = "polyref64"))]
    w.write_u32::<LittleEndian>(r)?;
    #[cfg(feature = "polyref64")]
    w.write_u64::<LittleEndian>(r)?;
    Ok(())
}

fn read_ref<R: Read>(r: &mut R) -> IoResult<PolyRef> {
    #[cfg(not(feature = "polyref64"))]
    return r.read_u32::<LittleEndian>();
    #[cfg(feature = "polyref64")]
    return r.read_u64::<LittleEndian>();
}

fn write_header<W: Write>(w: &mut W, h: &MeshHeader) -> IoResult<()> {
    w.write_i32::<LittleEndian>(h.magic)?;
    w.write_i32::<LittleEndian>(h.version)?;
    w.write_i32::<LittleEndian>(h.x)?;
    w.write_i32::<LittleEndian>(h.y)?;
    w.write_i32::<LittleEndian>(h.layer)?;
    w.write_u32::<LittleEndian>(h.user_id)?;
    w.write_i32::<LittleEndian>(h.poly_count)?;
    w.write_i32::<LittleEndian>(h.poly_map_count)?;
    w.write_i32::<LittleEndian>(h.vert_count)?;
    w.write_i32::<LittleEndian>(h.max_link_count)?;
    w.write_i32::<LittleEndian>(h.detail_mesh_count)?;
    w.write_i32::<LittleEndian>(h.detail_vert_count)?;
    w.write_i32::<LittleEndian>(h.detail_tri_count)?;
    w.write_i32::<LittleEndian>(h.bv_node_count)?;
    w.write_i32::<LittleEndian>(h.off_mesh_con_count)?;
    w.write_i32::<LittleEndian>(h.off_mesh_base)?;
    w.write_i32::<LittleEndian>(h.max_cell_count)?;
    w.write_f32::<LittleEndian>(h.walkable_height)?;
    w.write_f32::<LittleEndian>(h.walkable_radius)?;
    w.write_f32::<LittleEndian>(h.walkable_climb)?;
    for v in h.bmin {
        w.write_f32::<LittleEndian>(v)?;
    }
    for v in h.bmax {
        w.write_f32::<LittleEndian>(v)?;
    }
    w.write_f32::<LittleEndian>(h.bv_quant_factor)?;
    Ok(())
}

fn read_header(cursor: &mut Cursor<&[u8]>) -> IoResult<MeshHeader> {
    let mut h = MeshHeader {
        magic: cursor.read_i32::<LittleEndian>()?,
        version: cursor.read_i32::<LittleEndian>()?,
        x: cursor.read_i32::<LittleEndian>()?,
        y: cursor.read_i32::<LittleEndian>()?,
        layer: cursor.read_i32::<LittleEndian>()?,
        user_id: cursor.read_u32::<LittleEndian>()?,
        poly_count: cursor.read_i32::<LittleEndian>()?,
        poly_map_count: cursor.read_i32::<LittleEndian>()?,
        vert_count: cursor.read_i32::<LittleEndian>()?,
        max_link_count: cursor.read_i32::<LittleEndian>()?,
        detail_mesh_count: cursor.read_i32::<LittleEndian>()?,
        detail_vert_count: cursor.read_i32::<LittleEndian>()?,
        detail_tri_count: cursor.read_i32::<LittleEndian>()?,
        bv_node_count: cursor.read_i32::<LittleEndian>()?,
        off_mesh_con_count: cursor.read_i32::<LittleEndian>()?,
        off_mesh_base: cursor.read_i32::<LittleEndian>()?,
        max_cell_count: cursor.read_i32::<LittleEndian>()?,
        ..Default::default()
    };
    h.walkable_height = cursor.read_f32::<LittleEndian>()?;
    h.walkable_radius = cursor.read_f32::<LittleEndian>()?;
    h.walkable_climb = cursor.read_f32::<LittleEndian>()?;
    for v in &mut h.bmin {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    for v in &mut h.bmax {
        *v = cursor.read_f32::<LittleEndian>()?;
    }
    h.bv_quant_factor = cursor.read_f32::<LittleEndian>()?;
    Ok(h)
}

fn write_poly<W: Write>(w: &mut W, p: &Poly) -> IoResult<()> {
    w.write_u32::<LittleEndian>(p.first_link)?;
    for v in p.verts {
        w.write_u16::<LittleEndian>(v)?;
    }
    for n in p.neis {
        w.write_u16::<LittleEndian>(n)?;
    }
    w.write_u16::<LittleEndian>(p.flags.bits())?;
    w.write_u8(p.vert_count)?;
    w.write_u8(p.area_and_type)?;
    w.write_u16::<LittleEndian>(p.group_id)?;
    w.write_u16::<LittleEndian>(p.surface_area)?;
    for r in p.reserved {
        w.write_u16::<LittleEndian>(r)?;
    }
    for c in p.center {
        w.write_f32::<LittleEndian>(c)?;
    }
    Ok(())
}

fn read_poly(cursor: &mut Cursor<&[u8]>) -> IoResult<Poly> {
    let first_link = cursor.read_u32::<LittleEndian>()?;
    let mut verts = [0u16; MAX_VERTS_PER_POLY];
    for v in &mut verts {
        *v = cursor.read_u16::<LittleEndian>()?;
    }
    let mut neis = [0u16; MAX_VERTS_PER_POLY];
    for n in &mut neis {
        *n = cursor.read_u16::<LittleEndian>()?;
    }
    let flags = PolyFlags::from_bits_truncate(cursor.read_u16::<LittleEndian>()?);
    let vert_count = cursor.read_u8()?;
    let area_and_type = cursor.read_u8()?;
    let group_id = cursor.read_u16::<LittleEndian>()?;
    let surface_area = cursor.read_u16::<LittleEndian>()?;
    let mut reserved = [0u16; 2];
    for r in &mut reserved {
        *r = cursor.read_u16::<LittleEndian>()?;
    }
    let mut center = [0.0f32; 3];
    for c in &mut center {
        *c = cursor.read_f32::<LittleEndian>()?;
    }
    Ok(Poly {
        first_link,
        verts,
        neis,
        flags,
        vert_count,
        area_and_type,
        group_id,
        surface_area,
        reserved,
        center,
    })
}

fn write_link<W: Write>(w: &mut W, l: &Link) -> IoResult<()> {
    write_ref(w, l.target)?;
    w.write_u32::<LittleEndian>(l.next)?;
    w.write_u8(l.edge)?;
    w.write_u8(l.side)?;
    w.write_u8(l.bmin)?;
    w.write_u8(l.bmax)?;
    w.write_u8(l.traverse_type)?;
    w.write_u8(l.traverse_dist)?;
    w.write_u16::<LittleEndian>(l.reverse_link)?;
    Ok(())
}

fn read_link(cursor: &mut Cursor<&[u8]>) -> IoResult<Link> {
    Ok(Link {
        target: read_ref(cursor)?,
        next: cursor.read_u32::<LittleEndian>()?,
        edge: cursor.read_u8()?,
        side: cursor.read_u8()?,
        bmin: cursor.read_u8()?,
        bmax: cursor.read_u8()?,
        traverse_type: cursor.read_u8()?,
        traverse_dist: cursor.read_u8()?,
        reverse_link: cursor.read_u16::<LittleEndian>()?,
    })
}

fn write_off_mesh_con<W: Write>(w: &mut W, c: &OffMeshConnection) -> IoResult<()> {
    for p in c.pos {
        w.write_f32::<LittleEndian>(p)?;
    }
    w.write_f32::<LittleEndian>(c.rad)?;
    w.write_u16::<LittleEndian>(c.poly)?;
    w.write_u8(c.side)?;
    w.write_u8(c.traverse_type)?;
    w.write_u16::<LittleEndian>(c.user_id)?;
    w.write_u16::<LittleEndian>(c.hint_index)?;
    for p in c.ref_pos {
        w.write_f32::<LittleEndian>(p)?;
    }
    w.write_f32::<LittleEndian>(c.ref_yaw)?;
    w.write_u8(c.flags)?;
    w.write_u8(0)?;
    w.write_u16::<LittleEndian>(0)?;
    Ok(())
}

fn read_off_mesh_con(cursor: &mut Cursor<&[u8]>) -> IoResult<OffMeshConnection> {
    let mut pos = [0.0f32; 6];
    for p in &mut pos {
        *p = cursor.read_f32::<LittleEndian>()?;
    }
    let rad = cursor.read_f32::<LittleEndian>()?;
    let poly = cursor.read_u16::<LittleEndian>()?;
    let side = cursor.read_u8()?;
    let traverse_type = cursor.read_u8()?;
    let user_id = cursor.read_u16::<LittleEndian>()?;
    let hint_index = cursor.read_u16::<LittleEndian>()?;
    let mut ref_pos = [0.0f32; 3];
    for p in &mut ref_pos {
        *p = cursor.read_f32::<LittleEndian>()?;
    }
    let ref_yaw = cursor.read_f32::<LittleEndian>()?;
    let flags = cursor.read_u8()?;
    cursor.read_u8()?;
    cursor.read_u16::<LittleEndian>()?;
    Ok(OffMeshConnection {
        pos,
        rad,
        poly,
        side,
        traverse_type,
        user_id,
        hint_index,
        ref_pos,
        ref_yaw,
        flags,
    })
}

fn write_cell<W: Write>(w: &mut W, c: &TileCell) -> IoResult<()> {
    for p in c.pos {
        w.write_f32::<LittleEndian>(p)?;
    }
    w.write_u32::<LittleEndian>(c.poly_index)?;
    for s in c.occupy_state {
        w.write_u8(s)?;
    }
    for _ in 0..CELL_RESERVED_BYTES {
        w.write_u8(0)?;
    }
    Ok(())
}

fn read_cell(cursor: &mut Cursor<&[u8]>) -> IoResult<TileCell> {
    let mut pos = [0.0f32; 3];
    for p in &mut pos {
        *p = cursor.read_f32::<LittleEndian>()?;
    }
    let poly_index = cursor.read_u32::<LittleEndian>()?;
    let mut occupy_state = [0u8; 4];
    for s in &mut occupy_state {
        *s = cursor.read_u8()?;
    }
    cursor.set_position(cursor.position() + CELL_RESERVED_BYTES as u64);
    Ok(TileCell {
        pos,
        poly_index,
        occupy_state,
    })
}

/// Serialises a tile into one contiguous blob.
pub fn serialize_tile(tile: &MeshTile) -> Result<Vec<u8>, Status> {
    let header = tile
        .header
        .as_ref()
        .ok_or(Status::failure_detail(Status::INVALID_PARAM))?;

    // Free link slots serialise canonically so identical tiles produce
    // identical blobs regardless of free-list order; the list is rebuilt by
    // scanning at parse time.
    let mut live = vec![false; tile.links.len()];
    for poly in &tile.polys {
        let mut l = poly.first_link;
        while l != crate::NULL_LINK {
            live[l as usize] = true;
            l = tile.links[l as usize].next;
        }
    }

    let mut buf: Vec<u8> = Vec::new();
    let write = |buf: &mut Vec<u8>| -> IoResult<()> {
        write_header(buf, header)?;

        for p in &tile.polys {
            write_poly(buf, p)?;
        }
        for &m in &tile.poly_map {
            buf.write_i32::<LittleEndian>(m)?;
        }
        for &v in &tile.verts {
            buf.write_f32::<LittleEndian>(v)?;
        }
        for (i, l) in tile.links.iter().enumerate() {
            if live[i] {
                write_link(buf, l)?;
            } else {
                write_link(buf, &Link::default())?;
            }
        }
        for d in &tile.detail_meshes {
            buf.write_u32::<LittleEndian>(d.vert_base)?;
            buf.write_u32::<LittleEndian>(d.tri_base)?;
            buf.write_u8(d.vert_count)?;
            buf.write_u8(d.tri_count)?;
            buf.write_u16::<LittleEndian>(0)?;
        }
        for &v in &tile.detail_verts {
            buf.write_f32::<LittleEndian>(v)?;
        }
        for &t in &tile.detail_tris {
            buf.write_u8(t)?;
        }
        let len = buf.len();
        write_pad(buf, len)?;
        for n in &tile.bv_tree {
            for v in n.bmin {
                buf.write_u16::<LittleEndian>(v)?;
            }
            for v in n.bmax {
                buf.write_u16::<LittleEndian>(v)?;
            }
            buf.write_i32::<LittleEndian>(n.i)?;
        }
        for c in &tile.off_mesh_cons {
            write_off_mesh_con(buf, c)?;
        }
        for c in &tile.cells {
            write_cell(buf, c)?;
        }
        Ok(())
    };

    write(&mut buf).map_err(|_| Status::failure_detail(Status::OUT_OF_MEMORY))?;
    Ok(buf)
}

/// Parses a tile blob. Fails on magic or version mismatch without touching
/// anything.
pub fn parse_tile(data: &[u8]) -> Result<MeshTile, Status> {
    let mut cursor = Cursor::new(data);

    let header = read_header(&mut cursor).map_err(|_| Status::failure_detail(Status::INVALID_PARAM))?;
    if header.magic != NAVMESH_MAGIC {
        return Err(Status::failure_detail(Status::WRONG_MAGIC));
    }
    if header.version != NAVMESH_VERSION {
        return Err(Status::failure_detail(Status::WRONG_VERSION));
    }

    let read = |cursor: &mut Cursor<&[u8]>| -> IoResult<MeshTile> {
        let mut tile = MeshTile::default();

        for _ in 0..header.poly_count {
            tile.polys.push(read_poly(cursor)?);
        }
        for _ in 0..header.poly_map_count {
            tile.poly_map.push(cursor.read_i32::<LittleEndian>()?);
        }
        for _ in 0..header.vert_count * 3 {
            tile.verts.push(cursor.read_f32::<LittleEndian>()?);
        }
        for _ in 0..header.max_link_count {
            tile.links.push(read_link(cursor)?);
        }
        for _ in 0..header.detail_mesh_count {
            let d = PolyDetail {
                vert_base: cursor.read_u32::<LittleEndian>()?,
                tri_base: cursor.read_u32::<LittleEndian>()?,
                vert_count: cursor.read_u8()?,
                tri_count: cursor.read_u8()?,
            };
            cursor.read_u16::<LittleEndian>()?;
            tile.detail_meshes.push(d);
        }
        for _ in 0..header.detail_vert_count * 3 {
            tile.detail_verts.push(cursor.read_f32::<LittleEndian>()?);
        }
        for _ in 0..header.detail_tri_count * 4 {
            tile.detail_tris.push(cursor.read_u8()?);
        }
        skip_pad(cursor);
        for _ in 0..header.bv_node_count {
            let mut n = BVNode::default();
            for v in &mut n.bmin {
                *v = cursor.read_u16::<LittleEndian>()?;
            }
            for v in &mut n.bmax {
                *v = cursor.read_u16::<LittleEndian>()?;
            }
            n.i = cursor.read_i32::<LittleEndian>()?;
            tile.bv_tree.push(n);
        }
        for _ in 0..header.off_mesh_con_count {
            tile.off_mesh_cons.push(read_off_mesh_con(cursor)?);
        }
        for _ in 0..header.max_cell_count {
            tile.cells.push(read_cell(cursor)?);
        }

        tile.header = Some(header.clone());
        Ok(tile)
    };

    let mut tile = read(&mut cursor).map_err(|_| Status::failure_detail(Status::INVALID_PARAM))?;
    tile.rebuild_link_free_list();
    Ok(tile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NULL_LINK;

    fn sample_tile() -> MeshTile {
        let mut poly = Poly::default();
        poly.verts[0] = 0;
        poly.verts[1] = 1;
        poly.verts[2] = 2;
        poly.vert_count = 3;
        poly.flags = PolyFlags::WALK;
        poly.surface_area = 77;
        poly.center = [1.0, 1.0, 0.0];

        let header = MeshHeader {
            magic: NAVMESH_MAGIC,
            version: NAVMESH_VERSION,
            x: 3,
            y: 7,
            poly_count: 1,
            poly_map_count: 1,
            vert_count: 3,
            max_link_count: 2,
            bmin: [0.0, 0.0, 0.0],
            bmax: [10.0, 10.0, 10.0],
            bv_quant_factor: 1.0,
            ..Default::default()
        };

        MeshTile {
            header: Some(header),
            polys: vec![poly],
            poly_map: vec![0],
            verts: vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0, 0.0],
            links: vec![Link::default(), Link::default()],
            ..Default::default()
        }
    }

    #[test]
    fn test_tile_blob_roundtrip() {
        let tile = sample_tile();
        let blob = serialize_tile(&tile).unwrap();
        let parsed = parse_tile(&blob).unwrap();

        let header = parsed.header.as_ref().unwrap();
        assert_eq!(header.x, 3);
        assert_eq!(header.y, 7);
        assert_eq!(parsed.polys.len(), 1);
        assert_eq!(parsed.polys[0].flags, PolyFlags::WALK);
        assert_eq!(parsed.polys[0].surface_area, 77);
        assert_eq!(parsed.verts, tile.verts);

        // Serialising the parsed tile reproduces the blob byte for byte.
        let blob2 = serialize_tile(&parsed).unwrap();
        assert_eq!(blob, blob2);
    }

    #[test]
    fn test_parse_rejects_bad_magic() {
        let tile = sample_tile();
        let mut blob = serialize_tile(&tile).unwrap();
        blob[0] ^= 0xff;
        let err = parse_tile(&blob).unwrap_err();
        assert!(err.has_detail(Status::WRONG_MAGIC));
    }

    #[test]
    fn test_parse_rejects_bad_version() {
        let tile = sample_tile();
        let mut blob = serialize_tile(&tile).unwrap();
        blob[4] = 0x7f;
        let err = parse_tile(&blob).unwrap_err();
        assert!(err.has_detail(Status::WRONG_VERSION));
    }

    #[test]
    fn test_free_list_reconstructed() {
        let tile = sample_tile();
        let blob = serialize_tile(&tile).unwrap();
        let parsed = parse_tile(&blob).unwrap();
        // No poly chains anything, so both slots are free.
        assert_eq!(parsed.free_link_count(), 2);
        assert_ne!(parsed.links_free_list, NULL_LINK);
    }
}
