//! Region partitioning of the compact heightfield.
//!
//! Three strategies share the same output contract: every walkable span gets
//! a 16-bit region id, spans within `border_size` of the tile edge land in
//! regions tagged [`BORDER_REG`], and region ids are compact starting at 1.

use crate::compact::{CompactHeightfield, DIR_OFFSET_X, DIR_OFFSET_Y};
use crate::heightfield::NULL_AREA;
use tilenav_common::Result;

/// Flag marking regions on the tile border; they carry no polygons.
pub const BORDER_REG: u16 = 0x8000;

/// Builds the distance-to-boundary field used by watershed partitioning.
pub fn build_distance_field(chf: &mut CompactHeightfield) -> Result<()> {
    let mut src = vec![0xffffu16; chf.span_count];

    // Boundary seeds: spans missing a same-area neighbour on any side.
    for y in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let area = chf.areas[i];
                let mut nc = 0;
                for dir in 0..4 {
                    if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                        if chf.areas[n] == area {
                            nc += 1;
                        }
                    }
                }
                if nc != 4 {
                    src[i] = 0;
                }
            }
        }
    }

    // Two-pass chamfer over the connection graph.
    for y in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if let Some(n) = chf.neighbor_index(x, y, i, 0) {
                    src[i] = src[i].min(src[n].saturating_add(2));
                    if let Some(nn) = chf.neighbor_index(x - 1, y, n, 3) {
                        src[i] = src[i].min(src[nn].saturating_add(3));
                    }
                }
                if let Some(n) = chf.neighbor_index(x, y, i, 3) {
                    src[i] = src[i].min(src[n].saturating_add(2));
                    if let Some(nn) = chf.neighbor_index(x, y - 1, n, 2) {
                        src[i] = src[i].min(src[nn].saturating_add(3));
                    }
                }
            }
        }
    }
    for y in (0..chf.height).rev() {
        for x in (0..chf.width).rev() {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if let Some(n) = chf.neighbor_index(x, y, i, 2) {
                    src[i] = src[i].min(src[n].saturating_add(2));
                    if let Some(nn) = chf.neighbor_index(x + 1, y, n, 1) {
                        src[i] = src[i].min(src[nn].saturating_add(3));
                    }
                }
                if let Some(n) = chf.neighbor_index(x, y, i, 1) {
                    src[i] = src[i].min(src[n].saturating_add(2));
                    if let Some(nn) = chf.neighbor_index(x, y + 1, n, 0) {
                        src[i] = src[i].min(src[nn].saturating_add(3));
                    }
                }
            }
        }
    }

    let max_dist = src.iter().copied().max().unwrap_or(0);

    // Box blur to soften watershed basins.
    let mut dst = vec![0u16; chf.span_count];
    for y in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let cd = src[i];
                if cd <= 2 {
                    dst[i] = cd;
                    continue;
                }
                let mut d = cd as i32;
                for dir in 0..4 {
                    if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                        d += src[n] as i32;
                        let dir2 = (dir + 1) & 3;
                        if let Some(nn) =
                            chf.neighbor_index(x + DIR_OFFSET_X[dir], y + DIR_OFFSET_Y[dir], n, dir2)
                        {
                            d += src[nn] as i32;
                        } else {
                            d += src[n] as i32;
                        }
                    } else {
                        d += cd as i32 * 2;
                    }
                }
                dst[i] = ((d + 5) / 9) as u16;
            }
        }
    }

    chf.dist = dst;
    chf.max_distance = max_dist;
    Ok(())
}

/// Paints every span in the rectangle with `reg_id`.
fn paint_rect_region(chf: &mut CompactHeightfield, minx: i32, maxx: i32, miny: i32, maxy: i32, reg_id: u16) {
    for y in miny..maxy {
        for x in minx..maxx {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.areas[i] != NULL_AREA {
                    chf.spans[i].reg = reg_id;
                }
            }
        }
    }
}

/// Flood-fills one watershed basin from `seed` over spans whose distance is
/// at least `level`. Returns whether any span was claimed.
fn flood_region(
    chf: &mut CompactHeightfield,
    seed: usize,
    seed_x: i32,
    seed_y: i32,
    level: u16,
    reg_id: u16,
) -> bool {
    let area = chf.areas[seed];
    let mut stack = vec![(seed, seed_x, seed_y)];
    chf.spans[seed].reg = reg_id;
    let mut count = 0;

    while let Some((i, x, y)) = stack.pop() {
        // Reject the seed if any 8-neighbour already belongs to another
        // region; basins must not bleed into each other.
        let mut adjacent_region = 0u16;
        for dir in 0..4 {
            if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                if chf.areas[n] != area {
                    continue;
                }
                let nr = chf.spans[n].reg;
                if nr & BORDER_REG != 0 {
                    continue;
                }
                if nr != 0 && nr != reg_id {
                    adjacent_region = nr;
                    break;
                }
                let dir2 = (dir + 1) & 3;
                if let Some(nn) =
                    chf.neighbor_index(x + DIR_OFFSET_X[dir], y + DIR_OFFSET_Y[dir], n, dir2)
                {
                    if chf.areas[nn] == area {
                        let nnr = chf.spans[nn].reg;
                        if nnr != 0 && nnr != reg_id && nnr & BORDER_REG == 0 {
                            adjacent_region = nnr;
                            break;
                        }
                    }
                }
            }
        }
        if adjacent_region != 0 {
            chf.spans[i].reg = 0;
            continue;
        }
        count += 1;

        for dir in 0..4 {
            if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                if chf.areas[n] == area && chf.dist[n] >= level && chf.spans[n].reg == 0 {
                    chf.spans[n].reg = reg_id;
                    stack.push((n, x + DIR_OFFSET_X[dir], y + DIR_OFFSET_Y[dir]));
                }
            }
        }
    }

    count > 0
}

/// Grows existing regions outward over spans whose distance is at least
/// `level` and which touch a claimed span.
fn expand_regions(chf: &mut CompactHeightfield, level: u16, max_iter: i32) {
    // Collect the frontier.
    let mut stack: Vec<(usize, i32, i32)> = Vec::new();
    for y in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.dist[i] >= level && chf.spans[i].reg == 0 && chf.areas[i] != NULL_AREA {
                    stack.push((i, x, y));
                }
            }
        }
    }

    let mut iter = 0;
    while !stack.is_empty() {
        let mut failed = 0;
        let mut new_regs: Vec<(usize, u16)> = Vec::with_capacity(stack.len());

        for &(i, x, y) in &stack {
            if chf.spans[i].reg != 0 {
                failed += 1;
                continue;
            }
            let mut best_reg = 0u16;
            let mut best_dist = u16::MAX;
            for dir in 0..4 {
                if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                    if chf.areas[n] != chf.areas[i] {
                        continue;
                    }
                    let nr = chf.spans[n].reg;
                    if nr != 0 && nr & BORDER_REG == 0 && chf.dist[n] < best_dist {
                        best_reg = nr;
                        best_dist = chf.dist[n];
                    }
                }
            }
            if best_reg != 0 {
                new_regs.push((i, best_reg));
            } else {
                failed += 1;
            }
        }

        for (i, reg) in new_regs {
            chf.spans[i].reg = reg;
        }

        if failed == stack.len() {
            break;
        }
        stack.retain(|&(i, _, _)| chf.spans[i].reg == 0);

        if level > 0 {
            iter += 1;
            if iter >= max_iter {
                break;
            }
        }
    }
}

/// Per-region bookkeeping for the merge/filter pass.
struct RegionInfo {
    span_count: i32,
    connections: Vec<u16>,
    overlaps_border: bool,
}

/// Removes regions below `min_region_area` and merges regions below
/// `merge_region_area` into their best neighbour, then compacts ids.
fn merge_and_filter_regions(
    chf: &mut CompactHeightfield,
    min_region_area: i32,
    merge_region_area: i32,
    max_region_id: u16,
) -> u16 {
    let nreg = max_region_id as usize + 1;
    let mut regions: Vec<RegionInfo> = (0..nreg)
        .map(|_| RegionInfo {
            span_count: 0,
            connections: Vec::new(),
            overlaps_border: false,
        })
        .collect();

    // Gather sizes and adjacency.
    for y in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let r = chf.spans[i].reg;
                if r == 0 {
                    continue;
                }
                if r & BORDER_REG != 0 {
                    continue;
                }
                let reg = &mut regions[r as usize];
                reg.span_count += 1;

                for dir in 0..4 {
                    let nr = match chf.neighbor_index(x, y, i, dir) {
                        Some(n) => chf.spans[n].reg,
                        None => 0,
                    };
                    if nr == r {
                        continue;
                    }
                    if nr & BORDER_REG != 0 {
                        regions[r as usize].overlaps_border = true;
                    } else if nr != 0 && !regions[r as usize].connections.contains(&nr) {
                        regions[r as usize].connections.push(nr);
                    }
                }
            }
        }
    }

    // Drop small isolated regions.
    let mut remap = vec![0u16; nreg];
    for (id, reg) in regions.iter().enumerate().skip(1) {
        if reg.span_count > 0
            && reg.span_count < min_region_area
            && reg.connections.is_empty()
            && !reg.overlaps_border
        {
            remap[id] = 0;
        } else {
            remap[id] = id as u16;
        }
    }

    // Merge small regions into their smallest neighbour until stable.
    let mut changed = true;
    while changed {
        changed = false;
        for id in 1..nreg {
            if remap[id] != id as u16 {
                continue;
            }
            let span_count = regions[id].span_count;
            if span_count == 0 || span_count >= merge_region_area {
                continue;
            }
            // Smallest live neighbour.
            let mut best = 0usize;
            let mut best_size = i32::MAX;
            for &c in &regions[id].connections {
                let target = resolve(&remap, c as usize);
                if target == 0 || target == id {
                    continue;
                }
                if regions[target].span_count < best_size {
                    best_size = regions[target].span_count;
                    best = target;
                }
            }
            if best != 0 {
                remap[id] = best as u16;
                regions[best].span_count += span_count;
                regions[id].span_count = 0;
                changed = true;
            }
        }
    }

    // Compact ids.
    let mut compact = vec![0u16; nreg];
    let mut next_id = 0u16;
    for id in 1..nreg {
        let target = resolve(&remap, id);
        if target == 0 || regions[target].span_count == 0 {
            continue;
        }
        if compact[target] == 0 {
            next_id += 1;
            compact[target] = next_id;
        }
    }

    for span in &mut chf.spans {
        let r = span.reg;
        if r == 0 || r & BORDER_REG != 0 {
            continue;
        }
        let target = resolve(&remap, r as usize);
        span.reg = if target == 0 { 0 } else { compact[target] };
    }

    next_id
}

fn resolve(remap: &[u16], mut id: usize) -> usize {
    loop {
        let next = remap[id] as usize;
        if next == id || next == 0 {
            return next;
        }
        id = next;
    }
}

/// Marks the border band as border regions and returns the next region id.
fn mark_borders(chf: &mut CompactHeightfield, border_size: i32, mut next_id: u16) -> u16 {
    if border_size <= 0 {
        return next_id;
    }
    let w = chf.width;
    let h = chf.height;
    let bw = w.min(border_size);
    let bh = h.min(border_size);

    paint_rect_region(chf, 0, bw, 0, h, next_id | BORDER_REG);
    next_id += 1;
    paint_rect_region(chf, w - bw, w, 0, h, next_id | BORDER_REG);
    next_id += 1;
    paint_rect_region(chf, 0, w, 0, bh, next_id | BORDER_REG);
    next_id += 1;
    paint_rect_region(chf, 0, w, h - bh, h, next_id | BORDER_REG);
    next_id += 1;
    next_id
}

/// Watershed partitioning: flood regions from distance-field maxima.
pub fn build_regions(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    if chf.dist.is_empty() {
        build_distance_field(chf)?;
    }
    for span in &mut chf.spans {
        span.reg = 0;
    }

    let mut region_id = mark_borders(chf, border_size, 1);

    let expand_iters = 8;
    let mut level = (chf.max_distance + 1) & !1u16;

    while level > 0 {
        level = level.saturating_sub(2);

        // Grow current regions down to this water level.
        expand_regions(chf, level, expand_iters);

        // Flood new basins from yet-unclaimed spans at this level.
        for y in 0..chf.height {
            for x in 0..chf.width {
                let cell = chf.cell(x, y);
                for i in cell.index as usize..(cell.index + cell.count) as usize {
                    if chf.dist[i] < level || chf.spans[i].reg != 0 || chf.areas[i] == NULL_AREA {
                        continue;
                    }
                    if flood_region(chf, i, x, y, level, region_id) {
                        region_id += 1;
                    }
                }
            }
        }
    }

    // Final sweep picks up anything the levels missed.
    expand_regions(chf, 0, expand_iters * 8);

    chf.max_regions = merge_and_filter_regions(chf, min_region_area, merge_region_area, region_id);
    Ok(())
}

/// One sweep-column run for monotone partitioning.
#[derive(Clone, Copy, Default)]
struct SweepSpan {
    /// Final region id.
    id: u16,
    /// Samples merged from the previous row.
    ns: i32,
    /// Candidate neighbour region from the previous row.
    nei: u16,
}

/// Monotone partitioning: a left-to-right sweep emitting hole-free regions
/// without building a distance field.
pub fn build_regions_monotone(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    for span in &mut chf.spans {
        span.reg = 0;
    }
    let mut region_id = mark_borders(chf, border_size, 1);

    let w = chf.width;
    let h = chf.height;
    let mut prev_count = vec![0i32; 256];
    let mut sweeps: Vec<SweepSpan> = vec![SweepSpan::default(); w.max(16) as usize];

    for y in border_size..h - border_size.max(0) {
        if prev_count.len() < region_id as usize + 1 {
            prev_count.resize(region_id as usize + 1, 0);
        }
        prev_count.iter_mut().for_each(|c| *c = 0);
        // Sweep ids are row-local and 1-based so 0 stays "unassigned".
        let mut range_id = 1u16;

        for x in border_size..w - border_size.max(0) {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                if chf.areas[i] == NULL_AREA {
                    continue;
                }

                // Continue the run from the -x neighbour.
                let mut sid = 0u16;
                if let Some(n) = chf.neighbor_index(x, y, i, 0) {
                    if chf.spans[n].reg != 0
                        && chf.spans[n].reg & BORDER_REG == 0
                        && chf.areas[n] == chf.areas[i]
                    {
                        sid = chf.spans[n].reg;
                    }
                }
                if sid == 0 {
                    sid = range_id;
                    range_id += 1;
                    if sweeps.len() < range_id as usize {
                        sweeps.resize(range_id as usize, SweepSpan::default());
                    }
                    sweeps[sid as usize].ns = 0;
                    sweeps[sid as usize].nei = 0;
                }

                // Sample the -y neighbour's final region.
                if let Some(n) = chf.neighbor_index(x, y, i, 3) {
                    let nr = chf.spans[n].reg;
                    if nr != 0 && nr & BORDER_REG == 0 && chf.areas[n] == chf.areas[i] {
                        let sweep = &mut sweeps[sid as usize];
                        if sweep.nei == 0 || sweep.nei == nr {
                            sweep.nei = nr;
                            sweep.ns += 1;
                            prev_count[nr as usize] += 1;
                        } else {
                            sweep.nei = 0xffff;
                        }
                    }
                }

                chf.spans[i].reg = sid;
            }
        }

        // Resolve sweep ids into region ids. A sweep adopts its previous-row
        // neighbour only when that neighbour fed samples to no other sweep.
        for sid in 1..range_id {
            let sweep = &mut sweeps[sid as usize];
            if sweep.nei != 0
                && sweep.nei != 0xffff
                && prev_count[sweep.nei as usize] == sweep.ns
            {
                sweep.id = sweep.nei;
            } else {
                sweep.id = region_id;
                region_id += 1;
                if prev_count.len() < region_id as usize + 1 {
                    prev_count.resize(region_id as usize + 1, 0);
                }
            }
        }

        for x in border_size..w - border_size.max(0) {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let r = chf.spans[i].reg;
                if r > 0 && r < range_id {
                    chf.spans[i].reg = sweeps[r as usize].id;
                }
            }
        }
    }

    chf.max_regions = merge_and_filter_regions(chf, min_region_area, merge_region_area, region_id);
    Ok(())
}

/// Layered partitioning: monotone sweeps merged across rows wherever two
/// runs connect, yielding non-overlapping regions suited to tiles with many
/// small obstacles.
pub fn build_layer_regions(
    chf: &mut CompactHeightfield,
    border_size: i32,
    min_region_area: i32,
) -> Result<()> {
    build_regions_monotone(chf, border_size, min_region_area, 0)?;

    // Union regions that connect; connections never cross layers because
    // they are climb-limited, so merged regions stay non-overlapping.
    let nreg = chf.max_regions as usize + 1;
    let mut parent: Vec<u16> = (0..nreg as u16).collect();

    for y in 0..chf.height {
        for x in 0..chf.width {
            let cell = chf.cell(x, y);
            for i in cell.index as usize..(cell.index + cell.count) as usize {
                let r = chf.spans[i].reg;
                if r == 0 || r & BORDER_REG != 0 {
                    continue;
                }
                for dir in 0..4 {
                    if let Some(n) = chf.neighbor_index(x, y, i, dir) {
                        let nr = chf.spans[n].reg;
                        if nr != 0 && nr & BORDER_REG == 0 && nr != r && chf.areas[n] == chf.areas[i]
                        {
                            union(&mut parent, r, nr);
                        }
                    }
                }
            }
        }
    }

    // Compact the merged ids.
    let mut compact = vec![0u16; nreg];
    let mut next_id = 0u16;
    for span in &mut chf.spans {
        let r = span.reg;
        if r == 0 || r & BORDER_REG != 0 {
            continue;
        }
        let root = find(&mut parent, r) as usize;
        if compact[root] == 0 {
            next_id += 1;
            compact[root] = next_id;
        }
        span.reg = compact[root];
    }

    chf.max_regions = next_id;
    Ok(())
}

fn find(parent: &mut [u16], id: u16) -> u16 {
    let mut root = id;
    while parent[root as usize] != root {
        root = parent[root as usize];
    }
    let mut cur = id;
    while parent[cur as usize] != root {
        let next = parent[cur as usize];
        parent[cur as usize] = root;
        cur = next;
    }
    root
}

fn union(parent: &mut [u16], a: u16, b: u16) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi as usize] = lo;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heightfield::{Heightfield, WALKABLE_AREA};

    fn flat_compact(w: i32, h: i32) -> CompactHeightfield {
        let mut hf = Heightfield::new(w, h, [0.0; 3], [w as f32, h as f32, 10.0], 1.0, 1.0);
        for y in 0..h {
            for x in 0..w {
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        CompactHeightfield::build(2, 1, 0, &hf).unwrap()
    }

    /// Two 4-wide plates separated by a missing column.
    fn split_compact() -> CompactHeightfield {
        let mut hf = Heightfield::new(9, 4, [0.0; 3], [9.0, 4.0, 10.0], 1.0, 1.0);
        for y in 0..4 {
            for x in 0..9 {
                if x == 4 {
                    continue;
                }
                hf.add_span(x, y, 0, 1, WALKABLE_AREA, 1).unwrap();
            }
        }
        CompactHeightfield::build(2, 1, 0, &hf).unwrap()
    }

    #[test]
    fn test_distance_field() {
        let mut chf = flat_compact(9, 9);
        build_distance_field(&mut chf).unwrap();
        let rim = chf.cell(0, 4).index as usize;
        let centre = chf.cell(4, 4).index as usize;
        assert_eq!(chf.dist[rim], 0);
        assert!(chf.dist[centre] > chf.dist[rim]);
    }

    #[test]
    fn test_watershed_single_plate() {
        let mut chf = flat_compact(10, 10);
        build_regions(&mut chf, 0, 4, 20).unwrap();
        assert_eq!(chf.max_regions, 1);
        for span in &chf.spans {
            assert_eq!(span.reg, 1);
        }
    }

    #[test]
    fn test_watershed_two_plates() {
        let mut chf = split_compact();
        build_regions(&mut chf, 0, 2, 100).unwrap();
        assert_eq!(chf.max_regions, 2);

        let left = chf.cell(1, 1).index as usize;
        let right = chf.cell(7, 1).index as usize;
        assert_ne!(chf.spans[left].reg, 0);
        assert_ne!(chf.spans[right].reg, 0);
        assert_ne!(chf.spans[left].reg, chf.spans[right].reg);
    }

    #[test]
    fn test_monotone_two_plates() {
        let mut chf = split_compact();
        build_regions_monotone(&mut chf, 0, 2, 100).unwrap();
        let left = chf.cell(1, 1).index as usize;
        let right = chf.cell(7, 1).index as usize;
        assert_ne!(chf.spans[left].reg, 0);
        assert_ne!(chf.spans[right].reg, 0);
        assert_ne!(chf.spans[left].reg, chf.spans[right].reg);
    }

    #[test]
    fn test_layers_merges_connected_runs() {
        let mut chf = flat_compact(8, 8);
        build_layer_regions(&mut chf, 0, 2).unwrap();
        // A single connected plate collapses into one layer region.
        assert_eq!(chf.max_regions, 1);
    }

    #[test]
    fn test_border_regions_flagged() {
        let mut chf = flat_compact(12, 12);
        build_regions(&mut chf, 2, 2, 20).unwrap();
        let rim = chf.cell(0, 6).index as usize;
        assert_ne!(chf.spans[rim].reg & BORDER_REG, 0);
        let centre = chf.cell(6, 6).index as usize;
        assert_eq!(chf.spans[centre].reg & BORDER_REG, 0);
        assert_ne!(chf.spans[centre].reg, 0);
    }
}
