//! Defragmentation: repack every file extent into a gap-free prefix.
//!
//! Files are processed in ascending order of their current start block and
//! slid down toward block 1, one block at a time through a scratch buffer.
//! Because extents are disjoint and moves only go downward, an ascending
//! block-by-block copy never overwrites data it has yet to read. Afterwards
//! the tail of the disk is zeroed and the bitmap rebuilt from scratch.
//!
//! The operation cannot fail beyond the mount check; a crash mid-way leaves
//! the image undefined (there is no journal — an accepted limitation).

use crate::Volume;
use flatfs_error::Result;
use flatfs_types::{BlockIndex, SlotIndex, BITMAP_LEN, BLOCK_COUNT, BLOCK_SIZE};

impl Volume {
    pub(crate) fn defragment(&mut self) -> Result<()> {
        // Collect (slot, start, size) for every file; directories hold no
        // blocks. Starts are unique on a consistent volume, slot index
        // breaks ties deterministically anyway.
        let mut files: Vec<(SlotIndex, BlockIndex, u8)> = self
            .sb
            .records
            .iter()
            .enumerate()
            .filter(|(_, rec)| rec.is_used() && !rec.is_directory())
            .map(|(i, rec)| (SlotIndex(i as u8), rec.start_block(), rec.size_blocks()))
            .collect();
        files.sort_unstable_by_key(|&(slot, start, _)| (start, slot));

        let mut next_free: u8 = 1;
        let mut moved = 0usize;
        for &(slot, start, size) in &files {
            if start.0 != next_free {
                for i in 0..size {
                    let data = self.dev.read_block(BlockIndex(start.0 + i))?;
                    self.dev.write_block(BlockIndex(next_free + i), &data)?;
                }
                self.sb.records[slot.as_usize()].set_start_block(BlockIndex(next_free));
                moved += 1;
            }
            next_free += size;
        }

        // Everything past the packed prefix is garbage now; zero it.
        let zero = [0u8; BLOCK_SIZE];
        for block in next_free..BLOCK_COUNT as u8 {
            self.dev.write_block(BlockIndex(block), &zero)?;
        }

        // Rebuild the bitmap from the metadata block and the new extents.
        self.sb.free_block_list = [0u8; BITMAP_LEN];
        flatfs_alloc::set_used(&mut self.sb.free_block_list, BlockIndex::METADATA, true);
        for &(slot, _, size) in &files {
            let start = self.sb.records[slot.as_usize()].start_block();
            flatfs_alloc::mark_range(&mut self.sb.free_block_list, start, size, true);
        }

        self.persist()?;
        tracing::info!(
            disk = %self.disk,
            files = files.len(),
            moved,
            "defragmented volume"
        );
        Ok(())
    }
}
