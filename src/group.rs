//! Group descriptors and the per-group bitmap allocators. Grounded in the
//! teacher's `BlockGroupDescriptor::{get_disk_offset, read, write}` and
//! `fill_bitmap` (`mkfs/src/ext2.rs`), adapted to this spec's layout
//! (8-byte block numbers, explicit byte packing, separate block/inode
//! allocators operating on a mounted `Filesystem` rather than a
//! one-shot formatter).

use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::fs::Filesystem;

/// Size in bytes of a packed group descriptor.
pub const GROUP_DESC_SIZE: usize = 32;

/// A block group's metadata: where its bitmaps and inode table live, and
/// its free-space counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupDescriptor {
	pub block_bitmap_block: u64,
	pub inode_bitmap_block: u64,
	pub inode_table_block: u64,
	pub free_blocks_count: u32,
	pub free_inodes_count: u32,
}

impl GroupDescriptor {
	pub fn to_bytes(&self) -> [u8; GROUP_DESC_SIZE] {
		let mut buf = [0u8; GROUP_DESC_SIZE];
		buf[0..8].copy_from_slice(&self.block_bitmap_block.to_le_bytes());
		buf[8..16].copy_from_slice(&self.inode_bitmap_block.to_le_bytes());
		buf[16..24].copy_from_slice(&self.inode_table_block.to_le_bytes());
		buf[24..28].copy_from_slice(&self.free_blocks_count.to_le_bytes());
		buf[28..32].copy_from_slice(&self.free_inodes_count.to_le_bytes());
		buf
	}

	pub fn from_bytes(buf: &[u8]) -> Result<Self> {
		if buf.len() < GROUP_DESC_SIZE {
			return Err(Error::Invalid("group descriptor buffer too short"));
		}
		Ok(Self {
			block_bitmap_block: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
			inode_bitmap_block: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
			inode_table_block: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
			free_blocks_count: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
			free_inodes_count: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
		})
	}

	/// Byte offset of the `i`th group descriptor: the table starts
	/// immediately after the superblock's block (block 1).
	pub fn disk_offset(i: u64) -> u64 {
		BLOCK_SIZE + i * GROUP_DESC_SIZE as u64
	}
}

/// Number of blocks occupied by the inode table of a single group, derived
/// from the fixed 88-byte inode record (spec §9).
pub fn inode_table_blocks(inodes_per_group: u64) -> u64 {
	crate::util::ceil_division(inodes_per_group * crate::inode::INODE_SIZE as u64, BLOCK_SIZE)
}

/// Finds the lowest clear bit in `bitmap`, or `None` if all bits are set.
fn find_clear_bit(bitmap: &[u8]) -> Option<u32> {
	for (byte_idx, byte) in bitmap.iter().enumerate() {
		if *byte != 0xff {
			for bit in 0..8 {
				if byte & (1 << bit) == 0 {
					return Some((byte_idx * 8 + bit) as u32);
				}
			}
		}
	}
	None
}

fn set_bit(bitmap: &mut [u8], bit: u32) {
	bitmap[(bit / 8) as usize] |= 1 << (bit % 8);
}

fn clear_bit(bitmap: &mut [u8], bit: u32) {
	bitmap[(bit / 8) as usize] &= !(1 << (bit % 8));
}

fn is_bit_set(bitmap: &[u8], bit: u32) -> bool {
	bitmap[(bit / 8) as usize] & (1 << (bit % 8)) != 0
}

impl Filesystem {
	/// True if physical block `p` is a reserved metadata block that must
	/// never be handed out by the allocator: the superblock/BGDT blocks of
	/// group 0, or any group's bitmap/inode-table blocks.
	pub(crate) fn is_reserved_block(&self, p: u64) -> bool {
		let group = match self.group_of_block(p) {
			Some(g) => g,
			None => return true,
		};
		if group == 0 && (p == 0 || p == 1) {
			return true;
		}
		let gd = &self.groups[group as usize];
		let table_len = inode_table_blocks(self.superblock.inodes_per_group);
		p == gd.block_bitmap_block
			|| p == gd.inode_bitmap_block
			|| (gd.inode_table_block..gd.inode_table_block + table_len).contains(&p)
	}

	fn group_of_block(&self, p: u64) -> Option<u32> {
		if p >= self.superblock.fs_size_blocks {
			return None;
		}
		Some((p / self.superblock.blocks_per_group as u64) as u32)
	}

	/// Allocates a free inode, returning its 1-based number.
	pub fn allocate_inode(&mut self) -> Result<u64> {
		for group in 0..self.groups.len() as u32 {
			if self.groups[group as usize].free_inodes_count == 0 {
				continue;
			}
			let bitmap_block = self.groups[group as usize].inode_bitmap_block;
			let mut bitmap = self.device.read_block(bitmap_block)?;
			let bit = match find_clear_bit(&bitmap) {
				Some(b) => b,
				None => continue,
			};
			set_bit(&mut bitmap, bit);
			self.device.write_block(bitmap_block, &bitmap)?;
			self.groups[group as usize].free_inodes_count -= 1;
			self.superblock.free_inodes_count -= 1;
			self.write_group(group)?;
			self.write_superblock()?;
			return Ok(group as u64 * self.superblock.inodes_per_group + bit as u64 + 1);
		}
		Err(Error::NoSpace)
	}

	/// Frees a previously allocated inode. A double-free is a silent no-op.
	pub fn free_inode(&mut self, i: u64) -> Result<()> {
		if i == 0 {
			return Err(Error::Invalid("inode 0 is not valid"));
		}
		let group = ((i - 1) / self.superblock.inodes_per_group) as u32;
		let bit = ((i - 1) % self.superblock.inodes_per_group) as u32;
		let bitmap_block = self.groups[group as usize].inode_bitmap_block;
		let mut bitmap = self.device.read_block(bitmap_block)?;
		if !is_bit_set(&bitmap, bit) {
			return Ok(());
		}
		clear_bit(&mut bitmap, bit);
		self.device.write_block(bitmap_block, &bitmap)?;
		self.groups[group as usize].free_inodes_count += 1;
		self.superblock.free_inodes_count += 1;
		self.write_group(group)?;
		self.write_superblock()?;
		Ok(())
	}

	/// Allocates a free block, returning its physical block number.
	pub fn allocate_block(&mut self) -> Result<u64> {
		for group in 0..self.groups.len() as u32 {
			if self.groups[group as usize].free_blocks_count == 0 {
				continue;
			}
			let bitmap_block = self.groups[group as usize].block_bitmap_block;
			let mut bitmap = self.device.read_block(bitmap_block)?;
			let blocks_per_group = self.superblock.blocks_per_group;
			let found = (0..blocks_per_group).find(|&bit| {
				if is_bit_set(&bitmap, bit) {
					return false;
				}
				let physical = group as u64 * blocks_per_group as u64 + bit as u64;
				!self.is_reserved_block(physical)
			});
			let Some(bit) = found else {
				continue;
			};
			let physical = group as u64 * blocks_per_group as u64 + bit as u64;
			set_bit(&mut bitmap, bit);
			self.device.write_block(bitmap_block, &bitmap)?;
			self.groups[group as usize].free_blocks_count -= 1;
			self.superblock.free_blocks_count -= 1;
			self.write_group(group)?;
			self.write_superblock()?;
			return Ok(physical);
		}
		Err(Error::NoSpace)
	}

	/// Marks a specific physical block as used. Fails if it is already set
	/// or reserved. Used by the extent-extension fast path.
	pub fn allocate_block_at(&mut self, p: u64) -> Result<()> {
		if self.is_reserved_block(p) {
			return Err(Error::Invalid("cannot allocate a reserved block"));
		}
		let group = self
			.group_of_block(p)
			.ok_or(Error::Invalid("block out of range"))?;
		let bit = (p % self.superblock.blocks_per_group as u64) as u32;
		let bitmap_block = self.groups[group as usize].block_bitmap_block;
		let mut bitmap = self.device.read_block(bitmap_block)?;
		if is_bit_set(&bitmap, bit) {
			return Err(Error::Invalid("block already allocated"));
		}
		set_bit(&mut bitmap, bit);
		self.device.write_block(bitmap_block, &bitmap)?;
		self.groups[group as usize].free_blocks_count -= 1;
		self.superblock.free_blocks_count -= 1;
		self.write_group(group)?;
		self.write_superblock()?;
		Ok(())
	}

	/// Frees a block. Silently refuses to free a reserved block.
	pub fn free_block(&mut self, p: u64) -> Result<()> {
		if self.is_reserved_block(p) {
			return Ok(());
		}
		let group = match self.group_of_block(p) {
			Some(g) => g,
			None => return Ok(()),
		};
		let bit = (p % self.superblock.blocks_per_group as u64) as u32;
		let bitmap_block = self.groups[group as usize].block_bitmap_block;
		let mut bitmap = self.device.read_block(bitmap_block)?;
		if !is_bit_set(&bitmap, bit) {
			return Ok(());
		}
		clear_bit(&mut bitmap, bit);
		self.device.write_block(bitmap_block, &bitmap)?;
		self.groups[group as usize].free_blocks_count += 1;
		self.superblock.free_blocks_count += 1;
		self.write_group(group)?;
		self.write_superblock()?;
		Ok(())
	}

	pub(crate) fn write_group(&mut self, group: u32) -> Result<()> {
		let bytes = self.groups[group as usize].to_bytes();
		let off = GroupDescriptor::disk_offset(group as u64);
		self.device.write_at(off, &bytes)
	}

	pub(crate) fn write_superblock(&mut self) -> Result<()> {
		self.superblock.update_checksum();
		let bytes = self.superblock.to_bytes();
		self.device.write_at(0, &bytes)
	}
}

/// Fills `bitmap`'s first `end` bits with 1s (used slots) and the rest with
/// 0s, matching the teacher's `fill_bitmap` in `mkfs/src/ext2.rs`.
pub fn fill_bitmap_prefix(bitmap: &mut [u8], end: usize) {
	let set_bytes = end / 8;
	let remaining_bits = end % 8;
	bitmap[..set_bytes].fill(0xff);
	if remaining_bits != 0 {
		bitmap[set_bytes] = (1u8 << remaining_bits).wrapping_sub(1);
	}
}

/// Marks bits `[valid..total)` as used, the way ext2 pads a final, partial
/// block group: bits for blocks past the end of the device must never be
/// handed out, and must not count towards `free_blocks_count` either.
pub fn mark_bitmap_padding(bitmap: &mut [u8], valid: usize, total: usize) {
	for bit in valid..total {
		bitmap[bit / 8] |= 1 << (bit % 8);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn group_descriptor_roundtrip() {
		let gd = GroupDescriptor {
			block_bitmap_block: 2,
			inode_bitmap_block: 3,
			inode_table_block: 4,
			free_blocks_count: 8000,
			free_inodes_count: 2000,
		};
		let bytes = gd.to_bytes();
		assert_eq!(GroupDescriptor::from_bytes(&bytes).unwrap(), gd);
	}

	#[test]
	fn bit_helpers() {
		let mut bitmap = vec![0u8; 8];
		assert_eq!(find_clear_bit(&bitmap), Some(0));
		set_bit(&mut bitmap, 0);
		assert_eq!(find_clear_bit(&bitmap), Some(1));
		assert!(is_bit_set(&bitmap, 0));
		clear_bit(&mut bitmap, 0);
		assert!(!is_bit_set(&bitmap, 0));
	}

	#[test]
	fn fill_bitmap_prefix_aligned_and_unaligned() {
		let mut bitmap = vec![0u8; 4];
		fill_bitmap_prefix(&mut bitmap, 10);
		assert_eq!(bitmap[0], 0xff);
		assert_eq!(bitmap[1], 0b0000_0011);
		assert_eq!(bitmap[2], 0);
	}
}
