//! The formatter: lays out a fresh image and returns it already mounted.
//! Grounded in the teacher's `Ext2Factory::create` (`mkfs/src/ext2.rs`):
//! same "bitmaps-then-inode-table contiguous per group, bulk-prefill the
//! reserved prefix" approach, re-derived for this spec's fixed-size
//! superblock/group-descriptor/inode records instead of the teacher's
//! `#[repr(C, packed)]` ext2 structs.

use crate::device::BlockDevice;
use crate::device::BLOCK_SIZE;
use crate::error::Result;
use crate::fs::Filesystem;
use crate::group::fill_bitmap_prefix;
use crate::group::inode_table_blocks;
use crate::group::mark_bitmap_padding;
use crate::group::GroupDescriptor;
use crate::group::GROUP_DESC_SIZE;
use crate::inode::Inode;
use crate::inode::ROOT_INODE;
use crate::inode::S_IFDIR;
use crate::superblock::Superblock;
use crate::superblock::DEFAULT_BLOCKS_PER_GROUP;
use crate::superblock::DEFAULT_INODES_PER_GROUP;
use crate::superblock::SUPERBLOCK_SIZE;
use log::info;

/// Builder for the parameters of a fresh filesystem image, mirroring the
/// teacher's `Ext2Factory` optional-field builder.
#[derive(Default)]
pub struct FormatOptions {
	blocks_per_group: Option<u32>,
	inodes_per_group: Option<u64>,
}

impl FormatOptions {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn blocks_per_group(mut self, n: u32) -> Self {
		self.blocks_per_group = Some(n);
		self
	}

	pub fn inodes_per_group(mut self, n: u64) -> Self {
		self.inodes_per_group = Some(n);
		self
	}

	/// Lays out a fresh filesystem on `device` and returns it mounted.
	/// `device`'s existing size determines `fs_size_blocks`.
	pub fn format(self, device: BlockDevice) -> Result<Filesystem> {
		let blocks_per_group = self.blocks_per_group.unwrap_or(DEFAULT_BLOCKS_PER_GROUP);
		let inodes_per_group = self.inodes_per_group.unwrap_or(DEFAULT_INODES_PER_GROUP);
		format_device(device, blocks_per_group, inodes_per_group)
	}
}

fn format_device(mut device: BlockDevice, blocks_per_group: u32, inodes_per_group: u64) -> Result<Filesystem> {
	let fs_size_blocks = device.block_count();
	let group_count = crate::util::ceil_division(fs_size_blocks, blocks_per_group as u64);
	let total_inodes = group_count * inodes_per_group;

	let bgdt_blocks = crate::util::ceil_division(group_count * GROUP_DESC_SIZE as u64, BLOCK_SIZE);
	let bgdt_end = 1 + bgdt_blocks;
	let table_blocks = inode_table_blocks(inodes_per_group);
	let metadata_per_group = 2 + table_blocks;
	let used_blocks_end = bgdt_end + group_count * metadata_per_group;

	info!(
		"formatting {fs_size_blocks} blocks across {group_count} group(s), {total_inodes} inodes"
	);

	let mut groups = Vec::with_capacity(group_count as usize);
	for g in 0..group_count {
		let metadata_off = bgdt_end + g * metadata_per_group;
		let block_bitmap_block = metadata_off;
		let inode_bitmap_block = metadata_off + 1;
		let inode_table_block = metadata_off + 2;

		let group_start = g * blocks_per_group as u64;
		let used_in_group = if group_start < used_blocks_end {
			(used_blocks_end - group_start).min(blocks_per_group as u64)
		} else {
			0
		};
		// the final group may run past the end of the device: those trailing
		// bits name blocks that don't physically exist.
		let group_block_count = fs_size_blocks.saturating_sub(group_start).min(blocks_per_group as u64);
		let padding = blocks_per_group as u64 - group_block_count;

		let mut block_bitmap = vec![0u8; BLOCK_SIZE as usize];
		fill_bitmap_prefix(&mut block_bitmap, used_in_group as usize);
		if padding > 0 {
			mark_bitmap_padding(&mut block_bitmap, group_block_count as usize, blocks_per_group as usize);
		}
		device.write_block(block_bitmap_block, &block_bitmap)?;

		let reserved_inodes = if g == 0 { ROOT_INODE as usize } else { 0 };
		let mut inode_bitmap = vec![0u8; BLOCK_SIZE as usize];
		fill_bitmap_prefix(&mut inode_bitmap, reserved_inodes);
		device.write_block(inode_bitmap_block, &inode_bitmap)?;

		let zero_block = vec![0u8; BLOCK_SIZE as usize];
		for b in 0..table_blocks {
			device.write_block(inode_table_block + b, &zero_block)?;
		}

		groups.push(GroupDescriptor {
			block_bitmap_block,
			inode_bitmap_block,
			inode_table_block,
			free_blocks_count: (blocks_per_group as u64 - used_in_group - padding) as u32,
			free_inodes_count: (inodes_per_group - reserved_inodes as u64) as u32,
		});
	}

	for (g, gd) in groups.iter().enumerate() {
		let offset = GroupDescriptor::disk_offset(g as u64);
		device.write_at(offset, &gd.to_bytes())?;
	}

	let mut superblock = Superblock {
		fs_size_blocks,
		block_size: BLOCK_SIZE as u32,
		blocks_per_group,
		inodes_per_group,
		total_inodes,
		free_blocks_count: groups.iter().map(|g| g.free_blocks_count as u64).sum(),
		free_inodes_count: groups.iter().map(|g| g.free_inodes_count as u64).sum(),
		first_data_block: used_blocks_end as u32,
		checksum: 0,
	};
	superblock.update_checksum();
	let mut sb_block = vec![0u8; SUPERBLOCK_SIZE];
	sb_block.copy_from_slice(&superblock.to_bytes());
	device.write_at(0, &sb_block)?;

	let mut fs = Filesystem::mount(device)?;

	let mut root = Inode::new(S_IFDIR | 0o755, 2);
	let root_block = fs.extent_insert_block(&mut root, 0)?;
	root.size = BLOCK_SIZE;
	fs.write_initial_dir_block(root_block, ROOT_INODE, ROOT_INODE)?;
	fs.put_inode(ROOT_INODE, &root)?;

	Ok(fs)
}

#[cfg(test)]
mod test {
	use super::*;
	use std::fs::OpenOptions;

	fn make_device(blocks: u64) -> BlockDevice {
		let tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.as_file().set_len(blocks * BLOCK_SIZE).unwrap();
		let path = tmp.into_temp_path();
		let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
		BlockDevice::new(file).unwrap()
	}

	#[test]
	fn format_produces_mountable_root() {
		let device = make_device(256);
		let mut fs = FormatOptions::new().format(device).unwrap();
		let root = fs.get_inode(ROOT_INODE).unwrap();
		assert!(root.is_dir());
		let entries = fs.dir_iterate(&root).unwrap();
		let names: Vec<_> = entries.iter().map(|(n, _, _)| n.clone()).collect();
		assert!(names.contains(&b".".to_vec()));
		assert!(names.contains(&b"..".to_vec()));
	}

	#[test]
	fn reserved_blocks_are_not_allocatable() {
		let device = make_device(256);
		let mut fs = FormatOptions::new().format(device).unwrap();
		assert!(fs.is_reserved_block(0));
		assert!(fs.is_reserved_block(1));
		assert!(!fs.is_reserved_block(200));
	}

	#[test]
	fn final_group_padding_excluded_from_free_count() {
		// 10,000 blocks over the default 8192-per-group split into a full
		// group and a partial 1808-block one; the partial group's 6384
		// padding blocks don't exist and must not be counted as free.
		let device = make_device(10_000);
		let fs = FormatOptions::new().format(device).unwrap();
		// metadata: 1 superblock + 1 BGDT block + 2 groups * (2 bitmaps +
		// 44 inode-table blocks) = 94, plus one block for the root directory.
		assert_eq!(fs.free_blocks(), 10_000 - 94 - 1);
	}
}
