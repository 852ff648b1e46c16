//! The mounted filesystem: owns the block device, the in-memory superblock
//! and group-descriptor vector, and the open-file table. `mount`/`unmount`
//! are `[ADDED]` in SPEC_FULL.md §4.10, grounded in the teacher's pattern
//! of a top-level struct that opens a device and owns everything derived
//! from it (`mkfs/src/ext2.rs`'s `Ext2Factory`, generalised here to a
//! long-lived mounted handle rather than a one-shot builder).

use crate::device::BlockDevice;
use crate::error::Error;
use crate::error::Result;
use crate::group::GroupDescriptor;
use crate::superblock::Superblock;
use crate::vfs::OpenFileTable;
use log::warn;

/// A mounted filesystem: the single entry point for every operation in the
/// crate once an image has been opened.
pub struct Filesystem {
	pub(crate) device: BlockDevice,
	pub(crate) superblock: Superblock,
	pub(crate) groups: Vec<GroupDescriptor>,
	pub(crate) open_files: OpenFileTable,
}

impl Filesystem {
	/// Mounts an already-open device: reads the superblock and group
	/// descriptors into memory. A checksum mismatch is logged, not fatal
	/// (SPEC_FULL.md §9 leaves checksum enforcement out of scope).
	pub fn mount(mut device: BlockDevice) -> Result<Self> {
		let sb_bytes = device.read_at(0, crate::superblock::SUPERBLOCK_SIZE)?;
		let superblock = Superblock::from_bytes(&sb_bytes)?;

		let mut check = superblock;
		check.update_checksum();
		if check.checksum != superblock.checksum {
			warn!("superblock checksum mismatch; continuing without enforcement");
		}

		let group_count = superblock.group_count();
		let mut groups = Vec::with_capacity(group_count as usize);
		for g in 0..group_count {
			let offset = GroupDescriptor::disk_offset(g);
			let bytes = device.read_at(offset, crate::group::GROUP_DESC_SIZE)?;
			groups.push(GroupDescriptor::from_bytes(&bytes)?);
		}

		Ok(Self {
			device,
			superblock,
			groups,
			open_files: OpenFileTable::new(),
		})
	}

	/// Flushes the device and consumes the handle. Refuses if any fd is
	/// still open, rather than silently leaking reclamation.
	pub fn unmount(mut self) -> Result<()> {
		if !self.open_files.is_empty() {
			return Err(Error::Invalid("cannot unmount with open file descriptors"));
		}
		self.device.flush()
	}

	/// The superblock's current free-block count.
	pub fn free_blocks(&self) -> u64 {
		self.superblock.free_blocks_count
	}

	/// The superblock's current free-inode count.
	pub fn free_inodes(&self) -> u64 {
		self.superblock.free_inodes_count
	}
}
