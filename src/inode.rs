//! The inode record (88 bytes) and inode-table I/O. The `(group, index) ->
//! disk offset` resolution follows the teacher's `INode::get_disk_offset`
//! (`mkfs/src/ext2.rs`), generalised to 64-bit block numbers and this
//! spec's field layout.

use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::extent::ExtentRoot;
use crate::fs::Filesystem;

/// Size in bytes of a packed inode record.
pub const INODE_SIZE: usize = 88;

/// File-type bits of `mode` (the `S_IFMT` mask and friends).
pub const S_IFMT: u32 = 0o170000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFIFO: u32 = 0o010000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFSOCK: u32 = 0o140000;

/// The inode number of the root directory.
pub const ROOT_INODE: u64 = 2;

/// A filesystem object's metadata: ownership, times, size, link count, and
/// the root of its extent tree (or, for a short symlink, its inline
/// target).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Inode {
	pub mode: u32,
	pub uid: u32,
	pub gid: u32,
	pub size: u64,
	pub links_count: u32,
	pub atime: u32,
	pub ctime: u32,
	pub mtime: u32,
	pub flags: u32,
	pub extent_root: ExtentRoot,
}

impl Inode {
	/// Builds a fresh inode of the given `mode`, empty extent tree, current
	/// timestamps, and the given initial `links_count`.
	pub fn new(mode: u32, links_count: u32) -> Self {
		let now = crate::util::get_timestamp().as_secs() as u32;
		Self {
			mode,
			uid: 0,
			gid: 0,
			size: 0,
			links_count,
			atime: now,
			ctime: now,
			mtime: now,
			flags: 0,
			extent_root: ExtentRoot::empty(),
		}
	}

	/// The file-type nibble of `mode` (`S_IFMT` masked).
	pub fn file_type(&self) -> u32 {
		self.mode & S_IFMT
	}

	pub fn is_dir(&self) -> bool {
		self.file_type() == S_IFDIR
	}

	pub fn is_regular(&self) -> bool {
		self.file_type() == S_IFREG
	}

	pub fn is_symlink(&self) -> bool {
		self.file_type() == S_IFLNK
	}

	/// `true` when the bitmap bit is clear and link count is zero: a free
	/// slot in the inode table.
	pub fn is_free(&self) -> bool {
		self.links_count == 0
	}

	pub fn to_bytes(&self) -> [u8; INODE_SIZE] {
		let mut buf = [0u8; INODE_SIZE];
		let size_lo = self.size as u32;
		let size_hi = (self.size >> 32) as u32;
		buf[0..4].copy_from_slice(&self.mode.to_le_bytes());
		buf[4..8].copy_from_slice(&self.uid.to_le_bytes());
		buf[8..12].copy_from_slice(&size_lo.to_le_bytes());
		buf[12..16].copy_from_slice(&self.gid.to_le_bytes());
		buf[16..20].copy_from_slice(&self.links_count.to_le_bytes());
		buf[20..24].copy_from_slice(&size_hi.to_le_bytes());
		buf[24..28].copy_from_slice(&self.atime.to_le_bytes());
		buf[28..32].copy_from_slice(&self.ctime.to_le_bytes());
		buf[32..36].copy_from_slice(&self.mtime.to_le_bytes());
		buf[36..40].copy_from_slice(&self.flags.to_le_bytes());
		buf[40..88].copy_from_slice(&self.extent_root.to_bytes());
		buf
	}

	pub fn from_bytes(buf: &[u8]) -> Result<Self> {
		if buf.len() < INODE_SIZE {
			return Err(Error::Invalid("inode buffer too short"));
		}
		let size_lo = u32::from_le_bytes(buf[8..12].try_into().unwrap());
		let size_hi = u32::from_le_bytes(buf[20..24].try_into().unwrap());
		Ok(Self {
			mode: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
			uid: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
			gid: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
			links_count: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
			size: ((size_hi as u64) << 32) | size_lo as u64,
			atime: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
			ctime: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
			mtime: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
			flags: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
			extent_root: ExtentRoot::from_bytes(&buf[40..88])?,
		})
	}

	/// The number of logical blocks the file's current size spans.
	pub fn logical_block_count(&self) -> u64 {
		crate::util::ceil_division(self.size, BLOCK_SIZE)
	}
}

impl Filesystem {
	/// Resolves inode number `i` to `(group, index-in-group, byte offset)`.
	fn locate_inode(&self, i: u64) -> Result<(u32, u64, u64)> {
		if i == 0 || i > self.superblock.total_inodes {
			return Err(Error::Invalid("inode number out of range"));
		}
		let group = ((i - 1) / self.superblock.inodes_per_group) as u32;
		let index = (i - 1) % self.superblock.inodes_per_group;
		let gd = &self.groups[group as usize];
		let offset = gd.inode_table_block * BLOCK_SIZE + index * INODE_SIZE as u64;
		Ok((group, index, offset))
	}

	/// Reads inode `i` from the inode table.
	pub fn get_inode(&mut self, i: u64) -> Result<Inode> {
		let (_, _, offset) = self.locate_inode(i)?;
		let bytes = self.device.read_at(offset, INODE_SIZE)?;
		Inode::from_bytes(&bytes)
	}

	/// Writes `inode` back to its slot in the inode table.
	pub fn put_inode(&mut self, i: u64, inode: &Inode) -> Result<()> {
		let (_, _, offset) = self.locate_inode(i)?;
		self.device.write_at(offset, &inode.to_bytes())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn roundtrip_regular_file() {
		let mut ino = Inode::new(S_IFREG | 0o644, 1);
		ino.size = 0x1_0000_0003;
		ino.uid = 1000;
		let bytes = ino.to_bytes();
		let decoded = Inode::from_bytes(&bytes).unwrap();
		assert_eq!(ino, decoded);
		assert_eq!(decoded.size, 0x1_0000_0003);
	}

	#[test]
	fn type_predicates() {
		assert!(Inode::new(S_IFDIR | 0o755, 2).is_dir());
		assert!(Inode::new(S_IFREG | 0o644, 1).is_regular());
		assert!(Inode::new(S_IFLNK | 0o777, 1).is_symlink());
	}

	#[test]
	fn logical_block_count() {
		let mut ino = Inode::new(S_IFREG, 1);
		ino.size = 0;
		assert_eq!(ino.logical_block_count(), 0);
		ino.size = 1;
		assert_eq!(ino.logical_block_count(), 1);
		ino.size = BLOCK_SIZE;
		assert_eq!(ino.logical_block_count(), 1);
		ino.size = BLOCK_SIZE + 1;
		assert_eq!(ino.logical_block_count(), 2);
	}
}
