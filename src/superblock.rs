//! The superblock: 56 bytes at offset 0 of the image. Field layout and
//! defaults are grounded in the teacher's `Superblock` (`mkfs/src/ext2.rs`),
//! re-derived for this crate's on-disk format and packed/unpacked
//! explicitly rather than via `#[repr(C, packed)]` reinterpretation.

use crate::checksum::superblock_checksum;
use crate::error::Error;
use crate::error::Result;

/// Size in bytes of the packed superblock.
pub const SUPERBLOCK_SIZE: usize = 56;
/// Default blocks per group.
pub const DEFAULT_BLOCKS_PER_GROUP: u32 = 8192;
/// Default inodes per group.
pub const DEFAULT_INODES_PER_GROUP: u64 = 2048;

/// The filesystem superblock, stored at byte offset 0 of the image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Superblock {
	pub fs_size_blocks: u64,
	pub block_size: u32,
	pub blocks_per_group: u32,
	pub inodes_per_group: u64,
	pub total_inodes: u64,
	pub free_blocks_count: u64,
	pub free_inodes_count: u64,
	pub first_data_block: u32,
	pub checksum: u32,
}

impl Superblock {
	/// The number of block groups implied by this superblock.
	pub fn group_count(&self) -> u64 {
		crate::util::ceil_division(self.fs_size_blocks, self.blocks_per_group as u64)
	}

	/// Recomputes and stores `checksum` over the other fields.
	pub fn update_checksum(&mut self) {
		let mut bytes = self.to_bytes();
		// checksum covers only the preceding 52 bytes
		self.checksum = superblock_checksum(&bytes[..52]);
		bytes[52..56].copy_from_slice(&self.checksum.to_le_bytes());
	}

	/// Packs the superblock into its 56-byte little-endian wire format.
	pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
		let mut buf = [0u8; SUPERBLOCK_SIZE];
		buf[0..8].copy_from_slice(&self.fs_size_blocks.to_le_bytes());
		buf[8..12].copy_from_slice(&self.block_size.to_le_bytes());
		buf[12..16].copy_from_slice(&self.blocks_per_group.to_le_bytes());
		buf[16..24].copy_from_slice(&self.inodes_per_group.to_le_bytes());
		buf[24..32].copy_from_slice(&self.total_inodes.to_le_bytes());
		buf[32..40].copy_from_slice(&self.free_blocks_count.to_le_bytes());
		buf[40..48].copy_from_slice(&self.free_inodes_count.to_le_bytes());
		buf[48..52].copy_from_slice(&self.first_data_block.to_le_bytes());
		buf[52..56].copy_from_slice(&self.checksum.to_le_bytes());
		buf
	}

	/// Unpacks a superblock from 56 bytes. Fails if the block size is not
	/// the fixed 4096 this crate supports.
	pub fn from_bytes(buf: &[u8]) -> Result<Self> {
		if buf.len() < SUPERBLOCK_SIZE {
			return Err(Error::Invalid("superblock buffer too short"));
		}
		let sb = Self {
			fs_size_blocks: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
			block_size: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
			blocks_per_group: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
			inodes_per_group: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
			total_inodes: u64::from_le_bytes(buf[24..32].try_into().unwrap()),
			free_blocks_count: u64::from_le_bytes(buf[32..40].try_into().unwrap()),
			free_inodes_count: u64::from_le_bytes(buf[40..48].try_into().unwrap()),
			first_data_block: u32::from_le_bytes(buf[48..52].try_into().unwrap()),
			checksum: u32::from_le_bytes(buf[52..56].try_into().unwrap()),
		};
		if sb.block_size as u64 != crate::device::BLOCK_SIZE {
			return Err(Error::Invalid("unsupported block size"));
		}
		Ok(sb)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn sample() -> Superblock {
		Superblock {
			fs_size_blocks: 25600,
			block_size: 4096,
			blocks_per_group: DEFAULT_BLOCKS_PER_GROUP,
			inodes_per_group: DEFAULT_INODES_PER_GROUP,
			total_inodes: 2048,
			free_blocks_count: 25000,
			free_inodes_count: 2000,
			first_data_block: 1,
			checksum: 0,
		}
	}

	#[test]
	fn roundtrip() {
		let mut sb = sample();
		sb.update_checksum();
		let bytes = sb.to_bytes();
		let decoded = Superblock::from_bytes(&bytes).unwrap();
		assert_eq!(sb, decoded);
	}

	#[test]
	fn group_count_rounds_up() {
		let mut sb = sample();
		sb.fs_size_blocks = DEFAULT_BLOCKS_PER_GROUP as u64 + 1;
		assert_eq!(sb.group_count(), 2);
	}

	#[test]
	fn rejects_bad_block_size() {
		let mut sb = sample();
		sb.block_size = 1024;
		let bytes = sb.to_bytes();
		assert!(Superblock::from_bytes(&bytes).is_err());
	}
}
