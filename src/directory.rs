//! Directory records: a chain of variable-length, 4-byte-aligned entries
//! tiling a directory's data stream exactly. Grounded in spec §4.5; no
//! teacher module models this directly (the teacher's directories, where
//! present, are plain ext2 fixed records), so the codec follows the
//! byte-packing conventions set by `superblock.rs`/`inode.rs` instead.

use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::fs::Filesystem;
use crate::inode::Inode;

/// Fixed header size of a directory record, before the variable-length name.
const RECORD_HEADER: u32 = 12 + 1 + 1;

/// Directory-entry file-type byte (spec §6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FileType {
	Unknown = 0,
	Regular = 1,
	Directory = 2,
	Symlink = 7,
}

impl FileType {
	pub fn from_byte(b: u8) -> Self {
		match b {
			1 => Self::Regular,
			2 => Self::Directory,
			7 => Self::Symlink,
			_ => Self::Unknown,
		}
	}
}

/// One directory record, decoded from a data block.
#[derive(Clone, Debug)]
pub struct DirEntry {
	pub inode_num: u64,
	pub entry_len: u32,
	pub file_type: FileType,
	pub name: Vec<u8>,
	/// Byte offset of this record within its block.
	pub offset_in_block: u32,
	/// Physical block the record lives in.
	pub physical_block: u64,
}

impl DirEntry {
	fn is_free(&self) -> bool {
		self.inode_num == 0
	}
}

fn required_len(name: &[u8]) -> u32 {
	crate::util::align4(RECORD_HEADER + name.len() as u32)
}

fn encode_record(buf: &mut [u8], inode_num: u64, entry_len: u32, file_type: FileType, name: &[u8]) {
	buf[0..4].copy_from_slice(&(inode_num as u32).to_le_bytes());
	buf[4..8].copy_from_slice(&entry_len.to_le_bytes());
	buf[8..12].copy_from_slice(&(name.len() as u32).to_le_bytes());
	buf[12] = file_type as u8;
	buf[13] = 0;
	buf[14..14 + name.len()].copy_from_slice(name);
	for b in &mut buf[14 + name.len()..entry_len as usize] {
		*b = 0;
	}
}

fn decode_record(buf: &[u8], offset_in_block: u32, physical_block: u64) -> Result<DirEntry> {
	if buf.len() < RECORD_HEADER as usize {
		return Err(Error::Invalid("directory record buffer too short"));
	}
	let inode_num = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as u64;
	let entry_len = u32::from_le_bytes(buf[4..8].try_into().unwrap());
	let name_len = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
	let file_type = FileType::from_byte(buf[12]);
	if RECORD_HEADER as usize + name_len > buf.len() {
		return Err(Error::Invalid("directory record name overruns block"));
	}
	let name = buf[14..14 + name_len].to_vec();
	Ok(DirEntry {
		inode_num,
		entry_len,
		file_type,
		name,
		offset_in_block,
		physical_block,
	})
}

impl Filesystem {
	/// Walks `dir`'s records block by block, invoking `f` on each live
	/// (non-free) entry. `f` returning `Some` stops the walk early.
	fn scan_dir<T>(&mut self, dir: &Inode, mut f: impl FnMut(&DirEntry) -> Option<T>) -> Result<Option<T>> {
		let block_count = crate::util::ceil_division(dir.size, BLOCK_SIZE);
		for logical in 0..block_count {
			let Some((_, _, physical)) = self.extent_find(dir, logical)? else {
				continue;
			};
			let block = self.device.read_block(physical)?;
			let mut off = 0u32;
			while (off as u64) < BLOCK_SIZE {
				let entry = decode_record(&block[off as usize..], off, physical)?;
				if entry.entry_len == 0 {
					break;
				}
				if !entry.is_free() {
					if let Some(result) = f(&entry) {
						return Ok(Some(result));
					}
				}
				off += entry.entry_len;
			}
		}
		Ok(None)
	}

	/// Returns the inode number of `name` in `dir`, if present.
	pub fn dir_lookup(&mut self, dir: &Inode, name: &[u8]) -> Result<Option<u64>> {
		self.scan_dir(dir, |e| if e.name == name { Some(e.inode_num) } else { None })
	}

	/// Formats a freshly allocated, still-zeroed `block` as a brand new
	/// directory's sole data block: "." and ".." back to back, filling it
	/// exactly (spec §4.7's `mkdir`, which writes these two records
	/// directly rather than through `dir_add_entry`'s free-slot scan,
	/// since a zeroed block has no free-slot record to find yet).
	pub(crate) fn write_initial_dir_block(&mut self, block: u64, self_inode: u64, parent_inode: u64) -> Result<()> {
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		let dot_len = required_len(b".");
		let dotdot_len = BLOCK_SIZE as u32 - dot_len;
		encode_record(&mut buf[0..dot_len as usize], self_inode, dot_len, FileType::Directory, b".");
		encode_record(
			&mut buf[dot_len as usize..],
			parent_inode,
			dotdot_len,
			FileType::Directory,
			b"..",
		);
		self.device.write_block(block, &buf)
	}

	/// Adds a directory entry for `name` → `child_inode`, growing `dir` by
	/// one block if no existing free slot fits.
	pub fn dir_add_entry(
		&mut self,
		dir: &mut Inode,
		dir_inode_num: u64,
		name: &[u8],
		child_inode: u64,
		file_type: FileType,
	) -> Result<()> {
		let needed = required_len(name);
		let block_count = crate::util::ceil_division(dir.size, BLOCK_SIZE);

		for logical in 0..block_count {
			let Some((_, _, physical)) = self.extent_find(dir, logical)? else {
				continue;
			};
			let mut block = self.device.read_block(physical)?;
			let mut off = 0u32;
			while (off as u64) < BLOCK_SIZE {
				let entry = decode_record(&block[off as usize..], off, physical)?;
				if entry.entry_len == 0 {
					break;
				}
				if entry.is_free() && entry.entry_len >= needed {
					if entry.entry_len - needed >= RECORD_HEADER {
						let remainder_len = entry.entry_len - needed;
						encode_record(
							&mut block[off as usize..(off + needed) as usize],
							child_inode,
							needed,
							file_type,
							name,
						);
						let rem_off = (off + needed) as usize;
						encode_record(
							&mut block[rem_off..rem_off + remainder_len as usize],
							0,
							remainder_len,
							FileType::Unknown,
							&[],
						);
					} else {
						encode_record(
							&mut block[off as usize..(off + entry.entry_len) as usize],
							child_inode,
							entry.entry_len,
							file_type,
							name,
						);
					}
					self.device.write_block(physical, &block)?;
					return Ok(());
				}
				off += entry.entry_len;
			}
		}

		// no free slot anywhere: grow the directory by one block.
		let logical = block_count as u32;
		let new_block = self.extent_insert_block(dir, logical)?;
		let mut block = vec![0u8; BLOCK_SIZE as usize];
		encode_record(&mut block[0..needed as usize], child_inode, needed, file_type, name);
		let remainder = BLOCK_SIZE as u32 - needed;
		if remainder > 0 {
			encode_record(&mut block[needed as usize..], 0, remainder, FileType::Unknown, &[]);
		}
		self.device.write_block(new_block, &block)?;
		dir.size += BLOCK_SIZE;
		self.put_inode(dir_inode_num, dir)?;
		Ok(())
	}

	/// Removes the entry named `name` from `dir`, coalescing into a
	/// same-block predecessor or zeroing the victim's inode field.
	pub fn dir_remove_entry(&mut self, dir: &Inode, name: &[u8]) -> Result<()> {
		let block_count = crate::util::ceil_division(dir.size, BLOCK_SIZE);
		for logical in 0..block_count {
			let Some((_, _, physical)) = self.extent_find(dir, logical)? else {
				continue;
			};
			let mut block = self.device.read_block(physical)?;
			let mut prev_off: Option<u32> = None;
			let mut off = 0u32;
			while (off as u64) < BLOCK_SIZE {
				let entry = decode_record(&block[off as usize..], off, physical)?;
				if entry.entry_len == 0 {
					break;
				}
				if !entry.is_free() && entry.name == name {
					if let Some(poff) = prev_off {
						let prev = decode_record(&block[poff as usize..], poff, physical)?;
						let combined = prev.entry_len + entry.entry_len;
						block[poff as usize + 4..poff as usize + 8].copy_from_slice(&combined.to_le_bytes());
					} else {
						block[off as usize..off as usize + 4].copy_from_slice(&0u32.to_le_bytes());
					}
					self.device.write_block(physical, &block)?;
					return Ok(());
				}
				prev_off = Some(off);
				off += entry.entry_len;
			}
		}
		Err(Error::NotFound)
	}

	/// Returns the names of all live entries in `dir`, in on-disk order.
	pub fn dir_iterate(&mut self, dir: &Inode) -> Result<Vec<(Vec<u8>, u64, FileType)>> {
		let mut out = Vec::new();
		self.scan_dir::<()>(dir, |e| {
			out.push((e.name.clone(), e.inode_num, e.file_type));
			None
		})?;
		Ok(out)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn record_roundtrip() {
		let mut buf = vec![0u8; 32];
		encode_record(&mut buf, 7, 20, FileType::Directory, b"etc");
		let decoded = decode_record(&buf, 0, 1).unwrap();
		assert_eq!(decoded.inode_num, 7);
		assert_eq!(decoded.entry_len, 20);
		assert_eq!(decoded.name, b"etc");
		assert!(matches!(decoded.file_type, FileType::Directory));
	}

	#[test]
	fn required_len_is_four_byte_aligned() {
		assert_eq!(required_len(b"a") % 4, 0);
		assert_eq!(required_len(b"longer_name_here") % 4, 0);
	}

	#[test]
	fn free_slot_detected() {
		let mut buf = vec![0u8; 16];
		encode_record(&mut buf, 0, 16, FileType::Unknown, &[]);
		let decoded = decode_record(&buf, 0, 1).unwrap();
		assert!(decoded.is_free());
	}
}
