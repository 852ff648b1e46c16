//! The VFS façade: open-file table, POSIX-flavoured open/read/write/unlink
//! /mkdir/rmdir/readdir/link/symlink/stat/truncate, and deferred
//! reclamation. Grounded in spec §4.7; the `bitflags`-based `OpenFlags`
//! mirrors the pack's habit of modelling POSIX `O_*`/`S_IF*` constants as a
//! `bitflags!` type (the teacher itself reaches for `bitflags` for its own
//! mode/permission bitfields).

use crate::device::BLOCK_SIZE;
use crate::error::Error;
use crate::error::Result;
use crate::fs::Filesystem;
use crate::inode::Inode;
use crate::inode::S_IFDIR;
use crate::inode::S_IFLNK;
use crate::inode::S_IFREG;
use crate::directory::FileType;
use std::collections::HashMap;

bitflags::bitflags! {
	/// `O_*` open flags (spec §6). The low bits encode the access mode as a
	/// *value*, not independent bits, matching POSIX `fcntl.h`: test access
	/// with [`OpenFlags::access_mode`], not [`OpenFlags::contains`].
	#[derive(Clone, Copy, Debug, PartialEq, Eq)]
	pub struct OpenFlags: u32 {
		const RDONLY = 0;
		const WRONLY = 1;
		const RDWR = 2;
		const CREAT = 0o100;
		const TRUNC = 0o1000;
	}
}

impl OpenFlags {
	const ACCESS_MASK: u32 = 0o3;

	pub fn readable(self) -> bool {
		matches!(self.bits() & Self::ACCESS_MASK, 0 | 2)
	}

	pub fn writable(self) -> bool {
		matches!(self.bits() & Self::ACCESS_MASK, 1 | 2)
	}
}

/// An open file descriptor's in-memory state.
#[derive(Clone, Debug)]
pub struct OpenFile {
	pub inode_num: u64,
	pub path: String,
	pub flags: OpenFlags,
	pub offset: u64,
	pub inode: Inode,
}

/// A structured view of a resolved inode, returned by `stat`/`lstat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Stat {
	pub inode_num: u64,
	pub mode: u32,
	pub size: u64,
	pub uid: u32,
	pub gid: u32,
	pub atime: u32,
	pub mtime: u32,
	pub ctime: u32,
	pub links_count: u32,
}

/// The in-process open-file table: fd 3 upward, conventionally leaving 0-2
/// free for a caller's own stdio numbering.
#[derive(Default)]
pub struct OpenFileTable {
	files: HashMap<u32, OpenFile>,
	next_fd: u32,
}

impl OpenFileTable {
	pub fn new() -> Self {
		Self {
			files: HashMap::new(),
			next_fd: 3,
		}
	}

	fn insert(&mut self, file: OpenFile) -> u32 {
		let fd = self.next_fd;
		self.next_fd += 1;
		self.files.insert(fd, file);
		fd
	}

	pub fn is_empty(&self) -> bool {
		self.files.is_empty()
	}

	fn references(&self, inode_num: u64) -> bool {
		self.files.values().any(|f| f.inode_num == inode_num)
	}
}

impl Filesystem {
	/// Reads `len` bytes starting at `offset` from `inode`'s data stream,
	/// returning zeros for any hole. Shared by `read` and symlink-target
	/// reading.
	pub(crate) fn read_data_stream(&mut self, inode: &Inode, offset: u64, len: usize) -> Result<Vec<u8>> {
		let mut out = vec![0u8; len];
		let end = offset + len as u64;
		let mut pos = offset;
		while pos < end {
			let logical = pos / BLOCK_SIZE;
			let block_off = pos % BLOCK_SIZE;
			let chunk = ((BLOCK_SIZE - block_off).min(end - pos)) as usize;
			if let Some((_, _, physical)) = self.extent_find(inode, logical)? {
				let block = self.device.read_block(physical)?;
				let src = &block[block_off as usize..block_off as usize + chunk];
				out[(pos - offset) as usize..(pos - offset) as usize + chunk].copy_from_slice(src);
			}
			pos += chunk as u64;
		}
		Ok(out)
	}

	/// Writes `data` at `offset` into `inode`'s data stream, allocating or
	/// extending blocks as needed via the extent tree. Returns the new
	/// file size implied by this write (caller combines with the old size).
	fn write_data_stream(&mut self, inode: &mut Inode, offset: u64, data: &[u8]) -> Result<()> {
		let end = offset + data.len() as u64;
		let mut pos = offset;
		while pos < end {
			let logical = pos / BLOCK_SIZE;
			let block_off = pos % BLOCK_SIZE;
			let chunk = ((BLOCK_SIZE - block_off).min(end - pos)) as usize;
			let physical = match self.extent_find(inode, logical)? {
				Some((_, _, p)) => p,
				None => self.extent_insert_block(inode, logical as u32)?,
			};
			let mut block = if block_off == 0 && chunk as u64 == BLOCK_SIZE {
				vec![0u8; BLOCK_SIZE as usize]
			} else {
				self.device.read_block(physical)?
			};
			let src = &data[(pos - offset) as usize..(pos - offset) as usize + chunk];
			block[block_off as usize..block_off as usize + chunk].copy_from_slice(src);
			self.device.write_block(physical, &block)?;
			pos += chunk as u64;
		}
		Ok(())
	}

	/// Opens `path`, creating a fresh regular file if missing and `O_CREAT`
	/// is set.
	pub fn open(&mut self, path: &str, flags: OpenFlags, mode: u32) -> Result<u32> {
		let inode_num = match self.resolve(path, true) {
			Ok(i) => i,
			Err(Error::NotFound) if flags.contains(OpenFlags::CREAT) => {
				self.create_regular_file(path, mode)?
			}
			Err(e) => return Err(e),
		};
		let mut inode = self.get_inode(inode_num)?;
		if !inode.is_regular() {
			return Err(Error::IsDirectory);
		}
		if flags.contains(OpenFlags::TRUNC) {
			self.free_subtree(&mut inode)?;
			inode.size = 0;
			self.put_inode(inode_num, &inode)?;
		}
		let fd = self.open_files.insert(OpenFile {
			inode_num,
			path: path.to_string(),
			flags,
			offset: 0,
			inode,
		});
		Ok(fd)
	}

	fn create_regular_file(&mut self, path: &str, mode: u32) -> Result<u64> {
		let (parent_num, name) = self.split_parent(path)?;
		let mut parent = self.get_inode(parent_num)?;
		if !parent.is_dir() {
			return Err(Error::NotDirectory);
		}
		if self.dir_lookup(&parent, name.as_bytes())?.is_some() {
			return Err(Error::Exists);
		}
		let child_num = self.allocate_inode()?;
		let inode = Inode::new(S_IFREG | (mode & 0o7777), 1);
		self.put_inode(child_num, &inode)?;
		self.dir_add_entry(&mut parent, parent_num, name.as_bytes(), child_num, FileType::Regular)?;
		Ok(child_num)
	}

	fn split_parent<'a>(&mut self, path: &'a str) -> Result<(u64, &'a str)> {
		let trimmed = path.trim_end_matches('/');
		let (parent_path, name) = match trimmed.rfind('/') {
			Some(idx) => (&trimmed[..idx], &trimmed[idx + 1..]),
			None => ("", trimmed),
		};
		if name.is_empty() {
			return Err(Error::Invalid("path has no final component"));
		}
		let parent_num = self.resolve(parent_path, true)?;
		Ok((parent_num, name))
	}

	/// Reads up to `n` bytes. `off` overrides the descriptor's own offset
	/// without advancing it; omit to read-and-advance sequentially.
	pub fn read(&mut self, fd: u32, n: usize, off: Option<u64>) -> Result<Vec<u8>> {
		let file = self.open_files.files.get(&fd).ok_or(Error::BadDescriptor)?.clone();
		if !file.flags.readable() {
			return Err(Error::AccessDenied);
		}
		let start = off.unwrap_or(file.offset);
		let size = file.inode.size;
		let clipped = if start >= size { 0 } else { (size - start).min(n as u64) as usize };
		let data = self.read_data_stream(&file.inode, start, clipped)?;
		if off.is_none() {
			if let Some(f) = self.open_files.files.get_mut(&fd) {
				f.offset = start + data.len() as u64;
			}
		}
		Ok(data)
	}

	/// Writes `data`, extending the file and updating `mtime`.
	pub fn write(&mut self, fd: u32, data: &[u8], off: Option<u64>) -> Result<usize> {
		let file = self.open_files.files.get(&fd).ok_or(Error::BadDescriptor)?.clone();
		if !file.flags.writable() {
			return Err(Error::AccessDenied);
		}
		let start = off.unwrap_or(file.offset);
		let mut inode = file.inode;
		self.write_data_stream(&mut inode, start, data)?;
		let new_size = inode.size.max(start + data.len() as u64);
		inode.size = new_size;
		inode.mtime = crate::util::get_timestamp().as_secs() as u32;
		self.put_inode(file.inode_num, &inode)?;
		if let Some(f) = self.open_files.files.get_mut(&fd) {
			f.inode = inode;
			if off.is_none() {
				f.offset = start + data.len() as u64;
			}
		}
		Ok(data.len())
	}

	/// Closes `fd`, reclaiming the inode if it is both unlinked and
	/// unreferenced by any other open descriptor.
	pub fn close(&mut self, fd: u32) -> Result<()> {
		let file = self.open_files.files.remove(&fd).ok_or(Error::BadDescriptor)?;
		self.reclaim_if_orphaned(file.inode_num)
	}

	fn reclaim_if_orphaned(&mut self, inode_num: u64) -> Result<()> {
		let inode = self.get_inode(inode_num)?;
		if inode.links_count == 0 && !self.open_files.references(inode_num) {
			let mut inode = inode;
			self.free_subtree(&mut inode)?;
			self.free_inode(inode_num)?;
		}
		Ok(())
	}

	/// Removes a non-directory entry, decrementing the target's link count
	/// and reclaiming immediately if it is now both unlinked and unopened.
	pub fn unlink(&mut self, path: &str) -> Result<()> {
		let (parent_num, name) = self.split_parent(path)?;
		let parent = self.get_inode(parent_num)?;
		let child_num = self.dir_lookup(&parent, name.as_bytes())?.ok_or(Error::NotFound)?;
		let mut child = self.get_inode(child_num)?;
		if child.is_dir() {
			return Err(Error::IsDirectory);
		}
		self.dir_remove_entry(&parent, name.as_bytes())?;
		child.links_count -= 1;
		self.put_inode(child_num, &child)?;
		self.reclaim_if_orphaned(child_num)
	}

	/// Creates a new directory with "." and ".." entries.
	pub fn mkdir(&mut self, path: &str, mode: u32) -> Result<()> {
		let (parent_num, name) = self.split_parent(path)?;
		let mut parent = self.get_inode(parent_num)?;
		if !parent.is_dir() {
			return Err(Error::NotDirectory);
		}
		if self.dir_lookup(&parent, name.as_bytes())?.is_some() {
			return Err(Error::Exists);
		}
		let child_num = self.allocate_inode()?;
		let mut child = Inode::new(S_IFDIR | (mode & 0o7777), 2);
		let data_block = match self.extent_insert_block(&mut child, 0) {
			Ok(b) => b,
			Err(e) => {
				self.free_inode(child_num)?;
				return Err(e);
			}
		};
		child.size = BLOCK_SIZE;
		self.write_initial_dir_block(data_block, child_num, parent_num)?;
		self.put_inode(child_num, &child)?;
		self.dir_add_entry(&mut parent, parent_num, name.as_bytes(), child_num, FileType::Directory)?;
		parent.links_count += 1;
		self.put_inode(parent_num, &parent)?;
		Ok(())
	}

	/// Removes an empty directory (only "." and ".." remain).
	pub fn rmdir(&mut self, path: &str) -> Result<()> {
		if path.trim_end_matches('/').is_empty() {
			return Err(Error::Invalid("cannot remove the root directory"));
		}
		let (parent_num, name) = self.split_parent(path)?;
		let mut parent = self.get_inode(parent_num)?;
		let child_num = self.dir_lookup(&parent, name.as_bytes())?.ok_or(Error::NotFound)?;
		let mut child = self.get_inode(child_num)?;
		if !child.is_dir() {
			return Err(Error::NotDirectory);
		}
		let entries = self.dir_iterate(&child)?;
		if entries.iter().any(|(n, _, _)| n != b"." && n != b"..") {
			return Err(Error::NotEmpty);
		}
		self.dir_remove_entry(&parent, name.as_bytes())?;
		self.free_subtree(&mut child)?;
		self.free_inode(child_num)?;
		parent.links_count -= 1;
		self.put_inode(parent_num, &parent)?;
		Ok(())
	}

	/// Removes `path` recursively: files via `unlink`, directories via
	/// `rmdir`, post-order (children before the directory itself).
	pub fn rmdir_recursive(&mut self, path: &str) -> Result<()> {
		let inode_num = self.resolve(path, false)?;
		let inode = self.get_inode(inode_num)?;
		if !inode.is_dir() {
			return self.unlink(path);
		}
		let entries = self.dir_iterate(&inode)?;
		let base = path.trim_end_matches('/');
		for (name, _, _) in entries {
			if name == b"." || name == b".." {
				continue;
			}
			let name = String::from_utf8(name).map_err(|_| Error::Invalid("entry name is not valid UTF-8"))?;
			self.rmdir_recursive(&format!("{base}/{name}"))?;
		}
		self.rmdir(path)
	}

	/// Lists entry names other than "." and "..", in on-disk order.
	pub fn readdir(&mut self, path: &str) -> Result<Vec<String>> {
		let inode_num = self.resolve(path, true)?;
		let inode = self.get_inode(inode_num)?;
		if !inode.is_dir() {
			return Err(Error::NotDirectory);
		}
		let entries = self.dir_iterate(&inode)?;
		entries
			.into_iter()
			.filter(|(n, _, _)| n != b"." && n != b"..")
			.map(|(n, _, _)| String::from_utf8(n).map_err(|_| Error::Invalid("entry name is not valid UTF-8")))
			.collect()
	}

	/// Creates a hard link at `new_path` pointing at `target`'s inode.
	pub fn link(&mut self, target: &str, new_path: &str) -> Result<()> {
		let target_num = self.resolve(target, true)?;
		let mut target_inode = self.get_inode(target_num)?;
		if target_inode.is_dir() {
			return Err(Error::IsDirectory);
		}
		let (parent_num, name) = self.split_parent(new_path)?;
		let mut parent = self.get_inode(parent_num)?;
		if self.dir_lookup(&parent, name.as_bytes())?.is_some() {
			return Err(Error::Exists);
		}
		let file_type = if target_inode.is_symlink() {
			FileType::Symlink
		} else {
			FileType::Regular
		};
		self.dir_add_entry(&mut parent, parent_num, name.as_bytes(), target_num, file_type)?;
		target_inode.links_count += 1;
		self.put_inode(target_num, &target_inode)?;
		Ok(())
	}

	/// Creates a symlink at `new_path` with the given target bytes.
	pub fn symlink(&mut self, target: &[u8], new_path: &str) -> Result<()> {
		let (parent_num, name) = self.split_parent(new_path)?;
		let mut parent = self.get_inode(parent_num)?;
		if self.dir_lookup(&parent, name.as_bytes())?.is_some() {
			return Err(Error::Exists);
		}
		let child_num = self.allocate_inode()?;
		let mut child = Inode::new(S_IFLNK | 0o777, 1);
		if target.len() <= 48 {
			child.extent_root = crate::extent::ExtentRoot::inline_symlink_target(target);
		} else {
			if let Err(e) = self.extent_insert_block(&mut child, 0) {
				self.free_inode(child_num)?;
				return Err(e);
			}
			self.write_data_stream(&mut child, 0, target)?;
		}
		child.size = target.len() as u64;
		self.put_inode(child_num, &child)?;
		self.dir_add_entry(&mut parent, parent_num, name.as_bytes(), child_num, FileType::Symlink)?;
		Ok(())
	}

	/// Returns a structured view of the resolved inode, following the
	/// final symlink component.
	pub fn stat(&mut self, path: &str) -> Result<Stat> {
		let inode_num = self.resolve(path, true)?;
		Ok(Self::inode_to_stat(inode_num, &self.get_inode(inode_num)?))
	}

	/// Like `stat`, but does not follow a symlink at the final component.
	pub fn lstat(&mut self, path: &str) -> Result<Stat> {
		let inode_num = self.resolve(path, false)?;
		Ok(Self::inode_to_stat(inode_num, &self.get_inode(inode_num)?))
	}

	fn inode_to_stat(inode_num: u64, inode: &Inode) -> Stat {
		Stat {
			inode_num,
			mode: inode.mode,
			size: inode.size,
			uid: inode.uid,
			gid: inode.gid,
			atime: inode.atime,
			mtime: inode.mtime,
			ctime: inode.ctime,
			links_count: inode.links_count,
		}
	}

	/// Truncates (or extends with a hole) a regular file to `size`.
	pub fn truncate(&mut self, path: &str, size: u64) -> Result<()> {
		let inode_num = self.resolve(path, true)?;
		let mut inode = self.get_inode(inode_num)?;
		if !inode.is_regular() {
			return Err(Error::IsDirectory);
		}
		if size == 0 {
			self.free_subtree(&mut inode)?;
		}
		inode.size = size;
		inode.mtime = crate::util::get_timestamp().as_secs() as u32;
		self.put_inode(inode_num, &inode)?;
		Ok(())
	}
}
