//! Path tokenisation and resolution: walks component by component from the
//! root, handling "."/".." and symlink indirection with a depth bound.
//! Grounded in spec §4.6; no single teacher module matches (maestro's own
//! path walking lives in its kernel VFS, out of reach here), so this keeps
//! the crate's established explicit, `Result`-propagating style.

use crate::error::Error;
use crate::error::Result;
use crate::fs::Filesystem;
use crate::inode::ROOT_INODE;

/// Maximum symlink indirection depth before failing `TooManyLinks`.
pub const MAX_SYMLINK_DEPTH: u32 = 16;

/// Splits `path` into non-empty, non-"." components, applying ".." to pop
/// the running stack (never popping past an empty stack, i.e. `/..` stays
/// at root).
fn tokenize(path: &str) -> Vec<String> {
	let mut stack: Vec<String> = Vec::new();
	for part in path.split('/') {
		match part {
			"" | "." => continue,
			".." => {
				stack.pop();
			}
			other => stack.push(other.to_string()),
		}
	}
	stack
}

impl Filesystem {
	/// Resolves `path` to an inode number. `follow_last` controls whether a
	/// symlink at the final component is itself followed (used by `stat` vs
	/// `lstat`, and by every other caller that wants the link's target).
	pub fn resolve(&mut self, path: &str, follow_last: bool) -> Result<u64> {
		self.resolve_at(path, follow_last, 0)
	}

	fn resolve_at(&mut self, path: &str, follow_last: bool, depth: u32) -> Result<u64> {
		if path.is_empty() || path == "/" {
			return Ok(ROOT_INODE);
		}
		if depth > MAX_SYMLINK_DEPTH {
			return Err(Error::TooManyLinks);
		}
		let components = tokenize(path);
		let mut current = ROOT_INODE;
		let last_idx = components.len().saturating_sub(1);
		for (i, component) in components.iter().enumerate() {
			let dir_inode = self.get_inode(current)?;
			if !dir_inode.is_dir() {
				return Err(Error::NotDirectory);
			}
			let child = self
				.dir_lookup(&dir_inode, component.as_bytes())?
				.ok_or(Error::NotFound)?;
			let is_last = i == last_idx;
			let child_inode = self.get_inode(child)?;
			if child_inode.is_symlink() && (follow_last || !is_last) {
				let target = self.read_symlink_target(&child_inode)?;
				let target = String::from_utf8(target)
					.map_err(|_| Error::Invalid("symlink target is not valid UTF-8"))?;
				current = self.resolve_at(&target, true, depth + 1)?;
			} else {
				current = child;
			}
		}
		Ok(current)
	}

	/// Reads a symlink's target bytes: inline in the extent root for short
	/// targets, or from the data stream like a regular file otherwise.
	pub fn read_symlink_target(&mut self, inode: &crate::inode::Inode) -> Result<Vec<u8>> {
		if inode.size <= 48 {
			return Ok(inode.extent_root.read_inline_symlink_target(inode.size as usize));
		}
		self.read_data_stream(inode, 0, inode.size as usize)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn tokenize_drops_empties_and_dot() {
		assert_eq!(tokenize("/a//b/./c/"), vec!["a", "b", "c"]);
	}

	#[test]
	fn tokenize_handles_dotdot() {
		assert_eq!(tokenize("/a/b/../c"), vec!["a", "c"]);
		assert_eq!(tokenize("/../a"), vec!["a"]);
	}

	#[test]
	fn tokenize_root_is_empty() {
		assert!(tokenize("/").is_empty());
		assert!(tokenize("").is_empty());
	}
}
