//! The error taxonomy shared by every operation in the crate.

use std::io;
use thiserror::Error;

/// Every way an operation on a mounted filesystem can fail.
#[derive(Debug, Error)]
pub enum Error {
	/// A path component does not exist.
	#[error("no such file or directory")]
	NotFound,
	/// A create-style operation targets a name that already exists.
	#[error("file exists")]
	Exists,
	/// An operation that requires a directory was given something else.
	#[error("not a directory")]
	NotDirectory,
	/// An operation that requires a non-directory was given a directory.
	#[error("is a directory")]
	IsDirectory,
	/// `rmdir` on a directory that still has user entries.
	#[error("directory not empty")]
	NotEmpty,
	/// An fd does not refer to an open file.
	#[error("bad file descriptor")]
	BadDescriptor,
	/// Read on a write-only fd, or write on a read-only fd.
	#[error("permission denied")]
	AccessDenied,
	/// The block or inode allocator is exhausted.
	#[error("no space left on device")]
	NoSpace,
	/// Symlink resolution exceeded the depth bound.
	#[error("too many levels of symbolic links")]
	TooManyLinks,
	/// A malformed request: inode 0, an oversized path, a corrupt on-disk
	/// structure encountered while decoding.
	#[error("invalid argument: {0}")]
	Invalid(&'static str),
	/// The underlying block device failed, or on-disk metadata was found to
	/// be inconsistent (bad magic, out-of-range pointer) while reading.
	#[error("I/O error: {0}")]
	IoError(#[from] io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
