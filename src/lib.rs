//! A user-space, ext2/ext4-flavoured block-image filesystem library: a
//! block device, bitmap allocators, an extent B+ tree, a directory layer,
//! a path resolver, and a VFS façade on top, plus a formatter to bootstrap
//! a fresh image. See `SPEC_FULL.md` for the full design.

pub mod checksum;
pub mod device;
pub mod directory;
pub mod error;
pub mod extent;
pub mod format;
pub mod fs;
pub mod group;
pub mod inode;
pub mod path;
pub mod superblock;
pub mod util;
pub mod vfs;

pub use device::BlockDevice;
pub use device::BLOCK_SIZE;
pub use error::Error;
pub use error::Result;
pub use format::FormatOptions;
pub use fs::Filesystem;
pub use inode::Inode;
pub use inode::ROOT_INODE;
pub use vfs::OpenFlags;
pub use vfs::Stat;
