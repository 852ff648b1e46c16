//! The block device: a fixed-size image file addressed in `BLOCK_SIZE`
//! chunks, with positioned read/write. Adapted from the teacher's
//! `utils::disk` device-size probing, generalised into the full
//! read/write/flush surface the spec requires.

use crate::error::Error;
use crate::error::Result;
use std::fs::File;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::os::unix::fs::FileTypeExt;

/// The fixed block size of the filesystem, in bytes.
pub const BLOCK_SIZE: u64 = 4096;

/// A fixed-size image file addressed as a sequence of `BLOCK_SIZE` blocks.
pub struct BlockDevice {
	file: File,
	/// Total size of the device in bytes, cached at open time.
	len: u64,
}

impl BlockDevice {
	/// Wraps an already-open file as a block device.
	pub fn new(file: File) -> Result<Self> {
		let len = get_device_size(&file)?;
		Ok(Self { file, len })
	}

	/// The device's total size in bytes.
	pub fn len(&self) -> u64 {
		self.len
	}

	/// The device's total size in blocks.
	pub fn block_count(&self) -> u64 {
		self.len / BLOCK_SIZE
	}

	fn check_block_range(&self, block: u64, len: u64) -> Result<()> {
		let end = block
			.checked_add(len)
			.ok_or(Error::Invalid("block range overflow"))?;
		if end * BLOCK_SIZE > self.len {
			return Err(Error::IoError(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				"block access out of range",
			)));
		}
		Ok(())
	}

	/// Reads block `n` in full.
	pub fn read_block(&mut self, n: u64) -> Result<Vec<u8>> {
		self.check_block_range(n, 1)?;
		let mut buf = vec![0u8; BLOCK_SIZE as usize];
		self.file.seek(SeekFrom::Start(n * BLOCK_SIZE))?;
		self.file.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Writes block `n` in full. `data` must be exactly `BLOCK_SIZE` bytes.
	pub fn write_block(&mut self, n: u64, data: &[u8]) -> Result<()> {
		if data.len() as u64 != BLOCK_SIZE {
			return Err(Error::Invalid("write_block requires a full block"));
		}
		self.check_block_range(n, 1)?;
		self.file.seek(SeekFrom::Start(n * BLOCK_SIZE))?;
		self.file.write_all(data)?;
		Ok(())
	}

	/// Reads `len` bytes starting at byte offset `offset`, which may cross
	/// block boundaries.
	pub fn read_at(&mut self, offset: u64, len: usize) -> Result<Vec<u8>> {
		if offset + len as u64 > self.len {
			return Err(Error::IoError(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				"read past end of device",
			)));
		}
		let mut buf = vec![0u8; len];
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.read_exact(&mut buf)?;
		Ok(buf)
	}

	/// Writes `bytes` at byte offset `offset`, which may cross block
	/// boundaries.
	pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
		if offset + bytes.len() as u64 > self.len {
			return Err(Error::IoError(std::io::Error::new(
				std::io::ErrorKind::UnexpectedEof,
				"write past end of device",
			)));
		}
		self.file.seek(SeekFrom::Start(offset))?;
		self.file.write_all(bytes)?;
		Ok(())
	}

	/// Flushes pending writes to the underlying storage.
	pub fn flush(&mut self) -> Result<()> {
		self.file.flush()?;
		self.file.sync_data()?;
		Ok(())
	}
}

/// Returns the size in bytes of the given device, whether it is a regular
/// file (an image) or a block/character special device.
pub fn get_device_size(dev: &File) -> Result<u64> {
	let metadata = dev.metadata()?;
	let file_type = metadata.file_type();
	if file_type.is_block_device() || file_type.is_char_device() {
		#[cfg(target_os = "linux")]
		{
			use libc::ioctl;
			use std::os::fd::AsRawFd;
			const BLKGETSIZE64: libc::c_ulong = 0x80081272;
			let mut size: u64 = 0;
			let ret = unsafe { ioctl(dev.as_raw_fd(), BLKGETSIZE64, &mut size) };
			if ret < 0 {
				return Err(Error::IoError(std::io::Error::last_os_error()));
			}
			Ok(size)
		}
		#[cfg(not(target_os = "linux"))]
		{
			Ok(metadata.len())
		}
	} else {
		Ok(metadata.len())
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use std::fs::OpenOptions;

	fn make_image(blocks: u64) -> (tempfile::TempPath, File) {
		let tmp = tempfile::NamedTempFile::new().unwrap();
		tmp.as_file().set_len(blocks * BLOCK_SIZE).unwrap();
		let path = tmp.into_temp_path();
		let file = OpenOptions::new()
			.read(true)
			.write(true)
			.open(&path)
			.unwrap();
		(path, file)
	}

	#[test]
	fn read_write_roundtrip() {
		let (_path, file) = make_image(4);
		let mut dev = BlockDevice::new(file).unwrap();
		let mut data = vec![0u8; BLOCK_SIZE as usize];
		data[0] = 0xaa;
		data[4095] = 0x55;
		dev.write_block(2, &data).unwrap();
		let read = dev.read_block(2).unwrap();
		assert_eq!(read, data);
	}

	#[test]
	fn out_of_range_fails() {
		let (_path, file) = make_image(2);
		let mut dev = BlockDevice::new(file).unwrap();
		assert!(dev.read_block(5).is_err());
	}

	#[test]
	fn cross_block_read_at() {
		let (_path, file) = make_image(2);
		let mut dev = BlockDevice::new(file).unwrap();
		dev.write_at(BLOCK_SIZE - 2, &[1, 2, 3, 4]).unwrap();
		let read = dev.read_at(BLOCK_SIZE - 2, 4).unwrap();
		assert_eq!(read, vec![1, 2, 3, 4]);
	}
}
