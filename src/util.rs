//! Small helpers shared across the codec, allocator and formatter modules.

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

/// Returns the current timestamp since the Unix epoch, as stored in inode
/// `atime`/`ctime`/`mtime` fields.
pub fn get_timestamp() -> Duration {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.unwrap_or(Duration::ZERO)
}

/// Ceiling integer division.
pub fn ceil_division(n: u64, d: u64) -> u64 {
	n.div_ceil(d)
}

/// Performs the log2 operation on the given integer.
///
/// If the result is undefined (`n == 0`), the function returns `None`.
pub fn log2(n: u64) -> Option<u32> {
	if n == 0 {
		None
	} else {
		Some(u64::BITS - 1 - n.leading_zeros())
	}
}

/// Rounds `n` up to the next multiple of 4, as required for directory
/// record alignment.
pub fn align4(n: u32) -> u32 {
	(n + 3) & !3
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn ceil_division_exact_and_remainder() {
		assert_eq!(ceil_division(8, 4), 2);
		assert_eq!(ceil_division(9, 4), 3);
		assert_eq!(ceil_division(0, 4), 0);
	}

	#[test]
	fn log2_powers_of_two() {
		assert_eq!(log2(1), Some(0));
		assert_eq!(log2(4096), Some(12));
		assert_eq!(log2(0), None);
	}

	#[test]
	fn align4_rounds_up() {
		assert_eq!(align4(0), 0);
		assert_eq!(align4(1), 4);
		assert_eq!(align4(13), 16);
		assert_eq!(align4(16), 16);
	}
}
