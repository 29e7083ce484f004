//! Integrity primitives used by [`bb_wire`](../bb_wire/index.html) to detect
//! corruption on the wire.
//!
//! Two algorithms are offered: a portable Fletcher-32 that every host can
//! compute, and an optional hardware CRC32C (Castagnoly) fast path used when
//! the CPU advertises SSE4.2. Callers probe [`crc32c_hw_available`] once and
//! fall back to [`fletcher32`] when it returns `false`.

/// Block size (bytes) after which the running Fletcher sums are folded back
/// into 16 bits. Large enough that a single block can't carry either sum
/// past `u32::MAX`, small enough to fold often and avoid 64-bit sums.
const FLETCHER_BLOCK: usize = 360;

/// Compute the Fletcher-32 checksum of `bytes`.
///
/// Both running sums are seeded to `0xffff` rather than zero, so an empty
/// input returns the fully-reduced seed `0xffff_ffff` instead of zero — this
/// keeps an all-zero payload from colliding with "no payload" on the wire.
#[inline]
pub fn fletcher32(bytes: &[u8]) -> u32 {
	let mut sum1: u32 = 0xffff;
	let mut sum2: u32 = 0xffff;

	for block in bytes.chunks(FLETCHER_BLOCK) {
		for &b in block {
			sum1 += b as u32;
			sum2 += sum1;
		}

		sum1 = reduce(sum1);
		sum2 = reduce(sum2);
	}

	(sum2 << 16) | sum1
}

/// Fold a 32-bit accumulator back into the `[0, 0xffff]` range, mod `0xffff`.
#[inline]
fn reduce(mut x: u32) -> u32 {
	loop {
		let folded = (x & 0xffff) + (x >> 16);

		if folded == x {
			return folded;
		}

		x = folded;
	}
}

/// Compute CRC32C (Castagnoli, polynomial `0x1edc6f41`) using the CPU's
/// SSE4.2 `crc32` instruction, if present.
///
/// Returns `0` when hardware support is unavailable so callers can detect
/// the absence without a separate feature query — pair with
/// [`crc32c_hw_available`] before trusting a zero result as "checksum of
/// empty input" rather than "no hardware support".
#[inline]
pub fn crc32c_hw(bytes: &[u8]) -> u32 {
	#[cfg(target_arch = "x86_64")]
	{
		if crc32c_hw_available() {
			return unsafe { crc32c_sse42(bytes) };
		}
	}

	#[cfg(not(target_arch = "x86_64"))]
	let _ = bytes;

	0
}

/// Probe whether the running CPU supports the SSE4.2 `crc32` instruction.
///
/// On x86_64 this is bit 20 of ECX for CPUID leaf 1. All other
/// architectures report `false` since they have no hardware path here.
#[inline]
pub fn crc32c_hw_available() -> bool {
	#[cfg(target_arch = "x86_64")]
	{
		std::is_x86_feature_detected!("sse4.2")
	}

	#[cfg(not(target_arch = "x86_64"))]
	{
		false
	}
}

#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "sse4.2")]
unsafe fn crc32c_sse42(bytes: &[u8]) -> u32 {
	use core::arch::x86_64::{_mm_crc32_u64, _mm_crc32_u8};

	let mut crc: u64 = 0xffff_ffff;

	let (chunks, rem) = {
		let chunks = bytes.chunks_exact(8);
		let rem = chunks.remainder();
		(chunks, rem)
	};

	for chunk in chunks {
		let word = u64::from_ne_bytes(chunk.try_into().unwrap());
		crc = _mm_crc32_u64(crc, word);
	}

	for &b in rem {
		crc = _mm_crc32_u8(crc as u32, b) as u64;
	}

	!(crc as u32)
}
