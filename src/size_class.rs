//! Size-class arithmetic for the pooled small-object range.
//!
//! Requests from 1 to [`MAX_SMALL_SIZE`] bytes map onto 56 classes across
//! six tiers of increasing granularity:
//!
//! | request bytes | granularity | classes |
//! |---------------|-------------|---------|
//! | 1..=128       | 8           | 0..=15  |
//! | 129..=256     | 16          | 16..=23 |
//! | 257..=512     | 32          | 24..=31 |
//! | 513..=1024    | 64          | 32..=39 |
//! | 1025..=2048   | 128         | 40..=47 |
//! | 2049..=4096   | 256         | 48..=55 |
//!
//! Small requests pay at most 7 bytes of rounding waste; the coarser upper
//! tiers trade waste for class count. Every class size is a multiple of
//! [`MIN_CLASS_SIZE`], which keeps carved block addresses aligned for the
//! in-place free-list link word.

/// Largest request served by the pool; anything bigger goes straight to the
/// heap source.
pub const MAX_SMALL_SIZE: usize = 4096;

/// Smallest class size. Also the link-word granularity: every class size,
/// carve length, and leftover remainder is a multiple of this.
pub const MIN_CLASS_SIZE: usize = 8;

/// Number of size classes.
pub const NUM_SIZE_CLASSES: usize = 56;

/// Exact byte size of each class, indexed by class number. The inverse of
/// [`class_index`] for in-domain sizes.
pub const CLASS_SIZES: [usize; NUM_SIZE_CLASSES] = [
    8, 16, 24, 32, 40, 48, 56, 64, 72, 80, 88, 96, 104, 112, 120, 128, // step 8
    144, 160, 176, 192, 208, 224, 240, 256, // step 16
    288, 320, 352, 384, 416, 448, 480, 512, // step 32
    576, 640, 704, 768, 832, 896, 960, 1024, // step 64
    1152, 1280, 1408, 1536, 1664, 1792, 1920, 2048, // step 128
    2304, 2560, 2816, 3072, 3328, 3584, 3840, 4096, // step 256
];

/// Rounding granularity of the tier containing `bytes`. Values above
/// [`MAX_SMALL_SIZE`] use the coarsest tier's granularity.
const fn tier_granularity(bytes: usize) -> usize {
    match bytes {
        ..=128 => 8,
        129..=256 => 16,
        257..=512 => 32,
        513..=1024 => 64,
        1025..=2048 => 128,
        _ => 256,
    }
}

/// Round `bytes` up to its tier granularity without any domain check.
///
/// The growth policy feeds this arbitrary byte counts (including 0 and
/// values past [`MAX_SMALL_SIZE`]); in-domain callers use [`round_up`].
pub(crate) const fn round_up_any(bytes: usize) -> usize {
    let align = tier_granularity(bytes);
    (bytes + align - 1) & !(align - 1)
}

/// Smallest class size that can hold `bytes`.
///
/// `bytes` must be in `1..=MAX_SMALL_SIZE`.
#[must_use]
pub const fn round_up(bytes: usize) -> usize {
    debug_assert!(bytes >= 1 && bytes <= MAX_SMALL_SIZE);
    round_up_any(bytes)
}

/// Index of the class serving a request of `bytes`.
///
/// `bytes` must be in `1..=MAX_SMALL_SIZE`.
#[must_use]
pub const fn class_index(bytes: usize) -> usize {
    debug_assert!(bytes >= 1 && bytes <= MAX_SMALL_SIZE);
    match bytes {
        ..=128 => (bytes - 1) / 8,
        129..=256 => 16 + (bytes - 129) / 16,
        257..=512 => 24 + (bytes - 257) / 32,
        513..=1024 => 32 + (bytes - 513) / 64,
        1025..=2048 => 40 + (bytes - 1025) / 128,
        _ => 48 + (bytes - 2049) / 256,
    }
}

/// Exact byte size of class `index`.
#[must_use]
pub const fn class_size(index: usize) -> usize {
    CLASS_SIZES[index]
}

/// Largest exact class size not exceeding `bytes`.
///
/// Used to split leftover pool remainders into donatable pieces; `bytes`
/// must be at least [`MIN_CLASS_SIZE`].
pub(crate) const fn largest_class_at_most(bytes: usize) -> usize {
    debug_assert!(bytes >= MIN_CLASS_SIZE);
    let bytes = if bytes > MAX_SMALL_SIZE {
        MAX_SMALL_SIZE
    } else {
        bytes
    };
    let index = class_index(bytes);
    if CLASS_SIZES[index] == bytes {
        bytes
    } else {
        CLASS_SIZES[index - 1]
    }
}
