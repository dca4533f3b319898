//! Base relocation pass.

use pemap_layout::{DataDirectory, ImageView, LayoutError, RelocationKind};
use pemap_sys::{MemoryRegion, Platform};
use tracing::{debug, trace};

use crate::{LoadError, Result};

/// Counts from one relocation pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RelocationStats {
    pub blocks: usize,
    /// Entries that patched memory.
    pub applied: usize,
    /// `ABSOLUTE` padding entries.
    pub skipped: usize,
}

/// Apply every base relocation in `directory` to the image mapped in
/// `region`, adding `delta` (actual base minus preferred base).
///
/// `view` must describe the same image in mapped layout; relocation blocks
/// are read from it, patches go to `region`. Each patch target is checked
/// against the region before it is written.
///
/// # Errors
///
/// Structural errors from the relocation directory, an out-of-region
/// target, or [`LoadError::UnsupportedRelocation`] for types with no patch
/// rule (anything but `ABSOLUTE`, `HIGH`, `LOW`, `HIGHLOW` and `DIR64`).
#[allow(clippy::cast_possible_truncation)]
pub fn relocate<P: Platform>(
    platform: &P,
    region: &P::Region,
    view: &ImageView<'_>,
    directory: DataDirectory,
    delta: u64,
) -> Result<RelocationStats> {
    let mut stats = RelocationStats::default();
    if !directory.is_present() {
        return Ok(stats);
    }

    for block in view.relocation_blocks(directory) {
        let (block, entries) = block?;
        stats.blocks += 1;
        debug!(
            page = format!("{:#x}", block.virtual_address),
            entries = entries.len(),
            "relocation block"
        );

        for entry in entries {
            let rva = block.target(entry);
            let kind = entry.kind();
            let width = match kind {
                RelocationKind::Absolute => {
                    stats.skipped += 1;
                    continue;
                }
                RelocationKind::High | RelocationKind::Low => 2,
                RelocationKind::HighLow => 4,
                RelocationKind::Dir64 => 8,
                RelocationKind::HighAdj | RelocationKind::Other(_) => {
                    return Err(LoadError::UnsupportedRelocation { kind, rva });
                }
            };

            let target = region.base().offset(rva);
            if !region.contains(target, width) {
                return Err(LayoutError::OutOfBounds {
                    offset: rva as usize,
                    len: width,
                }
                .into());
            }

            trace!(rva = format!("{rva:#x}"), ?kind, "patch");
            // Target lies inside the region, checked above.
            unsafe {
                match kind {
                    RelocationKind::High => platform.increment_u16(target, (delta >> 16) as u16),
                    RelocationKind::Low => platform.increment_u16(target, delta as u16),
                    RelocationKind::HighLow => platform.increment_u32(target, delta as u32),
                    _ => platform.increment_u64(target, delta),
                }
            }
            stats.applied += 1;
        }
    }

    Ok(stats)
}
