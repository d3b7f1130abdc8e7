//! Raspberry Pi board detection.
//!
//! Resolves the board revision word (from the device tree on 64-bit
//! kernels, `/proc/cpuinfo` otherwise) to the SoC family and the physical
//! base addresses of the peripheral window and the VideoCore bus alias.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum BoardError {
    #[error("unsupported or unrecognized board (revision {0:#x?})")]
    Unsupported(Option<u32>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// SoC family, as far as this driver cares.
///
/// Pi 3 boards carry the same peripheral map as Pi 2 and report as `Pi2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocFamily {
    /// BCM2835 (Pi 1, Zero, Zero W, CM1)
    Pi1,
    /// BCM2836/BCM2837 (Pi 2, Pi 3, Zero 2 W, CM3)
    Pi2,
    /// BCM2711 (Pi 4, Pi 400, CM4)
    Pi4,
}

const PERIPH_BASE_PI1: u32 = 0x2000_0000;
const PERIPH_BASE_PI2: u32 = 0x3f00_0000;
const PERIPH_BASE_PI4: u32 = 0xfe00_0000;

const VIDEOCORE_BASE_PI1: u32 = 0x4000_0000;
const VIDEOCORE_BASE_PI2: u32 = 0xc000_0000;

/// Warranty bits of old-style revision words.
const WARRANTY_MASK: u32 = 0x3 << 24;
/// Manufacturer bits of new-style revision words.
const MANUFACTURER_MASK: u32 = 0xf << 16;

const CPUINFO: &str = "/proc/cpuinfo";
const DT_REVISION: &str = "/proc/device-tree/system/linux,revision";
const DT_SOC_RANGES: &str = "/proc/device-tree/soc/ranges";

/// Resolved board description.
#[derive(Debug, Clone, Copy)]
pub struct BoardInfo {
    /// Raw revision word as reported by the firmware.
    pub revision: u32,
    pub family: SocFamily,
    /// Physical base of the peripheral register window.
    pub periph_base: u32,
    /// Bus-address alias the DMA controller uses for SDRAM.
    pub videocore_base: u32,
    pub desc: &'static str,
}

impl BoardInfo {
    /// Crystal feeding the PWM clock manager.
    pub fn osc_freq(&self) -> u32 {
        match self.family {
            SocFamily::Pi4 => 54_000_000,
            _ => 19_200_000,
        }
    }
}

struct Entry {
    revision: u32,
    family: SocFamily,
    desc: &'static str,
}

const fn entry(revision: u32, family: SocFamily, desc: &'static str) -> Entry {
    Entry {
        revision,
        family,
        desc,
    }
}

static REVISION_TABLE: &[Entry] = &[
    // Old-style revision words
    entry(0x02, SocFamily::Pi1, "Model B"),
    entry(0x03, SocFamily::Pi1, "Model B"),
    entry(0x04, SocFamily::Pi1, "Model B"),
    entry(0x05, SocFamily::Pi1, "Model B"),
    entry(0x06, SocFamily::Pi1, "Model B"),
    entry(0x07, SocFamily::Pi1, "Model A"),
    entry(0x08, SocFamily::Pi1, "Model A"),
    entry(0x09, SocFamily::Pi1, "Model A"),
    entry(0x0d, SocFamily::Pi1, "Model B"),
    entry(0x0e, SocFamily::Pi1, "Model B"),
    entry(0x0f, SocFamily::Pi1, "Model B"),
    entry(0x10, SocFamily::Pi1, "Model B+"),
    entry(0x11, SocFamily::Pi1, "Compute Module 1"),
    entry(0x12, SocFamily::Pi1, "Model A+"),
    entry(0x13, SocFamily::Pi1, "Model B+"),
    entry(0x14, SocFamily::Pi1, "Compute Module 1"),
    entry(0x15, SocFamily::Pi1, "Model A+"),
    // New-style revision words
    entry(0x90_0021, SocFamily::Pi1, "Model A+"),
    entry(0x90_0032, SocFamily::Pi1, "Model B+"),
    entry(0x90_0092, SocFamily::Pi1, "Pi Zero v1.2"),
    entry(0x90_0093, SocFamily::Pi1, "Pi Zero v1.3"),
    entry(0x92_0093, SocFamily::Pi1, "Pi Zero v1.3"),
    entry(0x90_00c1, SocFamily::Pi1, "Pi Zero W"),
    entry(0x92_00c1, SocFamily::Pi1, "Pi Zero W"),
    entry(0xa0_1040, SocFamily::Pi2, "Pi 2"),
    entry(0xa0_1041, SocFamily::Pi2, "Pi 2"),
    entry(0xa2_1041, SocFamily::Pi2, "Pi 2"),
    entry(0xa2_2042, SocFamily::Pi2, "Pi 2 (BCM2837)"),
    entry(0xa0_2082, SocFamily::Pi2, "Pi 3"),
    entry(0xa2_2082, SocFamily::Pi2, "Pi 3"),
    entry(0xa3_2082, SocFamily::Pi2, "Pi 3"),
    entry(0xa0_20d3, SocFamily::Pi2, "Pi 3 B+"),
    entry(0x90_20e0, SocFamily::Pi2, "Pi 3 A+"),
    entry(0xa0_20a0, SocFamily::Pi2, "Compute Module 3"),
    entry(0xa0_2100, SocFamily::Pi2, "Compute Module 3+"),
    entry(0x90_2120, SocFamily::Pi2, "Pi Zero 2 W"),
    entry(0xa0_3111, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xb0_3111, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xb0_3112, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xb0_3114, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xc0_3111, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xc0_3112, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xc0_3114, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xd0_3114, SocFamily::Pi4, "Pi 4 Model B"),
    entry(0xc0_3130, SocFamily::Pi4, "Pi 400"),
    entry(0xa0_3140, SocFamily::Pi4, "Compute Module 4"),
    entry(0xb0_3140, SocFamily::Pi4, "Compute Module 4"),
    entry(0xc0_3140, SocFamily::Pi4, "Compute Module 4"),
    entry(0xd0_3140, SocFamily::Pi4, "Compute Module 4"),
];

fn family_defaults(family: SocFamily) -> (u32, u32) {
    match family {
        SocFamily::Pi1 => (PERIPH_BASE_PI1, VIDEOCORE_BASE_PI1),
        SocFamily::Pi2 => (PERIPH_BASE_PI2, VIDEOCORE_BASE_PI2),
        SocFamily::Pi4 => (PERIPH_BASE_PI4, VIDEOCORE_BASE_PI2),
    }
}

/// Look a revision word up in the static table, masking the warranty and
/// manufacturer bits from both sides.
fn lookup(revision: u32) -> Option<BoardInfo> {
    let masked = revision & !(WARRANTY_MASK | MANUFACTURER_MASK);
    REVISION_TABLE.iter().find_map(|e| {
        let hwver = e.revision & !(WARRANTY_MASK | MANUFACTURER_MASK);
        (hwver == masked).then(|| {
            let (periph_base, videocore_base) = family_defaults(e.family);
            BoardInfo {
                revision,
                family: e.family,
                periph_base,
                videocore_base,
                desc: e.desc,
            }
        })
    })
}

/// Extract the `Revision` word from `/proc/cpuinfo` text.
fn revision_from_cpuinfo(text: &str) -> Option<u32> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if !key.trim().eq_ignore_ascii_case("revision") {
            return None;
        }
        u32::from_str_radix(value.trim(), 16).ok()
    })
}

/// Last-ditch family guess from the `model name` line.
fn family_from_model_line(text: &str) -> Option<SocFamily> {
    let line = text
        .lines()
        .find(|l| l.to_ascii_lowercase().starts_with("model name"))?;
    if line.contains("ARMv6") {
        Some(SocFamily::Pi1)
    } else if line.contains("ARMv7") {
        Some(SocFamily::Pi2)
    } else {
        None
    }
}

/// Read a big-endian u32 at `offset` of a device-tree property file.
fn dt_word(path: &Path, offset: usize) -> Option<u32> {
    let bytes = fs::read(path).ok()?;
    let slice = bytes.get(offset..offset + 4)?;
    Some(u32::from_be_bytes(slice.try_into().unwrap()))
}

/// Detect the running board.
///
/// Resolution order: device-tree revision word, `/proc/cpuinfo` revision,
/// then the ARMv6/ARMv7 model-line fallback. The peripheral base from the
/// revision table can be overridden by `/proc/device-tree/soc/ranges`.
pub fn detect() -> Result<BoardInfo, BoardError> {
    detect_at(Path::new("/"))
}

fn detect_at(root: &Path) -> Result<BoardInfo, BoardError> {
    let dt_revision = dt_word(&root.join(&DT_REVISION[1..]), 0);
    let cpuinfo = fs::read_to_string(root.join(&CPUINFO[1..])).unwrap_or_default();

    let revision = dt_revision.or_else(|| revision_from_cpuinfo(&cpuinfo));

    let mut info = match revision.and_then(lookup) {
        Some(info) => info,
        None => match family_from_model_line(&cpuinfo) {
            Some(family) => {
                warn!(
                    ?revision,
                    ?family,
                    "unknown revision, falling back to CPU architecture"
                );
                let (periph_base, videocore_base) = family_defaults(family);
                BoardInfo {
                    revision: revision.unwrap_or(0),
                    family,
                    periph_base,
                    videocore_base,
                    desc: "unknown model",
                }
            }
            None => return Err(BoardError::Unsupported(revision)),
        },
    };

    // The device tree knows better than the table, when it is readable
    // and holds a 32-bit address.
    if let Some(base) = dt_word(&root.join(&DT_SOC_RANGES[1..]), 4) {
        if base != 0 && base != u32::MAX {
            info.periph_base = base;
        }
    }

    debug!(
        revision = info.revision,
        desc = info.desc,
        periph_base = info.periph_base,
        "detected board"
    );

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PI3_CPUINFO: &str = "processor\t: 0\n\
        model name\t: ARMv7 Processor rev 4 (v7l)\n\
        BogoMIPS\t: 38.40\n\
        Hardware\t: BCM2835\n\
        Revision\t: a02082\n\
        Serial\t\t: 00000000deadbeef\n";

    #[test]
    fn test_revision_from_cpuinfo() {
        assert_eq!(revision_from_cpuinfo(PI3_CPUINFO), Some(0xa0_2082));
        assert_eq!(revision_from_cpuinfo("no revision here\n"), None);
    }

    #[test]
    fn test_lookup_pi3() {
        let info = lookup(0xa0_2082).unwrap();
        assert_eq!(info.family, SocFamily::Pi2);
        assert_eq!(info.periph_base, 0x3f00_0000);
        assert_eq!(info.videocore_base, 0xc000_0000);
        assert_eq!(info.osc_freq(), 19_200_000);
    }

    #[test]
    fn test_lookup_pi4() {
        let info = lookup(0xc0_3111).unwrap();
        assert_eq!(info.family, SocFamily::Pi4);
        assert_eq!(info.periph_base, 0xfe00_0000);
        assert_eq!(info.osc_freq(), 54_000_000);
    }

    #[test]
    fn test_lookup_masks_warranty_and_manufacturer_bits() {
        // Warranty-voided Model B rev 2.0
        let info = lookup(0x0100_0005).unwrap();
        assert_eq!(info.family, SocFamily::Pi1);
        // Sony UK vs Embest manufacturing of the same Pi 3
        assert!(lookup(0xa2_2082).is_some());
    }

    #[test]
    fn test_unknown_revision_is_unsupported() {
        assert!(lookup(0xdead_beef).is_none());
    }

    #[test]
    fn test_model_line_fallback() {
        assert_eq!(
            family_from_model_line("model name\t: ARMv6-compatible processor rev 7 (v6l)\n"),
            Some(SocFamily::Pi1)
        );
        assert_eq!(
            family_from_model_line(PI3_CPUINFO),
            Some(SocFamily::Pi2)
        );
        assert_eq!(family_from_model_line("model name\t: AArch64\n"), None);
    }

    #[test]
    fn test_detect_against_fake_root() {
        let dir = std::env::temp_dir().join(format!("board-test-{}", std::process::id()));
        let proc = dir.join("proc");
        fs::create_dir_all(&proc).unwrap();
        fs::write(proc.join("cpuinfo"), PI3_CPUINFO).unwrap();

        let info = detect_at(&dir).unwrap();
        assert_eq!(info.family, SocFamily::Pi2);
        assert_eq!(info.revision, 0xa0_2082);

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_detect_unknown_board_fails_without_device_access() {
        // Detection must resolve purely from procfs; an unknown revision
        // with an unknown architecture reports Unsupported.
        let dir = std::env::temp_dir().join(format!("board-test-bad-{}", std::process::id()));
        let proc = dir.join("proc");
        fs::create_dir_all(&proc).unwrap();
        fs::write(
            proc.join("cpuinfo"),
            "model name\t: RISC-V\nRevision\t: deadbeef\n",
        )
        .unwrap();

        match detect_at(&dir) {
            Err(BoardError::Unsupported(Some(rev))) => assert_eq!(rev, 0xdead_beef),
            other => panic!("expected Unsupported, got {other:?}"),
        }

        fs::remove_dir_all(&dir).unwrap();
    }
}
