//! BCM283x peripheral offsets and register bit definitions.
//!
//! Offsets are relative to the board's peripheral base. The DMA engine
//! addresses peripherals through the VideoCore bus view at `0x7e000000`
//! regardless of where the ARM sees them.

/// Bus-view base of the peripheral window.
pub const PERIPH_BUS_BASE: u32 = 0x7e00_0000;

pub const GPIO_OFFSET: u32 = 0x0020_0000;
pub const PWM_OFFSET: u32 = 0x0020_c000;
pub const CM_PWM_OFFSET: u32 = 0x0010_10a0;

const DMA_OFFSET: u32 = 0x0000_7000;
const DMA15_OFFSET: u32 = 0x00e0_5000;

/// Number of DMA engines addressable by index.
pub const DMA_ENGINES: usize = 16;

/// Register-block offset of a DMA engine. Engine 15 lives apart from the
/// first fifteen.
pub fn dma_engine_offset(dma_num: usize) -> Option<u32> {
    match dma_num {
        15 => Some(DMA15_OFFSET),
        n if n < 15 => Some(DMA_OFFSET + 0x100 * n as u32),
        _ => None,
    }
}

/// PWM controller registers (byte offsets) and bits.
pub mod pwm {
    use bitflags::bitflags;

    pub const CTL: usize = 0x00;
    pub const STA: usize = 0x04;
    pub const DMAC: usize = 0x08;
    pub const RNG1: usize = 0x10;
    pub const DAT1: usize = 0x14;
    pub const FIF1: usize = 0x18;
    pub const RNG2: usize = 0x20;
    pub const DAT2: usize = 0x24;

    /// Total window size worth mapping.
    pub const LEN: usize = 0x28;

    bitflags! {
        /// CTL register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ctl: u32 {
            const PWEN1 = 1 << 0;
            const MODE1 = 1 << 1;
            const RPTL1 = 1 << 2;
            const SBIT1 = 1 << 3;
            const POLA1 = 1 << 4;
            const USEF1 = 1 << 5;
            const CLRF1 = 1 << 6;
            const MSEN1 = 1 << 7;
            const PWEN2 = 1 << 8;
            const MODE2 = 1 << 9;
            const RPTL2 = 1 << 10;
            const SBIT2 = 1 << 11;
            const POLA2 = 1 << 12;
            const USEF2 = 1 << 13;
            const MSEN2 = 1 << 15;
        }
    }

    pub const DMAC_ENAB: u32 = 1 << 31;

    pub const fn dmac_panic(level: u32) -> u32 {
        (level & 0xff) << 8
    }

    pub const fn dmac_dreq(level: u32) -> u32 {
        level & 0xff
    }
}

/// DMA engine registers (byte offsets) and bits.
pub mod dma {
    use bitflags::bitflags;

    pub const CS: usize = 0x00;
    pub const CONBLK_AD: usize = 0x04;
    pub const TI: usize = 0x08;
    pub const SOURCE_AD: usize = 0x0c;
    pub const DEST_AD: usize = 0x10;
    pub const TXFR_LEN: usize = 0x14;
    pub const STRIDE: usize = 0x18;
    pub const NEXTCONBK: usize = 0x1c;
    pub const DEBUG: usize = 0x20;

    pub const LEN: usize = 0x24;

    bitflags! {
        /// Control and status register.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Cs: u32 {
            const RESET = 1 << 31;
            const ABORT = 1 << 30;
            const DISDEBUG = 1 << 29;
            const WAIT_OUTSTANDING_WRITES = 1 << 28;
            const ERROR = 1 << 8;
            const WAITING_OUTSTANDING_WRITES = 1 << 6;
            const DREQ_STOPS_DMA = 1 << 5;
            const PAUSED = 1 << 4;
            const DREQ = 1 << 3;
            const INT = 1 << 2;
            const END = 1 << 1;
            const ACTIVE = 1 << 0;
        }
    }

    bitflags! {
        /// Transfer information, shared by the register and the control
        /// block field.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct Ti: u32 {
            const NO_WIDE_BURSTS = 1 << 26;
            const SRC_IGNORE = 1 << 11;
            const SRC_DREQ = 1 << 10;
            const SRC_WIDTH = 1 << 9;
            const SRC_INC = 1 << 8;
            const DEST_IGNORE = 1 << 7;
            const DEST_DREQ = 1 << 6;
            const DEST_WIDTH = 1 << 5;
            const DEST_INC = 1 << 4;
            const WAIT_RESP = 1 << 3;
            const TDMODE = 1 << 1;
            const INTEN = 1 << 0;
        }
    }

    pub const fn cs_panic_priority(level: u32) -> u32 {
        (level & 0xf) << 20
    }

    pub const fn cs_priority(level: u32) -> u32 {
        (level & 0xf) << 16
    }

    /// Peripheral whose DREQ paces the transfer.
    pub const fn ti_permap(peripheral: u32) -> u32 {
        (peripheral & 0x1f) << 16
    }

    /// PERMAP value for the PWM block.
    pub const PERMAP_PWM: u32 = 5;
}

/// PWM clock manager registers (byte offsets) and bits.
pub mod cm {
    pub const CTL: usize = 0x00;
    pub const DIV: usize = 0x04;

    pub const LEN: usize = 0x08;

    /// Clock-manager writes are ignored without this password nibble.
    pub const PASSWD: u32 = 0x5a << 24;

    pub const CTL_SRC_OSC: u32 = 1;
    pub const CTL_ENAB: u32 = 1 << 4;
    pub const CTL_KILL: u32 = 1 << 5;
    pub const CTL_BUSY: u32 = 1 << 7;

    pub const fn div_divi(div: u32) -> u32 {
        (div & 0xfff) << 12
    }
}

/// GPIO function-select encodings.
pub mod gpio {
    /// Size of the function-select register bank.
    pub const LEN: usize = 0x100;

    /// 3-bit function-select codes for the six alternate functions.
    pub const ALT_FN: [u32; 6] = [0b100, 0b101, 0b110, 0b111, 0b011, 0b010];
}

/// Bus address of the PWM FIFO, the DMA destination.
pub const PWM_FIFO_BUS_ADDR: u32 = PERIPH_BUS_BASE + PWM_OFFSET + pwm::FIF1 as u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dma_engine_offsets() {
        assert_eq!(dma_engine_offset(0), Some(0x7000));
        assert_eq!(dma_engine_offset(5), Some(0x7500));
        assert_eq!(dma_engine_offset(14), Some(0x7e00));
        assert_eq!(dma_engine_offset(15), Some(0xe0_5000));
        assert_eq!(dma_engine_offset(16), None);
    }

    #[test]
    fn test_pwm_fifo_bus_address() {
        assert_eq!(PWM_FIFO_BUS_ADDR, 0x7e20_c018);
    }

    #[test]
    fn test_value_fields() {
        assert_eq!(dma::ti_permap(dma::PERMAP_PWM), 5 << 16);
        assert_eq!(dma::cs_priority(15) | dma::cs_panic_priority(15), 0xff << 16);
        assert_eq!(cm::div_divi(8), 8 << 12);
        assert_eq!(pwm::dmac_panic(7) | pwm::dmac_dreq(3), 0x703);
    }
}
