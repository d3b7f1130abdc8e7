//! LED array to PWM bit-stream encoding.
//!
//! The chips use a self-clocking NRZ protocol: every data bit occupies a
//! ~1.25 us window and is distinguished by pulse width. With the PWM
//! serializer running at three clocks per bit window, a `1` is the
//! pattern `110` and a `0` is `100`. Frames are latched by holding the
//! line low for at least 50 us, which falls out of the zeroed tail words
//! the buffer is sized to include.

use types::{ColorShifts, Led};

/// 3-clock symbol for a `1` data bit (`110`).
pub const SYMBOL_HIGH: u32 = 0x6;
/// 3-clock symbol for a `0` data bit (`100`).
pub const SYMBOL_LOW: u32 = 0x4;

/// Idle-low time appended after the last pixel. The datasheets ask for
/// at least 50 us.
pub const LED_RESET_US: u64 = 55;

/// Wire bits per symbol.
const SYMBOL_BITS: usize = 3;

/// Buffers are sized for the 4-color worst case so changing strip type
/// never reallocates.
const LED_COLOURS: usize = 4;

/// PWM clocks needed to shift `count` LEDs plus the reset tail.
pub fn led_bit_count(count: usize, freq: u32) -> usize {
    let data = count * LED_COLOURS * 8 * SYMBOL_BITS;
    let reset = (LED_RESET_US * (freq as u64 * 3) / 1_000_000) as usize;
    data + reset
}

/// Bytes of bit buffer one channel occupies: the clock count rounded up
/// to whole 64-bit units, plus one trailing idle word.
pub fn pwm_byte_count(count: usize, freq: u32) -> usize {
    let bytes = led_bit_count(count, freq).div_ceil(8);
    bytes.next_multiple_of(8) + 8
}

/// 32-bit words of bit buffer for `channels` interleaved outputs sized by
/// the largest chain.
pub fn buffer_word_count(max_count: usize, freq: u32, channels: usize) -> usize {
    pwm_byte_count(max_count, freq) * channels / 4
}

/// Brightness/gamma mapping of one color byte.
///
/// The scale is `brightness + 1` so that full brightness is the identity
/// (that is a contract of the API, not an implementation detail).
fn shade(component: u8, brightness: u8, gamma: Option<&[u8; 256]>) -> u8 {
    let scale = brightness as u32 + 1;
    let scaled = ((component as u32 * scale) >> 8) as u8;
    match gamma {
        Some(table) => table[scaled as usize],
        None => scaled,
    }
}

/// Zero one channel's words of the shared bit buffer.
///
/// Encoding only sets bits, so this doubles as the reset-gap fill: every
/// word past the data cursor stays low for the rest of the frame.
pub fn clear_channel(words: &mut [u32], offset: usize, stride: usize) {
    let mut idx = offset;
    while idx < words.len() {
        words[idx] = 0;
        idx += stride;
    }
}

/// Encode one channel's LED array into the shared bit buffer.
///
/// `offset` is the channel's first word index and `stride` the number of
/// interleaved channels; the serializer pops alternate FIFO words when
/// both outputs run. Word bits are emitted MSB-first. The channel's words
/// must have been cleared first.
pub fn encode_channel(
    leds: &[Led],
    brightness: u8,
    shifts: ColorShifts,
    gamma: Option<&[u8; 256]>,
    words: &mut [u32],
    offset: usize,
    stride: usize,
) {
    let slots: [u32; 4] = [shifts.r, shifts.g, shifts.b, shifts.w];
    let colors = shifts.colors();

    let mut word = offset;
    let mut bit = 31i32;

    for &led in leds {
        for &shift in &slots[..colors] {
            let byte = shade((led >> shift) as u8, brightness, gamma);

            for k in (0..8).rev() {
                let symbol = if byte & (1 << k) != 0 {
                    SYMBOL_HIGH
                } else {
                    SYMBOL_LOW
                };

                for l in (0..SYMBOL_BITS).rev() {
                    if symbol & (1 << l) != 0 {
                        words[word] |= 1 << bit;
                    }
                    bit -= 1;
                    if bit < 0 {
                        bit = 31;
                        word += stride;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::StripFormat;

    /// Undo the word packing: one wire bit per element, MSB of word 0
    /// first, destriding a single channel out of the buffer.
    fn wire_bits(words: &[u32], offset: usize, stride: usize) -> Vec<u8> {
        let mut bits = Vec::new();
        let mut idx = offset;
        while idx < words.len() {
            for bit in (0..32).rev() {
                bits.push(((words[idx] >> bit) & 1) as u8);
            }
            idx += stride;
        }
        bits
    }

    /// Decode 3-bit symbols back into data bits; `None` on a pattern that
    /// is neither `110` nor `100`.
    fn decode_symbols(bits: &[u8], count: usize) -> Option<Vec<u8>> {
        bits.chunks(3)
            .take(count)
            .map(|chunk| match chunk {
                [1, 1, 0] => Some(1),
                [1, 0, 0] => Some(0),
                _ => None,
            })
            .collect()
    }

    fn encode_single(leds: &[Led], brightness: u8, format: StripFormat) -> Vec<u32> {
        let mut words = vec![0u32; buffer_word_count(leds.len(), 800_000, 1)];
        encode_channel(
            leds,
            brightness,
            format.shifts(),
            None,
            &mut words,
            0,
            1,
        );
        words
    }

    fn bits_of_byte(byte: u8) -> Vec<u8> {
        (0..8).rev().map(|k| (byte >> k) & 1).collect()
    }

    #[test]
    fn test_sizing_formula() {
        // The byte count is the bit count in whole bytes, rounded up to
        // an 8-byte boundary, plus 8 idle bytes.
        for count in [0usize, 1, 8, 30, 300, 4096] {
            for freq in [400_000u32, 800_000] {
                let bits = led_bit_count(count, freq);
                let expected = (bits.div_ceil(8) + 7) / 8 * 8 + 8;
                assert_eq!(pwm_byte_count(count, freq), expected);
                assert_eq!(pwm_byte_count(count, freq) % 4, 0);
            }
        }
    }

    #[test]
    fn test_reset_tail_is_at_least_50us() {
        for freq in [400_000u32, 800_000] {
            let data_bits = 10 * LED_COLOURS * 8 * 3;
            let total_bits = pwm_byte_count(10, freq) * 8;
            let tail_bits = total_bits - data_bits;
            let tail_us = tail_bits as u64 * 1_000_000 / (freq as u64 * 3);
            assert!(tail_us >= 50, "{tail_us} us tail at {freq} Hz");
        }
    }

    #[test]
    fn test_one_red_led_grb() {
        // GRB strip, 0x00FF0000: green byte 0x00 on the wire first, then
        // red 0xFF, then blue 0x00.
        let words = encode_single(&[0x00ff_0000], 255, StripFormat::Grb);
        let bits = wire_bits(&words, 0, 1);

        let mut expected = Vec::new();
        for _ in 0..8 {
            expected.extend([1, 0, 0]); // G = 0x00
        }
        for _ in 0..8 {
            expected.extend([1, 1, 0]); // R = 0xFF
        }
        for _ in 0..8 {
            expected.extend([1, 0, 0]); // B = 0x00
        }
        // 24 symbols = 72 PWM clocks for the pixel.
        assert_eq!(&bits[..72], &expected[..]);
        assert!(bits[72..].iter().all(|&b| b == 0), "reset tail not low");
    }

    #[test]
    fn test_brightness_scale_rounds_down() {
        // 0x00010203 at brightness 128: scale 129 maps (R,G,B) = (1,2,3)
        // to (0,1,1).
        let words = encode_single(&[0x0001_0203], 128, StripFormat::Rgb);
        let bits = wire_bits(&words, 0, 1);
        let decoded = decode_symbols(&bits, 24).unwrap();

        let mut expected = bits_of_byte(0x00);
        expected.extend(bits_of_byte(0x01));
        expected.extend(bits_of_byte(0x01));
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_full_brightness_is_identity() {
        for component in [0x01u8, 0x7f, 0x80, 0xff] {
            assert_eq!(shade(component, 255, None), component);
        }
    }

    #[test]
    fn test_two_rgbw_pixels() {
        // GRBW strip: first pixel pure white, second pure red. 2 pixels x
        // 32 data bits = 64 symbols = 192 PWM clocks total.
        let leds = [0xff00_0000, 0x00ff_0000];
        let words = encode_single(&leds, 255, StripFormat::Grbw);
        let bits = wire_bits(&words, 0, 1);
        let decoded = decode_symbols(&bits, 64).unwrap();

        let mut expected = Vec::new();
        // Pixel 0: G, R, B low, W = 0xFF.
        for byte in [0x00u8, 0x00, 0x00, 0xff] {
            expected.extend(bits_of_byte(byte));
        }
        // Pixel 1: R = 0xFF in the second wire slot.
        for byte in [0x00u8, 0xff, 0x00, 0x00] {
            expected.extend(bits_of_byte(byte));
        }
        assert_eq!(decoded, expected);
        assert!(bits[192..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_gamma_applies_after_scaling() {
        let mut table = [0u8; 256];
        table[0x40] = 0x99;
        // 0x80 at brightness 127 scales to 0x40, then maps through gamma.
        assert_eq!(shade(0x80, 127, Some(&table)), 0x99);
    }

    #[test]
    fn test_round_trip_random_colors() {
        let leds: Vec<Led> = (0..17)
            .map(|i| {
                let i = i as u32;
                (i * 0x0104_0907) ^ 0x00a5_5a3c
            })
            .collect();
        let brightness = 200u8;
        let words = encode_single(&leds, brightness, StripFormat::Bgr);
        let bits = wire_bits(&words, 0, 1);
        let decoded = decode_symbols(&bits, leds.len() * 24).unwrap();

        let shifts = StripFormat::Bgr.shifts();
        let mut expected = Vec::new();
        for &led in &leds {
            for shift in [shifts.r, shifts.g, shifts.b] {
                expected.extend(bits_of_byte(shade((led >> shift) as u8, brightness, None)));
            }
        }
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_two_channel_interleave() {
        let count = 4;
        let mut words = vec![0u32; buffer_word_count(count, 800_000, 2)];
        let red = [0x00ff_0000u32; 4];
        let blue = [0x0000_00ffu32; 4];

        clear_channel(&mut words, 0, 2);
        clear_channel(&mut words, 1, 2);
        encode_channel(&red, 255, StripFormat::Rgb.shifts(), None, &mut words, 0, 2);
        encode_channel(&blue, 255, StripFormat::Rgb.shifts(), None, &mut words, 1, 2);

        // Each channel destrides to exactly its single-channel encoding.
        let single_red = encode_single(&red, 255, StripFormat::Rgb);
        let single_blue = encode_single(&blue, 255, StripFormat::Rgb);
        let ch0: Vec<u32> = words.iter().copied().step_by(2).collect();
        let ch1: Vec<u32> = words.iter().skip(1).copied().step_by(2).collect();
        assert_eq!(ch0, single_red);
        assert_eq!(ch1, single_blue);
    }

    #[test]
    fn test_render_is_idempotent() {
        let leds = [0x0012_3456u32, 0x00ab_cdef];
        let mut words = vec![0u32; buffer_word_count(leds.len(), 800_000, 1)];

        clear_channel(&mut words, 0, 1);
        encode_channel(&leds, 90, StripFormat::Grb.shifts(), None, &mut words, 0, 1);
        let first = words.clone();

        clear_channel(&mut words, 0, 1);
        encode_channel(&leds, 90, StripFormat::Grb.shifts(), None, &mut words, 0, 1);
        assert_eq!(words, first);
    }

    #[test]
    fn test_zero_count_writes_only_reset_tail() {
        let mut words = vec![0xffff_ffffu32; buffer_word_count(0, 800_000, 1)];
        clear_channel(&mut words, 0, 1);
        encode_channel(&[], 255, StripFormat::Grb.shifts(), None, &mut words, 0, 1);
        assert!(words.iter().all(|&w| w == 0));
    }

    #[test]
    fn test_zero_brightness_darkens_everything() {
        let words = encode_single(&[0x00ff_ffff], 0, StripFormat::Rgb);
        let bits = wire_bits(&words, 0, 1);
        let decoded = decode_symbols(&bits, 24).unwrap();
        assert!(decoded.iter().all(|&b| b == 0));
    }
}
