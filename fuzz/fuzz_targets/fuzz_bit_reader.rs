#![no_main]

use avc_fmp4::BitReader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&ops, bits)) = data.split_first() else {
        return;
    };

    let mut r = BitReader::new(bits);
    for i in 0..64 {
        match (ops >> (i % 8)) & 0b11 {
            0 => {
                r.read_ue();
            }
            1 => {
                r.read_se();
            }
            2 => {
                let _ = r.try_read_ue();
            }
            _ => {
                r.read_bits(i % 9);
            }
        }
        assert!(r.position() <= bits.len() * 8);
    }
});
