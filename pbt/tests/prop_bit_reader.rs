//! BitReader の PBT。

use avc_fmp4::BitReader;
use proptest::prelude::*;

/// MSB から順にビットを詰めていくテスト用のライター
#[derive(Default)]
struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    fn push_bit(&mut self, bit: bool) {
        if self.bits % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.bits % 8);
        }
        self.bits += 1;
    }

    fn push_bits(&mut self, value: u64, n: usize) {
        for i in (0..n).rev() {
            self.push_bit((value >> i) & 1 == 1);
        }
    }

    fn push_ue(&mut self, value: u32) {
        let code = u64::from(value) + 1;
        let n = 63 - code.leading_zeros() as usize;
        self.push_bits(0, n);
        self.push_bits(code, n + 1);
    }

    fn push_se(&mut self, value: i32) {
        let code = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.push_ue(code);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn ue_round_trip(values in prop::collection::vec(
        prop_oneof![Just(0u32), Just(1u32), Just(u32::MAX - 1), 0..u32::MAX],
        1..20,
    )) {
        let mut w = BitWriter::default();
        for &v in &values {
            w.push_ue(v);
        }

        let mut lenient = BitReader::new(&w.bytes);
        let mut strict = BitReader::new(&w.bytes);
        for &v in &values {
            prop_assert_eq!(lenient.read_ue(), v);
            prop_assert_eq!(strict.try_read_ue().expect("must decode"), v);
        }
        prop_assert_eq!(strict.position(), w.bits);
        prop_assert!(strict.bits_available() < 8);
    }

    #[test]
    fn se_round_trip(values in prop::collection::vec(
        prop_oneof![Just(0i32), Just(1i32), Just(-1i32), -(1i32 << 30)..(1i32 << 30)],
        1..20,
    )) {
        let mut w = BitWriter::default();
        for &v in &values {
            w.push_se(v);
        }

        let mut r = BitReader::new(&w.bytes);
        for &v in &values {
            prop_assert_eq!(r.try_read_se().expect("must decode"), v);
        }
    }

    #[test]
    fn read_bits_matches_wide_read(data in prop::collection::vec(any::<u8>(), 1..16), n in 1u32..=8) {
        let mut narrow = BitReader::new(&data);
        let mut wide = BitReader::new(&data);
        while narrow.bits_available() >= n as usize {
            let expected = wide.try_read_bits(n).expect("enough bits");
            prop_assert_eq!(u32::from(narrow.read_bits(n)), expected);
        }
    }

    #[test]
    fn reading_past_end_never_panics(data in prop::collection::vec(any::<u8>(), 0..8), ops in prop::collection::vec(0u8..6, 0..64)) {
        let mut r = BitReader::new(&data);
        for op in ops {
            match op {
                0 => { r.read_ue(); }
                1 => { r.read_se(); }
                2 => { r.read_bits(8); }
                3 => { r.skip_lz(); }
                4 => { let _ = r.try_read_ue(); }
                _ => { r.skip_bits(3); }
            }
            prop_assert!(r.position() <= data.len() * 8);
        }
    }

    #[test]
    fn failed_strict_read_does_not_move(data in prop::collection::vec(any::<u8>(), 0..4)) {
        let mut r = BitReader::new(&data);
        while r.try_read_ue().is_ok() {}
        let position = r.position();
        prop_assert!(r.try_read_ue().is_err());
        prop_assert_eq!(r.position(), position);
    }
}
