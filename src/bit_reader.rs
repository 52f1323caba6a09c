//! H.264 のビットストリームを読むための、Exp-Golomb 符号に対応したビット単位のリーダー
use crate::{Error, Result};

/// バイト列を先頭から順番にビット単位で読み進めるリーダー
///
/// `read_*` 系のメソッドは寛容な挙動をとり、バッファの末尾を越えて読み込もうとした場合には
/// エラーにせずに 0 を返す（残りのビットは消費される）。
/// 厳密な検証が必要な場合には、事前に [`BitReader::bits_available()`] を確認するか、
/// `try_read_*` 系のメソッドを使うこと。
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    /// 指定のバイト列を読み込むリーダーを作成する
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// まだ読み込まれていないビット数を返す
    pub fn bits_available(&self) -> usize {
        self.data.len() * 8 - self.position
    }

    /// 現在の読み込み位置（ビット単位）を返す
    pub fn position(&self) -> usize {
        self.position
    }

    /// `n` ビットを読み飛ばす
    ///
    /// 残りのビット数が足りない場合には何もせずに `false` を返す
    pub fn skip_bits(&mut self, n: usize) -> bool {
        if self.bits_available() < n {
            return false;
        }
        self.position += n;
        true
    }

    /// `n` バイトを読み飛ばす
    ///
    /// 残りのビット数が足りない場合には何もせずに `false` を返す
    pub fn skip_bytes(&mut self, n: usize) -> bool {
        self.skip_bits(n * 8)
    }

    /// 最大 8 ビットを読み込んで、その値を返す
    ///
    /// 8 ビットより大きな値が必要な場合には、複数回に分けて呼び出すこと。
    /// 残りのビット数が足りない場合には、残りを全て消費した上で 0 を返す。
    pub fn read_bits(&mut self, n: u32) -> u8 {
        debug_assert!(n <= 8, "read_bits() reads at most 8 bits");
        let n = n.min(8);
        match self.peek(n) {
            Some(v) => {
                self.position += n as usize;
                v as u8
            }
            None => {
                self.position = self.data.len() * 8;
                0
            }
        }
    }

    /// 読み込み位置を進めずに、最大 8 ビットの値を返す
    ///
    /// 残りのビット数が足りない場合には 0 を返す
    pub fn peek_bits(&self, n: u32) -> u8 {
        debug_assert!(n <= 8, "peek_bits() reads at most 8 bits");
        self.peek(n.min(8)).map_or(0, |v| v as u8)
    }

    /// 1 ビットを読み込んで真偽値として返す
    pub fn read_boolean(&mut self) -> bool {
        self.read_bits(1) == 1
    }

    /// `n` バイト分（最大 4 バイト）のビットを読み込んで、ビッグエンディアンの整数として返す
    ///
    /// 残りのビット数が足りない場合には、末尾まで消費して 0 を返す
    pub fn read_ubyte(&mut self, n: u32) -> u32 {
        debug_assert!(n <= 4, "read_ubyte() reads at most 4 bytes");
        self.try_read_bits(n.saturating_mul(8)).unwrap_or_else(|_| {
            self.position = self.data.len() * 8;
            0
        })
    }

    /// 最初の 1 のビットが現れるまでの 0 のビットを消費して、その個数を返す
    ///
    /// 1 のビット自体は消費しない。
    /// 末尾まで 1 のビットが現れなかった場合には、末尾まで消費してその個数を返す。
    pub fn skip_lz(&mut self) -> usize {
        let mut zeros = 0;
        while self.bits_available() > 0 {
            if self.peek(1) == Some(1) {
                break;
            }
            self.position += 1;
            zeros += 1;
        }
        zeros
    }

    /// 符号なしの Exp-Golomb 符号 (`ue(v)`) を読み込む
    ///
    /// 値は `2^N - 1 + suffix` となる（`N` は先頭の 0 のビットの個数）。
    /// 途中で末尾に達した場合や `u32` に収まらない場合には 0 を返す。
    pub fn read_ue(&mut self) -> u32 {
        self.try_read_ue().unwrap_or_else(|_| {
            self.position = self.data.len() * 8;
            0
        })
    }

    /// 符号付きの Exp-Golomb 符号 (`se(v)`) を読み込む
    ///
    /// `codeNum` が奇数なら `(codeNum + 1) / 2` を、偶数なら `-(codeNum / 2)` を返す
    pub fn read_se(&mut self) -> i32 {
        zigzag(self.read_ue())
    }

    /// 最大 32 ビットを読み込んで返す
    ///
    /// 残りのビット数が足りない場合にはエラーを返し、読み込み位置は変化しない
    pub fn try_read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(Error::invalid_input(format!(
                "Cannot read more than 32 bits at once: {n}"
            )));
        }
        let v = self.peek(n).ok_or_else(|| {
            Error::invalid_data(format!(
                "Unexpected end of bitstream: required={n} bits, available={} bits",
                self.bits_available()
            ))
        })?;
        self.position += n as usize;
        Ok(v)
    }

    /// 1 ビットを読み込んで真偽値として返す（末尾を越える場合にはエラー）
    pub fn try_read_flag(&mut self) -> Result<bool> {
        Ok(self.try_read_bits(1)? == 1)
    }

    /// 符号なしの Exp-Golomb 符号を読み込む（末尾を越える場合にはエラー）
    pub fn try_read_ue(&mut self) -> Result<u32> {
        let start = self.position;
        let zeros = self.skip_lz();
        if self.bits_available() == 0 {
            self.position = start;
            return Err(Error::invalid_data(
                "Unexpected end of bitstream in Exp-Golomb prefix",
            ));
        }
        if zeros > 31 {
            self.position = start;
            return Err(Error::invalid_data(format!(
                "Too long Exp-Golomb prefix: {zeros} leading zero bits"
            )));
        }

        // 先頭の 1 のビットと、それに続く suffix をまとめて読むと `2^N + suffix` になる
        match self.try_read_bits(zeros as u32 + 1) {
            Ok(v) => Ok(v - 1),
            Err(e) => {
                self.position = start;
                Err(e)
            }
        }
    }

    /// 符号付きの Exp-Golomb 符号を読み込む（末尾を越える場合にはエラー）
    pub fn try_read_se(&mut self) -> Result<i32> {
        self.try_read_ue().map(zigzag)
    }

    fn peek(&self, n: u32) -> Option<u32> {
        if n == 0 {
            return Some(0);
        }
        if self.bits_available() < n as usize {
            return None;
        }

        let mut value = 0u64;
        let mut position = self.position;
        let mut remaining = n as usize;
        while remaining > 0 {
            let byte = self.data[position / 8];
            let bit_offset = position % 8;
            let take = (8 - bit_offset).min(remaining);
            let bits = (byte >> (8 - bit_offset - take)) & ((1u16 << take) - 1) as u8;
            value = (value << take) | u64::from(bits);
            position += take;
            remaining -= take;
        }
        Some(value as u32)
    }
}

fn zigzag(code_num: u32) -> i32 {
    if code_num % 2 == 1 {
        (code_num / 2 + 1) as i32
    } else {
        -((code_num / 2) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_bits_across_byte_boundary() {
        let mut r = BitReader::new(&[0b1010_1100, 0b0101_0000]);
        assert_eq!(r.read_bits(3), 0b101);
        assert_eq!(r.peek_bits(8), 0b0110_0010);
        assert_eq!(r.read_bits(8), 0b0110_0010);
        assert_eq!(r.bits_available(), 5);
        assert!(r.read_boolean());
        assert!(!r.read_boolean());
    }

    #[test]
    fn skip_fails_without_moving() {
        let mut r = BitReader::new(&[0xff, 0x00]);
        assert!(r.skip_bits(4));
        assert!(!r.skip_bytes(2));
        assert_eq!(r.position(), 4);
        assert!(r.skip_bytes(1));
        assert_eq!(r.bits_available(), 4);
    }

    #[test]
    fn read_past_end_returns_zero() {
        let mut r = BitReader::new(&[0xff]);
        assert_eq!(r.read_bits(6), 0b111111);
        assert_eq!(r.read_bits(4), 0);
        assert_eq!(r.bits_available(), 0);
        assert_eq!(r.read_ubyte(1), 0);
        assert_eq!(r.read_ue(), 0);
    }

    #[test]
    fn read_ubyte_reads_whole_bytes() {
        let mut r = BitReader::new(&[0x12, 0x34, 0x56, 0x78, 0x9a]);
        assert_eq!(r.read_ubyte(1), 0x12);
        assert_eq!(r.read_ubyte(3), 0x34_5678);
        assert_eq!(r.bits_available(), 8);

        // 足りない場合は末尾まで消費する
        assert_eq!(r.read_ubyte(2), 0);
        assert_eq!(r.bits_available(), 0);
    }

    #[test]
    fn skip_lz_counts_prefix() {
        let mut r = BitReader::new(&[0b0001_0000]);
        assert_eq!(r.skip_lz(), 3);
        assert!(r.read_boolean());
    }

    #[test]
    fn exp_golomb_values() {
        // ue: 0 -> 1, 1 -> 010, 2 -> 011, 3 -> 00100, 7 -> 0001000
        let mut r = BitReader::new(&[0b1010_0110, 0b0100_0001, 0b0000_0000]);
        assert_eq!(r.read_ue(), 0);
        assert_eq!(r.read_ue(), 1);
        assert_eq!(r.read_ue(), 2);
        assert_eq!(r.read_ue(), 3);
        assert_eq!(r.read_ue(), 7);
    }

    #[test]
    fn signed_exp_golomb_mapping() {
        // codeNum 1, 2, 3, 4 -> 1, -1, 2, -2
        let mut r = BitReader::new(&[0b0100_1100, 0b1000_0101, 0b0000_0000]);
        assert_eq!(r.read_se(), 1);
        assert_eq!(r.read_se(), -1);
        assert_eq!(r.read_se(), 2);
        assert_eq!(r.read_se(), -2);
    }

    #[test]
    fn max_ue_value() {
        // 31 個の 0、1、31 個の 1 => 2^32 - 2
        let bytes = [0x00, 0x00, 0x00, 0x01, 0xff, 0xff, 0xff, 0xfe];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.try_read_ue().unwrap(), u32::MAX - 1);
        assert_eq!(r.bits_available(), 1);
    }

    #[test]
    fn strict_reads_report_truncation() {
        let mut r = BitReader::new(&[0b0000_0001]);
        let e = r.try_read_ue().unwrap_err();
        assert_eq!(e.kind, crate::ErrorKind::InvalidData);
        assert_eq!(r.position(), 0);

        let mut r = BitReader::new(&[0x00]);
        assert!(r.try_read_ue().is_err());
        assert!(r.try_read_bits(9).is_err());
        assert_eq!(r.try_read_bits(8).unwrap(), 0);
    }
}
