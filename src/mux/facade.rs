use bytes::Bytes;

use crate::{
    BOX_HEADER_SIZE, ByteSink, ByteWriter, Error, Result, boxes_fmp4::write_mdat,
    mux::{AvcRemuxer, RemuxOptions, VideoSequence},
};

/// フレーム列を MP4 のバイト列に変換するための窓口
///
/// フレーム列にキャッシュ済みのヘッダーがある場合には、ボックスツリーを組み立て直さずに
/// ヘッダーの後ろに `mdat` ボックスを連結するだけで出力を生成する。
///
/// # Examples
///
/// ```
/// use avc_fmp4::mux::{AvcMp4Muxer, VideoFrame, VideoSequence};
///
/// let sps = [0, 0, 0, 8, 0x67, 0x42, 0xc0, 0x1e, 0xda, 0x05, 0x07, 0xe4];
/// let pps = [0, 0, 0, 4, 0x68, 0xce, 0x3c, 0x80];
/// let mut sequence = VideoSequence::new(sps.to_vec(), pps.to_vec(), 30.0);
/// sequence.frames.push(VideoFrame::new(0, true, vec![0, 0, 0, 2, 0x65, 0x88]));
///
/// let mut muxer = AvcMp4Muxer::new();
/// let mp4 = muxer.convert_to_mp4(&sequence)?.expect("non-empty payload");
/// assert_eq!(&mp4[4..8], b"ftyp");
/// # Ok::<(), avc_fmp4::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct AvcMp4Muxer {
    remuxer: AvcRemuxer,
}

impl AvcMp4Muxer {
    /// デフォルトのオプションでインスタンスを生成する
    pub fn new() -> Self {
        Self::default()
    }

    /// オプションを指定してインスタンスを生成する
    pub fn with_options(options: RemuxOptions) -> Self {
        Self {
            remuxer: AvcRemuxer::with_options(options),
        }
    }

    /// 内部で使われている [`AvcRemuxer`] を返す
    pub fn remuxer(&self) -> &AvcRemuxer {
        &self.remuxer
    }

    /// フレーム列を MP4 のバイト列に変換する
    ///
    /// 構造が一致するヘッダーがキャッシュされていれば [`AvcMp4Muxer::concat_mp4()`] を、
    /// そうでなければ [`AvcMp4Muxer::create_mp4()`] を使う。
    /// キャッシュ済みのヘッダーが一致しない場合は、警告ログを出力した上で全体を生成し直す。
    pub fn convert_to_mp4(&mut self, sequence: &VideoSequence) -> Result<Option<Bytes>> {
        if let Some(cached) = &sequence.cached_header {
            if cached.matches(sequence) {
                return self.concat_mp4(sequence).map(Some);
            }
            log::warn!(
                "Cached MP4 header does not match the sequence \
                 (payload: {} -> {}, samples: {} -> {}), rebuilding",
                cached.payload_len,
                sequence.payload_len(),
                cached.sample_count,
                sequence.frames.len()
            );
        }
        self.create_mp4(sequence)
    }

    /// ヘッダー部分（`ftyp` / `moov` / `moof`）を生成して、フレーム列にキャッシュする
    pub fn write_mp4_header(&mut self, sequence: &mut VideoSequence) -> Result<Option<Bytes>> {
        let track = self.remuxer.remux(sequence);
        self.remuxer.write_mp4_boxes_in_sequence(&track, sequence)
    }

    /// キャッシュ済みのヘッダーの後ろに `mdat` ボックスを連結する
    ///
    /// ヘッダーがキャッシュされていない場合や、フレーム列の構造と一致しない場合には
    /// [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput) を返す
    pub fn concat_mp4(&self, sequence: &VideoSequence) -> Result<Bytes> {
        let cached = sequence
            .cached_header
            .as_ref()
            .ok_or_else(|| Error::invalid_input("No cached MP4 header"))?;
        if !cached.matches(sequence) {
            return Err(Error::invalid_input(format!(
                "Cached MP4 header was built for {} samples / {} payload bytes, \
                 but the sequence has {} samples / {} payload bytes",
                cached.sample_count,
                cached.payload_len,
                sequence.frames.len(),
                sequence.payload_len()
            )));
        }

        let mdat_size = BOX_HEADER_SIZE as usize + cached.payload_len as usize;
        let mut writer = ByteWriter::with_capacity(cached.bytes.len() + mdat_size);
        writer.write_bytes(&cached.bytes);
        write_mdat(sequence, &mut writer)?;
        log::debug!(
            "concatenated {} cached header bytes and {mdat_size} mdat bytes",
            cached.bytes.len()
        );
        Ok(writer.release())
    }

    /// トラックの構築から `ftyp` / `moov` / `moof` / `mdat` の生成までを一度に行う
    ///
    /// ヘッダーのキャッシュは参照も更新もしない
    pub fn create_mp4(&mut self, sequence: &VideoSequence) -> Result<Option<Bytes>> {
        let track = self.remuxer.remux(sequence);
        self.remuxer.convert_mp4(&track, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, mux::VideoFrame};

    fn sequence() -> VideoSequence {
        let sps = [0, 0, 0, 8, 0x67, 0x42, 0xc0, 0x1e, 0xda, 0x05, 0x07, 0xe4];
        let pps = [0, 0, 0, 4, 0x68, 0xce, 0x3c, 0x80];
        let mut seq = VideoSequence::new(sps.to_vec(), pps.to_vec(), 25.0);
        seq.frames.push(VideoFrame::new(0, true, vec![0, 0, 0, 3, 0x65, 1, 2]));
        seq.frames.push(VideoFrame::new(1, false, vec![0, 0, 0, 2, 0x41, 3]));
        seq
    }

    #[test]
    fn concat_without_cache_fails() {
        let e = AvcMp4Muxer::new().concat_mp4(&sequence()).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidInput);
    }

    #[test]
    fn header_reuse_is_byte_identical() {
        let mut seq = sequence();
        let mut cached = AvcMp4Muxer::new();
        let header = cached.write_mp4_header(&mut seq).unwrap().unwrap();
        let reused = cached.convert_to_mp4(&seq).unwrap().unwrap();
        assert!(reused.starts_with(&header));

        let direct = AvcMp4Muxer::new().create_mp4(&seq).unwrap().unwrap();
        assert_eq!(reused, direct);
    }

    #[test]
    fn stale_cache_falls_back_to_full_build() {
        let mut seq = sequence();
        let mut muxer = AvcMp4Muxer::new();
        muxer.write_mp4_header(&mut seq).unwrap();

        seq.frames.push(VideoFrame::new(2, false, vec![0, 0, 0, 1, 0x41]));
        assert!(muxer.concat_mp4(&seq).is_err());

        let out = muxer.convert_to_mp4(&seq).unwrap().unwrap();
        let mut fresh = seq.clone();
        fresh.cached_header = None;
        let expected = AvcMp4Muxer::new().create_mp4(&fresh).unwrap().unwrap();
        // 二回目の生成なのでトラック ID だけが異なる
        assert_eq!(out.len(), expected.len());
    }

    #[test]
    fn empty_sequence_yields_nothing() {
        let mut seq = VideoSequence::default();
        let mut muxer = AvcMp4Muxer::new();
        assert_eq!(muxer.convert_to_mp4(&seq).unwrap(), None);
        assert_eq!(muxer.write_mp4_header(&mut seq).unwrap(), None);
        assert!(seq.cached_header.is_none());
    }
}
