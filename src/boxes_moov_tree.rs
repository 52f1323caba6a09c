//! `ftyp` と `moov` 以下のボックスのペイロード
//!
//! 実際のサンプルデータは `moof` / `mdat` 側に格納されるので、
//! `stbl` 以下のサンプルテーブルは仕様に適合するための空のテーブルとなっている。
use crate::{
    ByteSink, Encode, Error, FixedPointNumber, FullBoxFlags, FullBoxHeader, Result, boxes::BoxTree,
    codec::to_u32,
};

/// 単位行列（16.16 / 2.30 固定小数点数）
const UNITY_MATRIX: [u32; 9] = [0x0001_0000, 0, 0, 0, 0x0001_0000, 0, 0, 0, 0x4000_0000];

/// 未定義言語 "und" を ISO-639-2/T の 5 ビット文字三つに詰めた値
const LANGUAGE_UNDEFINED: u16 = 0x55c4;

/// `hdlr` ボックスの handler_type
const HANDLER_TYPE_VIDE: [u8; 4] = *b"vide";

/// `tkhd` ボックスのフラグ: track_enabled | track_in_movie
const TKHD_FLAGS: FullBoxFlags = FullBoxFlags::new(0x000003);

/// `vmhd` ボックスのフラグ（仕様上 1 固定）
const VMHD_FLAGS: FullBoxFlags = FullBoxFlags::new(0x000001);

/// `url ` ボックスのフラグ: メディアデータが同じファイル内にあることを示す
const URL_SELF_CONTAINED: FullBoxFlags = FullBoxFlags::new(0x000001);

/// `trex` ボックスの default_sample_flags（sample_is_non_sync_sample=1, sample_degradation_priority=1）
const TREX_DEFAULT_SAMPLE_FLAGS: u32 = 0x0001_0001;

impl BoxTree<'_> {
    pub(crate) fn write_ftyp<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        self.options.major_brand.encode(sink);
        sink.write_u32(self.options.minor_version);
        for brand in &self.options.compatible_brands {
            brand.encode(sink);
        }
        Ok(())
    }

    pub(crate) fn write_mvhd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let next_track_id = self
            .ctx
            .track
            .id
            .checked_add(1)
            .ok_or_else(|| Error::unsupported("Too large track ID"))?;

        FullBoxHeader::V0.encode(sink);
        self.options.creation_time.encode(sink); // creation_time
        self.options.creation_time.encode(sink); // modification_time
        sink.write_u32(self.ctx.timescale);
        sink.write_u32(self.ctx.duration);
        FixedPointNumber::<u16, u16>::new(1, 0).encode(sink); // rate
        FixedPointNumber::<u8, u8>::new(1, 0).encode(sink); // volume
        sink.write_zeros(2 + 4 * 2); // reserved
        write_matrix(sink);
        sink.write_zeros(4 * 6); // pre_defined
        sink.write_u32(next_track_id);
        Ok(())
    }

    pub(crate) fn write_tkhd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let track = self.ctx.track;
        let (width, height) = self.dimensions()?;

        FullBoxHeader::new(0, TKHD_FLAGS).encode(sink);
        self.options.creation_time.encode(sink);
        self.options.creation_time.encode(sink);
        sink.write_u32(track.id);
        sink.write_zeros(4); // reserved
        sink.write_u32(track.duration);
        sink.write_zeros(4 * 2); // reserved
        sink.write_u16(0); // layer
        sink.write_u16(0); // alternate_group
        sink.write_u16(0); // volume（映像トラックなので 0）
        sink.write_zeros(2); // reserved
        write_matrix(sink);
        FixedPointNumber::<u16, u16>::new(width, 0).encode(sink);
        FixedPointNumber::<u16, u16>::new(height, 0).encode(sink);
        Ok(())
    }

    /// 並べ替えられたフレームの composition time がデコード時刻より前にならないように
    /// 先頭に足した implicit offset 分だけ、再生開始位置をずらす
    pub(crate) fn write_elst<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let track = self.ctx.track;
        let media_time = u64::from(track.implicit_offset) * u64::from(track.sample_delta());
        let media_time = to_u32(media_time, "elst media_time")?;

        FullBoxHeader::V0.encode(sink);
        sink.write_u32(1); // entry_count
        sink.write_u32(track.duration); // segment_duration
        sink.write_u32(media_time);
        FixedPointNumber::<u16, u16>::new(1, 0).encode(sink); // media_rate
        Ok(())
    }

    pub(crate) fn write_mdhd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let track = self.ctx.track;
        FullBoxHeader::V0.encode(sink);
        self.options.creation_time.encode(sink);
        self.options.creation_time.encode(sink);
        sink.write_u32(track.timescale);
        sink.write_u32(track.duration);
        sink.write_u16(LANGUAGE_UNDEFINED);
        sink.write_u16(0); // pre_defined
        Ok(())
    }

    pub(crate) fn write_hdlr<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(0); // pre_defined
        sink.write_bytes(&HANDLER_TYPE_VIDE);
        sink.write_zeros(4 * 3); // reserved
        sink.write_bytes(self.options.handler_name.as_bytes());
        sink.write_u8(0);
        Ok(())
    }

    pub(crate) fn write_vmhd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::new(0, VMHD_FLAGS).encode(sink);
        sink.write_u16(0); // graphicsmode
        sink.write_zeros(2 * 3); // opcolor
        Ok(())
    }

    pub(crate) fn write_dref<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(1); // entry_count（子の url ボックス）
        Ok(())
    }

    pub(crate) fn write_url<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::new(0, URL_SELF_CONTAINED).encode(sink);
        Ok(())
    }

    pub(crate) fn write_stsd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(1); // entry_count（子の avc1 ボックス）
        Ok(())
    }

    /// stts / ctts / stss / stsc / stco に共通の、エントリーを持たないテーブル
    pub(crate) fn write_empty_table<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(0); // entry_count
        Ok(())
    }

    pub(crate) fn write_stsz<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(0); // sample_size
        sink.write_u32(0); // sample_count
        Ok(())
    }

    pub(crate) fn write_trex<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(self.ctx.track.id);
        sink.write_u32(1); // default_sample_description_index
        sink.write_u32(0); // default_sample_duration
        sink.write_u32(0); // default_sample_size
        sink.write_u32(TREX_DEFAULT_SAMPLE_FLAGS);
        Ok(())
    }

    /// `tkhd` と `avc1` に書き込む解像度を返す
    pub(crate) fn dimensions(&self) -> Result<(u16, u16)> {
        let track = self.ctx.track;
        let width = u16::try_from(track.width)
            .map_err(|_| Error::unsupported(format!("Too large width: {}", track.width)))?;
        let height = u16::try_from(track.height)
            .map_err(|_| Error::unsupported(format!("Too large height: {}", track.height)))?;
        Ok((width, height))
    }
}

fn write_matrix<S: ByteSink>(sink: &mut S) {
    for v in UNITY_MATRIX {
        sink.write_u32(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constants() {
        assert_eq!(TKHD_FLAGS.get(), 3);
        assert!(URL_SELF_CONTAINED.is_set(0));
        assert_eq!(UNITY_MATRIX.len() * 4, 36);
    }
}
