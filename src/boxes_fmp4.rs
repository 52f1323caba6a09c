//! fragmented MP4 のフラグメント部分（`moof` 以下のボックスと `mdat` ボックス）
use crate::{
    BOX_HEADER_SIZE, ByteSink, Encode, Error, FULL_BOX_HEADER_SIZE, FullBoxFlags, FullBoxHeader,
    Result,
    boxes::{BoxTree, Mp4Box},
    codec::to_u32,
    h264::NAL_LENGTH_PREFIX_SIZE,
    mux::VideoSequence,
};

/// `trun` ボックスのフラグ
///
/// data_offset と、サンプルごとの duration / size / flags / composition_time_offset を持つ
const TRUN_FLAGS: FullBoxFlags = FullBoxFlags::new(0x000f01);

/// `trun` ボックスのサンプル一つ当たりのバイト数
const TRUN_SAMPLE_SIZE: u32 = 4 * 4;

impl BoxTree<'_> {
    pub(crate) fn write_mfhd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(self.ctx.sequence_number);
        Ok(())
    }

    /// `traf` ボックスの子を出力する前に、`trun` の data_offset のうち `trun` 自身以外の部分を積み上げておく
    ///
    /// tfhd に base_data_offset を指定していないので、オフセットの基準は `moof` ボックスの先頭となる
    pub(crate) fn prepare_data_offset(&mut self) -> Result<()> {
        let mut offset = u64::from(self.measure(Mp4Box::Sdtp)?);
        offset += u64::from(self.measure(Mp4Box::Tfhd)?);
        offset += u64::from(self.measure(Mp4Box::Tfdt)?);
        offset += u64::from(BOX_HEADER_SIZE); // traf
        offset += u64::from(self.measure(Mp4Box::Mfhd)?);
        offset += u64::from(BOX_HEADER_SIZE); // moof
        offset += u64::from(BOX_HEADER_SIZE); // mdat
        self.ctx.data_offset = to_u32(offset, "data offset")?;
        Ok(())
    }

    pub(crate) fn write_tfhd<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(self.ctx.track.id);
        Ok(())
    }

    pub(crate) fn write_tfdt<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        sink.write_u32(self.ctx.base_media_decode_time);
        Ok(())
    }

    pub(crate) fn write_trun<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let samples = &self.ctx.track.samples;
        let sample_count = to_u32(samples.len(), "sample count")?;

        // 自分自身のサイズは measure() を経由すると再帰してしまうので、ここで直接計算する
        let trun_size = u64::from(BOX_HEADER_SIZE)
            + u64::from(FULL_BOX_HEADER_SIZE)
            + 4 * 2
            + u64::from(TRUN_SAMPLE_SIZE) * u64::from(sample_count);
        let data_offset = u64::from(self.ctx.data_offset) + trun_size;
        let data_offset = i32::try_from(data_offset)
            .map_err(|_| Error::unsupported(format!("Too large data offset: {data_offset}")))?;

        FullBoxHeader::new(0, TRUN_FLAGS).encode(sink);
        sink.write_u32(sample_count);
        sink.write_i32(data_offset);
        for sample in samples {
            sink.write_u32(sample.duration);
            sink.write_u32(sample.size);
            sink.write_u32(sample.flags.to_sample_flags());
            sink.write_u32(sample.cts);
        }
        Ok(())
    }

    pub(crate) fn write_sdtp<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        FullBoxHeader::V0.encode(sink);
        for sample in &self.ctx.track.samples {
            sink.write_u8(sample.flags.to_sdtp_entry());
        }
        Ok(())
    }
}

/// `mdat` ボックスのペイロード（ヘッダー NAL、各フレームの順）を書き出す
///
/// 入力の各ブロブの先頭 4 バイトは、ブロブの残りの長さを表すビッグエンディアンの値に置き換えられる。
/// そのため、ペイロードの合計サイズは入力のブロブ長の合計と一致する。
pub(crate) fn write_mdat_payload<S: ByteSink>(sequence: &VideoSequence, sink: &mut S) -> Result<()> {
    let blobs = sequence
        .headers
        .iter()
        .chain(sequence.frames.iter().map(|f| &f.data));
    for blob in blobs {
        let nal = crate::h264::strip_length_prefix(blob).ok_or_else(|| {
            Error::invalid_input(format!(
                "NAL unit is shorter than its {NAL_LENGTH_PREFIX_SIZE}-byte length prefix"
            ))
        })?;
        sink.write_u32(to_u32(nal.len(), "NAL unit size")?);
        sink.write_bytes(nal);
    }
    Ok(())
}

/// `mdat` ボックスのヘッダーとペイロードを書き出す
///
/// ボックスツリーを経由しないので、キャッシュ済みのヘッダーの後ろに連結する場合に使われる
pub(crate) fn write_mdat<S: ByteSink>(sequence: &VideoSequence, sink: &mut S) -> Result<u32> {
    let size = u64::from(BOX_HEADER_SIZE) + sequence.payload_len();
    let size = to_u32(size, "box size").map_err(|e| e.with_box_type(Mp4Box::Mdat.box_type()))?;
    sink.write_u32(size);
    Mp4Box::Mdat.box_type().encode(sink);
    write_mdat_payload(sequence, sink).map_err(|e| e.with_box_type(Mp4Box::Mdat.box_type()))?;
    Ok(size)
}
