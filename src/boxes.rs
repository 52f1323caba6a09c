//! fragmented MP4 を構成するボックスの一覧と、それらを二段階（計測・出力）で書き出す仕組み
//!
//! 各ボックスは [`Mp4Box`] のバリアントとして表現され、
//! [`BoxTree::measure()`] でサイズを計算した上で、[`BoxTree::emit()`] で実際のバイト列を出力する。
//! 計測結果は生成処理ごとにボックス種別単位でキャッシュされるので、
//! 出力時に長さフィールドを後から書き換えるためのシークは不要となっている。
use std::collections::HashMap;

use crate::{
    BOX_HEADER_SIZE, BoxType, ByteOrder, ByteSink, ByteWriter, Encode, Error, Result, SizeCounter,
    codec::to_u32,
    mux::{RemuxOptions, Track, VideoSequence},
};

/// このライブラリが出力するボックスの一覧
///
/// 子ボックスの並び順は [`Mp4Box::children()`] で固定されており、
/// 一回の生成処理の中ではボックスの構造が呼び出し元によって変化することはない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[allow(missing_docs)]
pub enum Mp4Box {
    Ftyp,
    Moov,
    Mvhd,
    Trak,
    Tkhd,
    Edts,
    Elst,
    Mdia,
    Mdhd,
    Hdlr,
    Minf,
    Vmhd,
    Dinf,
    Dref,
    Url,
    Stbl,
    Stsd,
    Avc1,
    Avcc,
    Stts,
    Ctts,
    Stss,
    Stsc,
    Stsz,
    Stco,
    Mvex,
    Trex,
    Moof,
    Mfhd,
    Traf,
    Tfhd,
    Tfdt,
    Trun,
    Sdtp,
    Mdat,
}

impl Mp4Box {
    /// 全てのボックス
    pub const ALL: [Self; 35] = [
        Self::Ftyp,
        Self::Moov,
        Self::Mvhd,
        Self::Trak,
        Self::Tkhd,
        Self::Edts,
        Self::Elst,
        Self::Mdia,
        Self::Mdhd,
        Self::Hdlr,
        Self::Minf,
        Self::Vmhd,
        Self::Dinf,
        Self::Dref,
        Self::Url,
        Self::Stbl,
        Self::Stsd,
        Self::Avc1,
        Self::Avcc,
        Self::Stts,
        Self::Ctts,
        Self::Stss,
        Self::Stsc,
        Self::Stsz,
        Self::Stco,
        Self::Mvex,
        Self::Trex,
        Self::Moof,
        Self::Mfhd,
        Self::Traf,
        Self::Tfhd,
        Self::Tfdt,
        Self::Trun,
        Self::Sdtp,
        Self::Mdat,
    ];

    /// 単体で再生可能なファイルを構成するトップレベルのボックス
    pub const FILE: [Self; 4] = [Self::Ftyp, Self::Moov, Self::Moof, Self::Mdat];

    /// 後から `mdat` ボックスを連結するためのヘッダー部分を構成するトップレベルのボックス
    pub const HEADER: [Self; 3] = [Self::Ftyp, Self::Moov, Self::Moof];

    /// ボックス種別を返す
    pub const fn box_type(self) -> BoxType {
        BoxType::new(match self {
            Self::Ftyp => *b"ftyp",
            Self::Moov => *b"moov",
            Self::Mvhd => *b"mvhd",
            Self::Trak => *b"trak",
            Self::Tkhd => *b"tkhd",
            Self::Edts => *b"edts",
            Self::Elst => *b"elst",
            Self::Mdia => *b"mdia",
            Self::Mdhd => *b"mdhd",
            Self::Hdlr => *b"hdlr",
            Self::Minf => *b"minf",
            Self::Vmhd => *b"vmhd",
            Self::Dinf => *b"dinf",
            Self::Dref => *b"dref",
            Self::Url => *b"url ",
            Self::Stbl => *b"stbl",
            Self::Stsd => *b"stsd",
            Self::Avc1 => *b"avc1",
            Self::Avcc => *b"avcC",
            Self::Stts => *b"stts",
            Self::Ctts => *b"ctts",
            Self::Stss => *b"stss",
            Self::Stsc => *b"stsc",
            Self::Stsz => *b"stsz",
            Self::Stco => *b"stco",
            Self::Mvex => *b"mvex",
            Self::Trex => *b"trex",
            Self::Moof => *b"moof",
            Self::Mfhd => *b"mfhd",
            Self::Traf => *b"traf",
            Self::Tfhd => *b"tfhd",
            Self::Tfdt => *b"tfdt",
            Self::Trun => *b"trun",
            Self::Sdtp => *b"sdtp",
            Self::Mdat => *b"mdat",
        })
    }

    /// ペイロードの後ろに続く子ボックスを、出力順に返す
    pub const fn children(self) -> &'static [Self] {
        match self {
            Self::Moov => &[Self::Mvhd, Self::Trak, Self::Mvex],
            Self::Trak => &[Self::Tkhd, Self::Edts, Self::Mdia],
            Self::Edts => &[Self::Elst],
            Self::Mdia => &[Self::Mdhd, Self::Hdlr, Self::Minf],
            Self::Minf => &[Self::Vmhd, Self::Dinf, Self::Stbl],
            Self::Dinf => &[Self::Dref],
            Self::Dref => &[Self::Url],
            Self::Stbl => &[
                Self::Stsd,
                Self::Stts,
                Self::Ctts,
                Self::Stss,
                Self::Stsc,
                Self::Stsz,
                Self::Stco,
            ],
            Self::Stsd => &[Self::Avc1],
            Self::Avc1 => &[Self::Avcc],
            Self::Mvex => &[Self::Trex],
            Self::Moof => &[Self::Mfhd, Self::Traf],
            Self::Traf => &[Self::Tfhd, Self::Tfdt, Self::Trun, Self::Sdtp],
            _ => &[],
        }
    }
}

/// 一回の生成処理の間だけ使われる状態
#[derive(Debug, Clone)]
pub struct MuxContext<'a> {
    /// ムービー全体のタイムスケール
    pub timescale: u32,

    /// ムービー全体の尺（タイムスケール単位）
    pub duration: u32,

    /// `mfhd` ボックスのシーケンス番号
    pub sequence_number: u32,

    /// `tfdt` ボックスの baseMediaDecodeTime
    pub base_media_decode_time: u32,

    /// `mdat` ボックスのペイロードサイズ
    pub payload_len: u32,

    /// 処理対象のトラック
    pub track: &'a Track,

    /// トラックの元になったフレーム列
    pub sequence: &'a VideoSequence,

    /// `traf` ボックスの先頭を基準にして積み上げた、`mdat` ペイロードまでのオフセット（`trun` のサイズを除く）
    pub data_offset: u32,
}

/// ボックスのサイズ計測と出力を行う
///
/// 計測結果のキャッシュと [`MuxContext`] は、このインスタンスが生きている間（一回の生成処理）だけ有効で、
/// 複数のスレッドや生成処理の間で共有されることはない。
#[derive(Debug)]
pub struct BoxTree<'a> {
    pub(crate) ctx: MuxContext<'a>,
    pub(crate) options: &'a RemuxOptions,
    sizes: HashMap<Mp4Box, u32>,
}

impl<'a> BoxTree<'a> {
    /// トラックとフレーム列を受け取って、新しい生成処理を開始する
    ///
    /// `track` が `sequence` から作られたものでない（サンプル数やペイロードサイズが一致しない）場合にはエラーとなる
    pub fn new(
        track: &'a Track,
        sequence: &'a VideoSequence,
        options: &'a RemuxOptions,
    ) -> Result<Self> {
        if track.samples.len() != sequence.frames.len() {
            return Err(Error::invalid_input(format!(
                "Sample count mismatch: track={}, sequence={}",
                track.samples.len(),
                sequence.frames.len()
            )));
        }
        let payload_len = sequence.payload_len();
        if u64::from(track.len) != payload_len {
            return Err(Error::invalid_input(format!(
                "Payload length mismatch: track={}, sequence={payload_len}",
                track.len
            )));
        }

        Ok(Self {
            ctx: MuxContext {
                timescale: track.timescale,
                duration: track.duration,
                sequence_number: options.sequence_number,
                base_media_decode_time: options.base_media_decode_time,
                payload_len: track.len,
                track,
                sequence,
                data_offset: 0,
            },
            options,
            sizes: HashMap::new(),
        })
    }

    /// 現在の生成処理の状態を返す
    pub fn context(&self) -> &MuxContext<'a> {
        &self.ctx
    }

    /// ボックスのサイズ（ヘッダーを含む）を計算する
    ///
    /// 結果はボックス種別ごとにキャッシュされ、二回目以降はキャッシュの値が返される
    pub fn measure(&mut self, b: Mp4Box) -> Result<u32> {
        if let Some(&size) = self.sizes.get(&b) {
            return Ok(size);
        }

        let size = if b == Mp4Box::Mdat {
            // mdat のペイロードは既知のバッファ長の合計なので、中身を走査する必要はない
            u64::from(BOX_HEADER_SIZE) + u64::from(self.ctx.payload_len)
        } else {
            let mut counter = SizeCounter::new();
            self.write_payload(b, &mut counter)?;
            let mut size = u64::from(BOX_HEADER_SIZE) + counter.size();
            for &child in b.children() {
                size += u64::from(self.measure(child)?);
            }
            size
        };
        let size = to_u32(size, "box size").map_err(|e| e.with_box_type(b.box_type()))?;

        log::trace!("measured '{}' box: {size} bytes", b.box_type());
        self.sizes.insert(b, size);
        Ok(size)
    }

    /// 複数のボックスのサイズの合計を計算する
    pub fn measure_all(&mut self, boxes: &[Mp4Box]) -> Result<u32> {
        let mut total = 0u64;
        for &b in boxes {
            total += u64::from(self.measure(b)?);
        }
        to_u32(total, "total box size")
    }

    /// ボックスを出力する
    ///
    /// サイズフィールドには計測済みの値を書き込み、その後にペイロードと子ボックスを順番に出力する。
    /// 実際に書き込まれたバイト数が計測値と一致しない場合にはエラーとなる。
    pub fn emit(&mut self, b: Mp4Box, writer: &mut ByteWriter) -> Result<u32> {
        if writer.order() != ByteOrder::BigEndian {
            return Err(Error::invalid_input("MP4 boxes must be written in big-endian"));
        }

        let size = self.measure(b)?;
        let start = writer.len();
        writer.write_u32(size);
        b.box_type().encode(writer);
        self.write_payload(b, writer)?;
        for &child in b.children() {
            self.emit(child, writer)?;
        }

        let written = writer.len() - start;
        if written != size as usize {
            return Err(Error::other(format!(
                "Emitted {written} bytes, but measured {size} bytes"
            ))
            .with_box_type(b.box_type()));
        }
        Ok(size)
    }

    /// 複数のボックスを順番に出力する
    pub fn emit_all(&mut self, boxes: &[Mp4Box], writer: &mut ByteWriter) -> Result<u32> {
        let mut total = 0u64;
        for &b in boxes {
            total += u64::from(self.emit(b, writer)?);
        }
        to_u32(total, "total box size")
    }

    fn write_payload<S: ByteSink>(&mut self, b: Mp4Box, sink: &mut S) -> Result<()> {
        let result = match b {
            Mp4Box::Moov
            | Mp4Box::Trak
            | Mp4Box::Edts
            | Mp4Box::Mdia
            | Mp4Box::Minf
            | Mp4Box::Dinf
            | Mp4Box::Stbl
            | Mp4Box::Mvex
            | Mp4Box::Moof => Ok(()),
            Mp4Box::Ftyp => self.write_ftyp(sink),
            Mp4Box::Mvhd => self.write_mvhd(sink),
            Mp4Box::Tkhd => self.write_tkhd(sink),
            Mp4Box::Elst => self.write_elst(sink),
            Mp4Box::Mdhd => self.write_mdhd(sink),
            Mp4Box::Hdlr => self.write_hdlr(sink),
            Mp4Box::Vmhd => self.write_vmhd(sink),
            Mp4Box::Dref => self.write_dref(sink),
            Mp4Box::Url => self.write_url(sink),
            Mp4Box::Stsd => self.write_stsd(sink),
            Mp4Box::Avc1 => self.write_avc1(sink),
            Mp4Box::Avcc => self.write_avcc(sink),
            Mp4Box::Stts | Mp4Box::Ctts | Mp4Box::Stss | Mp4Box::Stsc | Mp4Box::Stco => {
                self.write_empty_table(sink)
            }
            Mp4Box::Stsz => self.write_stsz(sink),
            Mp4Box::Trex => self.write_trex(sink),
            Mp4Box::Mfhd => self.write_mfhd(sink),
            Mp4Box::Traf => self.prepare_data_offset(),
            Mp4Box::Tfhd => self.write_tfhd(sink),
            Mp4Box::Tfdt => self.write_tfdt(sink),
            Mp4Box::Trun => self.write_trun(sink),
            Mp4Box::Sdtp => self.write_sdtp(sink),
            Mp4Box::Mdat => crate::boxes_fmp4::write_mdat_payload(self.ctx.sequence, sink),
        };
        result.map_err(|e| e.with_box_type(b.box_type()))
    }
}
