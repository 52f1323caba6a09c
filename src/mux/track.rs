use bytes::Bytes;

use crate::{SampleDependency, h264::NAL_LENGTH_PREFIX_SIZE};

/// 上流のエンコーダーが出力した一枚分のフレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFrame {
    /// 表示順のインデックス
    ///
    /// B フレームを含むストリームではデコード順（格納順）と一致しない
    pub presentation_index: i64,

    /// キーフレームかどうか
    pub keyframe: bool,

    /// 先頭に 4 バイトの長さプレフィックスが付与された NAL ユニット
    pub data: Bytes,
}

impl VideoFrame {
    /// 新しいフレームを作成する
    pub fn new(presentation_index: i64, keyframe: bool, data: impl Into<Bytes>) -> Self {
        Self {
            presentation_index,
            keyframe,
            data: data.into(),
        }
    }
}

/// [`AvcMp4Muxer::write_mp4_header()`](crate::mux::AvcMp4Muxer::write_mp4_header) で生成された、
/// `ftyp` / `moov` / `moof` ボックスからなるヘッダー部分
///
/// 生成時のペイロードサイズとサンプル数を保持しており、
/// 後から `mdat` ボックスを連結する際に、フレーム列がヘッダーと整合しているかを確認するのに使われる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedHeader {
    /// ヘッダーのバイト列
    pub bytes: Bytes,

    /// ヘッダー生成時の `mdat` ペイロードのサイズ
    pub payload_len: u32,

    /// ヘッダー生成時のサンプル数
    pub sample_count: usize,
}

impl CachedHeader {
    /// このヘッダーがフレーム列と同じ構造から生成されたかどうかを判定する
    ///
    /// 解像度やパラメータセットの変化までは検出できないので、そこは呼び出し元の責務となる
    pub fn matches(&self, sequence: &VideoSequence) -> bool {
        self.sample_count == sequence.frames.len()
            && u64::from(self.payload_len) == sequence.payload_len()
    }
}

/// MP4 に変換する対象のフレーム列
#[derive(Debug, Clone, Default)]
pub struct VideoSequence {
    /// デコード順に並んだフレーム
    pub frames: Vec<VideoFrame>,

    /// SPS と PPS（この順番、それぞれ 4 バイトの長さプレフィックス付き）
    pub headers: Vec<Bytes>,

    /// フレームレート
    pub frame_rate: f32,

    /// 生成済みのヘッダー
    pub cached_header: Option<CachedHeader>,
}

impl VideoSequence {
    /// SPS / PPS とフレームレートを指定して、空のフレーム列を作成する
    pub fn new(sps: impl Into<Bytes>, pps: impl Into<Bytes>, frame_rate: f32) -> Self {
        Self {
            frames: Vec::new(),
            headers: vec![sps.into(), pps.into()],
            frame_rate,
            cached_header: None,
        }
    }

    /// `mdat` ボックスのペイロードサイズを返す
    ///
    /// 全てのヘッダーとフレームのバイト数の合計で、長さプレフィックスの分も含まれる
    pub fn payload_len(&self) -> u64 {
        self.headers
            .iter()
            .chain(self.frames.iter().map(|f| &f.data))
            .map(|b| b.len() as u64)
            .sum()
    }

    /// 長さプレフィックスを持たない（4 バイト未満の）ブロブが含まれていないかを確認する
    pub(crate) fn find_malformed_blob(&self) -> Option<&'static str> {
        if self.headers.iter().any(|h| h.len() < NAL_LENGTH_PREFIX_SIZE) {
            return Some("header");
        }
        if self
            .frames
            .iter()
            .any(|f| f.data.len() < NAL_LENGTH_PREFIX_SIZE)
        {
            return Some("frame");
        }
        None
    }
}

/// トラックの種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    /// 映像トラック
    Video,
}

/// `trun` / `sdtp` ボックスに書き込まれるサンプル情報
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// デコード順のインデックス
    pub index: usize,

    /// サンプルのバイト数（最初のサンプルはヘッダー NAL の分も含む）
    pub size: u32,

    /// 尺（タイムスケール単位）
    pub duration: u32,

    /// composition time offset（タイムスケール単位）
    pub cts: u32,

    /// 依存関係
    pub flags: SampleDependency,
}

/// フレーム列から構築された、ボックスの生成に必要な情報一式
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// トラック ID
    pub id: u32,

    /// トラック種別
    pub kind: TrackKind,

    /// `mdat` ボックスのペイロードサイズ
    pub len: u32,

    /// 長さプレフィックスを取り除いた SPS の一覧
    pub sps: Vec<Vec<u8>>,

    /// 長さプレフィックスを取り除いた PPS の一覧
    pub pps: Vec<Vec<u8>>,

    /// profile_idc
    pub profile_idc: u8,

    /// constraint_set フラグ群
    pub profile_compatibility: u8,

    /// level_idc
    pub level_idc: u8,

    /// chroma_format_idc
    pub chroma_format_idc: u8,

    /// bit_depth_luma_minus8
    pub bit_depth_luma_minus8: u8,

    /// bit_depth_chroma_minus8
    pub bit_depth_chroma_minus8: u8,

    /// 幅
    pub width: u32,

    /// 高さ
    pub height: u32,

    /// タイムスケール
    pub timescale: u32,

    /// 尺（タイムスケール単位）
    pub duration: u32,

    /// サンプル一覧（デコード順）
    pub samples: Vec<Sample>,

    /// 各サンプルの表示順インデックス
    pub pts: Vec<i64>,

    /// `avc1.PPCCLL` 形式のコーデック文字列
    pub codec: String,

    /// フレームレート
    pub fps: f32,

    /// composition time offset が負にならないように全サンプルに足されるフレーム数
    pub implicit_offset: u32,
}

impl Track {
    /// サンプルが一つもない、ボックス生成の対象にならないトラックを作成する
    pub(crate) fn empty(id: u32, timescale: u32, fps: f32) -> Self {
        Self {
            id,
            kind: TrackKind::Video,
            len: 0,
            sps: Vec::new(),
            pps: Vec::new(),
            profile_idc: 0,
            profile_compatibility: 0,
            level_idc: 0,
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            width: 0,
            height: 0,
            timescale,
            duration: 0,
            samples: Vec::new(),
            pts: Vec::new(),
            codec: String::new(),
            fps,
            implicit_offset: 0,
        }
    }

    /// サンプル一つ当たりの尺（タイムスケール単位）を返す
    pub fn sample_delta(&self) -> u32 {
        match u32::try_from(self.samples.len()) {
            Ok(0) | Err(_) => 0,
            Ok(n) => self.duration / n,
        }
    }

    /// サンプルを一つも持たない場合には `true` を返す
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
