use crate::{Brand, Mp4FileTime};

/// デフォルトのタイムスケール
pub const DEFAULT_TIMESCALE: u32 = 6000;

/// [`AvcRemuxer`](crate::mux::AvcRemuxer) 用のオプション
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemuxOptions {
    /// トラックおよびムービーのタイムスケール
    pub timescale: u32,

    /// ftyp ボックスの major brand
    pub major_brand: Brand,

    /// ftyp ボックスの minor version
    pub minor_version: u32,

    /// ftyp ボックスの compatible brands
    pub compatible_brands: Vec<Brand>,

    /// ファイル作成時刻（mvhd / tkhd / mdhd の creation_time と modification_time）
    pub creation_time: Mp4FileTime,

    /// hdlr ボックスに書き込むハンドラー名
    pub handler_name: String,

    /// mfhd ボックスのシーケンス番号
    pub sequence_number: u32,

    /// tfdt ボックスの baseMediaDecodeTime
    pub base_media_decode_time: u32,

    /// 最初に割り当てるトラック ID
    pub first_track_id: u32,
}

impl Default for RemuxOptions {
    fn default() -> Self {
        Self {
            timescale: DEFAULT_TIMESCALE,
            major_brand: Brand::ISOM,
            minor_version: 1,
            compatible_brands: vec![Brand::ISOM, Brand::ISO2, Brand::AVC1, Brand::MP41],
            creation_time: Mp4FileTime::default(),
            handler_name: "VideoHandler".to_owned(),
            sequence_number: 1,
            base_media_decode_time: 0,
            first_track_id: 1,
        }
    }
}
