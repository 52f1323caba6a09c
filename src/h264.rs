//! H.264 のパラメータセットの解析
use crate::{BitReader, Error, Result};

/// 入力の NAL ユニットの先頭に付与されている長さ（またはスタートコード）のバイト数
pub const NAL_LENGTH_PREFIX_SIZE: usize = 4;

/// NAL ユニットヘッダーのバイト数
const NAL_HEADER_SIZE: usize = 1;

/// 先頭 4 バイトの長さプレフィックスを取り除いた NAL ユニットを返す
///
/// プレフィックスに満たない長さの場合には [`None`] を返す
pub fn strip_length_prefix(data: &[u8]) -> Option<&[u8]> {
    data.get(NAL_LENGTH_PREFIX_SIZE..)
}

/// NAL ユニットのペイロードから emulation_prevention_three_byte を取り除いて RBSP に変換する
pub fn nal_to_rbsp(nal: &[u8]) -> Vec<u8> {
    let mut rbsp = Vec::with_capacity(nal.len());
    let mut zeros = 0;
    for &b in nal {
        if zeros >= 2 && b == 0x03 {
            zeros = 0;
            continue;
        }
        rbsp.push(b);
        if b == 0 {
            zeros += 1;
        } else {
            zeros = 0;
        }
    }
    rbsp
}

/// SPS (Sequence Parameter Set) から取り出した情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpsInfo {
    /// 長さプレフィックスを取り除いた SPS の NAL ユニット（NAL ヘッダーを含む）
    pub sps: Vec<u8>,

    /// `avc1.PPCCLL` 形式のコーデック文字列
    pub codec: String,

    /// profile_idc
    pub profile_idc: u8,

    /// constraint_set フラグ群（`avcC` の profile_compatibility）
    pub profile_compatibility: u8,

    /// level_idc
    pub level_idc: u8,

    /// chroma_format_idc（High 系以外のプロファイルでは 1）
    pub chroma_format_idc: u8,

    /// bit_depth_luma_minus8
    pub bit_depth_luma_minus8: u8,

    /// bit_depth_chroma_minus8
    pub bit_depth_chroma_minus8: u8,

    /// クロップ後の幅（ピクセル単位）
    ///
    /// SPS 全体の解析に失敗した場合には 0 となる
    pub width: u32,

    /// クロップ後の高さ（ピクセル単位）
    ///
    /// SPS 全体の解析に失敗した場合には 0 となる
    pub height: u32,
}

impl SpsInfo {
    /// 長さプレフィックス付きの SPS NAL ユニットを解析する
    ///
    /// profile / constraint / level の三バイトが取得できない場合にはエラーとなる。
    /// 解像度の取得に失敗した場合はエラーにはせずに、ログを出力した上で幅と高さを 0 にする。
    pub fn parse(data: &[u8]) -> Result<Self> {
        let sps = strip_length_prefix(data)
            .ok_or_else(|| Error::invalid_input("SPS is shorter than its length prefix"))?;
        if sps.len() < NAL_HEADER_SIZE + 3 {
            return Err(Error::invalid_input(format!(
                "Too short SPS: {} bytes",
                sps.len()
            )));
        }
        let nal_unit_type = sps[0] & 0x1f;
        if nal_unit_type != 7 {
            log::warn!("NAL unit type of SPS is {nal_unit_type}, not 7");
        }

        let profile_idc = sps[1];
        let profile_compatibility = sps[2];
        let level_idc = sps[3];
        let codec = format!("avc1.{profile_idc:02x}{profile_compatibility:02x}{level_idc:02x}");

        let rbsp = nal_to_rbsp(&sps[NAL_HEADER_SIZE..]);
        let fields = match SpsFields::parse(&rbsp) {
            Ok(fields) => fields,
            Err(e) => {
                log::warn!("Failed to parse SPS, resolution is unknown: {e}");
                SpsFields::default()
            }
        };

        Ok(Self {
            sps: sps.to_vec(),
            codec,
            profile_idc,
            profile_compatibility,
            level_idc,
            chroma_format_idc: fields.chroma_format_idc,
            bit_depth_luma_minus8: fields.bit_depth_luma_minus8,
            bit_depth_chroma_minus8: fields.bit_depth_chroma_minus8,
            width: fields.width,
            height: fields.height,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SpsFields {
    chroma_format_idc: u8,
    bit_depth_luma_minus8: u8,
    bit_depth_chroma_minus8: u8,
    width: u32,
    height: u32,
}

impl Default for SpsFields {
    fn default() -> Self {
        Self {
            chroma_format_idc: 1,
            bit_depth_luma_minus8: 0,
            bit_depth_chroma_minus8: 0,
            width: 0,
            height: 0,
        }
    }
}

impl SpsFields {
    /// [ITU-T H.264] 7.3.2.1.1 seq_parameter_set_data() を解像度の取得に必要なところまで読む
    fn parse(rbsp: &[u8]) -> Result<Self> {
        let mut r = BitReader::new(rbsp);
        let profile_idc = r.try_read_bits(8)?;
        r.try_read_bits(8)?; // constraint_set flags + reserved_zero_2bits
        r.try_read_bits(8)?; // level_idc
        r.try_read_ue()?; // seq_parameter_set_id

        let mut fields = Self::default();
        let mut separate_colour_plane = false;
        if matches!(
            profile_idc,
            100 | 110 | 122 | 244 | 44 | 83 | 86 | 118 | 128 | 138 | 139 | 134 | 135
        ) {
            let chroma_format_idc = r.try_read_ue()?;
            if chroma_format_idc > 3 {
                return Err(Error::invalid_data(format!(
                    "Invalid chroma_format_idc: {chroma_format_idc}"
                )));
            }
            fields.chroma_format_idc = chroma_format_idc as u8;
            if chroma_format_idc == 3 {
                separate_colour_plane = r.try_read_flag()?;
            }
            fields.bit_depth_luma_minus8 = ue_as_u8(&mut r, "bit_depth_luma_minus8", 6)?;
            fields.bit_depth_chroma_minus8 = ue_as_u8(&mut r, "bit_depth_chroma_minus8", 6)?;
            r.try_read_flag()?; // qpprime_y_zero_transform_bypass_flag
            if r.try_read_flag()? {
                // seq_scaling_matrix_present_flag
                let count = if chroma_format_idc == 3 { 12 } else { 8 };
                for i in 0..count {
                    if r.try_read_flag()? {
                        skip_scaling_list(&mut r, if i < 6 { 16 } else { 64 })?;
                    }
                }
            }
        }

        r.try_read_ue()?; // log2_max_frame_num_minus4
        match r.try_read_ue()? {
            0 => {
                r.try_read_ue()?; // log2_max_pic_order_cnt_lsb_minus4
            }
            1 => {
                r.try_read_flag()?; // delta_pic_order_always_zero_flag
                r.try_read_se()?; // offset_for_non_ref_pic
                r.try_read_se()?; // offset_for_top_to_bottom_field
                let cycle = r.try_read_ue()?;
                if cycle > 255 {
                    return Err(Error::invalid_data(format!(
                        "Invalid num_ref_frames_in_pic_order_cnt_cycle: {cycle}"
                    )));
                }
                for _ in 0..cycle {
                    r.try_read_se()?;
                }
            }
            2 => {}
            other => {
                return Err(Error::invalid_data(format!(
                    "Invalid pic_order_cnt_type: {other}"
                )));
            }
        }
        r.try_read_ue()?; // max_num_ref_frames
        r.try_read_flag()?; // gaps_in_frame_num_value_allowed_flag

        let pic_width_in_mbs = u64::from(r.try_read_ue()?) + 1;
        let pic_height_in_map_units = u64::from(r.try_read_ue()?) + 1;
        let frame_mbs_only = r.try_read_flag()?;
        if !frame_mbs_only {
            r.try_read_flag()?; // mb_adaptive_frame_field_flag
        }
        r.try_read_flag()?; // direct_8x8_inference_flag

        let (crop_left, crop_right, crop_top, crop_bottom) = if r.try_read_flag()? {
            (
                u64::from(r.try_read_ue()?),
                u64::from(r.try_read_ue()?),
                u64::from(r.try_read_ue()?),
                u64::from(r.try_read_ue()?),
            )
        } else {
            (0, 0, 0, 0)
        };

        // [ITU-T H.264] 7.4.2.1.1 CropUnitX / CropUnitY
        let field_factor = if frame_mbs_only { 1 } else { 2 };
        let (crop_unit_x, crop_unit_y) = if separate_colour_plane || fields.chroma_format_idc == 0
        {
            (1, field_factor)
        } else {
            let sub_width_c = if fields.chroma_format_idc == 3 { 1 } else { 2 };
            let sub_height_c = if fields.chroma_format_idc == 1 { 2 } else { 1 };
            (sub_width_c, sub_height_c * field_factor)
        };

        let width = (pic_width_in_mbs * 16)
            .checked_sub((crop_left + crop_right) * crop_unit_x)
            .ok_or_else(|| Error::invalid_data("Horizontal cropping exceeds picture width"))?;
        let height = (pic_height_in_map_units * 16 * field_factor)
            .checked_sub((crop_top + crop_bottom) * crop_unit_y)
            .ok_or_else(|| Error::invalid_data("Vertical cropping exceeds picture height"))?;

        fields.width = u32::try_from(width)
            .map_err(|_| Error::invalid_data(format!("Too large picture width: {width}")))?;
        fields.height = u32::try_from(height)
            .map_err(|_| Error::invalid_data(format!("Too large picture height: {height}")))?;
        Ok(fields)
    }
}

fn ue_as_u8(r: &mut BitReader<'_>, name: &str, max: u32) -> Result<u8> {
    let v = r.try_read_ue()?;
    if v > max {
        return Err(Error::invalid_data(format!("Invalid {name}: {v}")));
    }
    Ok(v as u8)
}

/// [ITU-T H.264] 7.3.2.1.1.1 scaling_list() を読み飛ばす
fn skip_scaling_list(r: &mut BitReader<'_>, size: usize) -> Result<()> {
    let mut last_scale = 8i32;
    let mut next_scale = 8i32;
    for _ in 0..size {
        if next_scale != 0 {
            let delta_scale = r.try_read_se()?;
            if !(-128..=127).contains(&delta_scale) {
                return Err(Error::invalid_data(format!(
                    "Invalid delta_scale: {delta_scale}"
                )));
            }
            next_scale = (last_scale + delta_scale).rem_euclid(256);
        }
        if next_scale != 0 {
            last_scale = next_scale;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Baseline, 320x240, クロップなし
    const SPS_320X240: [u8; 12] = [
        0x00, 0x00, 0x00, 0x08, 0x67, 0x42, 0xc0, 0x1e, 0xda, 0x05, 0x07, 0xe4,
    ];

    // High, 1920x1080（1088 から下端を 8 ライン分クロップ）
    const SPS_1920X1080: [u8; 15] = [
        0x00, 0x00, 0x00, 0x0b, 0x67, 0x64, 0x00, 0x28, 0xac, 0xda, 0x01, 0xe0, 0x08, 0x9f,
        0x95,
    ];

    #[test]
    fn baseline_sps() {
        let info = SpsInfo::parse(&SPS_320X240).unwrap();
        assert_eq!(info.codec, "avc1.42c01e");
        assert_eq!(info.sps, &SPS_320X240[4..]);
        assert_eq!((info.width, info.height), (320, 240));
        assert_eq!(info.chroma_format_idc, 1);
    }

    #[test]
    fn high_profile_sps_with_cropping() {
        let info = SpsInfo::parse(&SPS_1920X1080).unwrap();
        assert_eq!(info.codec, "avc1.640028");
        assert_eq!(info.profile_idc, 100);
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    // Main, 640x480, pic_order_cnt_type=0
    const SPS_POC_TYPE0: [u8; 13] = [
        0x00, 0x00, 0x00, 0x09, 0x67, 0x4d, 0x40, 0x1e, 0xed, 0x01, 0x40, 0x7b, 0x20,
    ];

    // Main, 352x288, pic_order_cnt_type=1（offset_for_ref_frame が 2 個）
    const SPS_POC_TYPE1: [u8; 15] = [
        0x00, 0x00, 0x00, 0x0b, 0x67, 0x4d, 0x40, 0x15, 0xd0, 0xa9, 0x91, 0xa0, 0x58, 0x25,
        0x90,
    ];

    // High, フィールド符号化 (frame_mbs_only_flag=0)、1920x1088 から下端を 2 単位クロップ
    const SPS_INTERLACED: [u8; 15] = [
        0x00, 0x00, 0x00, 0x0b, 0x67, 0x64, 0x00, 0x28, 0xac, 0xda, 0x01, 0xe0, 0x11, 0x3f,
        0x68,
    ];

    // High, 1280x720, スケーリングリスト 0（途中で打ち切り）と 6（64 要素）を含む
    const SPS_SCALING_MATRIX: [u8; 27] = [
        0x00, 0x00, 0x00, 0x17, 0x67, 0x64, 0x00, 0x1f, 0xad, 0x84, 0x01, 0x08, 0x21, 0x0f,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xeb, 0x40, 0x28, 0x02, 0xdc, 0x80,
    ];

    // High, スケーリングリスト 0 の delta_scale が 2^31-1
    const SPS_HUGE_DELTA_SCALE: [u8; 18] = [
        0x00, 0x00, 0x00, 0x0e, 0x67, 0x64, 0x00, 0x1f, 0xad, 0x80, 0x00, 0x00, 0x00, 0xff,
        0xff, 0xff, 0xfe, 0x80,
    ];

    // High, スケーリングリスト 0 の delta_scale が 128
    const SPS_DELTA_SCALE_128: [u8; 17] = [
        0x00, 0x00, 0x00, 0x0d, 0x67, 0x64, 0x00, 0x1f, 0xad, 0x80, 0x40, 0x00, 0x5a, 0x01,
        0x40, 0x16, 0xe4,
    ];

    #[test]
    fn pic_order_cnt_type0_sps() {
        let info = SpsInfo::parse(&SPS_POC_TYPE0).unwrap();
        assert_eq!(info.codec, "avc1.4d401e");
        assert_eq!((info.width, info.height), (640, 480));
    }

    #[test]
    fn pic_order_cnt_type1_sps() {
        let info = SpsInfo::parse(&SPS_POC_TYPE1).unwrap();
        assert_eq!(info.codec, "avc1.4d4015");
        assert_eq!((info.width, info.height), (352, 288));
    }

    #[test]
    fn interlaced_sps_doubles_height_and_crop_unit() {
        let info = SpsInfo::parse(&SPS_INTERLACED).unwrap();
        assert_eq!(info.codec, "avc1.640028");
        assert_eq!((info.width, info.height), (1920, 1080));
    }

    #[test]
    fn sps_with_scaling_matrix() {
        let info = SpsInfo::parse(&SPS_SCALING_MATRIX).unwrap();
        assert_eq!(info.codec, "avc1.64001f");
        assert_eq!(info.chroma_format_idc, 1);
        assert_eq!((info.width, info.height), (1280, 720));
    }

    #[test]
    fn out_of_range_delta_scale_is_rejected() {
        for data in [&SPS_HUGE_DELTA_SCALE[..], &SPS_DELTA_SCALE_128[..]] {
            let rbsp = nal_to_rbsp(&data[5..]);
            let e = SpsFields::parse(&rbsp).unwrap_err();
            assert_eq!(e.kind, crate::ErrorKind::InvalidData);

            // 寛容な経路では解像度だけが不明になる
            let info = SpsInfo::parse(data).unwrap();
            assert_eq!(info.codec, "avc1.64001f");
            assert_eq!((info.width, info.height), (0, 0));
        }
    }

    #[test]
    fn truncated_sps_keeps_fingerprint() {
        let info = SpsInfo::parse(&SPS_320X240[..9]).unwrap();
        assert_eq!(info.codec, "avc1.42c01e");
        assert_eq!((info.width, info.height), (0, 0));
    }

    #[test]
    fn too_short_sps() {
        assert!(SpsInfo::parse(&[0, 0, 0, 1, 0x67, 0x42]).is_err());
        assert!(SpsInfo::parse(&[0, 0]).is_err());
    }

    #[test]
    fn emulation_prevention_is_removed() {
        assert_eq!(
            nal_to_rbsp(&[0x00, 0x00, 0x03, 0x01, 0x00, 0x00, 0x03, 0x00, 0x03]),
            [0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x03]
        );
    }
}
