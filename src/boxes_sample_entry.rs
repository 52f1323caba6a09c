//! `stsd` ボックスに格納されるサンプルエントリー（`avc1` と `avcC`）
use crate::{
    ByteSink, Encode, Error, FixedPointNumber, Result, boxes::BoxTree, h264::NAL_LENGTH_PREFIX_SIZE,
};

/// [ISO/IEC 14496-15] AVCDecoderConfigurationRecord の configurationVersion
const AVCC_CONFIGURATION_VERSION: u8 = 1;

/// 出力する NAL ユニットの長さフィールドのバイト数から 1 を引いた値
const LENGTH_SIZE_MINUS_ONE: u8 = NAL_LENGTH_PREFIX_SIZE as u8 - 1;

/// 72 dpi
const RESOLUTION_72DPI: FixedPointNumber<u16> = FixedPointNumber::new(72, 0);

/// 色深度 24 ビット（アルファなし）
const DEPTH_24BIT: u16 = 0x0018;

impl BoxTree<'_> {
    pub(crate) fn write_avc1<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let (width, height) = self.dimensions()?;

        sink.write_zeros(6); // reserved
        sink.write_u16(1); // data_reference_index
        sink.write_zeros(2 + 2 + 4 * 3); // pre_defined + reserved
        sink.write_u16(width);
        sink.write_u16(height);
        RESOLUTION_72DPI.encode(sink); // horizresolution
        RESOLUTION_72DPI.encode(sink); // vertresolution
        sink.write_zeros(4); // reserved
        sink.write_u16(1); // frame_count
        sink.write_zeros(32); // compressorname
        sink.write_u16(DEPTH_24BIT);
        sink.write_u16(0xffff); // pre_defined = -1
        Ok(())
    }

    pub(crate) fn write_avcc<S: ByteSink>(&mut self, sink: &mut S) -> Result<()> {
        let track = self.ctx.track;

        sink.write_u8(AVCC_CONFIGURATION_VERSION);
        sink.write_u8(track.profile_idc);
        sink.write_u8(track.profile_compatibility);
        sink.write_u8(track.level_idc);
        sink.write_u8(0b1111_1100 | LENGTH_SIZE_MINUS_ONE);

        let sps_count =
            u8::try_from(track.sps.len()).map_err(|_| Error::invalid_input("Too many SPSs"))?;
        if sps_count > 0b1_1111 {
            return Err(Error::invalid_input("Too many SPSs"));
        }
        sink.write_u8(0b1110_0000 | sps_count);
        for sps in &track.sps {
            write_parameter_set(sink, sps, "SPS")?;
        }

        let pps_count =
            u8::try_from(track.pps.len()).map_err(|_| Error::invalid_input("Too many PPSs"))?;
        sink.write_u8(pps_count);
        for pps in &track.pps {
            write_parameter_set(sink, pps, "PPS")?;
        }

        // High 系のプロファイルでは拡張フィールドが必須となる
        if !matches!(track.profile_idc, 66 | 77 | 88) {
            sink.write_u8(0b1111_1100 | (track.chroma_format_idc & 0b11));
            sink.write_u8(0b1111_1000 | (track.bit_depth_luma_minus8 & 0b111));
            sink.write_u8(0b1111_1000 | (track.bit_depth_chroma_minus8 & 0b111));
            sink.write_u8(0); // numOfSequenceParameterSetExt
        }
        Ok(())
    }
}

fn write_parameter_set<S: ByteSink>(sink: &mut S, nal: &[u8], name: &str) -> Result<()> {
    let size = u16::try_from(nal.len())
        .map_err(|_| Error::invalid_input(format!("Too long {name}: {} bytes", nal.len())))?;
    sink.write_u16(size);
    sink.write_bytes(nal);
    Ok(())
}
