use bytes::Bytes;

use crate::{
    ByteWriter, Error, Result, SampleDependency,
    boxes::{BoxTree, Mp4Box},
    codec::to_u32,
    h264::{SpsInfo, strip_length_prefix},
    mux::{CachedHeader, RemuxOptions, Sample, Track, TrackKind, VideoFrame, VideoSequence},
};

/// H.264 のフレーム列を fragmented MP4 のトラックに変換する
///
/// トラック ID はこのインスタンスの生存期間中に単調増加し、呼び出しの間でリセットされることはない。
/// ボックス生成時の状態は呼び出しごとに作られる [`BoxTree`] が保持するので、
/// 別々のインスタンスであれば、異なるスレッドから同時に利用しても問題ない。
#[derive(Debug, Clone)]
pub struct AvcRemuxer {
    next_track_id: u32,
    options: RemuxOptions,
}

impl Default for AvcRemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl AvcRemuxer {
    /// デフォルトのオプションでインスタンスを生成する
    pub fn new() -> Self {
        Self::with_options(RemuxOptions::default())
    }

    /// オプションを指定してインスタンスを生成する
    pub fn with_options(options: RemuxOptions) -> Self {
        Self {
            next_track_id: options.first_track_id,
            options,
        }
    }

    /// オプションを返す
    pub fn options(&self) -> &RemuxOptions {
        &self.options
    }

    /// 次の呼び出しで割り当てられるトラック ID を返す
    pub fn next_track_id(&self) -> u32 {
        self.next_track_id
    }

    /// フレーム列からトラックを構築する
    ///
    /// ヘッダーが二つ未満、あるいはフレームが一つもないといった不正な入力に対してはエラーを返さず、
    /// 警告ログを出力した上で、サンプルを持たないトラックを返す。
    /// 入力の不備を区別したい場合には [`AvcRemuxer::try_remux()`] を使うこと。
    pub fn remux(&mut self, sequence: &VideoSequence) -> Track {
        let id = self.allocate_track_id();
        match self.build_track(id, sequence) {
            Ok(track) => track,
            Err(e) => {
                log::warn!("Failed to remux H.264 sequence into track {id}: {e}");
                Track::empty(id, self.options.timescale, sequence.frame_rate)
            }
        }
    }

    /// フレーム列からトラックを構築する
    ///
    /// [`AvcRemuxer::remux()`] と異なり、入力が不正な場合には [`ErrorKind::InvalidInput`](crate::ErrorKind::InvalidInput) を返す
    pub fn try_remux(&mut self, sequence: &VideoSequence) -> Result<Track> {
        let id = self.allocate_track_id();
        self.build_track(id, sequence)
    }

    /// `ftyp` / `moov` / `moof` / `mdat` からなる、単体で再生可能なバイト列を生成する
    ///
    /// ペイロードが空のトラックに対しては `Ok(None)` を返す
    pub fn convert_mp4(&self, track: &Track, sequence: &VideoSequence) -> Result<Option<Bytes>> {
        if track.len == 0 {
            log::debug!("track {} has no payload, nothing to mux", track.id);
            return Ok(None);
        }

        let mut tree = BoxTree::new(track, sequence, &self.options)?;
        let size = tree.measure_all(&Mp4Box::FILE)?;

        let mut writer = ByteWriter::with_capacity(track.len as usize / 2 * 3);
        tree.emit_all(&Mp4Box::FILE, &mut writer)?;
        log::debug!(
            "muxed track {}: {} samples, {size} bytes",
            track.id,
            track.samples.len()
        );
        Ok(Some(writer.release()))
    }

    /// `ftyp` / `moov` / `moof` からなるヘッダー部分を生成して、フレーム列にキャッシュする
    ///
    /// 同じ構造のフレーム列であれば、このヘッダーの後ろに `mdat` ボックスを連結するだけで
    /// [`AvcRemuxer::convert_mp4()`] と同じ結果が得られる。
    /// ペイロードが空のトラックに対しては `Ok(None)` を返し、キャッシュも更新しない。
    pub fn write_mp4_boxes_in_sequence(
        &self,
        track: &Track,
        sequence: &mut VideoSequence,
    ) -> Result<Option<Bytes>> {
        if track.len == 0 {
            log::debug!("track {} has no payload, no header to cache", track.id);
            return Ok(None);
        }

        let bytes = {
            let mut tree = BoxTree::new(track, sequence, &self.options)?;
            tree.measure_all(&Mp4Box::HEADER)?;
            let mut writer = ByteWriter::with_capacity(track.len as usize / 2);
            tree.emit_all(&Mp4Box::HEADER, &mut writer)?;
            writer.release()
        };
        log::debug!("cached {} header bytes for track {}", bytes.len(), track.id);

        sequence.cached_header = Some(CachedHeader {
            bytes: bytes.clone(),
            payload_len: track.len,
            sample_count: track.samples.len(),
        });
        Ok(Some(bytes))
    }

    fn allocate_track_id(&mut self) -> u32 {
        let id = self.next_track_id;
        self.next_track_id = self.next_track_id.saturating_add(1);
        id
    }

    fn build_track(&self, id: u32, sequence: &VideoSequence) -> Result<Track> {
        if sequence.headers.len() < 2 {
            return Err(Error::invalid_input(format!(
                "SPS and PPS are required, but only {} header(s) given",
                sequence.headers.len()
            )));
        }
        if sequence.frames.is_empty() {
            return Err(Error::invalid_input("No frames"));
        }
        let fps = sequence.frame_rate;
        if !fps.is_finite() || fps <= 0.0 {
            return Err(Error::invalid_input(format!("Invalid frame rate: {fps}")));
        }
        if let Some(what) = sequence.find_malformed_blob() {
            return Err(Error::invalid_input(format!(
                "A {what} is shorter than its length prefix"
            )));
        }

        let sps = SpsInfo::parse(&sequence.headers[0])?;
        let pps = strip_length_prefix(&sequence.headers[1])
            .ok_or_else(|| Error::invalid_input("PPS is shorter than its length prefix"))?
            .to_vec();

        let timescale = self.options.timescale;
        let sample_count = to_u32(sequence.frames.len(), "sample count")?;
        let duration = (f64::from(sample_count) * f64::from(timescale) / f64::from(fps)).floor();
        if duration > f64::from(u32::MAX) {
            return Err(Error::unsupported(format!("Too long duration: {duration}")));
        }
        let duration = duration as u32;
        let sample_delta = duration / sample_count;

        let offset = to_u32(implicit_offset(&sequence.frames), "implicit offset")?;
        let header_len: u64 = sequence.headers.iter().map(|h| h.len() as u64).sum();

        let mut samples = Vec::with_capacity(sequence.frames.len());
        for (i, frame) in sequence.frames.iter().enumerate() {
            let mut size = frame.data.len() as u64;
            if i == 0 {
                size += header_len;
            }
            samples.push(Sample {
                index: i,
                size: to_u32(size, "sample size")?,
                duration: sample_delta,
                cts: composition_offset(frame.presentation_index, offset, i, sample_delta)?,
                flags: SampleDependency::from_keyframe(frame.keyframe),
            });
        }

        let track = Track {
            id,
            kind: TrackKind::Video,
            len: to_u32(sequence.payload_len(), "payload length")?,
            sps: vec![sps.sps],
            pps: vec![pps],
            profile_idc: sps.profile_idc,
            profile_compatibility: sps.profile_compatibility,
            level_idc: sps.level_idc,
            chroma_format_idc: sps.chroma_format_idc,
            bit_depth_luma_minus8: sps.bit_depth_luma_minus8,
            bit_depth_chroma_minus8: sps.bit_depth_chroma_minus8,
            width: sps.width,
            height: sps.height,
            timescale,
            duration,
            samples,
            pts: sequence
                .frames
                .iter()
                .map(|f| f.presentation_index)
                .collect(),
            codec: sps.codec,
            fps,
            implicit_offset: offset,
        };
        log::debug!(
            "remuxed track {id}: {} samples, {}x{}, codec={}, duration={duration}/{timescale}",
            track.samples.len(),
            track.width,
            track.height,
            track.codec
        );
        Ok(track)
    }
}

/// `(pts + offset - index) * delta` を計算する
///
/// `offset` が [`implicit_offset()`] の値であれば負になることはないが、
/// 負の値や `u32` に収まらない値になった場合にはエラーとする
fn composition_offset(pts: i64, offset: u32, index: usize, delta: u32) -> Result<u32> {
    let frames = i128::from(pts) + i128::from(offset) - index as i128;
    if frames < 0 {
        return Err(Error::invalid_input(format!(
            "Negative composition time offset at sample {index}"
        )));
    }
    to_u32(frames * i128::from(delta), "composition time offset")
}

/// デコード順に並んだフレームの表示時刻がデコード時刻よりも前にならないようにするためのオフセットを計算する
///
/// 全ての `i` について `frames[i].presentation_index + K - i >= 0` を満たす最小の非負整数 `K` を返す
pub fn implicit_offset(frames: &[VideoFrame]) -> u64 {
    frames
        .iter()
        .enumerate()
        .map(|(i, f)| (i as i64).saturating_sub(f.presentation_index))
        .max()
        .unwrap_or(0)
        .max(0)
        .unsigned_abs()
}
