use avc_fmp4::{
    ByteWriter,
    boxes::{BoxTree, Mp4Box},
    mux::{AvcMp4Muxer, AvcRemuxer, RemuxOptions, VideoFrame, VideoSequence},
};

const SPS: [u8; 12] = [
    0x00, 0x00, 0x00, 0x08, 0x67, 0x42, 0xc0, 0x1e, 0xda, 0x05, 0x07, 0xe4,
];
const PPS: [u8; 8] = [0x00, 0x00, 0x00, 0x04, 0x68, 0xce, 0x3c, 0x80];

fn nal(header: u8, len: usize) -> Vec<u8> {
    let mut data = (len as u32 - 4).to_be_bytes().to_vec();
    data.push(header);
    data.extend((1..len - 4).map(|k| k as u8));
    data
}

fn three_frames() -> VideoSequence {
    let mut seq = VideoSequence::new(SPS.to_vec(), PPS.to_vec(), 30.0);
    seq.frames.push(VideoFrame::new(0, true, nal(0x65, 20)));
    seq.frames.push(VideoFrame::new(1, false, nal(0x41, 10)));
    seq.frames.push(VideoFrame::new(2, false, nal(0x41, 10)));
    seq
}

/// ボックスの (種別, 開始位置, サイズ) を深さ優先で列挙する
fn walk(data: &[u8], base: usize, out: &mut Vec<([u8; 4], usize, usize)>) {
    let mut offset = 0;
    while offset < data.len() {
        assert!(offset + 8 <= data.len(), "truncated box header at {}", base + offset);
        let size = u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()) as usize;
        let ty: [u8; 4] = data[offset + 4..offset + 8].try_into().unwrap();
        assert!(size >= 8 && offset + size <= data.len(), "bad size of {ty:?}");
        out.push((ty, base + offset, size));

        let payload = &data[offset + 8..offset + size];
        let children_start = match &ty {
            b"moov" | b"trak" | b"edts" | b"mdia" | b"minf" | b"dinf" | b"stbl" | b"mvex"
            | b"moof" | b"traf" => Some(0),
            b"dref" | b"stsd" => Some(8),
            b"avc1" => Some(78),
            _ => None,
        };
        if let Some(start) = children_start {
            walk(&payload[start..], base + offset + 8 + start, out);
        }
        offset += size;
    }
}

#[test]
fn three_frame_scenario_matches_golden_file() {
    let expected = include_bytes!("testdata/three_frames.mp4");
    let actual = AvcMp4Muxer::new()
        .convert_to_mp4(&three_frames())
        .unwrap()
        .unwrap();
    assert_eq!(actual.len(), expected.len());
    assert_eq!(&actual[..], &expected[..]);
}

#[test]
fn every_box_in_file_is_well_formed() {
    let seq = three_frames();
    let mp4 = AvcMp4Muxer::new().create_mp4(&seq).unwrap().unwrap();

    let mut boxes = Vec::new();
    walk(&mp4, 0, &mut boxes);

    let tags: Vec<[u8; 4]> = boxes.iter().map(|(ty, _, _)| *ty).collect();
    let expected: Vec<[u8; 4]> = Mp4Box::ALL
        .iter()
        .map(|b| *b.box_type().as_bytes())
        .collect();
    let mut sorted_tags = tags.clone();
    sorted_tags.sort();
    let mut sorted_expected = expected.clone();
    sorted_expected.sort();
    assert_eq!(sorted_tags, sorted_expected);

    let mut top = Vec::new();
    let mut offset = 0;
    while offset < mp4.len() {
        let (ty, _, size) = *boxes.iter().find(|(_, start, _)| *start == offset).unwrap();
        top.push(ty);
        offset += size;
    }
    assert_eq!(top, [*b"ftyp", *b"moov", *b"moof", *b"mdat"]);
}

#[test]
fn trun_data_offset_points_to_mdat_payload() {
    let mp4 = AvcMp4Muxer::new()
        .convert_to_mp4(&three_frames())
        .unwrap()
        .unwrap();
    let mut boxes = Vec::new();
    walk(&mp4, 0, &mut boxes);

    let find = |tag: &[u8; 4]| *boxes.iter().find(|(ty, _, _)| ty == tag).unwrap();
    let (_, moof_start, _) = find(b"moof");
    let (_, mdat_start, mdat_size) = find(b"mdat");
    let (_, trun_start, _) = find(b"trun");

    let data_offset =
        i32::from_be_bytes(mp4[trun_start + 16..trun_start + 20].try_into().unwrap()) as usize;
    assert_eq!(moof_start + data_offset, mdat_start + 8);
    assert_eq!(mdat_size, 8 + 60);

    // mdat の先頭は SPS（長さプレフィックスは付け直されている）
    assert_eq!(&mp4[mdat_start + 8..mdat_start + 20], &SPS);
}

#[test]
fn measured_size_equals_emitted_bytes_for_every_box() {
    let seq = three_frames();
    let options = RemuxOptions::default();
    let track = AvcRemuxer::with_options(options.clone()).remux(&seq);

    for b in Mp4Box::ALL {
        let mut tree = BoxTree::new(&track, &seq, &options).unwrap();
        let measured = tree.measure(b).unwrap();

        let mut writer = ByteWriter::new();
        let emitted = tree.emit(b, &mut writer).unwrap();
        let bytes = writer.as_bytes();
        assert_eq!(measured, emitted, "{b:?}");
        assert_eq!(bytes.len(), measured as usize, "{b:?}");
        assert_eq!(&bytes[..4], &measured.to_be_bytes(), "{b:?}");
        assert_eq!(&bytes[4..8], b.box_type().as_bytes(), "{b:?}");
    }
}

#[test]
fn output_is_deterministic() {
    let seq = three_frames();
    let a = AvcMp4Muxer::new().create_mp4(&seq).unwrap().unwrap();
    let b = AvcMp4Muxer::new().create_mp4(&seq).unwrap().unwrap();
    assert_eq!(a, b);
}

#[test]
fn header_reuse_matches_direct_build() {
    let mut seq = three_frames();
    let mut muxer = AvcMp4Muxer::new();
    let header = muxer.write_mp4_header(&mut seq).unwrap().unwrap();
    assert_eq!(header.len(), 32 + 682 + 147);

    let reused = muxer.convert_to_mp4(&seq).unwrap().unwrap();
    let direct = AvcMp4Muxer::new().create_mp4(&seq).unwrap().unwrap();
    assert_eq!(reused, direct);
    assert_eq!(&reused[..], &include_bytes!("testdata/three_frames.mp4")[..]);
}

#[test]
fn track_id_is_written_to_every_track_box() {
    let seq = three_frames();
    let mut muxer = AvcMp4Muxer::with_options(RemuxOptions {
        first_track_id: 7,
        ..RemuxOptions::default()
    });
    let mp4 = muxer.create_mp4(&seq).unwrap().unwrap();
    assert_eq!(muxer.remuxer().next_track_id(), 8);

    let mut boxes = Vec::new();
    walk(&mp4, 0, &mut boxes);
    for (tag, field_offset) in [(b"tkhd", 20), (b"trex", 12), (b"tfhd", 12)] {
        let (_, start, _) = *boxes.iter().find(|(ty, _, _)| ty == tag).unwrap();
        let id = u32::from_be_bytes(
            mp4[start + field_offset..start + field_offset + 4]
                .try_into()
                .unwrap(),
        );
        assert_eq!(id, 7, "{tag:?}");
    }
}

#[test]
fn trex_default_sample_flags_mark_non_sync_samples() {
    let mp4 = AvcMp4Muxer::new()
        .create_mp4(&three_frames())
        .unwrap()
        .unwrap();
    let mut boxes = Vec::new();
    walk(&mp4, 0, &mut boxes);

    let (_, start, size) = *boxes.iter().find(|(ty, _, _)| ty == b"trex").unwrap();
    assert_eq!(size, 32);
    let flags = u32::from_be_bytes(mp4[start + 28..start + 32].try_into().unwrap());
    assert_eq!(flags, 0x0001_0001);
    assert_eq!((flags >> 24) & 0b11, 0, "sample_depends_on");
    assert_eq!((flags >> 16) & 1, 1, "sample_is_non_sync_sample");
    assert_eq!(flags & 0xffff, 1, "sample_degradation_priority");
}
