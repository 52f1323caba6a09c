#![no_main]

use avc_fmp4::mux::{AvcMp4Muxer, VideoFrame, VideoSequence};
use libfuzzer_sys::fuzz_target;

// 入力を 4 バイトの長さプレフィックス付きブロブの列とみなし、先頭二つを SPS / PPS として扱う
fuzz_target!(|data: &[u8]| {
    let mut blobs = Vec::new();
    let mut rest = data;
    while rest.len() >= 5 {
        let len = usize::from(rest[0] % 32) + 4;
        let flags = rest[1];
        let len = len.min(rest.len() - 1);
        blobs.push((flags, rest[1..1 + len].to_vec()));
        rest = &rest[1 + len..];
    }
    if blobs.len() < 2 {
        return;
    }

    let mut sequence = VideoSequence {
        frame_rate: 30.0,
        ..VideoSequence::default()
    };
    for (i, (flags, blob)) in blobs.into_iter().enumerate() {
        if i < 2 {
            sequence.headers.push(blob.into());
        } else {
            let shift = i64::from(flags % 4) - 2;
            sequence
                .frames
                .push(VideoFrame::new(i as i64 - 2 + shift, flags & 1 == 1, blob));
        }
    }

    let mut muxer = AvcMp4Muxer::new();
    let Ok(Some(full)) = muxer.create_mp4(&sequence) else {
        return;
    };
    let header = muxer
        .write_mp4_header(&mut sequence)
        .expect("header must be built when the full file is")
        .expect("non-empty payload");
    assert!(full.len() > header.len());
    let _ = muxer.convert_to_mp4(&sequence);
});
