#![no_main]

use avc_fmp4::h264::SpsInfo;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(info) = SpsInfo::parse(data) {
        assert_eq!(info.sps, &data[4..]);
        assert!(info.codec.starts_with("avc1."));
    }
});
