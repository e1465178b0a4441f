#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must be rejected with an error, never a panic
    if let Ok((header, layout)) = mmcorpus::index::IndexHeader::parse_with_layout(data) {
        assert_eq!(layout.file_len(), data.len());
        assert_eq!(header.to_bytes()[..], data[..mmcorpus::index::IndexHeader::SIZE]);
    }
});
