#![no_main]
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes as a delta stream: decoding may fail, but must never
// panic, hang, or over-allocate past the window guard.
fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let split = (data[0] as usize).min(data.len() - 1);
    let (source, delta) = data[1..].split_at(split.min(data.len() - 1));
    let _ = windelta::decode(source, delta);
});
