#![no_main]
use libfuzzer_sys::fuzz_target;
use windelta::DeltaConfig;

// Split the input into (source, target), encode, decode, and require an
// exact reconstruction.
fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let level = u32::from(data[0] % 10);
    let split = (data[1] as usize * data.len()) / 256;
    let payload = &data[2..];
    let split = split.min(payload.len());
    let (source, target) = payload.split_at(split);

    let config = DeltaConfig {
        level,
        window_size: 4096,
        ..Default::default()
    };
    let delta = windelta::encode_with_config(source, target, &config).unwrap();
    let decoded = windelta::decode_with_config(source, &delta, &config).unwrap();
    assert_eq!(decoded, target);
});
