#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(config) = ai_agent::Config::parse(s) {
            let _ = config.validate();
            let _ = config.provider_config();
            let _ = config.to_toml();
        }
    }
});
