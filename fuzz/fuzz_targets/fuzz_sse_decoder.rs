#![no_main]
use ai_agent::providers::sse::{delta_content, SseDecoder, SseEvent};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte picks the chunk size so split points vary.
    let Some((&split, body)) = data.split_first() else {
        return;
    };
    let chunk = usize::from(split % 16) + 1;

    let mut decoder = SseDecoder::new();
    let mut events = Vec::new();
    for piece in body.chunks(chunk) {
        events.extend(decoder.feed(piece));
    }
    events.extend(decoder.finish());

    for event in &events {
        if let SseEvent::Data(payload) = event {
            let _ = delta_content(payload);
        }
    }
});
