#![no_main]
#[cfg(not(windows))]
use libfuzzer_sys::fuzz_target;
#[cfg(not(windows))]
use pwkeep::{format, token};

#[cfg(not(windows))]
fuzz_target!(|data: &[u8]| {
    // The tokenizer must never panic on arbitrary text.
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = token::tokenize(text);
    }

    // Header and record parsing must fail gracefully, never panic.
    if data.len() < format::HEADER_LEN {
        return;
    }
    let (header_bytes, rest) = data.split_at(format::HEADER_LEN);
    if format::Header::parse(header_bytes).is_ok() {
        let _ = format::parse_records(rest);
    }
});

#[cfg(windows)]
fn main() {
    eprintln!("Fuzzing is not supported on Windows.");
    eprintln!("The main pwkeep binary works fine on Windows - only fuzzing is disabled.");
    eprintln!("For fuzzing, please use Linux/Unix or WSL.");
}
