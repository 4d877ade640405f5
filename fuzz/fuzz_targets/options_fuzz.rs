#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sqlmount::modules::options::{partition, MountOptions};

#[derive(Arbitrary, Debug)]
struct Input {
    raw_options: Vec<String>,
}

fuzz_target!(|input: Input| {
    let set = partition(&input.raw_options);

    // Recognized keys never reach the mount layer
    for option in &set.mount_options {
        assert!(!option.is_empty());
        assert!(!option.contains(','));
        assert!(!option.starts_with("password="));
        assert!(!option.starts_with("credentials="));
        assert_ne!(option, "encrypt");
    }

    let options = MountOptions::assemble(&set.mount_options);
    let _ = options.to_fuser();
});
