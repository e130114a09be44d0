#![no_main]

use arbitrary::Arbitrary;
use embassy_time::Instant;
use lg_bms_decoder::csv::write_csv_rows;
use lg_bms_decoder::{CanFrame, ModuleManager};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    parallel_strings: u16,
    frames: Vec<(u32, CanFrame)>,
}

// Routing and aggregation must not panic for any frame sequence
fuzz_target!(|input: Input| {
    let mut manager: ModuleManager = ModuleManager::default();
    manager.set_parallel_strings(input.parallel_strings);

    let mut millis = 0_u64;
    for (delay, frame) in &input.frames {
        millis = millis.saturating_add(*delay as u64);
        manager.dispatch(frame, Instant::from_millis(millis));
    }

    let now = Instant::from_millis(millis);
    let summary = manager.summary(now);
    assert!(summary.pack_voltage.is_finite());
    assert!(summary.avg_cell_voltage.is_finite());

    let mut sink = String::new();
    let _ = write_csv_rows(&mut sink, &manager, now, millis, 0.0, 0);
});
