//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code never blocks a thread with `std::thread::sleep`.
//! Async timed waits are allowed only where the wait *is* the behaviour:
//! the crossfade settle delay, the idle timer, simulated clip clocks and the
//! daemon's simulated speech.

use architectural_enforcement::production_lines;

/// Files whose timed waits are part of their contract
const TIMER_FILES: &[&str] = &[
    "crossfade.rs",
    "idle_timer.rs",
    "simulated.rs",
    "playback/daemon/src/main.rs",
];

#[test]
fn test_no_blocking_sleep() {
    let violations: Vec<String> = production_lines()
        .into_iter()
        .filter(|line| line.code.contains("thread::sleep("))
        .map(|line| line.to_string())
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ CRITICAL: Blocking sleep found in production code!\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        panic!(
            "\nFound {} blocking sleep(s). Use tokio::time or wait on an event.",
            violations.len()
        );
    }
}

#[test]
fn test_async_sleep_only_in_timer_files() {
    let violations: Vec<String> = production_lines()
        .into_iter()
        .filter(|line| line.code.contains("time::sleep("))
        .filter(|line| !TIMER_FILES.iter().any(|f| line.path.ends_with(f)))
        .map(|line| line.to_string())
        .collect();

    if !violations.is_empty() {
        eprintln!("\n❌ Timed waits outside the timer modules:\n");
        for violation in &violations {
            eprintln!("  ❌ {violation}");
        }
        eprintln!("\n✅ ACCEPTABLE: wait on a MediaEvent, a channel, or tokio::time::timeout");
        panic!("\nFound {} sleep violation(s).", violations.len());
    }
}
