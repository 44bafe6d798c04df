use super::*;

#[test]
fn manual_clock_clones_share_time() {
    let clock = ManualClock::starting_at_ms(10);
    let shared = clock.shared();
    clock.advance_ms(5);
    assert_eq!(shared.now_ms(), 15);
    clock.advance_ns(500_000);
    assert_eq!(shared.now_ns(), 15_500_000);
    assert_eq!(shared.now_ms(), 15);
}

#[test]
fn system_clock_is_monotonic() {
    let clock = SystemClock::new();
    let a = clock.now_ns();
    let b = clock.now_ns();
    assert!(b >= a);
}
