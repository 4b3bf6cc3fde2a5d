//! Tests for the time source.

use super::*;
use chrono::Duration;

#[test]
fn test_system_clock_tracks_wall_time() {
    let before = Utc::now();
    let now = SystemClock.now();
    let after = Utc::now();

    assert!(now >= before - Duration::seconds(1));
    assert!(now <= after + Duration::seconds(1));
}
