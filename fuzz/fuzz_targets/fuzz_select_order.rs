//! Fuzz target: network candidate ordering
//!
//! Derives a configured list and a scan result from fuzz bytes and checks
//! `select_order`:
//! - The result is never empty when something is configured
//! - Priorities are non-decreasing
//! - Every returned candidate is configured, and visible unless the
//!   fallback to the full list kicked in
//!
//! cargo fuzz run fuzz_select_order

#![no_main]

use doorlink::config::NetworkCandidate;
use doorlink::connectivity::select_order;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Pairs of (ssid index, priority) for configured; remaining bytes are
    // visible ssid indices.
    let split = data.len() / 2;
    let (cfg_bytes, scan_bytes) = data.split_at(split);
    let configured: Vec<NetworkCandidate> = cfg_bytes
        .chunks_exact(2)
        .map(|c| NetworkCandidate::new(&format!("net{}", c[0] % 8), "", c[1] % 4))
        .collect();
    let visible: Vec<String> = scan_bytes.iter().map(|b| format!("net{}", b % 8)).collect();
    let scanned = (!scan_bytes.is_empty() && scan_bytes[0] % 5 != 0).then_some(visible.as_slice());

    let order = select_order(&configured, scanned);

    if !configured.is_empty() {
        assert!(!order.is_empty());
    }
    assert!(order.windows(2).all(|w| w[0].priority <= w[1].priority));
    assert!(order.iter().all(|c| configured.contains(c)));

    if let Some(visible) = scanned {
        let any_visible = configured.iter().any(|c| visible.contains(&c.ssid));
        if any_visible {
            assert!(order.iter().all(|c| visible.contains(&c.ssid)));
        } else {
            assert_eq!(order.len(), configured.len());
        }
    }
});
