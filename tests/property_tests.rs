//! Property tests for the invariants the sync engine relies on.
//!
//! Runs on host (x86_64) only: proptest is not available for ESP32 targets.
//! On ESP32, these tests are compiled out.

#![cfg(not(target_os = "espidf"))]

use std::cmp::Ordering;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use serde_json::json;
use smarthome::app::events::{AttributeMap, AttributeScope};
use smarthome::state::{DeviceStateStore, FieldValue};
use smarthome::sync::attributes::{AttributeSyncManager, decode_fan_speed};
use smarthome::sync::channels::Outbox;
use smarthome::sync::version::{compare_versions, is_newer};

// ── Version ordering ──────────────────────────────────────────

fn arb_version() -> impl Strategy<Value = (u16, u16, u16)> {
    (0u16..50, 0u16..50, 0u16..50)
}

fn render((a, b, c): (u16, u16, u16)) -> String {
    format!("{}.{}.{}", a, b, c)
}

proptest! {
    /// Comparison agrees with numeric tuple ordering.
    #[test]
    fn version_order_matches_numeric_order(x in arb_version(), y in arb_version()) {
        prop_assert_eq!(compare_versions(&render(x), &render(y)), x.cmp(&y));
    }

    #[test]
    fn version_order_is_antisymmetric(x in arb_version(), y in arb_version()) {
        let (a, b) = (render(x), render(y));
        prop_assert_eq!(compare_versions(&a, &b), compare_versions(&b, &a).reverse());
    }

    #[test]
    fn version_is_never_newer_than_itself(x in arb_version()) {
        let v = render(x);
        prop_assert_eq!(compare_versions(&v, &v), Ordering::Equal);
        prop_assert!(!is_newer(&v, &v));
    }

    #[test]
    fn version_order_is_transitive(x in arb_version(), y in arb_version(), z in arb_version()) {
        let (a, b, c) = (render(x), render(y), render(z));
        if is_newer(&a, &b) && is_newer(&b, &c) {
            prop_assert!(is_newer(&a, &c));
        }
    }

    /// Arbitrary text never panics.
    #[test]
    fn version_compare_total_on_any_input(a in ".{0,16}", b in ".{0,16}") {
        let _ = compare_versions(&a, &b);
    }
}

// ── Fan speed clamping ────────────────────────────────────────

proptest! {
    #[test]
    fn fan_speed_always_in_range(raw in any::<i64>()) {
        let FieldValue::FanSpeed(pct) = FieldValue::fan_speed(raw) else {
            unreachable!();
        };
        prop_assert!(pct <= 100);
        prop_assert_eq!(i64::from(pct), raw.clamp(0, 100));
    }

    #[test]
    fn decoded_fan_speed_survives_the_store(raw in -1_000i64..1_000) {
        let decoded = decode_fan_speed(&json!(raw)).unwrap();
        let store = DeviceStateStore::new();
        store.set_desired(decoded);
        let changes = store.drain_changes();
        prop_assert_eq!(changes.as_slice(), &[decoded][..]);
        prop_assert_eq!(store.snapshot().fan_speed_percent as i64, raw.clamp(0, 100));
    }
}

// ── Request / timeout exclusivity ─────────────────────────────

#[derive(Debug, Clone)]
enum AttrOp {
    Request,
    Respond(u32),
    Advance(u64),
}

fn arb_attr_op() -> impl Strategy<Value = AttrOp> {
    prop_oneof![
        Just(AttrOp::Request),
        (1u32..=12).prop_map(AttrOp::Respond),
        (0u64..=20_000).prop_map(AttrOp::Advance),
    ]
}

/// `(successes, timeouts)` per attempted request.
type Outcomes = Arc<Mutex<Vec<(u32, u32)>>>;

proptest! {
    /// Every issued request ends exactly once, through either its response
    /// or its timeout, whatever order events arrive in.
    #[test]
    fn request_ends_exactly_once(ops in proptest::collection::vec(arb_attr_op(), 1..=40)) {
        let outbox = Outbox::new();
        let mut mgr = AttributeSyncManager::new(15_000);
        let outcomes: Outcomes = Arc::default();
        let mut issued = Vec::new();
        let mut now = 0u64;

        for op in &ops {
            match op {
                AttrOp::Request => {
                    let slot = {
                        let mut o = outcomes.lock().unwrap();
                        o.push((0, 0));
                        o.len() - 1
                    };
                    let (ok, to) = (Arc::clone(&outcomes), Arc::clone(&outcomes));
                    let result = mgr.request(
                        AttributeScope::Shared,
                        &["fanSpeed"],
                        now,
                        Box::new(move |_| ok.lock().unwrap()[slot].0 += 1),
                        Box::new(move || to.lock().unwrap()[slot].1 += 1),
                        &outbox,
                    );
                    if result.is_ok() {
                        issued.push(slot);
                    }
                }
                AttrOp::Respond(id) => {
                    mgr.on_message(*id, &AttributeMap::new());
                }
                AttrOp::Advance(ms) => {
                    now += ms;
                    mgr.sweep(now);
                }
            }
            while outbox.try_receive().is_ok() {}
            prop_assert!(mgr.outstanding() <= 4);
        }

        mgr.sweep(u64::MAX);
        prop_assert_eq!(mgr.outstanding(), 0);

        let outcomes = outcomes.lock().unwrap();
        for (slot, &(success, timeout)) in outcomes.iter().enumerate() {
            let expected = u32::from(issued.contains(&slot));
            prop_assert_eq!(success + timeout, expected, "slot {}", slot);
        }
    }
}
