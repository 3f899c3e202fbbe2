//! The memory adapter reporting sub-second TTL precision.

use carbon::{Storage, StorageOptions};
use carbon_conformance::{CommonAdapterTest, ModifiableTime, Outcome, common_adapter_tests};
use shared::config::HarnessConfig;
use std::time::Duration;
use storage_engine::MemoryAdapter;

fn set_up() -> CommonAdapterTest<MemoryAdapter, ModifiableTime> {
    let time = ModifiableTime::new();
    let adapter = MemoryAdapter::new()
        .with_clock(time.modifiable_clock())
        .with_ttl_precision(0.5);

    CommonAdapterTest::new(adapter, time)
}

common_adapter_tests!(set_up);

#[test]
fn test_touch_waits_less_than_a_second() {
    let mut test = set_up().with_config(HarnessConfig::from_lookup(|_| None));
    assert_eq!(test.storage.capabilities().ttl_precision, 0.5);

    let clock = test.time.modifiable_clock();
    assert_eq!(test.touch_item().unwrap(), Outcome::Passed);
    assert_eq!(clock.elapsed(), Duration::from_millis(2000));
}

#[test]
fn test_item_outlives_half_its_ttl() {
    let mut test = set_up();
    let clock = test.time.modifiable_clock();
    test.options.adapter_options().set_ttl(1.0).unwrap();
    test.storage.set_item("key", "value").unwrap();

    clock.add(Duration::from_millis(500));
    assert!(test.storage.touch_item("key").unwrap());
    clock.add(Duration::from_millis(999));
    assert!(test.storage.has_item("key").unwrap());
    clock.add(Duration::from_millis(1));
    assert!(!test.storage.has_item("key").unwrap());
}
