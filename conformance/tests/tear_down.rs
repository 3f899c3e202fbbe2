use carbon::{Storage, StorageOptions};
use carbon_conformance::{CommonAdapterTest, MockAdapter, ModifiableTime, RealTime};
use storage_engine::MemoryAdapter;

#[test]
#[should_panic(expected = "Error trap not stopped")]
fn test_open_error_trap_fails_tear_down() {
    let mut test = CommonAdapterTest::new(MockAdapter::new(), RealTime);
    std::mem::forget(test.error_trap.start());
    test.tear_down().unwrap();
}

#[test]
fn test_released_error_trap_passes_tear_down() {
    let mut test = CommonAdapterTest::new(MockAdapter::new(), RealTime);
    let guard = test.error_trap.start();
    guard.stop().unwrap();
    test.tear_down().unwrap();
}

#[test]
fn test_tear_down_flushes_flushable_storage() {
    let time = ModifiableTime::new();
    let adapter = MemoryAdapter::new().with_clock(time.modifiable_clock());
    let mut test = CommonAdapterTest::new(adapter, time);

    test.options.adapter_options().set_namespace("ns1");
    test.storage.set_item("key", "value").unwrap();
    test.options.adapter_options().set_namespace("ns2");
    test.storage.set_item("key", "value").unwrap();

    test.tear_down().unwrap();
    assert!(test.storage.is_empty());
}

#[test]
fn test_tear_down_keeps_unflushable_storage() {
    let mut test = CommonAdapterTest::new(MockAdapter::new(), RealTime);
    test.storage.set_item("key", "value").unwrap();

    test.tear_down().unwrap();
    assert!(test.storage.has_item("key").unwrap());
}
