use carbon_conformance::{CommonAdapterTest, ModifiableTime, common_adapter_tests};
use shared::ErrorTrap;
use storage_engine::MemoryAdapter;

fn set_up() -> CommonAdapterTest<MemoryAdapter, ModifiableTime> {
    let time = ModifiableTime::new();
    let error_trap = ErrorTrap::new();
    let adapter = MemoryAdapter::new()
        .with_clock(time.modifiable_clock())
        .with_error_trap(error_trap.clone());

    CommonAdapterTest::new(adapter, time).with_error_trap(error_trap)
}

common_adapter_tests!(set_up);
