use carbon_conformance::{CommonAdapterTest, MockAdapter, RealTime, common_adapter_tests};

fn set_up() -> CommonAdapterTest<MockAdapter, RealTime> {
    CommonAdapterTest::new(MockAdapter::new(), RealTime)
}

// The mock reports no key length, which the key length behavior treats as a failure.
common_adapter_tests!(
    set_up,
    skip = ["can_store_values_with_cache_keys_up_to_the_maximum_key_length_limit"]
);
