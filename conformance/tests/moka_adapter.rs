use carbon_conformance::{CommonAdapterTest, RealTime, common_adapter_tests};
use storage_engine::MokaAdapter;

fn set_up() -> CommonAdapterTest<MokaAdapter, RealTime> {
    CommonAdapterTest::new(MokaAdapter::new("conformance"), RealTime)
}

common_adapter_tests!(set_up);
