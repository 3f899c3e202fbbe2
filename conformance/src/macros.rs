//! Test generation for adapter fixtures

/// Expand every behavior of [`CommonAdapterTest`](crate::CommonAdapterTest) into a `#[test]`.
///
/// The first argument builds a fresh fixture and is called once per test. Behaviors
/// that can't apply to an adapter may be excluded by name.
///
/// # Example
/// ```ignore
/// fn set_up() -> CommonAdapterTest<MockAdapter, RealTime> {
///     CommonAdapterTest::new(MockAdapter::new(), RealTime)
/// }
///
/// common_adapter_tests!(set_up, skip = ["iterator"]);
/// ```
#[macro_export]
macro_rules! common_adapter_tests {
    (@emit $setup:expr, $skips:tt, $($name:ident),+ $(,)?) => {
        $(
            #[test]
            fn $name() {
                $crate::run_behavior(
                    stringify!($name),
                    &$skips,
                    $setup,
                    $crate::CommonAdapterTest::$name,
                );
            }
        )+
    };
    ($setup:expr, skip = $skips:tt) => {
        $crate::common_adapter_tests!(@emit $setup, $skips,
            getters_and_setters_of_options_exist,
            options_get_and_set_default,
            options_fluent_interface,
            data_types_capability,
            ttl_capabilities,
            key_capabilities,
            has_item_returns_true_on_valid_item,
            has_item_returns_false_on_missing_item,
            has_item_returns_false_on_expired_item,
            has_item_non_readable,
            has_items_returns_keys_of_found_items,
            has_items_returns_empty_array_if_non_readable,
            get_item_returns_absent_on_missing_item,
            get_item_reports_found_flag,
            get_item_returns_absent_on_expired_item,
            get_item_returns_absent_if_non_readable,
            get_items_returns_key_value_pairs_of_found_items,
            get_items_returns_empty_map_if_non_readable,
            get_metadata,
            get_metadata_returns_none_on_missing_item,
            get_metadata_returns_none_if_non_readable,
            get_metadatas,
            get_metadatas_with_empty_namespace,
            get_metadatas_returns_empty_map_if_non_readable,
            set_get_has_and_remove_item_without_namespace,
            set_get_has_and_remove_items_without_namespace,
            set_get_has_and_remove_item_with_namespace,
            set_get_has_and_remove_items_with_namespace,
            set_and_get_expired_item,
            set_and_get_expired_items,
            set_and_get_item_of_different_types,
            set_item_returns_false_if_non_writable,
            add_new_item,
            add_item_returns_false_if_item_already_exists,
            add_item_returns_false_if_non_writable,
            add_items_returns_failed_keys,
            add_item_sets_ttl,
            replace_existing_item,
            replace_item_returns_false_on_missing_item,
            replace_item_returns_false_if_non_writable,
            replace_items_returns_failed_keys,
            add_and_replace_are_complementary,
            remove_item_returns_false_on_missing_item,
            remove_items_returns_missing_keys,
            check_and_set_item,
            touch_item,
            touch_item_returns_false_on_missing_item,
            touch_item_returns_false_if_non_writable,
            touch_items_returns_given_keys_if_non_writable,
            optimize,
            iterator,
            flush,
            clear_by_prefix,
            clear_by_prefix_rejects_empty_prefix,
            clear_by_namespace,
            clear_by_namespace_rejects_empty_namespace,
            clear_expired,
            taggable,
            taggable_functions_on_empty_storage,
            clear_by_tags_match_any_and_match_all,
            get_total_space,
            get_available_space,
            can_store_values_with_cache_keys_up_to_the_maximum_key_length_limit,
        );
    };
    ($setup:expr) => {
        $crate::common_adapter_tests!($setup, skip = []);
    };
}
