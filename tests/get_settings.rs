//! Process-wide settings. Kept in its own binary because it changes the
//! process environment, which no other test here may read concurrently.

use std::sync::Arc;

use reqlog::{get_settings, try_get_settings};

#[test]
fn test_get_settings_is_memoized() {
    std::env::set_var("APP_NAME", "memo-first");
    let first = get_settings();

    std::env::set_var("APP_NAME", "memo-second");
    let second = get_settings();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(second.app_name, "memo-first");

    let third = try_get_settings().unwrap();
    assert!(Arc::ptr_eq(&first, &third));
}
