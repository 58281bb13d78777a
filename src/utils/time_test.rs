use super::time::get_now_as_u64;

#[test]
fn test_get_now_as_u64() {
    let now = get_now_as_u64();

    // Greater than 2021-01-01
    assert!(now > 1609459200);
}
