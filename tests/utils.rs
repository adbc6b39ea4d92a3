use mediation_core::utils::{expand_macros, now_millis};

#[test]
fn test_expand_macros() {
    let url = "https://t.test/l?p=${AUCTION_PRICE}&r=${AUCTION_LOSS}&p2=${AUCTION_PRICE}";
    let expanded = expand_macros(
        url,
        &[
            ("AUCTION_PRICE", "1.25".to_string()),
            ("AUCTION_LOSS", "4".to_string()),
        ],
    );
    assert_eq!(expanded, "https://t.test/l?p=1.25&r=4&p2=1.25");
}

#[test]
fn test_unknown_macros_are_left_alone() {
    assert_eq!(
        expand_macros("x=${OTHER}", &[("AUCTION_PRICE", "1".to_string())]),
        "x=${OTHER}"
    );
}

#[test]
fn test_now_millis_advances() {
    let before = now_millis();
    std::thread::sleep(std::time::Duration::from_millis(2));
    assert!(now_millis() > before);
}
