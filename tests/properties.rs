// tests/properties.rs

use proptest::prelude::*;

use renderkit::cache::CacheKey;
use renderkit::session::StripedLocks;

proptest! {
    #[test]
    fn stripe_is_stable_and_in_range(id in ".{0,40}", stripes in 1usize..2048) {
        let locks = StripedLocks::new(stripes);
        let s = locks.stripe_for(&id);
        prop_assert!(s < stripes);
        prop_assert_eq!(s, locks.stripe_for(&id));
    }

    #[test]
    fn cache_keys_equal_iff_all_parts_equal(
        text in ".{0,30}",
        other_text in ".{0,30}",
        voice in "[a-z]{1,8}",
        other_voice in "[a-z]{1,8}",
    ) {
        let a = CacheKey::for_text(&text, "minimax", &voice);
        let b = CacheKey::for_text(&other_text, "minimax", &other_voice);
        prop_assert_eq!(a == b, text == other_text && voice == other_voice);
    }
}
