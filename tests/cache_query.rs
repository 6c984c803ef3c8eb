use std::sync::Arc;

use parking_lot::RwLock;

use markstore::{
    core::store::RecordStore,
    query::{Query, SharedStore, StockCache},
    types::{KeyError, Market, StockKey},
};

const FIXTURE: &str = "\
[MARK]
01600519=3
00000858=5

[TIP]
01600519=watch earnings
02830799=北交所 新股

[TIPWORD]
00000858=白酒/消费
01600519=白酒/高端
00300750=新能源
";

fn cache(capacity: usize) -> StockCache {
    let store: SharedStore = Arc::new(RwLock::new(RecordStore::load(FIXTURE).expect("fixture")));
    StockCache::new(store, capacity)
}

fn codes(views: &[markstore::mark::StockView]) -> Vec<&str> {
    views.iter().map(|v| v.key.as_str()).collect()
}

#[test]
fn get_materializes_views_and_counts_hits() {
    let cache = cache(10);
    let view = cache.get("600519").expect("key").expect("view");
    assert_eq!(view.mark.as_deref(), Some("3"));
    assert_eq!(view.tip.as_deref(), Some("watch earnings"));
    assert_eq!(view.tipword.joined(), "白酒/高端");

    let again = cache.get("01600519").expect("key").expect("view");
    assert_eq!(again, view);

    let stats = cache.stats();
    assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    assert_eq!(stats.hit_rate(), 0.5);

    assert_eq!(cache.get("601318").expect("key"), None);
    assert_eq!(cache.get("9"), Err(KeyError::BadLength("9".to_string())));
}

#[test]
fn least_recently_used_view_is_evicted() {
    let cache = cache(2);
    for code in ["600519", "000858", "600519", "300750", "000858"] {
        cache.get(code).expect("key").expect("view");
    }

    let stats = cache.stats();
    assert_eq!(stats.capacity, 2);
    assert_eq!(stats.len, 2);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 4);
}

#[test]
fn invalidate_and_clear_drop_entries() {
    let cache = cache(4);
    cache.get("600519").expect("key");
    cache.get("000858").expect("key");

    let key = StockKey::resolve("600519").expect("key");
    assert_eq!(cache.invalidate([&key]), 1);
    assert_eq!(cache.invalidate([&key]), 0);
    assert_eq!(cache.stats().len, 1);

    cache.clear();
    assert_eq!(cache.stats().len, 0);
}

#[test]
fn keys_query_skips_bad_and_absent_codes() {
    let cache = cache(4);
    let views = cache.query(&Query::Keys(vec![
        "830799".to_string(),
        "bogus".to_string(),
        "000001".to_string(),
        "600519".to_string(),
    ]));
    assert_eq!(codes(&views), vec!["02830799", "01600519"]);
}

#[test]
fn keyword_query_scans_in_store_order() {
    let cache = cache(4);

    let views = cache.query(&Query::Keyword("白酒".to_string()));
    assert_eq!(codes(&views), vec!["01600519", "00000858"]);

    let views = cache.query(&Query::Keyword("earn".to_string()));
    assert_eq!(codes(&views), vec!["01600519"]);

    let views = cache.query(&Query::Keyword("300750".to_string()));
    assert_eq!(codes(&views), vec!["00300750"]);

    assert!(cache.query(&Query::Keyword("nothing".to_string())).is_empty());
    // Scans do not populate the cache.
    assert_eq!(cache.stats().len, 0);
}

#[test]
fn market_and_tipword_searches() {
    let cache = cache(4);
    assert_eq!(codes(&cache.by_market(Market::Shanghai)), vec!["01600519"]);
    assert_eq!(codes(&cache.by_market(Market::Beijing)), vec!["02830799"]);
    assert_eq!(
        codes(&cache.by_market(Market::Shenzhen)),
        vec!["00000858", "00300750"]
    );

    assert_eq!(codes(&cache.search_by_tipword("能源")), vec!["00300750"]);
    assert_eq!(codes(&cache.search_by_tipword("白")), vec!["01600519", "00000858"]);
}
