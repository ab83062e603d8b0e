//! Integration tests for the SQLite store: persistence across restarts,
//! idempotent writes, and upgrade of databases from the earlier schema.
//!
//! In-memory tests get a fresh database each; file-backed tests use their own
//! directory under the system temp dir.

use pretty_assertions::assert_eq;
use rss_scraper::channel::MatchedItem;
use rss_scraper::feed::{parse_document, ContentHash, FeedItem};
use rss_scraper::matcher::PatternSet;
use rss_scraper::storage::{SqliteStore, Store, TableCounts};

fn matched_item(xml: &str, patterns: &PatternSet) -> MatchedItem {
    let doc = parse_document(xml.as_bytes()).unwrap();
    let node = &doc.items()[0];
    let hash = ContentHash::of(node.raw_text());
    MatchedItem {
        item: FeedItem::from_node(hash, node, "https://example.com/rss"),
        matches: patterns.find_matches(node.raw_text()),
    }
}

fn temp_db(name: &str) -> (std::path::PathBuf, String) {
    let dir = std::env::temp_dir().join(name);
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("db.sqlite3").to_str().unwrap().to_string();
    (dir, path)
}

// ============================================================================
// Round trip
// ============================================================================

#[tokio::test]
async fn test_recorded_item_reads_back_with_all_fields() {
    let store = SqliteStore::open(":memory:").await.unwrap();
    let patterns = PatternSet::compile([r"alert: \w+"]).unwrap();
    let entry = matched_item(
        r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/"><channel><item>
            <title>alert: disk full</title>
            <link>https://example.com/items/1</link>
            <description><![CDATA[<p>Disk <b>full</b> on db-1</p>]]></description>
            <dc:creator>ops</dc:creator>
            <category>infra</category>
            <category>storage</category>
            <guid isPermaLink="false">item-1</guid>
            <pubDate>Tue, 10 Jun 2003 04:00:00 GMT</pubDate>
        </item></channel></rss>"#,
        &patterns,
    );

    store.record(&entry).await.unwrap();
    let stored = store
        .get_feed_item(&entry.item.content_hash)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(stored, entry.item);
    assert_eq!(stored.author.as_deref(), Some("ops"));
    assert_eq!(stored.category.as_deref(), Some(r#"["infra","storage"]"#));
    assert_eq!(stored.description.as_deref(), Some("<p>Disk <b>full</b> on db-1</p>"));
    assert_eq!(stored.source_url.as_deref(), Some("https://example.com/rss"));
}

#[tokio::test]
async fn test_overlapping_patterns_share_item_hash() {
    let store = SqliteStore::open(":memory:").await.unwrap();
    let patterns = PatternSet::compile([r"alert: \w+", r"disk \w+"]).unwrap();
    let entry = matched_item(
        "<rss><channel><item><title>alert: disk full</title></item></channel></rss>",
        &patterns,
    );

    store.record(&entry).await.unwrap();
    let evidence = store
        .evidence_for_item(&entry.item.content_hash)
        .await
        .unwrap();

    assert_eq!(evidence.len(), 2);
    assert!(evidence
        .iter()
        .all(|e| e.content_hash == entry.item.content_hash));
    let pairs: Vec<(&str, &str)> = evidence
        .iter()
        .map(|e| (e.match_value.as_str(), e.pattern.as_str()))
        .collect();
    assert_eq!(
        pairs,
        vec![("alert: disk", r"alert: \w+"), ("disk full", r"disk \w+")]
    );
}

#[tokio::test]
async fn test_replaying_entries_leaves_counts_unchanged() {
    let store = SqliteStore::open(":memory:").await.unwrap();
    let patterns = PatternSet::compile([r"alert: \w+"]).unwrap();
    let entry = matched_item(
        "<rss><channel><item><title>alert: disk full</title></item></channel></rss>",
        &patterns,
    );

    for _ in 0..3 {
        store.record(&entry).await.unwrap();
    }

    assert_eq!(
        store.counts().await.unwrap(),
        TableCounts {
            items: 1,
            patterns: 1,
            matches: 1,
            evidence: 1,
        }
    );
}

// ============================================================================
// File-backed databases
// ============================================================================

#[tokio::test]
async fn test_data_survives_reopen() {
    let (dir, path) = temp_db("rss_scraper_store_test_reopen");
    let patterns = PatternSet::compile([r"alert: \w+"]).unwrap();
    let entry = matched_item(
        "<rss><channel><item><title>alert: disk full</title></item></channel></rss>",
        &patterns,
    );

    {
        let store = SqliteStore::open(&path).await.unwrap();
        store.record(&entry).await.unwrap();
    }

    let store = SqliteStore::open(&path).await.unwrap();
    assert!(store
        .get_feed_item(&entry.item.content_hash)
        .await
        .unwrap()
        .is_some());
    // A restarted process re-polls the same item: nothing new is written
    let replay = store.record(&entry).await.unwrap();
    assert!(replay.is_noop());

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_earlier_schema_is_upgraded_in_place() {
    let (dir, path) = temp_db("rss_scraper_store_test_upgrade");
    let hash = ContentHash::of("alert: disk full");

    // All four tables as earlier releases created them: nullable columns and
    // no uniqueness rule on evidence, which holds a repeated triple
    {
        let pool = sqlx::SqlitePool::connect(&format!("sqlite:{}?mode=rwc", path))
            .await
            .unwrap();
        for ddl in [
            r#"CREATE TABLE rss_items (
                sha256 VARCHAR PRIMARY KEY,
                title VARCHAR,
                link VARCHAR,
                description VARCHAR,
                author VARCHAR,
                category VARCHAR,
                comments VARCHAR,
                enclosure VARCHAR,
                guid VARCHAR,
                pub_date VARCHAR,
                source VARCHAR
            )"#,
            "CREATE TABLE patterns (regex VARCHAR PRIMARY KEY)",
            r#"CREATE TABLE matches ("match" VARCHAR PRIMARY KEY)"#,
            r#"CREATE TABLE evidence (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                rss_item_sha256 VARCHAR,
                "match" VARCHAR,
                pattern VARCHAR
            )"#,
        ] {
            sqlx::query(ddl).execute(&pool).await.unwrap();
        }

        sqlx::query("INSERT INTO rss_items (sha256, title, source) VALUES (?, 'alert: disk full', 'https://example.com/rss')")
            .bind(hash.as_str())
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(r"INSERT INTO patterns (regex) VALUES ('alert: \w+')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(r#"INSERT INTO matches ("match") VALUES ('alert: disk')"#)
            .execute(&pool)
            .await
            .unwrap();
        for _ in 0..2 {
            sqlx::query(r#"INSERT INTO evidence (rss_item_sha256, "match", pattern) VALUES (?, 'alert: disk', 'alert: \w+')"#)
                .bind(hash.as_str())
                .execute(&pool)
                .await
                .unwrap();
        }
        sqlx::query(r#"INSERT INTO evidence (rss_item_sha256, "match", pattern) VALUES (NULL, 'orphan', NULL)"#)
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    }

    let store = SqliteStore::open(&path).await.unwrap();

    // The repeated triple collapses to its first row; the NULL row survives
    assert_eq!(
        store.counts().await.unwrap(),
        TableCounts {
            items: 1,
            patterns: 1,
            matches: 1,
            evidence: 2,
        }
    );
    let legacy = store.get_feed_item(&hash).await.unwrap().unwrap();
    assert_eq!(legacy.title.as_deref(), Some("alert: disk full"));
    assert_eq!(legacy.source_url.as_deref(), Some("https://example.com/rss"));
    assert_eq!(legacy.link, None);
    assert_eq!(store.evidence_for_item(&hash).await.unwrap().len(), 1);

    // Existing rows count as already present; new triples are kept once
    assert!(!store.upsert_pattern(r"alert: \w+").await.unwrap());
    assert!(!store
        .insert_evidence_if_absent(&hash, "alert: disk", r"alert: \w+")
        .await
        .unwrap());
    assert!(store
        .insert_evidence_if_absent(&hash, "disk full", "disk full")
        .await
        .unwrap());
    assert!(!store
        .insert_evidence_if_absent(&hash, "disk full", "disk full")
        .await
        .unwrap());
    assert_eq!(store.counts().await.unwrap().evidence, 3);

    std::fs::remove_dir_all(&dir).ok();
}
