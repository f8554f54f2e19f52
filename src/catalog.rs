//! The catalog of documents to keep synchronized.
//!
//! The source publishes its full id list as a zipped XML file
//! (`BWBIdList.xml`) with one `RegelingInfo` record per document. This module
//! downloads and parses that file, stores it in the `documents` table, and
//! streams ids back out for the coordinator.

use std::io::Read;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use futures::stream::BoxStream;
use futures::StreamExt;
use quick_xml::events::Event;
use sqlx::SqlitePool;

use crate::config::{CatalogConfig, Config};
use crate::db;
use crate::models::{format_stored_date, Document};

/// Maximum decompressed size of the id list (zip-bomb protection).
const MAX_CATALOG_BYTES: u64 = 512 * 1024 * 1024;

pub async fn download_catalog(config: &CatalogConfig) -> Result<Vec<u8>> {
    tracing::info!(url = %config.url, "downloading catalog");
    let resp = reqwest::get(&config.url)
        .await
        .with_context(|| format!("Failed to download catalog from {}", config.url))?;

    if !resp.status().is_success() {
        bail!("Catalog download failed (HTTP {})", resp.status());
    }

    Ok(resp.bytes().await?.to_vec())
}

/// Extract `entry` from the zip archive and parse it into documents.
pub fn parse_catalog(zip_bytes: &[u8], entry: &str) -> Result<Vec<Document>> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(zip_bytes))
        .context("Catalog is not a valid zip archive")?;
    let file = archive
        .by_name(entry)
        .with_context(|| format!("Catalog archive has no entry named {}", entry))?;

    let xml = read_limited(file, MAX_CATALOG_BYTES, entry)?;
    parse_catalog_xml(&xml)
}

/// Read at most `limit` bytes; anything longer is rejected.
fn read_limited(reader: impl Read, limit: u64, name: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader.take(limit + 1).read_to_end(&mut buf)?;
    if buf.len() as u64 > limit {
        bail!("{} exceeds size limit ({} bytes)", name, limit);
    }
    Ok(buf)
}

/// Parse the `BWBIdServiceResultaat` document.
///
/// Only the first `Citeertitel` of a record supplies title, status and start
/// date. Records without an id are skipped.
pub fn parse_catalog_xml(xml: &[u8]) -> Result<Vec<Document>> {
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut docs = Vec::new();
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<Document> = None;
    let mut citations = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match name.as_str() {
                    "RegelingInfo" => {
                        current = Some(Document::bare(""));
                        citations = 0;
                    }
                    "Citeertitel" => citations += 1,
                    _ => {}
                }
                path.push(name);
            }
            Ok(Event::End(_)) => {
                if path.pop().as_deref() == Some("RegelingInfo") {
                    if let Some(doc) = current.take() {
                        if !doc.id.is_empty() {
                            docs.push(doc);
                        }
                    }
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(doc) = current.as_mut() {
                    let text = t.unescape()?.into_owned();
                    apply_field(doc, &path, citations, text);
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "Malformed catalog XML at byte {}: {}",
                reader.buffer_position(),
                e
            ),
            _ => {}
        }
        buf.clear();
    }

    Ok(docs)
}

fn apply_field(doc: &mut Document, path: &[String], citations: usize, text: String) {
    let Some(leaf) = path.last() else {
        return;
    };
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str());

    match (parent, leaf.as_str()) {
        (Some("RegelingInfo"), "BWBId") => doc.id = text,
        (Some("RegelingInfo"), "OfficieleTitel") => doc.official_title = text,
        (Some("RegelingInfo"), "RegelingSoort") => doc.kind = text,
        (Some("RegelingInfo"), "VervalDatum") => doc.expiry_date = parse_catalog_date(&text),
        (Some("Citeertitel"), field) if citations == 1 => match field {
            "titel" => doc.title = text,
            "status" => doc.status = text,
            "InwerkingtredingsDatum" => doc.start_date = parse_catalog_date(&text),
            _ => {}
        },
        _ => {}
    }
}

/// Catalog dates are ISO dates; older exports use `dd-mm-yyyy`. Anything
/// else is treated as absent.
fn parse_catalog_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let s = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d-%m-%Y"))
        .ok()
}

/// Upsert every catalog document in a single transaction.
pub async fn store_catalog(pool: &SqlitePool, docs: &[Document]) -> Result<usize> {
    let mut tx = pool.begin().await?;

    for doc in docs {
        sqlx::query(
            r#"
            INSERT INTO documents (id, official_title, title, status, kind, start_date, expiry_date)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                official_title = excluded.official_title,
                title = excluded.title,
                status = excluded.status,
                kind = excluded.kind,
                start_date = excluded.start_date,
                expiry_date = excluded.expiry_date
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.official_title)
        .bind(&doc.title)
        .bind(&doc.status)
        .bind(&doc.kind)
        .bind(doc.start_date.map(format_stored_date))
        .bind(doc.expiry_date.map(format_stored_date))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(docs.len())
}

/// Ids fetched per page by [`document_ids`].
const ID_PAGE_SIZE: i64 = 256;

/// Stream catalog ids in catalog order, optionally restricted to one kind.
///
/// Ids are read in pages keyed on `rowid`, and the pool connection is
/// returned after each page, so the stream can share a pool with the
/// scanners even when it has a single connection. A failing page query is
/// logged and ends the stream.
pub fn document_ids<'a>(pool: &'a SqlitePool, kind: Option<&'a str>) -> BoxStream<'a, String> {
    futures::stream::unfold(Some(0i64), move |after| async move {
        let after = after?;
        match id_page(pool, kind, after).await {
            Ok(page) if page.is_empty() => None,
            Ok(page) => {
                let next = if (page.len() as i64) < ID_PAGE_SIZE {
                    None
                } else {
                    page.last().map(|(rowid, _)| *rowid)
                };
                let ids: Vec<String> = page.into_iter().map(|(_, id)| id).collect();
                Some((futures::stream::iter(ids), next))
            }
            Err(e) => {
                tracing::warn!(error = %e, after_rowid = after, "catalog page query failed; stopping id stream");
                None
            }
        }
    })
    .flatten()
    .boxed()
}

async fn id_page(pool: &SqlitePool, kind: Option<&str>, after: i64) -> Result<Vec<(i64, String)>> {
    let rows = match kind {
        Some(kind) => {
            sqlx::query_as::<_, (i64, String)>(
                r#"
                SELECT rowid, id FROM documents
                WHERE kind = ? AND rowid > ? AND id IS NOT NULL
                ORDER BY rowid
                LIMIT ?
                "#,
            )
            .bind(kind)
            .bind(after)
            .bind(ID_PAGE_SIZE)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as::<_, (i64, String)>(
                r#"
                SELECT rowid, id FROM documents
                WHERE rowid > ? AND id IS NOT NULL
                ORDER BY rowid
                LIMIT ?
                "#,
            )
            .bind(after)
            .bind(ID_PAGE_SIZE)
            .fetch_all(pool)
            .await?
        }
    };
    Ok(rows)
}

/// `wetten catalog`: load the id list from a local zip or the source.
pub async fn run_load_catalog(config: &Config, file: Option<&std::path::Path>) -> Result<()> {
    let bytes = match file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?,
        None => download_catalog(&config.catalog).await?,
    };

    let docs = parse_catalog(&bytes, &config.catalog.entry)?;
    let pool = db::connect(config).await?;
    let stored = store_catalog(&pool, &docs).await?;

    let matching = match config.sync.kind_filter() {
        Some(kind) => docs.iter().filter(|d| d.kind == kind).count(),
        None => docs.len(),
    };

    println!("catalog");
    println!("  documents stored: {}", stored);
    println!(
        "  selected for sync: {} (kind: {})",
        matching,
        config.sync.kind_filter().unwrap_or("all")
    );
    println!("ok");

    pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BWBIdServiceResultaat>
  <GegenereerdOp>2014-03-01T02:00:00</GegenereerdOp>
  <RegelingInfoLijst>
    <RegelingInfo>
      <BWBId>BWBR0001840</BWBId>
      <DatumLaatsteWijziging>2013-07-01</DatumLaatsteWijziging>
      <VervalDatum></VervalDatum>
      <OfficieleTitel>Grondwet voor het Koninkrijk der Nederlanden</OfficieleTitel>
      <CiteertitelLijst>
        <Citeertitel>
          <titel>Grondwet</titel>
          <status>officieel</status>
          <InwerkingtredingsDatum>1815-08-24</InwerkingtredingsDatum>
        </Citeertitel>
        <Citeertitel>
          <titel>Gw</titel>
          <status>informeel</status>
        </Citeertitel>
      </CiteertitelLijst>
      <RegelingSoort>wet</RegelingSoort>
    </RegelingInfo>
    <RegelingInfo>
      <BWBId>BWBR0005537</BWBId>
      <VervalDatum>2011-01-01</VervalDatum>
      <OfficieleTitel>Besluit &amp; regeling</OfficieleTitel>
      <RegelingSoort>AMvB</RegelingSoort>
    </RegelingInfo>
    <RegelingInfo>
      <OfficieleTitel>no id</OfficieleTitel>
    </RegelingInfo>
  </RegelingInfoLijst>
</BWBIdServiceResultaat>
"#;

    fn zipped(name: &str, body: &str) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn parses_regeling_info_records() {
        let docs = parse_catalog_xml(SAMPLE.as_bytes()).unwrap();
        assert_eq!(docs.len(), 2);

        let gw = &docs[0];
        assert_eq!(gw.id, "BWBR0001840");
        assert_eq!(gw.title, "Grondwet");
        assert_eq!(gw.status, "officieel");
        assert_eq!(gw.kind, "wet");
        assert_eq!(gw.start_date, NaiveDate::from_ymd_opt(1815, 8, 24));
        assert_eq!(gw.expiry_date, None);

        let amvb = &docs[1];
        assert_eq!(amvb.official_title, "Besluit & regeling");
        assert_eq!(amvb.expiry_date, NaiveDate::from_ymd_opt(2011, 1, 1));
        assert_eq!(amvb.title, "");
    }

    #[test]
    fn reads_entry_from_zip() {
        let bytes = zipped("BWBIdList.xml", SAMPLE);
        let docs = parse_catalog(&bytes, "BWBIdList.xml").unwrap();
        assert_eq!(docs.len(), 2);
        assert!(parse_catalog(&bytes, "other.xml").is_err());
    }

    #[test]
    fn malformed_dates_are_absent() {
        assert_eq!(parse_catalog_date("not a date"), None);
        assert_eq!(parse_catalog_date("24-08-1815"), NaiveDate::from_ymd_opt(1815, 8, 24));
        assert_eq!(
            parse_catalog_date("2001-02-03T00:00:00"),
            NaiveDate::from_ymd_opt(2001, 2, 3)
        );
    }

    #[tokio::test]
    async fn stored_catalog_streams_ids_by_kind() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = crate::config::parse_config(&format!(
            "[db]\npath = \"{}\"\n",
            tmp.path().join("c.sqlite").display()
        ))
        .unwrap();
        let pool = db::connect(&cfg).await.unwrap();
        crate::migrate::create_schema(&pool).await.unwrap();

        let docs = parse_catalog_xml(SAMPLE.as_bytes()).unwrap();
        assert_eq!(store_catalog(&pool, &docs).await.unwrap(), 2);
        // idempotent upsert
        store_catalog(&pool, &docs).await.unwrap();

        let wet: Vec<String> = document_ids(&pool, Some("wet")).collect().await;
        assert_eq!(wet, vec!["BWBR0001840".to_string()]);
        let all: Vec<String> = document_ids(&pool, None).collect().await;
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn size_limit_is_inclusive() {
        assert_eq!(read_limited(&b"abcd"[..], 4, "x").unwrap(), b"abcd");
        let err = read_limited(&b"abcde"[..], 4, "x").unwrap_err();
        assert!(err.to_string().contains("exceeds size limit"));
    }

    #[tokio::test]
    async fn sync_completes_on_a_single_connection_pool() {
        use crate::coordinator::SyncCoordinator;
        use crate::fetch::timeline::TimelineFetcher;
        use crate::scanner::ScanConfig;
        use crate::store::sqlite::SqliteSnapshotStore;
        use std::sync::Arc;

        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = crate::config::parse_config(&format!(
            "[db]\npath = \"{}\"\nmax_connections = 1\n",
            tmp.path().join("c.sqlite").display()
        ))
        .unwrap();
        let pool = db::connect(&cfg).await.unwrap();
        crate::migrate::create_schema(&pool).await.unwrap();

        // more than one page of ids
        let docs: Vec<Document> = (0..300)
            .map(|i| {
                let mut doc = Document::bare(format!("BWBR{:07}", i));
                doc.kind = "wet".to_string();
                doc
            })
            .collect();
        store_catalog(&pool, &docs).await.unwrap();

        let fetcher = docs.iter().fold(TimelineFetcher::new(), |f, doc| {
            f.version(&doc.id, NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(), &doc.id)
        });
        let store = Arc::new(SqliteSnapshotStore::new(pool.clone()));

        let summary = SyncCoordinator::new(
            Arc::new(fetcher),
            store,
            ScanConfig::from_config(&cfg).unwrap(),
            4,
        )
        .with_until(NaiveDate::from_ymd_opt(2003, 1, 1).unwrap())
        .run(document_ids(&pool, Some("wet")))
        .await;

        assert_eq!(summary.documents, 300);
        assert_eq!(summary.completed, 300);
        assert_eq!(summary.aborted, 0);
        assert_eq!(summary.new_versions, 300);
    }
}
