//! End-to-end integration tests for bibgraph.
//!
//! These tests exercise the full path from raw XML through ingestion into a
//! store and back out through the query service and the coauthor expander.

use rand::SeedableRng;
use rand::rngs::StdRng;

use bibgraph::coauthor::ExpansionLimits;
use bibgraph::error::{IngestError, ParseError};
use bibgraph::ingest::{IngestConfig, IngestPipeline};
use bibgraph::key::{ContentKey, PrimaryKey};
use bibgraph::query::QueryService;
use bibgraph::store::{BibStore, MemStore};

const SAMPLE: &str = r#"<?xml version="1.0" encoding="ISO-8859-1"?>
<!DOCTYPE dblp SYSTEM "dblp.dtd">
<dblp>
<article mdate="2017-05-28" key="journals/acta/Saxena96">
<author>Sanjeev Saxena</author>
<title>Parallel Integer Sorting and Simulation Amongst CRCW Models.</title>
<pages>607-619</pages>
<year>1996</year>
<volume>33</volume>
<journal>Acta Inf.</journal>
<number>7</number>
<url>db/journals/acta/acta33.html#Saxena96</url>
<ee>https://doi.org/10.1007/BF03036466</ee>
</article>
<inproceedings mdate="2018-11-06" key="conf/icalp/SaxenaS97">
<author>Sanjeev Saxena</author>
<author>J&ouml;rg Sch&auml;fer</author>
<title>Parallel Sorting in <i>O</i>(log n) Time.</title>
<year>1997</year>
<booktitle>ICALP</booktitle>
</inproceedings>
<inproceedings mdate="2018-11-06" key="conf/icalp/SchaferW98">
<author>J&ouml;rg Sch&auml;fer</author>
<author>Ute Weber</author>
<title>Simulation of Parallel Machines.</title>
<year>1998</year>
</inproceedings>
<www mdate="2009-06-10" key="homepages/s/SanjeevSaxena">
<author>Sanjeev Saxena</author>
<title>Home Page</title>
</www>
</dblp>
"#;

fn ingested() -> MemStore {
    let mut pipeline = IngestPipeline::new(MemStore::new(), IngestConfig::default());
    let summary = pipeline.ingest_document(SAMPLE.as_bytes()).unwrap();
    assert_eq!(summary.records, 4);
    assert!(summary.committed);
    pipeline.into_store()
}

#[test]
fn end_to_end_ingest_and_query() {
    let service = QueryService::new(ingested(), ExpansionLimits::default());

    // Author query short-circuits.
    let resp = service.query("Sanjeev Saxena").unwrap();
    let author = resp.author.unwrap();
    assert_eq!(author.workcount, 3);
    assert_eq!(
        author.work,
        vec![
            PrimaryKey::new(0).to_hex(),
            PrimaryKey::new(1).to_hex(),
            PrimaryKey::new(3).to_hex(),
        ]
    );

    // Keyword query intersects title keywords.
    let resp = service.query("parallel sorting").unwrap();
    assert!(resp.author.is_none());
    assert_eq!(
        resp.keyword,
        vec![PrimaryKey::new(0).to_hex(), PrimaryKey::new(1).to_hex()]
    );
    assert_eq!(resp.fullmatch, Some(Vec::new()));

    // Full-title query.
    let resp = service.query("Simulation of Parallel Machines.").unwrap();
    assert_eq!(resp.fullmatch, Some(vec![PrimaryKey::new(2).to_hex()]));
}

#[test]
fn entities_and_nested_markup_survive_ingestion() {
    let store = ingested();
    let record = store.full_record(PrimaryKey::new(1)).unwrap().unwrap();
    assert_eq!(record.authors(), ["Sanjeev Saxena", "Jörg Schäfer"]);
    assert_eq!(record.first("title"), Some("Parallel Sorting in O(log n) Time."));
    assert_eq!(record.first("booktitle"), Some("ICALP"));
    // `journal` is not a collected field.
    let first = store.full_record(PrimaryKey::new(0)).unwrap().unwrap();
    assert!(first.property("journal").is_empty());
    assert_eq!(first.attribute("mdate"), Some("2017-05-28"));
}

#[test]
fn entry_summaries_and_full_entry() {
    let service = QueryService::new(ingested(), ExpansionLimits::default());
    let summaries = service
        .entry_summaries(&["2", "3", "deadbeef"])
        .unwrap();
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].title, ["Simulation of Parallel Machines."]);
    assert!(summaries[1].year.is_empty());

    let entry = service.full_entry(&PrimaryKey::new(3).to_hex()).unwrap().unwrap();
    assert_eq!(entry.attrs["key"], "homepages/s/SanjeevSaxena");
}

#[test]
fn coauthor_graph_spans_two_hops() {
    let service = QueryService::new(ingested(), ExpansionLimits::default());
    let graph = service
        .coauthor_graph_with_rng("Sanjeev Saxena", &mut StdRng::seed_from_u64(11))
        .unwrap();
    let names: Vec<&str> = graph.vertices.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["Sanjeev Saxena", "Jörg Schäfer", "Ute Weber"]);
    assert_eq!(
        graph.edges,
        vec![
            ("1".to_string(), "2".to_string()),
            ("2".to_string(), "3".to_string()),
        ]
    );
    assert!(!graph.truncated);
}

#[test]
fn features_after_commit() {
    let service = QueryService::new(ingested(), ExpansionLimits::default());
    let features = service.features().unwrap();
    assert_eq!(features.topauthors[0], "Sanjeev Saxena");
    assert_eq!(features.topkeywords[0], "parallel");
    // Years 1996, 1997, 1998 each contribute a [year, keywords] pair.
    assert_eq!(features.topyearkeywords.len(), 6);
    assert_eq!(features.topyearkeywords[0], serde_json::json!(1996));
}

#[test]
fn structural_error_ingests_nothing() {
    let doc = "<dblp><title>Loose</title><article><author>A</author></article></dblp>";
    let mut pipeline = IngestPipeline::new(MemStore::new(), IngestConfig::default());
    let err = pipeline.ingest_document(doc.as_bytes()).unwrap_err();
    assert!(matches!(err, IngestError::Parse(ParseError::Structural { .. })));
    assert!(pipeline.store().is_empty());
    assert!(
        pipeline
            .store()
            .lookup_by_author(ContentKey::of("A"))
            .unwrap()
            .is_empty()
    );
}

#[test]
fn stores_behind_arc_are_shared() {
    use std::sync::Arc;

    let store = Arc::new(MemStore::new());
    let mut pipeline = IngestPipeline::new(Arc::clone(&store), IngestConfig::default());
    pipeline.ingest_document(SAMPLE.as_bytes()).unwrap();

    let service = QueryService::new(Arc::clone(&store), ExpansionLimits::default());
    assert_eq!(service.query("Ute Weber").unwrap().author.unwrap().workcount, 1);
    assert_eq!(store.len(), 4);
}
