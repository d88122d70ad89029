//! Benchmarks for parsing, ingestion and coauthor expansion.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::SeedableRng;

use bibgraph::coauthor::{CoauthorExpander, ExpansionLimits};
use bibgraph::ingest::{IngestConfig, IngestPipeline};
use bibgraph::key::ContentKey;
use bibgraph::keyword::keywords;
use bibgraph::parser::XmlRecordReader;
use bibgraph::store::MemStore;

/// A synthetic dump: `n` articles, each by three of `authors` authors.
fn synthetic_dump(n: usize, authors: usize) -> String {
    let mut doc = String::from("<?xml version=\"1.0\"?>\n<dblp>\n");
    for i in 0..n {
        doc.push_str(&format!(
            "<article key=\"journals/x/{i}\" mdate=\"2020-01-01\">\
             <author>Author {}</author><author>Author {}</author><author>Author {}</author>\
             <title>On the Complexity of Streaming Problem {i}.</title>\
             <year>{}</year></article>\n",
            i % authors,
            (i * 7 + 1) % authors,
            (i * 13 + 2) % authors,
            1990 + i % 30,
        ));
    }
    doc.push_str("</dblp>\n");
    doc
}

fn bench_parse(c: &mut Criterion) {
    let doc = synthetic_dump(10_000, 500);
    c.bench_function("parse_10k_records", |bench| {
        bench.iter(|| {
            let count = XmlRecordReader::new(black_box(doc.as_bytes()))
                .records()
                .count();
            black_box(count)
        })
    });
}

fn bench_ingest(c: &mut Criterion) {
    let doc = synthetic_dump(10_000, 500);
    c.bench_function("ingest_10k_records_mem", |bench| {
        bench.iter(|| {
            let mut pipeline = IngestPipeline::new(MemStore::new(), IngestConfig::default());
            black_box(pipeline.ingest_document(doc.as_bytes()).unwrap())
        })
    });
}

fn bench_keywords(c: &mut Criterion) {
    let title = "Parallel Integer Sorting and Simulation Amongst CRCW Models.";
    c.bench_function("keywords_title", |bench| {
        bench.iter(|| black_box(keywords(black_box(title))))
    });
}

fn bench_expand(c: &mut Criterion) {
    let doc = synthetic_dump(10_000, 500);
    let mut pipeline = IngestPipeline::new(MemStore::new(), IngestConfig::default());
    pipeline.ingest_document(doc.as_bytes()).unwrap();
    let store = pipeline.into_store();
    let expander = CoauthorExpander::new(&store, ExpansionLimits::default());
    let seed = ContentKey::of("Author 0");
    let mut rng = rand::rngs::StdRng::seed_from_u64(0);

    c.bench_function("expand_depth2", |bench| {
        bench.iter(|| black_box(expander.expand(seed, &mut rng).unwrap()))
    });
}

criterion_group!(benches, bench_parse, bench_ingest, bench_keywords, bench_expand);
criterion_main!(benches);
