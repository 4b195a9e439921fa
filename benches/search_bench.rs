use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tessera::{Document, Enquire, MSetRequest, Op, Query, TermGenerator, WritableDatabase};

const VOCABULARY: usize = 2000;

fn generate_texts(count: usize, words_per_doc: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            (0..words_per_doc)
                .map(|_| {
                    // Skew towards low ids so some terms are common.
                    let a = rng.random_range(0..VOCABULARY);
                    let b = rng.random_range(0..VOCABULARY);
                    format!("w{}", a.min(b))
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn build_database(texts: &[String]) -> WritableDatabase {
    let mut db = WritableDatabase::inmemory().unwrap();
    let mut generator = TermGenerator::new();
    for (i, text) in texts.iter().enumerate() {
        let mut doc = Document::with_data(text.as_str());
        doc.add_value(0, format!("{:08}", i % 97));
        generator.set_termpos(0);
        generator.index_text(&mut doc, text, 1, "").unwrap();
        db.add_document(&doc).unwrap();
    }
    db.commit().unwrap();
    db
}

fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Indexing");
    group.sample_size(10);

    for count in [1000, 5000].iter() {
        let texts = generate_texts(*count, 50);
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), &texts, |b, texts| {
            b.iter(|| build_database(texts))
        });
    }
    group.finish();
}

fn bench_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("Search");
    let db = build_database(&generate_texts(5000, 50));
    let reader = db.reader();

    let queries = [
        ("or", Query::new(Op::Or, [Query::term("w1"), Query::term("w10"), Query::term("w100")])),
        ("and", Query::new(Op::And, [Query::term("w1"), Query::term("w2")])),
        ("phrase", Query::new(Op::Phrase, [Query::term("w1"), Query::term("w2")])),
    ];
    for (name, query) in queries {
        let mut enquire = Enquire::new(&reader);
        enquire.set_query(query).unwrap();
        group.bench_function(BenchmarkId::new("top10", name), |b| {
            b.iter(|| enquire.get_mset(MSetRequest::new(0, 10)).unwrap())
        });
    }

    let mut enquire = Enquire::new(&reader);
    enquire.set_query(Query::term("w3")).unwrap();
    enquire.set_sort_by_value(0, false);
    group.bench_function("sort_by_value", |b| {
        b.iter(|| enquire.get_mset(MSetRequest::new(0, 10).collapse(0, 1)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_indexing, bench_search);
criterion_main!(benches);
