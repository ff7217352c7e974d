use context_escape::{
    codec::{CSS, Codec, Context, HTML},
    encode, encode_for_html, encode_utf16,
    format::EscapeFormatter,
    rules::{Emitter, Guard, RuleSet},
    stream::EncodeStream,
};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::borrow::Cow;
use std::convert::Infallible;
use std::io::{self, Write};

// --- Benchmark Data ---
// Nothing to escape in any context but CSS; the best case for literal runs.
const NO_ESCAPES: &str = "This is a simple string without any special characters to escape. It is just plain ASCII text, designed to test the best case where the iterator can yield the whole input as a single slice";
// Typical user-provided text with a few markup characters.
const SPARSE_ESCAPES: &str = r#"Here's a comment with a "quote", an <em>tag</em> & an ampersand.
It also has a newline and a	tab, like most text pasted into a form."#;
// Every character needs an escape.
const DENSE_ESCAPES: &str = r#"<>&"'<>&"'<>&"'`=`=`=\\\\"#;
// Non-ASCII text, escaped by the HTML codecs and passed through by JavaScript.
const UNICODE: &str = "Unicode test: éàçüö. Emoji: 😀. More symbols: ❤️✅. Line\u{2028}separator.";

/// Benchmarks for each built-in context.
fn context_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Encode");

    for (id, input) in [
        ("No Escapes", NO_ESCAPES),
        ("Sparse Escapes", SPARSE_ESCAPES),
        ("Dense Escapes", DENSE_ESCAPES),
        ("Unicode", UNICODE),
    ] {
        for context in Context::ALL {
            let name = format!("{}/{}", context.name(), id);

            // 1. Pure iterator performance (no allocation).
            group.bench_with_input(BenchmarkId::new("Iterate Only", &name), input, |b, i| {
                b.iter(|| {
                    for token in encode(&context, i) {
                        black_box(token);
                    }
                })
            });

            // 2. Collecting into a String (includes allocation).
            group.bench_with_input(BenchmarkId::new("Collect to String", &name), input, |b, i| {
                b.iter(|| black_box(encode(&context, i).into_string()))
            });

            // 3. Writing to a sink through `fmt::Display`.
            group.bench_with_input(BenchmarkId::new("Write to Sink", &name), input, |b, i| {
                b.iter(|| {
                    let mut sink = io::sink();
                    write!(sink, "{}", encode(&context, i)).unwrap();
                    black_box(sink);
                })
            });
        }
    }

    // 4. `Cow::from` conversion, borrowed and owned paths.
    group.bench_function("Cow::from (Borrowed)", |b| {
        b.iter(|| {
            let cow: Cow<str> = encode(&HTML, NO_ESCAPES).into();
            black_box(cow);
        })
    });

    group.bench_function("Cow::from (Owned)", |b| {
        b.iter(|| {
            let cow: Cow<str> = encode(&HTML, SPARSE_ESCAPES).into();
            black_box(cow);
        })
    });

    // Baseline against the common "replace chain" approach.
    group.bench_function("encode_for_html vs replace/encode_for_html", |b| {
        b.iter(|| black_box(encode_for_html(SPARSE_ESCAPES)))
    });
    group.bench_function("encode_for_html vs replace/replace chain", |b| {
        b.iter(|| {
            black_box(
                SPARSE_ESCAPES
                    .replace('&', "&#38;")
                    .replace('<', "&#60;")
                    .replace('>', "&#62;")
                    .replace('"', "&#34;")
                    .replace('\'', "&#39;"),
            )
        })
    });

    group.finish();
}

/// Rule sets pay for a linear rule scan per character.
fn rule_set_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("RuleSet");

    let xml = RuleSet::builder("XML")
        .rule(Guard::Single('<'), "&lt;")
        .rule(Guard::Single('>'), "&gt;")
        .rule(Guard::Single('&'), "&amp;")
        .rule(Guard::Single('"'), "&quot;")
        .rule(
            Guard::Range('\0', '\u{1F}'),
            Emitter::list([
                Emitter::constant("&#x"),
                Emitter::Builtin(EscapeFormatter::Hexadecimal),
                Emitter::constant(";"),
            ]),
        )
        .default_emitter(EscapeFormatter::Identity)
        .build()
        .unwrap();

    for (id, input) in [("Sparse Escapes", SPARSE_ESCAPES), ("Unicode", UNICODE)] {
        group.bench_with_input(BenchmarkId::new("Collect to String", id), input, |b, i| {
            b.iter(|| black_box(encode(&xml, i).into_string()))
        });
    }

    group.finish();
}

/// Streaming and UTF-16 input paths.
fn input_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("Input");
    let large = SPARSE_ESCAPES.repeat(100);

    for chunk_size in [7, 64, 4096] {
        group.bench_with_input(
            BenchmarkId::new("Stream Chunks", chunk_size),
            &chunk_size,
            |b, &size| {
                b.iter(|| {
                    let mut chunks = large.as_bytes().chunks(size);
                    let mut out = String::with_capacity(large.len());
                    EncodeStream::new(&CSS)
                        .encode_from_fn::<_, _, Infallible, Infallible, _>(
                            || chunks.next().map(Ok),
                            |token| {
                                out.push_str(token.as_str());
                                Ok(())
                            },
                        )
                        .unwrap();
                    black_box(out);
                })
            },
        );
    }

    let units: Vec<u16> = large.encode_utf16().collect();
    group.bench_function("UTF-16", |b| {
        b.iter(|| black_box(encode_utf16(&CSS, &units).unwrap()))
    });
    group.bench_function("UTF-8 Baseline", |b| {
        b.iter(|| black_box(encode(&CSS, &large).into_string()))
    });

    group.finish();
}

criterion_group!(
    benches,
    context_benchmarks,
    rule_set_benchmarks,
    input_benchmarks
);
criterion_main!(benches);
