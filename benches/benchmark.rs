use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lexforge::key::Encoding;
use lexforge::parser;
use lexforge::rules::RuleSet;

const RULES: &str = r#"
letter = [a-z];

<default>
    /if|else|while|return/ «| Keyword |»
    letter([a-z0-9_])*     «| Identifier |»
    [0-9]+                 «| Number |»
    "/*"                   «| | comment»
    [ \11\12\15]+          «| | continue»
    eos                    «| EndOfInput |»
    catch_all              «| Illegal |»
    default_action         «| Skip |»

<comment>
    "*/" «| Comment |»
    .    «| | continue»
"#;

pub fn full_pipeline(c: &mut Criterion) {
    c.bench_function("compile rule set", |b| {
        b.iter(|| lexforge::compile(black_box(RULES), Encoding::latin1()).unwrap())
    });
}

pub fn stages(c: &mut Criterion) {
    let set: RuleSet = parser::rules(RULES).unwrap().try_into().unwrap();
    c.bench_function("nfa construction", |b| {
        b.iter(|| set.compile(black_box(Encoding::latin1())).unwrap())
    });

    let nfa = set.compile(Encoding::latin1()).unwrap();
    c.bench_function("subset construction", |b| {
        b.iter(|| black_box(&nfa).to_dfa().unwrap())
    });

    let dfa = nfa.to_dfa().unwrap();
    c.bench_function("hopcroft minimization", |b| {
        b.iter(|| black_box(&dfa).minimize())
    });
}

criterion_group!(benches, full_pipeline, stages);
criterion_main!(benches);
