use criterion::{black_box, criterion_group, criterion_main, Criterion};

use basalt_core::{eval, exec_file, set_default_options, Options, StringDict, Thread};

fn bench_eval_arith(c: &mut Criterion) {
    let mut thread = Thread::new();
    let env = StringDict::new();
    c.bench_function("eval_arith", |b| {
        b.iter(|| {
            let v = eval(&mut thread, "<bench>", black_box("(1 + 2) * 3 - 4 % 5"), &env)
                .expect("eval");
            black_box(v)
        })
    });
}

fn bench_fib(c: &mut Criterion) {
    set_default_options(Options {
        allow_recursion: true,
        ..Options::default()
    });
    const SRC: &str = "\
def fib(n):
    if n < 2:
        return n
    return fib(n - 1) + fib(n - 2)
r = fib(15)
";
    c.bench_function("exec_fib_15", |b| {
        b.iter(|| {
            let mut thread = Thread::new();
            let globals = exec_file(&mut thread, "bench.bst", Some(SRC), &StringDict::new())
                .expect("exec");
            black_box(globals)
        })
    });
}

fn bench_comprehension(c: &mut Criterion) {
    let mut thread = Thread::new();
    let env = StringDict::new();
    c.bench_function("list_comprehension", |b| {
        b.iter(|| {
            let v = eval(
                &mut thread,
                "<bench>",
                black_box("[x * x for x in range(200) if x % 3 != 0]"),
                &env,
            )
            .expect("eval");
            black_box(v)
        })
    });
}

criterion_group!(benches, bench_eval_arith, bench_fib, bench_comprehension);
criterion_main!(benches);
