//! Scaling benchmarks for the value-flow engine and the checks built on it.
//!
//! No real C parser is in scope (see crate docs), so every fixture here
//! builds its token arena by hand, the same way the `#[cfg(test)]` modules
//! throughout `vflow-core` do — just bigger, to see how the engine scales
//! with function size.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vflow_core::checks::{null_deref, uninit};
use vflow_core::config::Settings;
use vflow_core::model::{AstKind, Function, FunctionId, Location, Scope, Token, TokenArena, TokenKind, VarId, VarType, Variable};
use vflow_core::{DiagnosticSink, Engine};

fn leaf_number(arena: &mut TokenArena, text: &str, line: u32) -> vflow_core::TokenId {
    arena.push(Token::new(text, TokenKind::NumberLiteral, Location::new(0, line, 1)))
}

fn leaf_var(arena: &mut TokenArena, var: VarId, line: u32, col: u32) -> vflow_core::TokenId {
    arena.push(Token::new("v", TokenKind::Identifier, Location::new(0, line, col)).with_variable(var))
}

/// `int v0; v0 = 0; int v1; v1 = v0; ...` — a straight-line chain of N
/// declare+assign pairs, each reading the previous variable. Exercises the
/// per-token value-set bookkeeping without any branching.
fn build_straight_line(n: usize) -> (TokenArena, Scope, Function) {
    let mut arena = TokenArena::new();
    let mut scope = Scope::new();
    let mut body = Vec::new();
    let mut prev: Option<VarId> = None;

    for i in 0..n {
        let line = (i * 2 + 1) as u32;
        let var = scope.declare(Variable::new(VarId(0), format!("v{i}"), VarType::Scalar));
        let decl = arena.push(
            Token::new(format!("v{i}"), TokenKind::Identifier, Location::new(0, line, 1))
                .with_ast_kind(AstKind::Declare)
                .with_variable(var),
        );
        body.push(decl);

        let rhs = match prev {
            Some(p) => leaf_var(&mut arena, p, line + 1, 5),
            None => leaf_number(&mut arena, "0", line + 1),
        };
        let lhs = leaf_var(&mut arena, var, line + 1, 1);
        let assign = arena.push(
            Token::new("=", TokenKind::Operator, Location::new(0, line + 1, 3))
                .with_ast_kind(AstKind::Assign)
                .with_operands(Some(lhs), Some(rhs)),
        );
        body.push(assign);
        prev = Some(var);
    }

    let function = Function::new(FunctionId(0), "bench_fn", vec![], body);
    (arena, scope, function)
}

/// `void bench_fn(int *p0, ..., int *pN) { if (p0) { *p0 = 1; } ... }` — one
/// guarded dereference per parameter, exercising the null-deref check's
/// guard-set bookkeeping across an if-chain.
fn build_guarded_derefs(n: usize) -> (TokenArena, Scope, Function) {
    let mut arena = TokenArena::new();
    let mut scope = Scope::new();
    let mut params = Vec::new();
    let mut body = Vec::new();

    for i in 0..n {
        let line = (i * 3 + 1) as u32;
        let p = scope.declare(Variable::new(VarId(0), format!("p{i}"), VarType::Pointer).as_param(i as u32));
        params.push(p);

        let cond = leaf_var(&mut arena, p, line, 5);
        let base = leaf_var(&mut arena, p, line + 1, 9);
        let deref = arena.push(
            Token::new("*", TokenKind::Operator, Location::new(0, line + 1, 8))
                .with_ast_kind(AstKind::Deref)
                .with_operands(Some(base), None),
        );
        let one = leaf_number(&mut arena, "1", line + 1);
        let assign = arena.push(
            Token::new("=", TokenKind::Operator, Location::new(0, line + 1, 10))
                .with_ast_kind(AstKind::Assign)
                .with_operands(Some(deref), Some(one)),
        );
        let if_stmt = arena.push(
            Token::new("if", TokenKind::Keyword, Location::new(0, line, 1)).with_ast_kind(AstKind::If {
                condition: cond,
                then_branch: vec![assign],
                else_branch: vec![],
            }),
        );
        body.push(if_stmt);
    }

    let function = Function::new(FunctionId(0), "bench_fn", params, body);
    (arena, scope, function)
}

fn bench_engine_run_straight_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("Engine::run straight-line");
    for &n in &[10usize, 50, 200, 800] {
        let (arena, scope, function) = build_straight_line(n);
        group.bench_with_input(BenchmarkId::new("statements", n), &n, |b, _| {
            b.iter(|| {
                let engine = Engine::new(Settings::default());
                let flow = engine.run(black_box(&arena), black_box(&scope), black_box(std::slice::from_ref(&function)));
                black_box(flow);
            })
        });
    }
    group.finish();
}

fn bench_null_deref_check_guarded_derefs(c: &mut Criterion) {
    let mut group = c.benchmark_group("null_deref::check guarded derefs");
    for &n in &[10usize, 50, 200, 800] {
        let (arena, scope, function) = build_guarded_derefs(n);
        group.bench_with_input(BenchmarkId::new("parameters", n), &n, |b, _| {
            b.iter(|| {
                let engine = Engine::new(Settings::default());
                let flow = engine.run(&arena, &scope, std::slice::from_ref(&function));
                let mut sink = DiagnosticSink::new(Settings::default());
                null_deref::check("bench.c", black_box(&arena), &scope, std::slice::from_ref(&function), &flow, &mut sink);
                black_box(sink.len());
            })
        });
    }
    group.finish();
}

fn bench_uninit_check_straight_line(c: &mut Criterion) {
    let mut group = c.benchmark_group("uninit::check straight-line");
    for &n in &[10usize, 50, 200, 800] {
        let (arena, scope, function) = build_straight_line(n);
        let library = vflow_core::library::LibraryFacts::with_stdlib_defaults();
        group.bench_with_input(BenchmarkId::new("statements", n), &n, |b, _| {
            b.iter(|| {
                let engine = Engine::new(Settings::default());
                let flow = engine.run(&arena, &scope, std::slice::from_ref(&function));
                let mut sink = DiagnosticSink::new(Settings::default());
                uninit::check("bench.c", black_box(&arena), &scope, std::slice::from_ref(&function), &flow, &library, &mut sink);
                black_box(sink.len());
            })
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_engine_run_straight_line,
    bench_null_deref_check_guarded_derefs,
    bench_uninit_check_straight_line,
);
criterion_main!(benches);
