//! Scaling benchmarks for the CTU join step: matching call facts against
//! unsafe usages across a chain of per-file summaries, plus the wire
//! framing round trip those summaries travel through between TU workers.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vflow_core::config::Preset;
use vflow_core::ctu::{self, CtuInput};
use vflow_core::model::Location;
use vflow_core::summary::{CallArgValue, CallFact, FileInfo, FunctionSummary, UnsafeUsage, UsagePayload};

fn loc(line: u32) -> Location {
    Location::new(0, line, 1)
}

/// `caller` calls `leaf_0..leaf_{n-1}` directly with a null constant each;
/// every `leaf_i` has one matching unsafe usage on parameter 0. Exercises
/// the direct (non-forwarding) match path at increasing fan-out.
fn build_fan_out(n: usize) -> Vec<FileInfo> {
    let mut call_facts = Vec::with_capacity(n);
    for i in 0..n {
        call_facts.push(CallFact {
            callee_name: format!("leaf_{i}"),
            argument_index: 0,
            value: CallArgValue::Null,
            location: loc(i as u32 + 1),
            path_preamble: vec![],
        });
    }
    let caller = FileInfo {
        functions: vec![FunctionSummary {
            function_name: "caller".to_string(),
            unsafe_usages: vec![],
            call_facts,
        }],
    };

    let mut files = vec![caller];
    for i in 0..n {
        files.push(FileInfo {
            functions: vec![FunctionSummary {
                function_name: format!("leaf_{i}"),
                unsafe_usages: vec![UnsafeUsage {
                    check_id: "ctunullpointer".to_string(),
                    argument_index: 0,
                    parameter_name: "p".to_string(),
                    location: loc(1),
                    payload: UsagePayload::RequiresNonNull,
                }],
                call_facts: vec![],
            }],
        });
    }
    files
}

/// `f0` calls `f1(null)`, `f1` forwards to `f2`, ..., `f{n-1}` finally
/// derefs the parameter unguarded. Exercises the depth-bounded forwarding
/// walk at increasing chain length.
fn build_forward_chain(n: usize) -> Vec<FileInfo> {
    let mut files = Vec::with_capacity(n + 1);
    files.push(FileInfo {
        functions: vec![FunctionSummary {
            function_name: "f0".to_string(),
            unsafe_usages: vec![],
            call_facts: vec![CallFact {
                callee_name: "f1".to_string(),
                argument_index: 0,
                value: CallArgValue::Null,
                location: loc(1),
                path_preamble: vec![],
            }],
        }],
    });
    for i in 1..n {
        files.push(FileInfo {
            functions: vec![FunctionSummary {
                function_name: format!("f{i}"),
                unsafe_usages: vec![],
                call_facts: vec![CallFact {
                    callee_name: format!("f{}", i + 1),
                    argument_index: 0,
                    value: CallArgValue::ForwardedParam(0),
                    location: loc(1),
                    path_preamble: vec![],
                }],
            }],
        });
    }
    files.push(FileInfo {
        functions: vec![FunctionSummary {
            function_name: format!("f{n}"),
            unsafe_usages: vec![UnsafeUsage {
                check_id: "ctunullpointer".to_string(),
                argument_index: 0,
                parameter_name: "p".to_string(),
                location: loc(1),
                payload: UsagePayload::RequiresNonNull,
            }],
            call_facts: vec![],
        }],
    });
    files
}

fn bench_join_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("ctu::join fan-out");
    for &n in &[10usize, 50, 200, 500] {
        let files = build_fan_out(n);
        let settings = Preset::Thorough.settings();
        group.bench_with_input(BenchmarkId::new("callees", n), &n, |b, _| {
            b.iter(|| {
                let inputs: Vec<CtuInput> = files
                    .iter()
                    .enumerate()
                    .map(|(i, info)| CtuInput {
                        file_name: if i == 0 { "caller.c" } else { "leaf.c" },
                        file_info: info,
                    })
                    .collect();
                let diags = ctu::join(black_box(&inputs), &settings);
                black_box(diags);
            })
        });
    }
    group.finish();
}

fn bench_join_forward_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("ctu::join forward chain");
    for &n in &[2usize, 8, 16, 32] {
        let files = build_forward_chain(n);
        let mut settings = Preset::Thorough.settings();
        settings.ctu_depth_bound = n as u32 + 1;
        group.bench_with_input(BenchmarkId::new("chain_len", n), &n, |b, _| {
            b.iter(|| {
                let inputs: Vec<CtuInput> = files
                    .iter()
                    .map(|info| CtuInput { file_name: "chain.c", file_info: info })
                    .collect();
                let diags = ctu::join(black_box(&inputs), &settings);
                black_box(diags);
            })
        });
    }
    group.finish();
}

fn bench_wire_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("ctu wire framing round trip");
    for &n in &[10usize, 100, 1000] {
        let files = build_fan_out(n);
        group.bench_with_input(BenchmarkId::new("functions", n), &n, |b, _| {
            b.iter(|| {
                let encoded = ctu::encode_stream(black_box(&files)).expect("encode");
                let decoded = ctu::decode_stream(black_box(&encoded)).expect("decode");
                black_box(decoded);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_join_fan_out, bench_join_forward_chain, bench_wire_roundtrip);
criterion_main!(benches);
