//! Hand-built two-file CTU walkthrough.
//!
//! No C parser lives in this workspace, so this demo does what every test
//! fixture in the crate does: build the token arena for each translation
//! unit directly instead of lexing real source. It analyzes two TUs
//! independently (as a driver running `analyze_many` across workers would),
//! then joins their per-file summaries and prints whatever the CTU pass
//! finds. Run with `cargo run --example ctu_demo`.

use vflow_core::ctu::{self, CtuInput};
use vflow_core::model::{AstKind, Function, FunctionId, Location, Scope, Token, TokenArena, TokenId, TokenKind, VarId, VarType, Variable};
use vflow_core::{analyze_one, Preset, TranslationUnit};

fn leaf_number(arena: &mut TokenArena, text: &str, line: u32) -> TokenId {
    arena.push(Token::new(text, TokenKind::NumberLiteral, Location::new(0, line, 1)))
}

fn leaf_var(arena: &mut TokenArena, var: VarId, line: u32, col: u32) -> TokenId {
    arena.push(Token::new("v", TokenKind::Identifier, Location::new(0, line, col)).with_variable(var))
}

/// `void use(int *p) { *p = 1; }` — a parameter dereferenced with no local
/// guard, the unsafe usage a CTU join looks for.
fn build_callee() -> TranslationUnit {
    let mut tokens = TokenArena::new();
    let mut scope = Scope::new();
    let p = scope.declare(Variable::new(VarId(0), "p", VarType::Pointer).as_param(0));

    let base = leaf_var(&mut tokens, p, 1, 15);
    let deref = tokens.push(
        Token::new("*", TokenKind::Operator, Location::new(0, 1, 14))
            .with_ast_kind(AstKind::Deref)
            .with_operands(Some(base), None),
    );
    let one = leaf_number(&mut tokens, "1", 1);
    let assign = tokens.push(
        Token::new("=", TokenKind::Operator, Location::new(0, 1, 17))
            .with_ast_kind(AstKind::Assign)
            .with_operands(Some(deref), Some(one)),
    );

    let function = Function::new(FunctionId(0), "use", vec![p], vec![assign]);
    TranslationUnit {
        file_name: "callee.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    }
}

/// `int main(void) { use(0); }` — passes a literal null straight into
/// `use`'s only parameter.
fn build_caller() -> TranslationUnit {
    let mut tokens = TokenArena::new();
    let scope = Scope::new();

    let null_arg = tokens.push(Token::new("0", TokenKind::NumberLiteral, Location::new(0, 2, 9)).with_ast_kind(AstKind::NullLiteral));
    let callee_name = tokens.push(Token::new("use", TokenKind::Identifier, Location::new(0, 2, 5)));
    let call = tokens.push(
        Token::new("use", TokenKind::Identifier, Location::new(0, 2, 5))
            .with_ast_kind(AstKind::Call { args: vec![null_arg] })
            .with_operands(Some(callee_name), None),
    );

    let function = Function::new(FunctionId(0), "main", vec![], vec![call]);
    TranslationUnit {
        file_name: "caller.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    }
}

fn main() {
    let settings = Preset::Thorough.settings();

    let caller = build_caller();
    let callee = build_callee();

    let caller_result = analyze_one(&caller, &settings);
    let callee_result = analyze_one(&callee, &settings);

    println!("-- intra-TU diagnostics --");
    for result in [&caller_result, &callee_result] {
        for d in &result.diagnostics {
            println!("{}: {} ({})", result.file_name, d.short_message, d.id);
        }
    }

    let inputs = vec![
        CtuInput {
            file_name: &caller_result.file_name,
            file_info: &caller_result.file_info,
        },
        CtuInput {
            file_name: &callee_result.file_name,
            file_info: &callee_result.file_info,
        },
    ];
    let ctu_diagnostics = ctu::join(&inputs, &settings);

    println!("-- CTU diagnostics --");
    if ctu_diagnostics.is_empty() {
        println!("(none)");
    }
    for d in &ctu_diagnostics {
        println!("{} [{:?}]: {}", d.id, d.certainty, d.short_message);
        for hop in &d.call_stack {
            println!("  at {}:{} — {}", hop.resolved_file, hop.location, hop.info);
        }
    }
}
