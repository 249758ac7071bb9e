//! End-to-end scenarios S1-S6, driven through the public `analyze_one`/
//! `ctu::join` entry points rather than calling a single check's `check()`
//! function directly — this is the integration-level counterpart to the
//! per-module `#[cfg(test)]` unit tests, the same split the teacher crate
//! draws between its `src/**/tests.rs` modules and its top-level `tests/`
//! directory. No C parser lives in this workspace, so every fixture below
//! builds its token arena by hand, the same way cppcheck's own
//! `test/testuninitvar.cpp`/`test/testnullpointer.cpp` build token lists
//! through small `tok()` helpers.

use vflow_core::model::{
    AstKind, Function, FunctionId, Location, Scope, Token, TokenArena, TokenId, TokenKind, VarId, VarType, Variable,
};
use vflow_core::{analyze_one, ctu, Preset, TranslationUnit};

fn leaf_number(arena: &mut TokenArena, text: &str, line: u32, col: u32) -> TokenId {
    arena.push(Token::new(text, TokenKind::NumberLiteral, Location::new(0, line, col)))
}

fn leaf_var(arena: &mut TokenArena, name: &str, var: VarId, line: u32, col: u32) -> TokenId {
    arena.push(Token::new(name, TokenKind::Identifier, Location::new(0, line, col)).with_variable(var))
}

/// S1. `void f(){ int x; g(x); }` where `g`'s argument is `in`.
/// Expected: one `uninitvar` at line 1.
#[test]
fn s1_uninitialized_local_passed_to_in_argument() {
    let mut tokens = TokenArena::new();
    let mut scope = Scope::new();
    let x = scope.declare(Variable::new(VarId(0), "x", VarType::Scalar));

    let decl = tokens.push(
        Token::new("x", TokenKind::Identifier, Location::new(0, 1, 1))
            .with_ast_kind(AstKind::Declare)
            .with_variable(x),
    );
    let arg = leaf_var(&mut tokens, "x", x, 1, 10);
    let callee = tokens.push(Token::new("g", TokenKind::Identifier, Location::new(0, 1, 8)));
    let call = tokens.push(
        Token::new("g", TokenKind::Identifier, Location::new(0, 1, 8))
            .with_ast_kind(AstKind::Call { args: vec![arg] })
            .with_operands(Some(callee), None),
    );

    let function = Function::new(FunctionId(0), "f", vec![], vec![decl, call]);
    let tu = TranslationUnit {
        file_name: "s1.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    };
    let result = analyze_one(&tu, &Preset::Balanced.settings());

    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].id, "uninitvar");
    assert_eq!(result.diagnostics[0].call_stack[0].location.line, 1);
}

/// S2. `void f(int*p){ *p=0; if(p){} }`.
/// Expected: one `nullPointer` with two locations, deref then condition.
#[test]
fn s2_deref_then_guard_is_redundant_condition() {
    let mut tokens = TokenArena::new();
    let mut scope = Scope::new();
    let p = scope.declare(Variable::new(VarId(0), "p", VarType::Pointer).as_param(0));

    let lit0 = leaf_number(&mut tokens, "0", 1, 6);
    let p_ref1 = leaf_var(&mut tokens, "p", p, 1, 2);
    let deref = tokens.push(
        Token::new("*", TokenKind::Operator, Location::new(0, 1, 1))
            .with_ast_kind(AstKind::Deref)
            .with_operands(Some(p_ref1), None),
    );
    let assign = tokens.push(
        Token::new("=", TokenKind::Operator, Location::new(0, 1, 4))
            .with_ast_kind(AstKind::Assign)
            .with_operands(Some(deref), Some(lit0)),
    );
    let p_ref2 = leaf_var(&mut tokens, "p", p, 1, 10);
    let if_tok = tokens.push(
        Token::new("if", TokenKind::Keyword, Location::new(0, 1, 7)).with_ast_kind(AstKind::If {
            condition: p_ref2,
            then_branch: vec![],
            else_branch: vec![],
        }),
    );

    let function = Function::new(FunctionId(0), "f", vec![p], vec![assign, if_tok]);
    let tu = TranslationUnit {
        file_name: "s2.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    };
    let result = analyze_one(&tu, &Preset::Balanced.settings());

    let null_diags: Vec<_> = result.diagnostics.iter().filter(|d| d.id == "nullPointer").collect();
    assert_eq!(null_diags.len(), 1);
    assert_eq!(null_diags[0].call_stack.len(), 2);
    assert!(null_diags[0].verbose_message.contains("redundant"));
}

/// S3. `struct AB{int a;int b;}; void f(){ struct AB ab; ab.a=0; return ab.b; }`.
/// Expected: one `uninitStructMember` for `ab.b` at the `return` line.
#[test]
fn s3_struct_member_partially_initialized() {
    let mut tokens = TokenArena::new();
    let mut scope = Scope::new();
    let a = scope.declare(Variable::new(VarId(0), "a", VarType::Scalar));
    let b = scope.declare(Variable::new(VarId(0), "b", VarType::Scalar));
    let ab = scope.declare(Variable::new(VarId(0), "ab", VarType::Scalar).with_members(vec![a, b]));

    let decl = tokens.push(
        Token::new("ab", TokenKind::Identifier, Location::new(0, 1, 1))
            .with_ast_kind(AstKind::Declare)
            .with_variable(ab),
    );
    let lit0 = leaf_number(&mut tokens, "0", 2, 7);
    let member_a = tokens.push(
        Token::new("a", TokenKind::Identifier, Location::new(0, 2, 1))
            .with_ast_kind(AstKind::MemberAccess { via_arrow: false })
            .with_variable(a),
    );
    let assign_a = tokens.push(
        Token::new("=", TokenKind::Operator, Location::new(0, 2, 5))
            .with_ast_kind(AstKind::Assign)
            .with_operands(Some(member_a), Some(lit0)),
    );
    let member_b = tokens.push(
        Token::new("b", TokenKind::Identifier, Location::new(0, 3, 8))
            .with_ast_kind(AstKind::MemberAccess { via_arrow: false })
            .with_variable(b),
    );
    let ret = tokens.push(
        Token::new("return", TokenKind::Keyword, Location::new(0, 3, 1))
            .with_ast_kind(AstKind::Return)
            .with_operands(Some(member_b), None),
    );

    let function = Function::new(FunctionId(0), "f", vec![], vec![decl, assign_a, ret]);
    let tu = TranslationUnit {
        file_name: "s3.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    };
    let result = analyze_one(&tu, &Preset::Balanced.settings());

    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].id, "uninitStructMember");
    assert_eq!(result.diagnostics[0].call_stack[0].location.line, 3);
}

/// S4. `void f(){ char*s=(char*)malloc(64); if(s[0]){} }`.
/// Expected: one `uninitdata` ("memory allocated but not initialized") at
/// the `if` line.
#[test]
fn s4_heap_allocated_memory_read_before_write() {
    let mut tokens = TokenArena::new();
    let mut scope = Scope::new();
    let s = scope.declare(Variable::new(VarId(0), "s", VarType::Pointer));

    let arg = leaf_number(&mut tokens, "64", 1, 20);
    let callee = tokens.push(Token::new("malloc", TokenKind::Identifier, Location::new(0, 1, 13)));
    let call = tokens.push(
        Token::new("malloc", TokenKind::Identifier, Location::new(0, 1, 13))
            .with_ast_kind(AstKind::Call { args: vec![arg] })
            .with_operands(Some(callee), None),
    );
    let decl = tokens.push(
        Token::new("s", TokenKind::Identifier, Location::new(0, 1, 1))
            .with_ast_kind(AstKind::Declare)
            .with_variable(s)
            .with_operands(None, Some(call)),
    );

    let idx0 = leaf_number(&mut tokens, "0", 2, 7);
    let s_ref = leaf_var(&mut tokens, "s", s, 2, 5);
    let index = tokens.push(
        Token::new("[", TokenKind::Punctuator, Location::new(0, 2, 6))
            .with_ast_kind(AstKind::Index)
            .with_operands(Some(s_ref), Some(idx0)),
    );
    let if_tok = tokens.push(
        Token::new("if", TokenKind::Keyword, Location::new(0, 2, 1)).with_ast_kind(AstKind::If {
            condition: index,
            then_branch: vec![],
            else_branch: vec![],
        }),
    );

    let function = Function::new(FunctionId(0), "f", vec![], vec![decl, if_tok]);
    let tu = TranslationUnit {
        file_name: "s4.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    };
    let result = analyze_one(&tu, &Preset::Balanced.settings());

    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].id, "uninitdata");
    assert_eq!(result.diagnostics[0].call_stack[0].location.line, 2);
}

/// S5. CTU: file A defines `void use(int*p){ a=*p; }`; file B defines
/// `int main(){ int x; use(&x); }`. Expected: one `ctuuninitvar` diagnostic
/// whose call stack runs B:main(&x uninitialized) -> A:use (dereferences p).
#[test]
fn s5_ctu_join_links_uninitialized_argument_to_callee_deref() {
    // File A: void use(int*p){ a=*p; }
    let mut a_tokens = TokenArena::new();
    let mut a_scope = Scope::new();
    let p = a_scope.declare(Variable::new(VarId(0), "p", VarType::Pointer).as_param(0));
    let a_var = a_scope.declare(Variable::new(VarId(0), "a", VarType::Scalar));

    let p_ref = leaf_var(&mut a_tokens, "p", p, 1, 20);
    let deref = a_tokens.push(
        Token::new("*", TokenKind::Operator, Location::new(0, 1, 19))
            .with_ast_kind(AstKind::Deref)
            .with_operands(Some(p_ref), None),
    );
    let a_ref = leaf_var(&mut a_tokens, "a", a_var, 1, 17);
    let assign = a_tokens.push(
        Token::new("=", TokenKind::Operator, Location::new(0, 1, 18))
            .with_ast_kind(AstKind::Assign)
            .with_operands(Some(a_ref), Some(deref)),
    );
    let use_fn = Function::new(FunctionId(0), "use", vec![p], vec![assign]);
    let tu_a = TranslationUnit {
        file_name: "a.c".to_string(),
        tokens: a_tokens,
        scope: a_scope,
        functions: vec![use_fn],
    };

    // File B: int main(){ int x; use(&x); }
    let mut b_tokens = TokenArena::new();
    let mut b_scope = Scope::new();
    let x = b_scope.declare(Variable::new(VarId(0), "x", VarType::Scalar));

    let decl = b_tokens.push(
        Token::new("x", TokenKind::Identifier, Location::new(0, 1, 1))
            .with_ast_kind(AstKind::Declare)
            .with_variable(x),
    );
    let x_ref = leaf_var(&mut b_tokens, "x", x, 2, 10);
    let addr = b_tokens.push(
        Token::new("&", TokenKind::Operator, Location::new(0, 2, 9))
            .with_ast_kind(AstKind::AddressOf)
            .with_operands(Some(x_ref), None),
    );
    let callee = b_tokens.push(Token::new("use", TokenKind::Identifier, Location::new(0, 2, 5)));
    let call = b_tokens.push(
        Token::new("use", TokenKind::Identifier, Location::new(0, 2, 5))
            .with_ast_kind(AstKind::Call { args: vec![addr] })
            .with_operands(Some(callee), None),
    );
    let main_fn = Function::new(FunctionId(0), "main", vec![], vec![decl, call]);
    let tu_b = TranslationUnit {
        file_name: "b.c".to_string(),
        tokens: b_tokens,
        scope: b_scope,
        functions: vec![main_fn],
    };

    let settings = {
        let mut s = Preset::Thorough.settings();
        s.inconclusive = true;
        s
    };

    let result_a = analyze_one(&tu_a, &settings);
    let result_b = analyze_one(&tu_b, &settings);

    let inputs = vec![
        ctu::CtuInput {
            file_name: &result_b.file_name,
            file_info: &result_b.file_info,
        },
        ctu::CtuInput {
            file_name: &result_a.file_name,
            file_info: &result_a.file_info,
        },
    ];
    let diagnostics = ctu::join(&inputs, &settings);

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].id, "ctuuninitvar");
    assert_eq!(diagnostics[0].call_stack.len(), 2);
    assert_eq!(diagnostics[0].call_stack[0].resolved_file, "b.c");
    assert_eq!(diagnostics[0].call_stack[1].resolved_file, "a.c");
}

/// S6. `int f(int*p){ if(!p) return 0; return *p; }`. No diagnostic.
#[test]
fn s6_guard_then_deref_is_clean() {
    let mut tokens = TokenArena::new();
    let mut scope = Scope::new();
    let p = scope.declare(Variable::new(VarId(0), "p", VarType::Pointer).as_param(0));

    let p_ref1 = leaf_var(&mut tokens, "p", p, 1, 8);
    let not_p = tokens.push(
        Token::new("!", TokenKind::Operator, Location::new(0, 1, 7))
            .with_ast_kind(AstKind::LogicalNot)
            .with_operands(Some(p_ref1), None),
    );
    let lit0 = leaf_number(&mut tokens, "0", 1, 19);
    let ret0 = tokens.push(
        Token::new("return", TokenKind::Keyword, Location::new(0, 1, 12))
            .with_ast_kind(AstKind::Return)
            .with_operands(Some(lit0), None),
    );
    let if_tok = tokens.push(
        Token::new("if", TokenKind::Keyword, Location::new(0, 1, 1)).with_ast_kind(AstKind::If {
            condition: not_p,
            then_branch: vec![ret0],
            else_branch: vec![],
        }),
    );

    let p_ref2 = leaf_var(&mut tokens, "p", p, 2, 9);
    let deref = tokens.push(
        Token::new("*", TokenKind::Operator, Location::new(0, 2, 8))
            .with_ast_kind(AstKind::Deref)
            .with_operands(Some(p_ref2), None),
    );
    let ret_deref = tokens.push(
        Token::new("return", TokenKind::Keyword, Location::new(0, 2, 1))
            .with_ast_kind(AstKind::Return)
            .with_operands(Some(deref), None),
    );

    let function = Function::new(FunctionId(0), "f", vec![p], vec![if_tok, ret_deref]);
    let tu = TranslationUnit {
        file_name: "s6.c".to_string(),
        tokens,
        scope,
        functions: vec![function],
    };
    let result = analyze_one(&tu, &Preset::Balanced.settings());

    assert!(result.diagnostics.is_empty());
}
