//! End-to-end checks of the command-line driver: exit codes, the compact
//! `[line N] Error:` report lines, and the dump formats of each subcommand.

use std::fs;
use std::path::PathBuf;
use std::process::Command;

use pretty_assertions::assert_eq;

/// Writes `source` to a file under the target tmpdir, runs the binary on it
/// with `args`, and returns stdout, stderr and the exit code.
fn minipas(args: &[&str], name: &str, source: &str) -> (String, String, Option<i32>) {
    let path = PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join(name);
    fs::write(&path, source).expect("writing the program file");

    let output = Command::new(env!("CARGO_BIN_EXE_minipas_interpreter"))
        .args(args)
        .arg(&path)
        .env_remove("RUST_LOG")
        .output()
        .expect("spawning the interpreter");
    (
        String::from_utf8(output.stdout).expect("stdout is utf-8"),
        String::from_utf8(output.stderr).expect("stderr is utf-8"),
        output.status.code(),
    )
}

#[test]
fn a_valid_program_runs_to_completion() {
    let (stdout, stderr, code) = minipas(&["run"], "happy.mp", "integer x = 2 * 3;\nwriteln(x);");
    assert_eq!(code, Some(0), "stderr: {stderr}");
    assert_eq!(stdout, "5\n");
    assert_eq!(stderr, "");
}

#[test]
fn echo_prints_the_source_and_a_separator_first() {
    let (stdout, _, code) = minipas(&["run", "--echo"], "echo.mp", "writeln(5);");
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "writeln(5);\n\n--------------------\n\n5\n");
}

#[test]
fn star_product_multiplies_from_the_command_line() {
    let (stdout, _, code) = minipas(&["run", "--star-product"], "product.mp", "writeln(2 * 3);");
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "6\n");
}

#[test]
fn gated_control_skips_the_untaken_branch() {
    let source = "if (1 == 2) then begin writeln(7); end;";

    let (stdout, _, code) = minipas(&["run"], "untaken_default.mp", source);
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "7\n");

    let (stdout, _, code) = minipas(&["run", "--gated-control"], "untaken_gated.mp", source);
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "");
}

#[test]
fn tokenize_dumps_wire_names_and_the_eof_line() {
    let (stdout, _, code) = minipas(&["tokenize"], "dump.mp", "x = x + 1;");
    assert_eq!(code, Some(0));
    assert_eq!(
        stdout,
        "IDEN x null\nEQU = null\nIDEN x null\nPLUS + null\nNUMB 1 1\nSEMI ; null\nEOF  null\n"
    );
}

#[test]
fn pairwise_comments_change_the_token_dump() {
    let source = "$ a $ y $ b $";

    let (stdout, _, code) = minipas(&["tokenize"], "greedy.mp", source);
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "EOF  null\n");

    let (stdout, _, code) = minipas(&["tokenize", "--pairwise-comments"], "pairwise.mp", source);
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "IDEN y null\nEOF  null\n");
}

#[test]
fn parse_prints_s_expressions() {
    let (stdout, _, code) = minipas(&["parse"], "sexpr.mp", "integer x = 5;\nx = x + 3;");
    assert_eq!(code, Some(0));
    assert_eq!(stdout, "(integer x 5)\n(= x (+ x 3))\n");
}

#[test]
fn an_invalid_character_exits_sixty_five() {
    let (stdout, stderr, code) = minipas(&["run"], "invalid.mp", "writeln(1);\n@");
    assert_eq!(code, Some(65));
    assert_eq!(stdout, "1\n");
    assert_eq!(stderr.lines().next(), Some("[line 2] Error: invalid token @"));
}

#[test]
fn tokenize_reports_lex_faults_the_same_way() {
    let (stdout, stderr, code) = minipas(&["tokenize"], "invalid_tok.mp", "@");
    assert_eq!(code, Some(65));
    assert_eq!(stdout, "");
    assert_eq!(stderr.lines().next(), Some("[line 1] Error: invalid token @"));
}

#[test]
fn a_syntax_error_exits_sixty_five() {
    let (_, stderr, code) = minipas(&["run"], "syntax.mp", "x = ;");
    assert_eq!(code, Some(65));
    assert_eq!(
        stderr.lines().next(),
        Some("[line 1] Error: Syntax error at SEMI ")
    );
}

#[test]
fn an_oversized_literal_exits_sixty_five() {
    let (_, stderr, code) = minipas(&["run"], "oversized.mp", "writeln(99999999999999999999);");
    assert_eq!(code, Some(65));
    assert_eq!(
        stderr.lines().next(),
        Some("[line 1] Error: numeric literal `99999999999999999999` does not fit in an integer")
    );
}

#[test]
fn an_unterminated_pairwise_comment_exits_sixty_five() {
    let source = "writeln(1); $ trailing";
    let (stdout, stderr, code) =
        minipas(&["run", "--pairwise-comments"], "unterminated.mp", source);
    assert_eq!(code, Some(65));
    assert_eq!(stdout, "1\n");
    assert_eq!(
        stderr.lines().next(),
        Some("[line 1] Error: unterminated comment")
    );
}

#[test]
fn input_with_no_statements_exits_sixty_five() {
    let (_, stderr, code) = minipas(&["run"], "comment_only.mp", "$ a comment and nothing else $");
    assert_eq!(code, Some(65));
    assert_eq!(stderr.lines().next(), Some("Error: unexpected end of file"));
}

#[test]
fn an_undeclared_name_exits_seventy() {
    let (stdout, stderr, code) = minipas(&["run"], "undeclared.mp", "y = 5;");
    assert_eq!(code, Some(70));
    assert_eq!(stdout, "");
    assert_eq!(stderr.lines().next(), Some("[line 1] Error: Name y not defined"));
}

#[test]
fn reading_an_unassigned_name_exits_seventy() {
    let (_, stderr, code) = minipas(&["run"], "unassigned.mp", "integer x;\nwriteln(x);");
    assert_eq!(code, Some(70));
    assert_eq!(
        stderr.lines().next(),
        Some("[line 2] Error: Name x has no value")
    );
}

#[test]
fn division_by_zero_exits_seventy() {
    let (_, stderr, code) = minipas(&["run"], "divzero.mp", "writeln(1 / 0);");
    assert_eq!(code, Some(70));
    assert_eq!(stderr.lines().next(), Some("Error: division by zero"));
}
