use std::fs;
use std::path::PathBuf;

use clap::Parser;
use clap::Subcommand;
use log::debug;
use miette::IntoDiagnostic;
use miette::WrapErr;
use minipas_interpreter::eval::{ArithmeticError, UndefinedNameError, UninitializedNameError};
use minipas_interpreter::lex::{CommentTerminationError, Eof, NumberOverflowError, SingleTokenError};
use minipas_interpreter::parse::SyntaxError;
use minipas_interpreter::{CommentMode, ControlMode, Interpreter, Lexer, Options, StarMode};

#[derive(Parser, Debug)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Dump the token stream of a source file.
    Tokenize {
        filename: PathBuf,

        /// Close each comment at the next `$` instead of the last one.
        #[arg(long)]
        pairwise_comments: bool,
    },
    /// Print each statement of a source file as an s-expression.
    Parse {
        filename: PathBuf,

        /// Close each comment at the next `$` instead of the last one.
        #[arg(long)]
        pairwise_comments: bool,
    },
    /// Evaluate a source file.
    Run {
        filename: PathBuf,

        /// Print the source text and a separator line before evaluating.
        #[arg(long)]
        echo: bool,

        /// Close each comment at the next `$` instead of the last one.
        #[arg(long)]
        pairwise_comments: bool,

        /// Let guards gate execution: `if` runs one branch, `while` loops.
        #[arg(long)]
        gated_control: bool,

        /// Make `*` multiply its operands instead of adding them.
        #[arg(long)]
        star_product: bool,
    },
}

fn comment_mode(pairwise: bool) -> CommentMode {
    if pairwise {
        CommentMode::Pairwise
    } else {
        CommentMode::Greedy
    }
}

/// Prints the one-line report for a known fault and picks its exit code:
/// 65 for anything the front end rejects, 70 for a fault during evaluation.
fn report(e: &miette::Error) -> Option<i32> {
    if let Some(err) = e.downcast_ref::<SingleTokenError>() {
        eprintln!("[line {}] Error: invalid token {}", err.line(), err.token);
        Some(65)
    } else if let Some(err) = e.downcast_ref::<CommentTerminationError>() {
        eprintln!("[line {}] Error: unterminated comment", err.line());
        Some(65)
    } else if let Some(err) = e.downcast_ref::<NumberOverflowError>() {
        eprintln!("[line {}] Error: {err}", err.line());
        Some(65)
    } else if let Some(err) = e.downcast_ref::<SyntaxError>() {
        eprintln!("[line {}] Error: {err}", err.line());
        Some(65)
    } else if e.downcast_ref::<Eof>().is_some() {
        eprintln!("Error: unexpected end of file");
        Some(65)
    } else if let Some(err) = e.downcast_ref::<UndefinedNameError>() {
        eprintln!("[line {}] Error: {err}", err.line());
        Some(70)
    } else if let Some(err) = e.downcast_ref::<UninitializedNameError>() {
        eprintln!("[line {}] Error: {err}", err.line());
        Some(70)
    } else if let Some(err) = e.downcast_ref::<ArithmeticError>() {
        eprintln!("Error: {err}");
        Some(70)
    } else {
        None
    }
}

fn main() -> miette::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Tokenize {
            filename,
            pairwise_comments,
        } => {
            let file_contents = fs::read_to_string(&filename)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;

            let lexer = Lexer::new(filename.to_str(), &file_contents)
                .comment_mode(comment_mode(pairwise_comments));
            for token in lexer {
                let token = match token {
                    Ok(token) => token,
                    Err(e) => {
                        if let Some(code) = report(&e) {
                            eprintln!("{e:?}");
                            std::process::exit(code);
                        }
                        return Err(e);
                    }
                };
                println!("{token}");
            }
            println!("EOF  null");
        }
        Commands::Parse {
            filename,
            pairwise_comments,
        } => {
            let file_contents = fs::read_to_string(&filename)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;

            for statement in minipas_interpreter::Parser::new(filename.to_str(), &file_contents)
                .comment_mode(comment_mode(pairwise_comments))
            {
                let statement = match statement {
                    Ok(statement) => statement,
                    Err(e) => {
                        if let Some(code) = report(&e) {
                            eprintln!("{e:?}");
                            std::process::exit(code);
                        }
                        return Err(e);
                    }
                };
                println!("{statement}");
            }
        }
        Commands::Run {
            filename,
            echo,
            pairwise_comments,
            gated_control,
            star_product,
        } => {
            let file_contents = fs::read_to_string(&filename)
                .into_diagnostic()
                .wrap_err_with(|| format!("reading `{}` failed", filename.display()))?;

            if echo {
                println!("{file_contents}");
                println!("\n--------------------\n");
            }

            let options = Options {
                comments: comment_mode(pairwise_comments),
                control: if gated_control {
                    ControlMode::Gated
                } else {
                    ControlMode::SinglePass
                },
                star: if star_product {
                    StarMode::Product
                } else {
                    StarMode::Sum
                },
            };
            debug!("running `{}` with {options:?}", filename.display());

            let mut interpreter =
                Interpreter::new(filename.to_str(), &file_contents).options(options);
            if let Err(e) = interpreter.run() {
                if let Some(code) = report(&e) {
                    eprintln!("{e:?}");
                    std::process::exit(code);
                }
                return Err(e);
            }
        }
    }
    Ok(())
}
