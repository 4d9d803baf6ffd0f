//! Command-line interface for strata
//! Renders, converts and inspects templates.
//!
//! Usage:
//!   strata render `<name>` [--data `<file>`]           - Render a template from the roots
//!   strata render-string `<source>` [--data `<file>`]  - Render template text given inline
//!   strata convert `<file>` --to `<syntax>`            - Rewrite a template in another syntax
//!   strata tokens `<file>`                             - Dump the token stream as JSON
//!   strata compile `<name>`                            - Dump the compiled instructions as JSON
//!
//! Global options: --config `<file>`, --root `<dir>` (repeatable), --syntax, --format, -v

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;

use strata::strata::config::ConfigLoader;
use strata::strata::conversion::convert_source;
use strata::strata::lexing::tokenize;
use strata::{locals_from_json, Engine, EngineConfig, Locals, SyntaxName};

fn main() {
    let matches = cli().get_matches();
    init_tracing(matches.get_count("verbose"));

    let config = load_config(&matches).unwrap_or_else(|e| fail("Configuration error", e));

    match matches.subcommand() {
        Some(("render", sub)) => handle_render_command(&config, sub),
        Some(("render-string", sub)) => handle_render_string_command(&config, sub),
        Some(("convert", sub)) => handle_convert_command(&config, sub),
        Some(("tokens", sub)) => handle_tokens_command(&config, sub),
        Some(("compile", sub)) => handle_compile_command(&config, sub),
        _ => unreachable!(),
    }
}

fn syntax_arg(name: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .value_parser(["first-pass", "second-pass"])
}

fn data_arg() -> Arg {
    Arg::new("data")
        .long("data")
        .short('d')
        .value_name("FILE")
        .help("JSON or YAML file whose top-level object becomes the template's locals")
}

fn cli() -> Command {
    Command::new("strata")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A layered text-templating engine")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .global(true)
                .help("TOML configuration file layered over the built-in defaults"),
        )
        .arg(
            Arg::new("root")
                .long("root")
                .short('r')
                .value_name("DIR")
                .action(ArgAction::Append)
                .global(true)
                .help("Template search root; may be given more than once"),
        )
        .arg(
            syntax_arg("syntax")
                .global(true)
                .help("Tag syntax the templates are written in"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .global(true)
                .help("Output format, selecting {name}.{format}.{extension} files"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count)
                .global(true)
                .help("Log to stderr: -v for debug, -vv for trace"),
        )
        .subcommand(
            Command::new("render")
                .about("Render a template from the search roots")
                .arg(
                    Arg::new("name")
                        .help("Template name without format and extension")
                        .required(true)
                        .index(1),
                )
                .arg(data_arg()),
        )
        .subcommand(
            Command::new("render-string")
                .about("Render template text given on the command line")
                .arg(
                    Arg::new("source")
                        .help("Template text")
                        .required(true)
                        .index(1),
                )
                .arg(data_arg()),
        )
        .subcommand(
            Command::new("convert")
                .about("Rewrite a template file in another tag syntax")
                .arg(
                    Arg::new("path")
                        .help("Path to the template file")
                        .required(true)
                        .index(1),
                )
                .arg(
                    syntax_arg("to")
                        .required(true)
                        .help("Syntax to convert to"),
                ),
        )
        .subcommand(
            Command::new("tokens")
                .about("Print the token stream of a template file as JSON")
                .arg(
                    Arg::new("path")
                        .help("Path to the template file")
                        .required(true)
                        .index(1),
                ),
        )
        .subcommand(
            Command::new("compile")
                .about("Print the compiled instructions of a template as JSON")
                .arg(
                    Arg::new("name")
                        .help("Template name without format and extension")
                        .required(true)
                        .index(1),
                ),
        )
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, error);
    std::process::exit(1);
}

fn load_config(matches: &ArgMatches) -> Result<EngineConfig, config::ConfigError> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = matches.get_one::<String>("config") {
        loader = loader.with_file(path);
    }
    if let Some(roots) = matches.get_many::<String>("root") {
        let roots: Vec<String> = roots.cloned().collect();
        loader = loader.set_override("roots", roots)?;
    }
    if let Some(syntax) = matches.get_one::<String>("syntax") {
        loader = loader.set_override("syntax", syntax.as_str())?;
    }
    if let Some(format) = matches.get_one::<String>("format") {
        loader = loader.set_override("default_format", format.as_str())?;
    }
    loader.build()
}

fn read_file(path: &Path) -> String {
    std::fs::read_to_string(path)
        .unwrap_or_else(|e| fail(&format!("Error reading {}", path.display()), e))
}

/// Locals from a `--data` file: YAML for .yaml/.yml, JSON otherwise.
fn read_locals(matches: &ArgMatches) -> Locals {
    let Some(path) = matches.get_one::<String>("data") else {
        return Locals::new();
    };
    let path = PathBuf::from(path);
    let text = read_file(&path);
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let value: Value = if is_yaml {
        serde_yaml::from_str(&text).unwrap_or_else(|e| fail("Invalid YAML data", e))
    } else {
        serde_json::from_str(&text).unwrap_or_else(|e| fail("Invalid JSON data", e))
    };
    locals_from_json(value)
}

fn handle_render_command(config: &EngineConfig, matches: &ArgMatches) {
    let name = matches.get_one::<String>("name").unwrap();
    let engine = Engine::from_config(config);
    let output = engine
        .render(name, &(), read_locals(matches))
        .unwrap_or_else(|e| fail("Render error", e));
    print!("{}", output);
}

fn handle_render_string_command(config: &EngineConfig, matches: &ArgMatches) {
    let source = matches.get_one::<String>("source").unwrap();
    let engine = Engine::from_config(config);
    let output = engine
        .render_string(source, &(), read_locals(matches))
        .unwrap_or_else(|e| fail("Render error", e));
    print!("{}", output);
}

fn handle_convert_command(config: &EngineConfig, matches: &ArgMatches) {
    let path = PathBuf::from(matches.get_one::<String>("path").unwrap());
    let to = matches
        .get_one::<String>("to")
        .and_then(|name| SyntaxName::parse(name))
        .unwrap();
    let text = read_file(&path);
    let origin: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
    let output = convert_source(&text, &origin, &config.syntax.syntax(), &to.syntax())
        .unwrap_or_else(|e| fail("Conversion error", e));
    print!("{}", output);
}

fn handle_tokens_command(config: &EngineConfig, matches: &ArgMatches) {
    let path = PathBuf::from(matches.get_one::<String>("path").unwrap());
    let text = read_file(&path);
    let origin: Arc<str> = Arc::from(path.to_string_lossy().as_ref());
    let tokens =
        tokenize(&text, &config.syntax.syntax(), &origin).unwrap_or_else(|e| fail("Lex error", e));
    let json = serde_json::to_string_pretty(&tokens).unwrap_or_else(|e| fail("Output error", e));
    println!("{}", json);
}

fn handle_compile_command(config: &EngineConfig, matches: &ArgMatches) {
    let name = matches.get_one::<String>("name").unwrap();
    let engine = Engine::from_config(config);
    let template = engine
        .template(name, engine.default_format())
        .unwrap_or_else(|e| fail("Compile error", e));
    let json = serde_json::to_string_pretty(template.instructions())
        .unwrap_or_else(|e| fail("Output error", e));
    println!("{}", json);
}
